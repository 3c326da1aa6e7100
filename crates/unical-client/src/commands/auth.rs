//! Authentication commands.

use tracing::info;

use unical_server::{Account, BackendSettings, CalendarConfig, GoogleSettings, google_config};

use crate::error::{ClientError, ClientResult};

/// Runs the Google authorization flow for one calendar.
///
/// The calendar defaults to the first `type: google` entry. The resulting
/// token is written to that entry's `token_file`, where the server picks it
/// up on first use.
pub async fn google(config: &CalendarConfig, calendar: Option<&str>) -> ClientResult<()> {
    use unical_providers::google::GoogleProvider;

    let (account, settings) = select_google_account(config, calendar)?;
    if !settings.credentials_file.is_file() {
        return Err(ClientError::Config(format!(
            "credentials file not found: {} (download an OAuth desktop client JSON from the Google Cloud Console)",
            settings.credentials_file.display()
        )));
    }

    eprintln!("Authorizing Google calendar '{}'...", account.name);
    eprintln!("A browser window will open for you to grant access.");
    eprintln!("If it does not, open the URL printed below.");
    eprintln!();

    let token = GoogleProvider::authorize(&google_config(settings)).await?;
    info!(
        account = %account.name,
        has_refresh_token = token.refresh_token.is_some(),
        "Google authorization complete"
    );

    eprintln!();
    eprintln!("Authorized. Token saved to {}", settings.token_file.display());
    Ok(())
}

/// Picks the account to authorize.
fn select_google_account<'a>(
    config: &'a CalendarConfig,
    calendar: Option<&str>,
) -> ClientResult<(&'a Account, &'a GoogleSettings)> {
    let account = match calendar {
        Some(name) => config.get(name).ok_or_else(|| {
            let available: Vec<_> = config.accounts.iter().map(|a| a.name.as_str()).collect();
            ClientError::Config(format!(
                "Unknown calendar '{name}'. Available: {}",
                available.join(", ")
            ))
        })?,
        None => config
            .accounts
            .iter()
            .find(|a| matches!(a.backend, BackendSettings::Google(_)))
            .ok_or_else(|| ClientError::Config("no google calendar configured".into()))?,
    };

    match &account.backend {
        BackendSettings::Google(settings) => Ok((account, settings)),
        _ => Err(ClientError::Config(format!(
            "calendar '{}' has type {}, not google",
            account.name,
            account.kind()
        ))),
    }
}

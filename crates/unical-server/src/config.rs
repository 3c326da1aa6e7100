//! Calendar accounts configuration.
//!
//! The accounts file is YAML with a top-level `calendars` list:
//!
//! ```yaml
//! calendars:
//!   - name: work
//!     label: Work (Exchange)
//!     type: ews
//!     ews_url: https://mail.example.com/EWS/Exchange.asmx
//!     username_env: EWS_USER
//!     password_env: EWS_PASSWORD
//!   - name: family
//!     type: google
//!     calendar_id: family@group.calendar.google.com
//!     credentials_file: /config/google_credentials.json
//! ```
//!
//! Secrets are never stored in the file, only the names of the environment
//! variables holding them. Those are read when the account is first used.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use unical_providers::BackendKind;

use crate::error::ConfigError;

/// Environment variable naming the accounts file.
pub const CONFIG_ENV: &str = "CALENDAR_CONFIG";

/// Accounts file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/config/calendar_accounts.yaml";

/// Google token file used when an account does not set `token_file`.
pub const DEFAULT_TOKEN_FILE: &str = "/data/google_calendar_token.json";

/// All configured accounts, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarConfig {
    pub accounts: Vec<Account>,
}

/// One configured calendar connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub backend: BackendSettings,
}

impl Account {
    /// Human label, falling back to the name.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> BackendKind {
        match self.backend {
            BackendSettings::Ews(_) => BackendKind::Ews,
            BackendSettings::Google(_) => BackendKind::Google,
            BackendSettings::CalDav(_) => BackendKind::CalDav,
        }
    }

    /// Environment variables this account reads its credentials from.
    pub fn credential_envs(&self) -> Vec<&str> {
        match &self.backend {
            BackendSettings::Ews(s) => vec![s.username_env.as_str(), s.password_env.as_str()],
            BackendSettings::CalDav(s) => vec![s.username_env.as_str(), s.password_env.as_str()],
            BackendSettings::Google(_) => Vec::new(),
        }
    }
}

/// Backend-specific keys, selected by the entry's `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendSettings {
    Ews(EwsSettings),
    Google(GoogleSettings),
    #[serde(rename = "caldav")]
    CalDav(CalDavSettings),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EwsSettings {
    pub ews_url: String,
    pub username_env: String,
    pub password_env: String,
    /// Mailbox to open when it differs from the login.
    #[serde(default)]
    pub email: Option<String>,
    /// IANA zone of the mailbox, used for all-day items.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GoogleSettings {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    pub credentials_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalDavSettings {
    pub url: String,
    pub username_env: String,
    pub password_env: String,
    /// Display name of the calendar below `url`.
    #[serde(default)]
    pub calendar_name: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_true() -> bool {
    true
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from(DEFAULT_TOKEN_FILE)
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    calendars: Option<Vec<serde_yaml::Value>>,
}

impl CalendarConfig {
    /// Loads the accounts file.
    ///
    /// A missing file is not an error: the server starts with no accounts.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            warn!(path = %path.display(), "Config file not found, no calendars configured");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        info!(
            path = %path.display(),
            accounts = config.accounts.len(),
            "Loaded calendar config"
        );
        Ok(config)
    }

    /// Parses and validates the YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            warn!("Config file is empty");
            return Ok(Self::default());
        }
        let raw: Option<RawConfig> = serde_yaml::from_str(content)?;
        let Some(entries) = raw.and_then(|r| r.calendars) else {
            warn!("No 'calendars' key in config file");
            return Ok(Self::default());
        };

        let mut accounts = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let account = parse_entry(index, entry)?;
            if !seen.insert(account.name.clone()) {
                return Err(ConfigError::entry(
                    index,
                    format!("duplicate calendar name '{}'", account.name),
                ));
            }
            warn_unset_env(&account);
            accounts.push(account);
        }

        Ok(Self { accounts })
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.name == name)
    }
}

fn parse_entry(index: usize, mut entry: serde_yaml::Value) -> Result<Account, ConfigError> {
    let Some(map) = entry.as_mapping_mut() else {
        return Err(ConfigError::entry(index, "expected a mapping"));
    };

    // `type` is matched case-insensitively.
    if let Some(serde_yaml::Value::String(kind)) = map.get_mut("type") {
        *kind = kind.trim().to_ascii_lowercase();
    }

    let mut account: Account =
        serde_yaml::from_value(entry).map_err(|e| ConfigError::entry(index, e.to_string()))?;
    account.name = account.name.trim().to_string();
    if account.name.is_empty() {
        return Err(ConfigError::entry(index, "'name' must not be empty"));
    }
    Ok(account)
}

fn warn_unset_env(account: &Account) {
    for var in account.credential_envs() {
        let unset = std::env::var_os(var).is_none_or(|v| v.is_empty());
        if unset {
            warn!(account = %account.name, env = var, "Credential environment variable not set");
        }
    }
}

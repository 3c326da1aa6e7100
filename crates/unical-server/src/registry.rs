//! Account registry with lazily connected adapters.
//!
//! Adapters are built on first use and cached for the life of the process.
//! Each account has its own [`OnceCell`], so concurrent first calls for the
//! same account share one connection attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use unical_providers::caldav::{CalDavConfig, CalDavProvider};
use unical_providers::ews::{EwsConfig, EwsProvider};
use unical_providers::google::{GoogleConfig, GoogleProvider};
use unical_providers::{BoxFuture, CalendarProvider, ProviderError, ProviderResult};

use crate::config::{Account, BackendSettings, CalDavSettings, CalendarConfig, EwsSettings, GoogleSettings};
use crate::error::{CalendarError, CalendarResult};

/// A shared adapter handle.
pub type Adapter = Arc<dyn CalendarProvider>;

/// Builds the adapter for one account.
///
/// The registry only calls this once per account unless construction fails.
pub trait AdapterFactory: Send + Sync {
    fn connect<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, ProviderResult<Adapter>>;
}

/// The factory used in production: dispatches on the account's backend type.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendFactory;

impl AdapterFactory for BackendFactory {
    fn connect<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, ProviderResult<Adapter>> {
        Box::pin(async move {
            let adapter: Adapter = match &account.backend {
                BackendSettings::Ews(settings) => {
                    let config = ews_config(&account.name, settings)?;
                    Arc::new(EwsProvider::connect(&account.name, config).await?)
                }
                BackendSettings::Google(settings) => {
                    Arc::new(GoogleProvider::connect(&account.name, google_config(settings)).await?)
                }
                BackendSettings::CalDav(settings) => {
                    let config = caldav_config(&account.name, settings)?;
                    Arc::new(CalDavProvider::connect(&account.name, config).await?)
                }
            };
            Ok(adapter)
        })
    }
}

/// Reads a username/password pair from the named environment variables.
fn env_credentials(
    account: &str,
    username_env: &str,
    password_env: &str,
) -> ProviderResult<(String, String)> {
    let read = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
    match (read(username_env), read(password_env)) {
        (Some(username), Some(password)) => Ok((username, password)),
        _ => Err(ProviderError::configuration(format!(
            "Calendar '{account}': credentials not set ({username_env}, {password_env})"
        ))),
    }
}

fn ews_config(account: &str, settings: &EwsSettings) -> ProviderResult<EwsConfig> {
    let (username, password) =
        env_credentials(account, &settings.username_env, &settings.password_env)?;
    let mut config = EwsConfig::new(&settings.ews_url)
        .map_err(|e| ProviderError::configuration(format!("invalid ews_url: {e}")))?
        .with_credentials(username, password);
    if let Some(email) = &settings.email {
        config = config.with_email(email);
    }
    if let Some(timezone) = &settings.timezone {
        config = config.with_timezone(timezone)?;
    }
    config.verify_tls = settings.verify_tls;
    Ok(config)
}

/// Builds the Google adapter config for an account; also used by the auth command.
pub fn google_config(settings: &GoogleSettings) -> GoogleConfig {
    let mut config = GoogleConfig::new(&settings.credentials_file)
        .with_calendar_id(&settings.calendar_id)
        .with_token_file(&settings.token_file);
    if let Some(timezone) = &settings.timezone {
        config = config.with_timezone(timezone);
    }
    config
}

fn caldav_config(account: &str, settings: &CalDavSettings) -> ProviderResult<CalDavConfig> {
    let (username, password) =
        env_credentials(account, &settings.username_env, &settings.password_env)?;
    let mut config = CalDavConfig::new(&settings.url)
        .map_err(|e| ProviderError::configuration(format!("invalid url: {e}")))?
        .with_credentials(username, password);
    if let Some(name) = &settings.calendar_name {
        config = config.with_calendar_name(name);
    }
    if !settings.verify_tls {
        config = config.with_insecure_tls();
    }
    Ok(config)
}

/// Configured accounts plus their cached adapters.
pub struct AccountRegistry {
    accounts: Vec<Account>,
    adapters: HashMap<String, OnceCell<Adapter>>,
    factory: Arc<dyn AdapterFactory>,
}

impl AccountRegistry {
    /// Creates a registry that connects real backends.
    pub fn new(config: CalendarConfig) -> Self {
        Self::with_factory(config, Arc::new(BackendFactory))
    }

    pub fn with_factory(config: CalendarConfig, factory: Arc<dyn AdapterFactory>) -> Self {
        let adapters = config
            .accounts
            .iter()
            .map(|a| (a.name.clone(), OnceCell::new()))
            .collect();
        Self {
            accounts: config.accounts,
            adapters,
            factory,
        }
    }

    /// Configured accounts in file order.
    pub fn list(&self) -> &[Account] {
        &self.accounts
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accounts.iter().map(|a| a.name.as_str())
    }

    /// Looks up an account without connecting it.
    pub fn account(&self, name: &str) -> CalendarResult<&Account> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| CalendarError::unknown_account(name, self.names()))
    }

    /// Returns the adapter for `name`, connecting it on first use.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> CalendarResult<Adapter> {
        let account = self.account(name)?;
        let Some(cell) = self.adapters.get(name) else {
            return Err(CalendarError::unknown_account(name, self.names()));
        };

        if let Some(adapter) = cell.get() {
            return Ok(Arc::clone(adapter));
        }

        let adapter = cell
            .get_or_try_init(|| async {
                let started = Instant::now();
                debug!(account = %account.name, kind = %account.kind(), "Connecting adapter");
                let adapter = self.factory.connect(account).await?;
                info!(
                    account = %account.name,
                    kind = %account.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Adapter connected"
                );
                Ok::<_, ProviderError>(adapter)
            })
            .await
            .map_err(|e| {
                warn!(account = %account.name, error = %e, "Adapter connection failed");
                CalendarError::connect_failed(&account.name, account.kind(), e)
            })?;
        Ok(Arc::clone(adapter))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory adapters for registry, fan-out and tool tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use unical_core::{CanonicalEvent, EventDraft, EventPatch, TimeWindow};
    use unical_providers::{BackendKind, ErrorProvider, retain_in_window};

    use super::*;

    /// A provider holding its events in memory.
    pub struct MemoryProvider {
        name: String,
        kind: BackendKind,
        events: Mutex<Vec<CanonicalEvent>>,
        next_id: AtomicUsize,
    }

    impl MemoryProvider {
        pub fn new(name: &str, kind: BackendKind, events: Vec<CanonicalEvent>) -> Self {
            Self {
                name: name.to_string(),
                kind,
                events: Mutex::new(events),
                next_id: AtomicUsize::new(1),
            }
        }

        fn find(&self, id: &str) -> ProviderResult<CanonicalEvent> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| ProviderError::not_found(format!("Event not found: {id}")))
        }
    }

    impl CalendarProvider for MemoryProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn list_events(
            &self,
            window: TimeWindow,
        ) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
            let events = self.events.lock().unwrap().clone();
            Box::pin(async move { Ok(retain_in_window(events, &window)) })
        }

        fn get_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
            Box::pin(async move { self.find(id) })
        }

        fn create_event(
            &self,
            draft: EventDraft,
        ) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
            Box::pin(async move {
                draft.validate()?;
                let id = format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst));
                let event = CanonicalEvent::from_draft(id, draft);
                self.events.lock().unwrap().push(event.clone());
                Ok(event)
            })
        }

        fn update_event<'a>(
            &'a self,
            id: &'a str,
            patch: EventPatch,
        ) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
            Box::pin(async move {
                let updated = patch.apply(&self.find(id)?)?;
                let mut events = self.events.lock().unwrap();
                if let Some(slot) = events.iter_mut().find(|e| e.id == id) {
                    *slot = updated.clone();
                }
                Ok(updated)
            })
        }

        fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                let mut events = self.events.lock().unwrap();
                let before = events.len();
                events.retain(|e| e.id != id);
                if events.len() == before {
                    return Err(ProviderError::not_found(format!("Event not found: {id}")));
                }
                Ok(())
            })
        }
    }

    /// Hands out prepared adapters and counts connection attempts.
    #[derive(Default)]
    pub struct StaticFactory {
        adapters: Mutex<HashMap<String, Adapter>>,
        failures: Mutex<HashMap<String, ProviderError>>,
        pub connects: AtomicUsize,
    }

    impl StaticFactory {
        pub fn with_adapter(self, name: &str, adapter: Adapter) -> Self {
            self.adapters.lock().unwrap().insert(name.to_string(), adapter);
            self
        }

        pub fn with_events(self, name: &str, events: Vec<CanonicalEvent>) -> Self {
            let adapter = Arc::new(MemoryProvider::new(name, BackendKind::CalDav, events));
            self.with_adapter(name, adapter)
        }

        /// Makes connecting `name` fail.
        pub fn failing(self, name: &str, error: ProviderError) -> Self {
            self.failures.lock().unwrap().insert(name.to_string(), error);
            self
        }

        /// An adapter that connects but fails every operation.
        pub fn broken(self, name: &str, error: ProviderError) -> Self {
            let adapter = Arc::new(ErrorProvider::new(name, BackendKind::Ews, error));
            self.with_adapter(name, adapter)
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl AdapterFactory for StaticFactory {
        fn connect<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, ProviderResult<Adapter>> {
            Box::pin(async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                // Yield so concurrent first calls overlap.
                tokio::task::yield_now().await;
                if let Some(error) = self.failures.lock().unwrap().get(&account.name) {
                    return Err(error.duplicate());
                }
                self.adapters
                    .lock()
                    .unwrap()
                    .get(&account.name)
                    .cloned()
                    .ok_or_else(|| ProviderError::configuration("no test adapter"))
            })
        }
    }

    /// A config with one CalDAV account per name.
    pub fn config(names: &[&str]) -> CalendarConfig {
        let accounts = names
            .iter()
            .map(|name| Account {
                name: name.to_string(),
                label: Some(format!("{name} label")),
                backend: BackendSettings::CalDav(CalDavSettings {
                    url: "https://dav.example.com/".into(),
                    username_env: "U".into(),
                    password_env: "P".into(),
                    calendar_name: None,
                    verify_tls: true,
                }),
            })
            .collect();
        CalendarConfig { accounts }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use unical_providers::BackendKind;

    #[tokio::test]
    async fn resolve_connects_once_and_returns_same_instance() {
        let factory = Arc::new(StaticFactory::default().with_events("work", vec![]));
        let registry = AccountRegistry::with_factory(config(&["work"]), factory.clone());

        let first = registry.resolve("work").await.unwrap();
        let second = registry.resolve("work").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_connects_once() {
        let factory = Arc::new(StaticFactory::default().with_events("work", vec![]));
        let registry = Arc::new(AccountRegistry::with_factory(config(&["work"]), factory.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.resolve("work").await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn unknown_account_does_not_connect() {
        let factory = Arc::new(StaticFactory::default());
        let registry = AccountRegistry::with_factory(config(&["work", "family"]), factory.clone());

        let err = registry.resolve("nope").await.err().unwrap();
        assert_eq!(err.kind(), "unknown_account");
        assert!(err.to_string().contains("work, family"));
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test]
    async fn connection_failure_is_reported_and_retried_next_time() {
        let factory = Arc::new(
            StaticFactory::default().failing("work", ProviderError::network("refused")),
        );
        let registry = AccountRegistry::with_factory(config(&["work"]), factory.clone());

        let err = registry.resolve("work").await.err().unwrap();
        match err {
            CalendarError::BackendConnection { account, kind, .. } => {
                assert_eq!(account, "work");
                assert_eq!(kind, BackendKind::CalDav);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(registry.resolve("work").await.is_err());
        assert_eq!(factory.connect_count(), 2);
    }

    #[test]
    fn missing_env_credentials_are_a_configuration_error() {
        let err = env_credentials("work", "UNICAL_TEST_UNSET_USER", "UNICAL_TEST_UNSET_PASS")
            .unwrap_err();
        assert!(err.message().contains("UNICAL_TEST_UNSET_USER"));
    }

    #[test]
    fn google_settings_map_to_config() {
        let settings = GoogleSettings {
            calendar_id: "family@group.calendar.google.com".into(),
            credentials_file: "/config/google.json".into(),
            token_file: "/data/family.json".into(),
            timezone: Some("Europe/Berlin".into()),
        };
        let config = google_config(&settings);
        assert_eq!(config.calendar_id, "family@group.calendar.google.com");
        assert_eq!(config.token_file, std::path::PathBuf::from("/data/family.json"));
        assert_eq!(config.timezone.as_deref(), Some("Europe/Berlin"));
    }
}

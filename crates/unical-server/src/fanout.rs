//! Concurrent listing across accounts.
//!
//! Every requested account is queried at once. Accounts that fail are
//! reported next to the merged events instead of failing the whole query.

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};
use unical_core::{AccountEvent, TimeWindow};

use crate::error::{CalendarError, CalendarResult};
use crate::registry::AccountRegistry;

/// One account that could not be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountFailure {
    #[serde(rename = "calendar")]
    pub account: String,
    pub kind: &'static str,
    pub message: String,
}

impl AccountFailure {
    pub fn new(account: impl Into<String>, error: &CalendarError) -> Self {
        Self {
            account: account.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Events from several accounts in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedEventList {
    pub events: Vec<AccountEvent>,
    pub failures: Vec<AccountFailure>,
}

impl MergedEventList {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Merges per-account results.
///
/// Events are sorted by start instant, ties broken by account name. The
/// sort is stable so one account's events keep their relative order.
pub fn merge<I>(results: I) -> MergedEventList
where
    I: IntoIterator<Item = (String, CalendarResult<Vec<unical_core::CanonicalEvent>>)>,
{
    let mut merged = MergedEventList::default();
    for (account, result) in results {
        match result {
            Ok(events) => merged
                .events
                .extend(events.into_iter().map(|e| AccountEvent::new(account.clone(), e))),
            Err(error) => merged.failures.push(AccountFailure::new(account, &error)),
        }
    }
    merged.events.sort_by(|a, b| {
        a.event
            .start
            .cmp(&b.event.start)
            .then_with(|| a.account.cmp(&b.account))
    });
    merged
}

/// Lists one account, mapping adapter failures to [`CalendarError`].
pub async fn list_account(
    registry: &AccountRegistry,
    name: &str,
    window: &TimeWindow,
) -> CalendarResult<Vec<unical_core::CanonicalEvent>> {
    let adapter = registry.resolve(name).await?;
    adapter
        .list_events(window.clone())
        .await
        .map_err(|e| CalendarError::operation_failed(name, None, e))
}

/// Queries `names` concurrently and merges the results.
pub async fn fan_out_list(
    registry: &AccountRegistry,
    names: &[String],
    window: &TimeWindow,
) -> MergedEventList {
    let queries = names.iter().map(|name| async move {
        let result = list_account(registry, name, window).await;
        match &result {
            Ok(events) => debug!(account = %name, count = events.len(), "Listed account"),
            Err(e) => warn!(account = %name, kind = e.kind(), error = %e, "Account listing failed"),
        }
        (name.clone(), result)
    });
    merge(join_all(queries).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use unical_core::{CanonicalEvent, EventTime};
    use unical_providers::ProviderError;

    use super::*;
    use crate::registry::testing::{StaticFactory, config};

    fn at(h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap())
    }

    fn event(id: &str, start: u32) -> CanonicalEvent {
        CanonicalEvent::new(id, id, at(start), at(start + 1))
    }

    fn day() -> TimeWindow {
        TimeWindow::for_utc_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_sorts_by_start_then_account() {
        let merged = merge(vec![
            ("work".to_string(), Ok(vec![event("w1", 10), event("w2", 8)])),
            ("family".to_string(), Ok(vec![event("f1", 10), event("f2", 9)])),
        ]);
        let order: Vec<_> = merged.events.iter().map(|e| e.event.id.as_str()).collect();
        assert_eq!(order, vec!["w2", "f2", "f1", "w1"]);
        assert!(!merged.is_partial());
    }

    #[test]
    fn merge_is_deterministic_regardless_of_input_order() {
        let a = merge(vec![
            ("b".to_string(), Ok(vec![event("b1", 9)])),
            ("a".to_string(), Ok(vec![event("a1", 9)])),
        ]);
        let b = merge(vec![
            ("a".to_string(), Ok(vec![event("a1", 9)])),
            ("b".to_string(), Ok(vec![event("b1", 9)])),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.events[0].account, "a");
    }

    #[test]
    fn all_day_events_sort_by_their_utc_midnight() {
        let all_day = CanonicalEvent::new(
            "holiday",
            "Holiday",
            EventTime::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            EventTime::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        );
        let merged = merge(vec![("x".to_string(), Ok(vec![event("m", 8), all_day]))]);
        assert_eq!(merged.events[0].event.id, "holiday");
    }

    #[tokio::test]
    async fn one_failing_account_does_not_hide_the_others() {
        let factory = StaticFactory::default()
            .with_events("work", vec![event("w1", 11)])
            .with_events("family", vec![event("f1", 9)])
            .failing("club", ProviderError::network("connection refused"));
        let registry =
            AccountRegistry::with_factory(config(&["work", "family", "club"]), Arc::new(factory));

        let merged = fan_out_list(&registry, &names(&["work", "family", "club"]), &day()).await;

        let ids: Vec<_> = merged.events.iter().map(|e| e.event.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "w1"]);
        assert_eq!(merged.failures.len(), 1);
        assert_eq!(merged.failures[0].account, "club");
        assert_eq!(merged.failures[0].kind, "backend_connection");
    }

    #[tokio::test]
    async fn operation_failures_are_reported_per_account() {
        let factory = StaticFactory::default()
            .with_events("work", vec![event("w1", 11)])
            .broken("family", ProviderError::server("HTTP 503"));
        let registry = AccountRegistry::with_factory(config(&["work", "family"]), Arc::new(factory));

        let merged = fan_out_list(&registry, &names(&["work", "family"]), &day()).await;
        assert_eq!(merged.events.len(), 1);
        assert_eq!(merged.failures[0].kind, "backend");
        assert!(merged.failures[0].message.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn missing_collection_is_a_backend_failure() {
        let factory = StaticFactory::default()
            .with_events("work", vec![event("w1", 11)])
            .broken("family", ProviderError::not_found("calendar collection returned 404"));
        let registry = AccountRegistry::with_factory(config(&["work", "family"]), Arc::new(factory));

        let merged = fan_out_list(&registry, &names(&["work", "family"]), &day()).await;
        assert_eq!(merged.events.len(), 1);
        assert_eq!(merged.failures[0].account, "family");
        assert_eq!(merged.failures[0].kind, "backend");
        assert!(merged.failures[0].message.contains("returned 404"));
    }

    #[tokio::test]
    async fn events_outside_the_window_are_dropped() {
        let late = CanonicalEvent::new(
            "next-day",
            "Tomorrow",
            EventTime::parse("2024-01-02T09:00:00Z").unwrap(),
            EventTime::parse("2024-01-02T10:00:00Z").unwrap(),
        );
        let factory = StaticFactory::default().with_events("work", vec![event("w1", 9), late]);
        let registry = AccountRegistry::with_factory(config(&["work"]), Arc::new(factory));

        let merged = fan_out_list(&registry, &names(&["work"]), &day()).await;
        assert_eq!(merged.events.len(), 1);
        assert_eq!(merged.events[0].event.id, "w1");
    }
}

//! Event types shared by every backend.
//!
//! - [`CanonicalEvent`]: the backend-agnostic event representation
//! - [`EventDraft`]: the fields needed to create an event
//! - [`EventPatch`]: a partial update, only `Some` fields are applied
//! - [`AccountEvent`]: an event paired with the account it came from

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::time::EventTime;

/// A calendar event normalized from any backend.
///
/// `id` is opaque and only unique within the account that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl CanonicalEvent {
    /// Creates an event with only the required fields.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            description: None,
            location: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns `true` if the event starts on an all-day date.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Builds the event a backend should hold after storing `draft` under `id`.
    pub fn from_draft(id: impl Into<String>, draft: EventDraft) -> Self {
        Self {
            id: id.into(),
            title: draft.title,
            start: draft.start,
            end: draft.end,
            description: draft.description,
            location: draft.location,
        }
    }
}

/// The fields of an event to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            description: None,
            location: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Checks the draft can be stored by any backend.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        validate_range(&self.start, &self.end)
    }
}

/// A partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl EventPatch {
    /// Returns `true` when no field would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
    }

    /// Checks the patch on its own, before the current event is known.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyTitle);
        }
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            validate_range(start, end)?;
        }
        Ok(())
    }

    /// Applies the patch to `current`, validating the merged result.
    pub fn apply(&self, current: &CanonicalEvent) -> ValidationResult<CanonicalEvent> {
        let mut merged = current.clone();
        if let Some(title) = &self.title {
            merged.title = title.clone();
        }
        if let Some(start) = &self.start {
            merged.start = start.clone();
        }
        if let Some(end) = &self.end {
            merged.end = end.clone();
        }
        if let Some(description) = &self.description {
            merged.description = Some(description.clone());
        }
        if let Some(location) = &self.location {
            merged.location = Some(location.clone());
        }
        validate_range(&merged.start, &merged.end)?;
        Ok(merged)
    }
}

/// An event tagged with the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub account: String,
    pub event: CanonicalEvent,
}

impl AccountEvent {
    pub fn new(account: impl Into<String>, event: CanonicalEvent) -> Self {
        Self {
            account: account.into(),
            event,
        }
    }
}

fn validate_range(start: &EventTime, end: &EventTime) -> ValidationResult<()> {
    if !start.same_kind(end) {
        return Err(ValidationError::MixedTimeKinds);
    }
    if start > end {
        return Err(ValidationError::start_after_end(start, end));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap())
    }

    fn day(d: u32) -> EventTime {
        EventTime::from_date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    }

    fn sample() -> CanonicalEvent {
        CanonicalEvent::new("abc", "Standup", at(9), at(10))
            .with_description("daily")
            .with_location("Room 1")
    }

    #[test]
    fn draft_accepts_equal_start_end() {
        assert!(EventDraft::new("Reminder", at(9), at(9)).validate().is_ok());
    }

    #[test]
    fn draft_rejects_start_after_end() {
        let err = EventDraft::new("Bad", at(10), at(9)).validate().unwrap_err();
        assert!(matches!(err, ValidationError::StartAfterEnd { .. }));
    }

    #[test]
    fn draft_rejects_blank_title() {
        let err = EventDraft::new("   ", at(9), at(10)).validate().unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
    }

    #[test]
    fn draft_rejects_mixed_kinds() {
        let err = EventDraft::new("Mixed", day(1), at(10)).validate().unwrap_err();
        assert_eq!(err, ValidationError::MixedTimeKinds);
    }

    #[test]
    fn all_day_draft() {
        let draft = EventDraft::new("Holiday", day(1), day(2));
        assert!(draft.validate().is_ok());
        assert!(CanonicalEvent::from_draft("x", draft).is_all_day());
    }

    #[test]
    fn empty_patch() {
        let patch = EventPatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.validate(), Err(ValidationError::EmptyPatch));
    }

    #[test]
    fn patch_title_only_leaves_rest() {
        let patch = EventPatch {
            title: Some("X".into()),
            ..Default::default()
        };
        let updated = patch.apply(&sample()).unwrap();
        assert_eq!(updated.title, "X");
        assert_eq!(updated.start, at(9));
        assert_eq!(updated.end, at(10));
        assert_eq!(updated.description.as_deref(), Some("daily"));
        assert_eq!(updated.location.as_deref(), Some("Room 1"));
        assert_eq!(updated.id, "abc");
    }

    #[test]
    fn patch_start_past_existing_end_is_rejected() {
        let patch = EventPatch {
            start: Some(at(11)),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
        let err = patch.apply(&sample()).unwrap_err();
        assert!(matches!(err, ValidationError::StartAfterEnd { .. }));
    }

    #[test]
    fn patch_moving_both_bounds() {
        let patch = EventPatch {
            start: Some(at(14)),
            end: Some(at(15)),
            ..Default::default()
        };
        let updated = patch.apply(&sample()).unwrap();
        assert_eq!(updated.start, at(14));
        assert_eq!(updated.end, at(15));
    }
}

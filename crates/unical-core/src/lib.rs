//! Core types: canonical events, event times, validation, tracing

pub mod error;
pub mod event;
pub mod time;
pub mod tracing;

pub use error::{ValidationError, ValidationResult};
pub use event::{AccountEvent, CanonicalEvent, EventDraft, EventPatch};
pub use time::{EventTime, TimeWindow};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};

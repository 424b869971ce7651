//! syncward core library: domain types, persisted processing state,
//! partial-failure reporting, settings and errors.
//!
//! - [`types`]: project codes, queue stages, action kinds, statuses
//! - [`cycle`]: the fixed action ordering and its stage mapping
//! - [`state`]: [`ProcessingState`] records and the [`StateStore`]
//! - [`reporting`]: [`ConversionError`], [`ErrorReport`], [`EntryCounts`]
//! - [`settings`]: [`Settings`] loading and path layout

pub mod cycle;
pub mod error;
pub mod fs;
pub mod records;
pub mod reporting;
pub mod settings;
pub mod state;
pub mod types;

pub use error::CoreError;
pub use records::{Comment, Record};
pub use reporting::{ConversionError, EntryCounts, ErrorReport, ReportableEntry};
pub use settings::{LogFormat, Settings};
pub use state::{ProcessingState, StateStore, TrackedState};
pub use types::{ActionKind, ErrorCode, ProjectCode, QueueStage, Status};

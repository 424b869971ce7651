//! Partial-failure aggregation for bulk conversions.
//!
//! A transfer action catches each per-item failure and routes it into a
//! [`ConversionError`]; nothing here catches or raises. When the run is over
//! the aggregate is flattened with [`ConversionError::create_reports`] into
//! the serializable [`ConversionErrors`] shape and attached to the project's
//! state inside an [`ErrorReport`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::{Comment, Record};

/// Longest comment excerpt carried in a report label.
pub const COMMENT_LABEL_CHARS: usize = 100;

/// Stable identity and a short human label for a failed entry.
pub trait ReportableEntry {
    fn guid(&self) -> Option<Uuid>;
    fn storage_id(&self) -> Option<String>;
    fn label(&self) -> String;
}

impl ReportableEntry for Record {
    fn guid(&self) -> Option<Uuid> {
        Some(self.guid)
    }

    fn storage_id(&self) -> Option<String> {
        self.id.clone()
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EntryConversionError<E> {
    pub entry: Option<E>,
    pub error: Option<String>,
}

impl<E: ReportableEntry> EntryConversionError<E> {
    pub fn new(entry: E, error: Option<String>) -> Self {
        Self {
            entry: Some(entry),
            error,
        }
    }

    pub fn entry_guid(&self) -> Uuid {
        self.entry
            .as_ref()
            .and_then(ReportableEntry::guid)
            .unwrap_or_else(Uuid::nil)
    }

    pub fn storage_id(&self) -> Option<String> {
        self.entry.as_ref().and_then(ReportableEntry::storage_id)
    }

    pub fn label(&self) -> String {
        self.entry
            .as_ref()
            .map(ReportableEntry::label)
            .unwrap_or_default()
    }

    fn to_report(&self) -> SingleItemReport {
        SingleItemReport {
            guid: self.entry_guid(),
            id: self.storage_id(),
            exception_message: self.error.clone(),
            label: self.label(),
            entry: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommentConversionError<E> {
    pub comment: Comment,
    pub error: String,
    pub entry_error: Option<EntryConversionError<E>>,
    /// Entry guid when only the guid, not the entry, is known.
    pub entry_guid: Option<Uuid>,
}

impl<E: ReportableEntry> CommentConversionError<E> {
    pub fn entry_guid(&self) -> Uuid {
        match (&self.entry_error, self.entry_guid) {
            (Some(entry_error), _) => entry_error.entry_guid(),
            (None, Some(guid)) => guid,
            (None, None) => self.comment.entry_guid.unwrap_or_else(Uuid::nil),
        }
    }

    pub fn comment_guid(&self) -> Uuid {
        self.comment.guid.unwrap_or_else(Uuid::nil)
    }

    /// First [`COMMENT_LABEL_CHARS`] characters of the comment text.
    pub fn label(&self) -> String {
        self.comment
            .content
            .as_deref()
            .map(|c| c.chars().take(COMMENT_LABEL_CHARS).collect())
            .unwrap_or_default()
    }

    fn to_report(&self) -> SingleItemReport {
        let entry = match &self.entry_error {
            Some(entry_error) => Some(Box::new(entry_error.to_report())),
            None => self.entry_guid.map(|guid| {
                Box::new(SingleItemReport {
                    guid,
                    ..SingleItemReport::default()
                })
            }),
        };
        SingleItemReport {
            guid: self.comment_guid(),
            id: self.comment.id.clone(),
            exception_message: Some(self.error.clone()),
            label: self.label(),
            entry,
        }
    }
}

/// Append-only record of per-item failures during one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionError<E> {
    pub entry_errors: Vec<EntryConversionError<E>>,
    pub comment_errors: Vec<CommentConversionError<E>>,
}

impl<E> Default for ConversionError<E> {
    fn default() -> Self {
        Self {
            entry_errors: Vec::new(),
            comment_errors: Vec::new(),
        }
    }
}

impl<E: ReportableEntry> ConversionError<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        !self.entry_errors.is_empty() || !self.comment_errors.is_empty()
    }

    pub fn entry_error_count(&self) -> usize {
        self.entry_errors.len()
    }

    pub fn comment_error_count(&self) -> usize {
        self.comment_errors.len()
    }

    pub fn count(&self) -> usize {
        self.entry_error_count() + self.comment_error_count()
    }

    pub fn add_entry_error(&mut self, entry: E, error: impl fmt::Display) {
        self.entry_errors
            .push(EntryConversionError::new(entry, Some(error.to_string())));
    }

    pub fn add_comment_error(
        &mut self,
        comment: Comment,
        error: impl fmt::Display,
        entry_error: Option<EntryConversionError<E>>,
    ) {
        self.comment_errors.push(CommentConversionError {
            comment,
            error: error.to_string(),
            entry_error,
            entry_guid: None,
        });
    }

    /// Record a comment failure whose owning entry converted fine.
    pub fn add_comment_error_for_entry(&mut self, comment: Comment, error: impl fmt::Display, entry: E) {
        self.add_comment_error(comment, error, Some(EntryConversionError::new(entry, None)));
    }

    /// Record a comment failure when only the owning entry's guid is known.
    pub fn add_comment_error_for_guid(&mut self, comment: Comment, error: impl fmt::Display, entry_guid: Uuid) {
        self.comment_errors.push(CommentConversionError {
            comment,
            error: error.to_string(),
            entry_error: None,
            entry_guid: Some(entry_guid),
        });
    }

    pub fn add_comment_errors(&mut self, errors: Vec<CommentConversionError<E>>) {
        self.comment_errors.extend(errors);
    }

    /// Flatten into the durable report shape.
    pub fn create_reports(&self) -> ConversionErrors {
        ConversionErrors {
            entries: ErrorList::from_items(
                self.entry_errors.iter().map(EntryConversionError::to_report).collect(),
            ),
            comments: ErrorList::from_items(
                self.comment_errors.iter().map(CommentConversionError::to_report).collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Serializable report shape
// ---------------------------------------------------------------------------

/// Timestamped snapshot of a fatal error and/or skipped items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(default)]
    pub skipped: ConversionErrorReport,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            exception_message: None,
            skipped: ConversionErrorReport::default(),
        }
    }

    /// Items skipped while writing into the local store.
    pub fn from_local_conversion(errors: ConversionErrors) -> Self {
        let mut report = Self::new();
        report.skipped.to_local = Some(errors);
        report
    }

    /// Items skipped while writing into the remote document store.
    pub fn from_remote_conversion(errors: ConversionErrors) -> Self {
        let mut report = Self::new();
        report.skipped.to_remote = Some(errors);
        report
    }

    pub fn with_exception(mut self, error: impl fmt::Display) -> Self {
        self.exception_message = Some(error.to_string());
        self
    }

    pub fn skipped_count(&self) -> usize {
        [&self.skipped.to_local, &self.skipped.to_remote]
            .into_iter()
            .flatten()
            .map(|e| e.entries.count + e.comments.count)
            .sum()
    }
}

impl Default for ErrorReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionErrorReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_remote: Option<ConversionErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_local: Option<ConversionErrors>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionErrors {
    pub entries: ErrorList,
    pub comments: ErrorList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorList {
    pub count: usize,
    pub list: Vec<SingleItemReport>,
}

impl ErrorList {
    fn from_items(list: Vec<SingleItemReport>) -> Self {
        Self {
            count: list.len(),
            list,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleItemReport {
    pub guid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Box<SingleItemReport>>,
}

// ---------------------------------------------------------------------------
// Entry counts
// ---------------------------------------------------------------------------

/// Added/modified/deleted tallies for one conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl EntryCounts {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }

    /// Commit message recorded in the local repository for these changes.
    pub fn commit_message(&self) -> String {
        if self.total() == 0 {
            return "syncward: no changes".to_string();
        }
        format!(
            "syncward: {} added, {} modified, {} deleted",
            self.added, self.modified, self.deleted
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_accumulator_is_empty() {
        let errors = ConversionError::<Record>::new();
        assert!(!errors.any());
        assert_eq!(errors.count(), 0);
    }

    #[test]
    fn entry_error_counts() {
        let mut errors = ConversionError::new();
        errors.add_entry_error(Record::new("apple"), "bad gloss");
        assert!(errors.any());
        assert_eq!(errors.entry_error_count(), 1);
        assert_eq!(errors.comment_error_count(), 0);
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn comment_error_counts() {
        let entry = Record::new("pear");
        let mut errors = ConversionError::new();
        errors.add_comment_error_for_entry(Comment::new(entry.guid, "typo"), "no author", entry);
        assert!(errors.any());
        assert_eq!(errors.entry_error_count(), 0);
        assert_eq!(errors.comment_error_count(), 1);
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn errors_are_never_overwritten() {
        let mut errors = ConversionError::new();
        let entry = Record::new("dup");
        errors.add_entry_error(entry.clone(), "first");
        errors.add_entry_error(entry, "second");
        let report = errors.create_reports();
        assert_eq!(report.entries.count, 2);
        assert_eq!(report.entries.list[0].exception_message.as_deref(), Some("first"));
        assert_eq!(report.entries.list[1].exception_message.as_deref(), Some("second"));
    }

    #[test]
    fn comment_label_is_truncated_on_char_boundary() {
        let entry = Record::new("long");
        let long = "é".repeat(150);
        let mut errors = ConversionError::new();
        errors.add_comment_error_for_entry(Comment::new(entry.guid, long), "boom", entry.clone());
        errors.add_comment_error_for_entry(Comment::new(entry.guid, "short"), "boom", entry);

        let report = errors.create_reports();
        assert_eq!(report.comments.list[0].label.chars().count(), COMMENT_LABEL_CHARS);
        assert_eq!(report.comments.list[1].label, "short");
    }

    #[test]
    fn report_keys_items_by_identity_and_renders_errors_as_text() {
        let mut entry = Record::new("banana");
        entry.id = Some("mongo-1".into());
        let mut errors = ConversionError::new();
        errors.add_entry_error(entry.clone(), std::io::Error::other("disk on fire"));
        errors.add_comment_error_for_guid(Comment::new(entry.guid, "hi"), "orphan", entry.guid);

        let report = ErrorReport::from_local_conversion(errors.create_reports()).with_exception("fatal");
        let json = serde_json::to_value(&report).unwrap();

        let item = &json["skipped"]["to_local"]["entries"]["list"][0];
        assert_eq!(item["guid"], serde_json::json!(entry.guid));
        assert_eq!(item["id"], "mongo-1");
        assert_eq!(item["exception_message"], "disk on fire");
        assert!(item.get("entry").is_none(), "absent entry must not serialize");

        let comment = &json["skipped"]["to_local"]["comments"]["list"][0];
        assert_eq!(comment["entry"]["guid"], serde_json::json!(entry.guid));
        assert_eq!(json["exception_message"], "fatal");
        assert_eq!(report.skipped_count(), 2);
    }

    #[test]
    fn entry_counts_reset_and_message() {
        let mut counts = EntryCounts {
            added: 2,
            modified: 1,
            deleted: 0,
        };
        assert_eq!(counts.commit_message(), "syncward: 2 added, 1 modified, 0 deleted");
        counts.reset();
        assert_eq!(counts, EntryCounts::default());
        assert_eq!(counts.commit_message(), "syncward: no changes");
    }
}

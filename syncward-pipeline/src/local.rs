//! In-memory model of a project's local structured store, shared by the
//! file-backed store and the test fakes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use syncward_core::{Comment, EntryCounts, Record};

use crate::error::ActionError;

/// Effect of applying one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

impl Change {
    pub fn tally(self, counts: &mut EntryCounts) {
        match self {
            Change::Added => counts.added += 1,
            Change::Modified => counts.modified += 1,
            Change::Deleted => counts.deleted += 1,
            Change::Unchanged => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalData {
    pub model_version: u32,
    #[serde(default)]
    pub records: BTreeMap<Uuid, Record>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub commits: Vec<CommitInfo>,
}

impl LocalData {
    pub fn new(model_version: u32) -> Self {
        Self {
            model_version,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, record: &Record) -> Result<Change, ActionError> {
        if !(record.fields.is_object() || record.fields.is_null()) {
            return Err(ActionError::Conversion(format!(
                "entry '{}' has fields that are not an object",
                record.label
            )));
        }
        if record.deleted {
            let change = match self.records.remove(&record.guid) {
                Some(_) => Change::Deleted,
                None => Change::Unchanged,
            };
            return Ok(change);
        }
        let change = match self.records.get(&record.guid) {
            Some(existing) if existing == record => return Ok(Change::Unchanged),
            Some(_) => Change::Modified,
            None => Change::Added,
        };
        self.records.insert(record.guid, record.clone());
        Ok(change)
    }

    pub fn apply_comment(&mut self, comment: &Comment) -> Result<(), ActionError> {
        let entry = comment
            .entry_guid
            .ok_or_else(|| ActionError::Conversion("comment is not attached to an entry".into()))?;
        if !self.records.contains_key(&entry) {
            return Err(ActionError::Conversion(format!(
                "comment refers to unknown entry {entry}"
            )));
        }
        let existing = comment
            .guid
            .and_then(|guid| self.comments.iter().position(|c| c.guid == Some(guid)));
        match existing {
            Some(idx) => self.comments[idx] = comment.clone(),
            None => self.comments.push(comment.clone()),
        }
        Ok(())
    }

    pub fn commit(&mut self, message: &str) {
        self.commits.push(CommitInfo {
            message: message.to_owned(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_classifies_changes() {
        let mut data = LocalData::new(7_000_072);
        let mut record = Record::new("kuna");
        assert_eq!(data.apply(&record).unwrap(), Change::Added);
        assert_eq!(data.apply(&record).unwrap(), Change::Unchanged);
        record.label = "kuna (verb)".into();
        assert_eq!(data.apply(&record).unwrap(), Change::Modified);
        record.deleted = true;
        assert_eq!(data.apply(&record).unwrap(), Change::Deleted);
        assert_eq!(data.apply(&record).unwrap(), Change::Unchanged);
    }

    #[test]
    fn scalar_fields_are_rejected() {
        let mut data = LocalData::new(7_000_072);
        let mut record = Record::new("bad");
        record.fields = serde_json::json!("just a string");
        assert!(matches!(data.apply(&record), Err(ActionError::Conversion(_))));
        assert!(data.records.is_empty());
    }

    #[test]
    fn comment_needs_known_entry() {
        let mut data = LocalData::new(7_000_072);
        let record = Record::new("kuna");
        let comment = Comment::new(record.guid, "check tone");
        assert!(data.apply_comment(&comment).is_err());

        data.apply(&record).unwrap();
        data.apply_comment(&comment).unwrap();
        data.apply_comment(&comment).unwrap();
        assert_eq!(data.comments.len(), 1);
    }

    #[test]
    fn tally_counts_only_real_changes() {
        let mut counts = EntryCounts::default();
        for change in [Change::Added, Change::Added, Change::Deleted, Change::Unchanged] {
            change.tally(&mut counts);
        }
        assert_eq!((counts.added, counts.modified, counts.deleted), (2, 0, 1));
    }
}

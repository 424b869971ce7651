//! The two stores a project's data moves between, and their file-backed
//! implementations.
//!
//! The local structured store lives inside the project's clone directory
//! (`webwork/<code>/local-store.json`); the remote document store keeps one
//! JSON document per project under `documents/`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use syncward_core::fs::atomic_write;
use syncward_core::{Comment, ProjectCode, Record};

use crate::error::{io_err, ActionError};
use crate::local::{Change, LocalData};

pub const LOCAL_STORE_FILE: &str = "local-store.json";
pub const LOCAL_LOCK_FILE: &str = ".local-store.lock";

// ---------------------------------------------------------------------------
// Local structured store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub code: &'a ProjectCode,
    pub dir: &'a Path,
    /// Model version the caller works with.
    pub model_version: u32,
    /// Permit upgrading an older store to `model_version`.
    pub allow_data_migration: bool,
    /// Start an empty store when the directory has none. Only a fresh clone
    /// may do so; otherwise a missing store is `NoSuchProject`.
    pub create_if_missing: bool,
}

/// Result of opening a local store. Only unexpected faults are errors.
pub enum OpenOutcome {
    Opened(Box<dyn DomainStore>),
    NoSuchProject,
    IncompatibleVersion { found: u32, supported: u32 },
    Locked,
}

pub trait DomainStore {
    fn model_version(&self) -> u32;
    fn records(&self) -> Vec<Record>;
    fn comments(&self) -> Vec<Comment>;
    fn apply(&mut self, record: &Record) -> Result<Change, ActionError>;
    fn apply_comment(&mut self, comment: &Comment) -> Result<(), ActionError>;
    fn commit(&mut self, message: &str) -> Result<(), ActionError>;
    /// Persist and release the store.
    fn close(self: Box<Self>) -> Result<(), ActionError>;
}

pub trait DomainStoreConnector: Send + Sync {
    /// Whether `dir` already holds a usable local store.
    fn exists(&self, dir: &Path) -> bool;
    fn open(&self, request: &OpenRequest<'_>) -> Result<OpenOutcome, ActionError>;
}

/// Decide how a store at `found` may be opened for `request`.
pub(crate) fn check_version(
    data: &mut LocalData,
    request: &OpenRequest<'_>,
) -> Result<(), (u32, u32)> {
    let found = data.model_version;
    if found > request.model_version {
        return Err((found, request.model_version));
    }
    if found < request.model_version && request.allow_data_migration {
        info!(
            project = %request.code,
            from = found,
            to = request.model_version,
            "migrating local store"
        );
        data.model_version = request.model_version;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct FileDomainConnector;

impl DomainStoreConnector for FileDomainConnector {
    fn exists(&self, dir: &Path) -> bool {
        dir.join(LOCAL_STORE_FILE).is_file()
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<OpenOutcome, ActionError> {
        let path = request.dir.join(LOCAL_STORE_FILE);
        if !request.dir.is_dir() || (!request.create_if_missing && !path.is_file()) {
            return Ok(OpenOutcome::NoSuchProject);
        }
        let lock_path = request.dir.join(LOCAL_LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(OpenOutcome::Locked)
            }
            Err(e) => return Err(io_err(lock_path, e)),
        }
        // From here on the guard releases the lock on every early return.
        let mut store = FileDomainStore {
            path,
            lock_path,
            data: LocalData::new(request.model_version),
        };
        if store.path.exists() {
            let body =
                std::fs::read_to_string(&store.path).map_err(|e| io_err(&store.path, e))?;
            store.data = serde_json::from_str(&body).map_err(|e| {
                ActionError::Store(format!("{}: {e}", store.path.display()))
            })?;
        }
        if let Err((found, supported)) = check_version(&mut store.data, request) {
            return Ok(OpenOutcome::IncompatibleVersion { found, supported });
        }
        Ok(OpenOutcome::Opened(Box::new(store)))
    }
}

pub struct FileDomainStore {
    path: PathBuf,
    lock_path: PathBuf,
    data: LocalData,
}

impl DomainStore for FileDomainStore {
    fn model_version(&self) -> u32 {
        self.data.model_version
    }

    fn records(&self) -> Vec<Record> {
        self.data.records.values().cloned().collect()
    }

    fn comments(&self) -> Vec<Comment> {
        self.data.comments.clone()
    }

    fn apply(&mut self, record: &Record) -> Result<Change, ActionError> {
        self.data.apply(record)
    }

    fn apply_comment(&mut self, comment: &Comment) -> Result<(), ActionError> {
        self.data.apply_comment(comment)
    }

    fn commit(&mut self, message: &str) -> Result<(), ActionError> {
        self.data.commit(message);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), ActionError> {
        let body = serde_json::to_vec_pretty(&self.data)?;
        atomic_write(&self.path, &body)?;
        Ok(())
    }
}

impl Drop for FileDomainStore {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

// ---------------------------------------------------------------------------
// Remote document store
// ---------------------------------------------------------------------------

pub trait DocumentStoreConnector: Send + Sync {
    fn records(&self, code: &ProjectCode) -> Result<Vec<Record>, ActionError>;
    fn comments(&self, code: &ProjectCode) -> Result<Vec<Comment>, ActionError>;
    fn get(&self, code: &ProjectCode, guid: Uuid) -> Result<Option<Record>, ActionError>;
    fn upsert(&self, code: &ProjectCode, record: &Record) -> Result<(), ActionError>;
    fn upsert_comment(&self, code: &ProjectCode, comment: &Comment) -> Result<(), ActionError>;
    /// Returns whether a record was removed.
    fn delete(&self, code: &ProjectCode, guid: Uuid) -> Result<bool, ActionError>;
    fn last_synced_date(&self, code: &ProjectCode) -> Result<Option<DateTime<Utc>>, ActionError>;
    fn set_last_synced_date(&self, code: &ProjectCode, at: DateTime<Utc>) -> Result<(), ActionError>;

    /// True when the project holds user entries or was synced before.
    fn has_user_data_or_synced(&self, code: &ProjectCode) -> Result<bool, ActionError> {
        Ok(self.last_synced_date(code)?.is_some() || !self.records(code)?.is_empty())
    }
}

/// One project's document in the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl ProjectDocument {
    pub(crate) fn upsert(&mut self, record: &Record) {
        match self.records.iter_mut().find(|r| r.guid == record.guid) {
            Some(existing) => *existing = record.clone(),
            None => self.records.push(record.clone()),
        }
    }

    pub(crate) fn upsert_comment(&mut self, comment: &Comment) {
        let existing = comment
            .guid
            .and_then(|guid| self.comments.iter_mut().find(|c| c.guid == Some(guid)));
        match existing {
            Some(existing) => *existing = comment.clone(),
            None => self.comments.push(comment.clone()),
        }
    }

    pub(crate) fn delete(&mut self, guid: Uuid) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.guid != guid);
        self.comments.retain(|c| c.entry_guid != Some(guid));
        self.records.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, code: &ProjectCode) -> PathBuf {
        self.dir.join(format!("{}.json", code.as_str()))
    }

    pub fn load(&self, code: &ProjectCode) -> Result<ProjectDocument, ActionError> {
        let path = self.path_for(code);
        match std::fs::read_to_string(&path) {
            Ok(body) => serde_json::from_str(&body)
                .map_err(|e| ActionError::Store(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProjectDocument::default()),
            Err(e) => Err(io_err(path, e)),
        }
    }

    pub fn save(&self, code: &ProjectCode, doc: &ProjectDocument) -> Result<(), ActionError> {
        let body = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path_for(code), &body)?;
        Ok(())
    }

    fn modify<T>(
        &self,
        code: &ProjectCode,
        f: impl FnOnce(&mut ProjectDocument) -> T,
    ) -> Result<T, ActionError> {
        let mut doc = self.load(code)?;
        let out = f(&mut doc);
        self.save(code, &doc)?;
        Ok(out)
    }
}

impl DocumentStoreConnector for FileDocumentStore {
    fn records(&self, code: &ProjectCode) -> Result<Vec<Record>, ActionError> {
        Ok(self.load(code)?.records)
    }

    fn comments(&self, code: &ProjectCode) -> Result<Vec<Comment>, ActionError> {
        Ok(self.load(code)?.comments)
    }

    fn get(&self, code: &ProjectCode, guid: Uuid) -> Result<Option<Record>, ActionError> {
        Ok(self.load(code)?.records.into_iter().find(|r| r.guid == guid))
    }

    fn upsert(&self, code: &ProjectCode, record: &Record) -> Result<(), ActionError> {
        self.modify(code, |doc| doc.upsert(record))
    }

    fn upsert_comment(&self, code: &ProjectCode, comment: &Comment) -> Result<(), ActionError> {
        self.modify(code, |doc| doc.upsert_comment(comment))
    }

    fn delete(&self, code: &ProjectCode, guid: Uuid) -> Result<bool, ActionError> {
        self.modify(code, |doc| doc.delete(guid))
    }

    fn last_synced_date(&self, code: &ProjectCode) -> Result<Option<DateTime<Utc>>, ActionError> {
        Ok(self.load(code)?.last_synced)
    }

    fn set_last_synced_date(&self, code: &ProjectCode, at: DateTime<Utc>) -> Result<(), ActionError> {
        self.modify(code, |doc| doc.last_synced = Some(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request<'a>(code: &'a ProjectCode, dir: &'a Path, version: u32) -> OpenRequest<'a> {
        OpenRequest {
            code,
            dir,
            model_version: version,
            allow_data_migration: false,
            create_if_missing: true,
        }
    }

    #[test]
    fn missing_dir_is_no_such_project() {
        let tmp = TempDir::new().unwrap();
        let code = ProjectCode::from("p");
        let dir = tmp.path().join("absent");
        let outcome = FileDomainConnector.open(&request(&code, &dir, 7_000_072)).unwrap();
        assert!(matches!(outcome, OpenOutcome::NoSuchProject));
    }

    #[test]
    fn clone_dir_without_store_is_no_such_project_unless_creating() {
        let tmp = TempDir::new().unwrap();
        let code = ProjectCode::from("p");
        let req = OpenRequest {
            create_if_missing: false,
            ..request(&code, tmp.path(), 7_000_072)
        };

        let outcome = FileDomainConnector.open(&req).unwrap();
        assert!(matches!(outcome, OpenOutcome::NoSuchProject));
        assert!(!tmp.path().join(LOCAL_LOCK_FILE).exists());
        assert!(!FileDomainConnector.exists(tmp.path()));
    }

    #[test]
    fn second_open_is_locked_until_close() {
        let tmp = TempDir::new().unwrap();
        let code = ProjectCode::from("p");
        let req = request(&code, tmp.path(), 7_000_072);

        let OpenOutcome::Opened(mut store) = FileDomainConnector.open(&req).unwrap() else {
            panic!("expected open");
        };
        assert!(matches!(FileDomainConnector.open(&req).unwrap(), OpenOutcome::Locked));

        store.apply(&Record::new("kuna")).unwrap();
        store.close().unwrap();
        assert!(FileDomainConnector.exists(tmp.path()));

        let OpenOutcome::Opened(store) = FileDomainConnector.open(&req).unwrap() else {
            panic!("expected reopen");
        };
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn newer_store_is_incompatible_older_migrates_on_request() {
        let tmp = TempDir::new().unwrap();
        let code = ProjectCode::from("p");
        let data = LocalData::new(7_000_070);
        std::fs::write(
            tmp.path().join(LOCAL_STORE_FILE),
            serde_json::to_vec(&data).unwrap(),
        )
        .unwrap();

        let outcome = FileDomainConnector.open(&request(&code, tmp.path(), 7_000_068)).unwrap();
        assert!(matches!(
            outcome,
            OpenOutcome::IncompatibleVersion { found: 7_000_070, supported: 7_000_068 }
        ));
        assert!(!tmp.path().join(LOCAL_LOCK_FILE).exists());

        let mut req = request(&code, tmp.path(), 7_000_072);
        req.allow_data_migration = true;
        let OpenOutcome::Opened(store) = FileDomainConnector.open(&req).unwrap() else {
            panic!("expected open");
        };
        assert_eq!(store.model_version(), 7_000_072);
    }

    #[test]
    fn document_store_crud_and_sync_marker() {
        let tmp = TempDir::new().unwrap();
        let docs = FileDocumentStore::new(tmp.path());
        let code = ProjectCode::from("p");
        assert!(!docs.has_user_data_or_synced(&code).unwrap());

        let record = Record::new("kuna");
        docs.upsert(&code, &record).unwrap();
        docs.upsert_comment(&code, &Comment::new(record.guid, "tone?")).unwrap();
        assert_eq!(docs.get(&code, record.guid).unwrap(), Some(record.clone()));
        assert!(docs.has_user_data_or_synced(&code).unwrap());

        assert!(docs.delete(&code, record.guid).unwrap());
        assert!(!docs.delete(&code, record.guid).unwrap());
        assert!(docs.comments(&code).unwrap().is_empty());

        let at = Utc::now();
        docs.set_last_synced_date(&code, at).unwrap();
        assert_eq!(docs.last_synced_date(&code).unwrap(), Some(at));
    }
}

//! In-memory collaborators and a ready-made context for tests.
//!
//! Every fake is a cheap handle over shared state, so a test keeps a clone
//! to script or inspect while the context owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use syncward_core::{Comment, ProjectCode, Record, Settings};

use crate::action::ActionRegistry;
use crate::bridge::{BridgeOp, BridgeOptions, BridgeOutput, Progress, RemoteSyncBridge};
use crate::context::{Collaborators, SyncContext};
use crate::crash::CrashReporter;
use crate::error::ActionError;
use crate::local::{Change, LocalData};
use crate::project::SyncProject;
use crate::store::{
    check_version, DocumentStoreConnector, DomainStore, DomainStoreConnector, OpenOutcome,
    OpenRequest, ProjectDocument,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum BridgeReply {
    Output { ok: bool, text: String },
    Unauthorized,
}

/// Replays queued replies. With nothing queued a clone reports a new clone
/// and a send/receive reports no changes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBridge {
    replies: Arc<Mutex<VecDeque<BridgeReply>>>,
    calls: Arc<Mutex<Vec<(BridgeOp, BridgeOptions)>>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, text: &str) {
        lock(&self.replies).push_back(BridgeReply::Output {
            ok: true,
            text: text.to_owned(),
        });
    }

    pub fn push_failure(&self, text: &str) {
        lock(&self.replies).push_back(BridgeReply::Output {
            ok: false,
            text: text.to_owned(),
        });
    }

    pub fn push_unauthorized(&self) {
        lock(&self.replies).push_back(BridgeReply::Unauthorized);
    }

    pub fn calls(&self) -> Vec<(BridgeOp, BridgeOptions)> {
        lock(&self.calls).clone()
    }

    pub fn ops(&self) -> Vec<BridgeOp> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }
}

impl RemoteSyncBridge for ScriptedBridge {
    fn execute(
        &self,
        op: BridgeOp,
        progress: &dyn Progress,
        options: &BridgeOptions,
    ) -> Result<BridgeOutput, ActionError> {
        lock(&self.calls).push((op, options.clone()));
        let reply = lock(&self.replies).pop_front();
        let (ok, text) = match reply {
            Some(BridgeReply::Output { ok, text }) => (ok, text),
            Some(BridgeReply::Unauthorized) => return Err(ActionError::Unauthorized { op }),
            None => match op {
                BridgeOp::Clone => (
                    true,
                    format!(
                        "new clone created on branch '7000072' in folder '{}'.",
                        options.get("project_dir").map(String::as_str).unwrap_or_default()
                    ),
                ),
                BridgeOp::SendReceive => (true, "No changes from others".to_owned()),
            },
        };
        for line in text.lines() {
            progress.message(line);
        }
        Ok(BridgeOutput { ok, text })
    }
}

// ---------------------------------------------------------------------------
// Local store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DomainInner {
    stores: HashMap<PathBuf, LocalData>,
    locked: HashSet<PathBuf>,
    missing: HashSet<PathBuf>,
}

/// Local stores keyed by clone directory. Opening an unknown directory
/// with `create_if_missing` starts an empty store that becomes visible once
/// closed.
#[derive(Debug, Clone, Default)]
pub struct MemoryDomain {
    inner: Arc<Mutex<DomainInner>>,
}

impl MemoryDomain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, dir: &Path, data: LocalData) {
        lock(&self.inner).stores.insert(dir.to_path_buf(), data);
    }

    pub fn data(&self, dir: &Path) -> Option<LocalData> {
        lock(&self.inner).stores.get(dir).cloned()
    }

    pub fn lock_store(&self, dir: &Path) {
        lock(&self.inner).locked.insert(dir.to_path_buf());
    }

    pub fn mark_missing(&self, dir: &Path) {
        lock(&self.inner).missing.insert(dir.to_path_buf());
    }
}

impl DomainStoreConnector for MemoryDomain {
    fn exists(&self, dir: &Path) -> bool {
        lock(&self.inner).stores.contains_key(dir)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<OpenOutcome, ActionError> {
        let inner = lock(&self.inner);
        if inner.missing.contains(request.dir) {
            return Ok(OpenOutcome::NoSuchProject);
        }
        if inner.locked.contains(request.dir) {
            return Ok(OpenOutcome::Locked);
        }
        let mut data = match inner.stores.get(request.dir) {
            Some(data) => data.clone(),
            None if request.create_if_missing => LocalData::new(request.model_version),
            None => return Ok(OpenOutcome::NoSuchProject),
        };
        if let Err((found, supported)) = check_version(&mut data, request) {
            return Ok(OpenOutcome::IncompatibleVersion { found, supported });
        }
        Ok(OpenOutcome::Opened(Box::new(MemoryDomainStore {
            dir: request.dir.to_path_buf(),
            data,
            inner: Arc::clone(&self.inner),
        })))
    }
}

struct MemoryDomainStore {
    dir: PathBuf,
    data: LocalData,
    inner: Arc<Mutex<DomainInner>>,
}

impl DomainStore for MemoryDomainStore {
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
        let MemoryDomainStore { dir, data, inner } = *self;
        lock(&inner).stores.insert(dir, data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remote document store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryDocuments {
    docs: Arc<Mutex<HashMap<ProjectCode, ProjectDocument>>>,
    reject_labels: Arc<Mutex<HashSet<String>>>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, code: &ProjectCode, doc: ProjectDocument) {
        lock(&self.docs).insert(code.clone(), doc);
    }

    pub fn document(&self, code: &ProjectCode) -> ProjectDocument {
        lock(&self.docs).get(code).cloned().unwrap_or_default()
    }

    /// Make upserts of records with this label fail.
    pub fn reject_label(&self, label: &str) {
        lock(&self.reject_labels).insert(label.to_owned());
    }

    fn with_doc<T>(&self, code: &ProjectCode, f: impl FnOnce(&mut ProjectDocument) -> T) -> T {
        f(lock(&self.docs).entry(code.clone()).or_default())
    }
}

impl DocumentStoreConnector for MemoryDocuments {
    fn records(&self, code: &ProjectCode) -> Result<Vec<Record>, ActionError> {
        Ok(self.document(code).records)
    }

    fn comments(&self, code: &ProjectCode) -> Result<Vec<Comment>, ActionError> {
        Ok(self.document(code).comments)
    }

    fn get(&self, code: &ProjectCode, guid: Uuid) -> Result<Option<Record>, ActionError> {
        Ok(self.document(code).records.into_iter().find(|r| r.guid == guid))
    }

    fn upsert(&self, code: &ProjectCode, record: &Record) -> Result<(), ActionError> {
        if lock(&self.reject_labels).contains(&record.label) {
            return Err(ActionError::Conversion(format!(
                "remote store rejected '{}'",
                record.label
            )));
        }
        self.with_doc(code, |doc| doc.upsert(record));
        Ok(())
    }

    fn upsert_comment(&self, code: &ProjectCode, comment: &Comment) -> Result<(), ActionError> {
        self.with_doc(code, |doc| doc.upsert_comment(comment));
        Ok(())
    }

    fn delete(&self, code: &ProjectCode, guid: Uuid) -> Result<bool, ActionError> {
        Ok(self.with_doc(code, |doc| doc.delete(guid)))
    }

    fn last_synced_date(&self, code: &ProjectCode) -> Result<Option<DateTime<Utc>>, ActionError> {
        Ok(self.document(code).last_synced)
    }

    fn set_last_synced_date(&self, code: &ProjectCode, at: DateTime<Utc>) -> Result<(), ActionError> {
        self.with_doc(code, |doc| doc.last_synced = Some(at));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Crash reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RecordingCrashReporter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingCrashReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl CrashReporter for RecordingCrashReporter {
    fn notify(&self, error: &(dyn std::error::Error + 'static)) {
        lock(&self.messages).push(error.to_string());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A context rooted at `base` wired to the fakes above.
pub struct Harness {
    pub bridge: ScriptedBridge,
    pub domain: MemoryDomain,
    pub documents: MemoryDocuments,
    pub crashes: RecordingCrashReporter,
    pub ctx: SyncContext,
}

impl Harness {
    pub fn new(base: &Path) -> Self {
        Self::with_actions(base, ActionRegistry::standard())
    }

    pub fn with_actions(base: &Path, actions: ActionRegistry) -> Self {
        let settings = Settings::with_base_dir(base);
        let bridge = ScriptedBridge::new();
        let domain = MemoryDomain::new();
        let documents = MemoryDocuments::new();
        let crashes = RecordingCrashReporter::new();
        let collaborators = Collaborators {
            bridge: Box::new(bridge.clone()),
            domain: Box::new(domain.clone()),
            documents: Box::new(documents.clone()),
            crash_reporter: Box::new(crashes.clone()),
        };
        let ctx = match SyncContext::new(settings, collaborators) {
            Ok(ctx) => ctx.with_actions(actions),
            Err(err) => panic!("test context: {err}"),
        };
        Self {
            bridge,
            domain,
            documents,
            crashes,
            ctx,
        }
    }

    pub fn project(&self, code: &str) -> SyncProject {
        match self.ctx.open_project(&ProjectCode::from(code)) {
            Ok(project) => project,
            Err(err) => panic!("open project {code}: {err}"),
        }
    }

    /// Give `code` an existing local store and an IDLE state record so
    /// EnsureClone has nothing to do.
    pub fn cloned_project(&self, code: &str) -> SyncProject {
        let mut project = self.project(code);
        self.domain.seed(
            &project.dir,
            LocalData::new(self.ctx.settings().default_model_version),
        );
        if let Err(err) = project.state.set_status(syncward_core::Status::Idle) {
            panic!("seed state for {code}: {err}");
        }
        project
    }
}

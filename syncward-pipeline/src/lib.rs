//! # syncward-pipeline
//!
//! The action state machine. An [`Action`] is bound to one [`ActionKind`];
//! [`run_action`] wraps its work in the status bookkeeping every action
//! shares. Actions reach their collaborators (the version-control bridge,
//! the local store, the remote document store, the crash reporter) and each
//! other through one [`SyncContext`] built at startup.
//!
//! [`ActionKind`]: syncward_core::ActionKind

pub mod action;
pub mod actions;
pub mod bridge;
pub mod context;
pub mod crash;
pub mod error;
pub mod local;
pub mod project;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use action::{run_action, Action, ActionRegistry};
pub use bridge::{BridgeOp, BridgeOptions, BridgeOutput, CommandBridge, RemoteSyncBridge};
pub use context::{Collaborators, SyncContext};
pub use crash::{CrashReporter, LogCrashReporter, UncleanStateError};
pub use error::ActionError;
pub use project::SyncProject;
pub use store::{
    DocumentStoreConnector, DomainStore, DomainStoreConnector, FileDocumentStore,
    FileDomainConnector, OpenOutcome, OpenRequest,
};

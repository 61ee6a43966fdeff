//! Error types for the composition core
//!
//! Every failure is a typed value whose `Display` is a human-readable reason
//! suitable for surfacing in tooling. None of them leave the subsystem in an
//! unusable state.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::WorldKind;
use crate::content::ContentPath;
use crate::host::NodeId;

/// Errors returned by [`Foundation`](crate::Foundation) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoundationError {
    /// Assigning the content would make it load itself recursively
    #[error("Cycle detected assigning '{path}': {reason}")]
    CycleDetected { path: ContentPath, reason: String },

    /// An edit session is already open for this content
    #[error("Content '{0}' is already being edited")]
    AlreadyEditing(ContentPath),

    /// A related edit session holds unsaved changes
    #[error("Cannot edit or close '{path}': {reason}")]
    AncestorOrDescendantDirty { path: ContentPath, reason: String },

    /// The content path is empty or unknown to the content store
    #[error("Content '{0}' could not be resolved")]
    ContentUnresolvable(ContentPath),

    /// The save prompt was declined or the save itself failed
    #[error("Saving '{path}' was declined or failed: {reason}")]
    SaveDeclinedOrFailed { path: ContentPath, reason: String },

    /// No edit session is open for this content
    #[error("Content '{0}' is not currently being edited")]
    NotCurrentlyEditing(ContentPath),

    /// The node was never registered (or already unregistered)
    #[error("Node {0} is not registered")]
    UnknownNode(NodeId),

    /// The operation needs a content-hosting node
    #[error("Node {0} does not host content")]
    NotContentHost(NodeId),

    /// An ancestor of the node has not registered yet
    #[error("Identity of node {node} is waiting on ancestor {waiting_on}")]
    IdentityDeferred { node: NodeId, waiting_on: NodeId },

    /// Another registered node already owns the same composite identity
    #[error("Node {node} has the same composite identity as node {existing}")]
    DuplicateIdentity { node: NodeId, existing: NodeId },

    #[error("Node {0} has no stable id")]
    InvalidStableId(NodeId),

    /// Edit sessions are only available in editor worlds
    #[error("Editing is not available in {0} worlds")]
    EditingUnavailable(WorldKind),

    /// Only one deferred edit request can wait for streaming to settle
    #[error("An edit of node {0} is already waiting for streaming to settle")]
    EditAlreadyPending(NodeId),
}

impl FoundationError {
    /// Human-readable reason, for tooling
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, FoundationError>;

/// Errors from loading a [`FoundationConfig`](crate::FoundationConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

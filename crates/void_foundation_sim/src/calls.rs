//! Shared call log
//!
//! Every simulated collaborator appends what the core asked it to do, in
//! order, so tests can assert on call sequences.

use std::sync::Arc;

use parking_lot::Mutex;
use void_foundation::{ContainerId, ContentPath, NodeId};

/// A collaborator call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimCall {
    Attach {
        owner: NodeId,
        container: ContainerId,
        content: ContentPath,
        editable: bool,
    },
    Detach {
        containers: Vec<ContainerId>,
    },
    Resolve {
        path: ContentPath,
    },
    OpenForEdit {
        path: ContentPath,
    },
    CloseEdit {
        path: ContentPath,
    },
    Save {
        packages: Vec<ContentPath>,
    },
    SaveDeclined,
    SaveFailed,
    TransactionReset {
        reason: String,
    },
}

impl SimCall {
    pub fn is_save_attempt(&self) -> bool {
        matches!(self, Self::Save { .. } | Self::SaveDeclined | Self::SaveFailed)
    }
}

/// Append-only log shared by scene, store and transaction log
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<SimCall>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: SimCall) {
        self.0.lock().push(call);
    }

    /// Copy of every call so far
    pub fn snapshot(&self) -> Vec<SimCall> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&SimCall) -> bool) -> usize {
        self.0.lock().iter().filter(|call| pred(call)).count()
    }

    /// Every bulk detach, in order
    pub fn detaches(&self) -> Vec<Vec<ContainerId>> {
        self.0
            .lock()
            .iter()
            .filter_map(|call| match call {
                SimCall::Detach { containers } => Some(containers.clone()),
                _ => None,
            })
            .collect()
    }

    /// Owners of every attach, in order
    pub fn attached_owners(&self) -> Vec<NodeId> {
        self.0
            .lock()
            .iter()
            .filter_map(|call| match call {
                SimCall::Attach { owner, .. } => Some(*owner),
                _ => None,
            })
            .collect()
    }
}

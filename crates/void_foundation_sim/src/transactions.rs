//! Simulated undo system

use void_foundation::TransactionLog;

use crate::calls::{CallLog, SimCall};

/// Transaction log whose in-flight state is driven by the test
pub struct SimTransactionLog {
    calls: CallLog,
    depth: u32,
}

impl SimTransactionLog {
    pub fn new(calls: CallLog) -> Self {
        Self { calls, depth: 0 }
    }

    /// Start recording an operation; nests
    pub fn begin(&mut self) {
        self.depth += 1;
    }

    pub fn end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl TransactionLog for SimTransactionLog {
    fn is_operation_in_progress(&self) -> bool {
        self.depth > 0
    }

    fn reset(&mut self, reason: &str) {
        log::debug!("Undo history reset: {}", reason);
        self.calls.push(SimCall::TransactionReset {
            reason: reason.to_string(),
        });
    }
}

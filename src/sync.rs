use serde::{Deserialize, Serialize};

/// Suppression flags threaded through every reconciliation and sync call.
///
/// Lot sets flow in two directions after confirmation: order line to
/// warehouse operation and back. Each write the engine makes in one
/// direction hands the callee a context with the echo for the opposite
/// direction muted, so a host that relays store writes into the sync hooks
/// cannot produce a feedback loop. `suppress_feedback` additionally silences
/// both hooks for the whole confirmation pass, where the engine itself is
/// the author of every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    /// Set for the duration of a confirmation pass; both hooks back off.
    pub suppress_feedback: bool,
    /// The operation-side write came from a line edit; the operation hook
    /// must not echo it back to the line.
    pub skip_sync_from_operation: bool,
    /// The line-side write came from an operation edit; the line hook must
    /// not echo it back to the operations.
    pub skip_sync_from_line: bool,
}

impl SyncContext {
    /// No suppression: an ordinary user-originated edit.
    pub fn none() -> Self {
        Self::default()
    }

    /// Context for the confirmation pass.
    pub fn confirming() -> Self {
        Self {
            suppress_feedback: true,
            ..Self::default()
        }
    }

    /// Derived context for writes this engine makes on the operation side,
    /// handed to anything that might relay them into the operation hook.
    pub fn muting_operation_echo(self) -> Self {
        Self {
            skip_sync_from_operation: true,
            ..self
        }
    }

    /// Derived context for writes this engine makes on the line side,
    /// handed to anything that might relay them into the line hook.
    pub fn muting_line_echo(self) -> Self {
        Self {
            skip_sync_from_line: true,
            ..self
        }
    }

    /// True when the line hook must not push the selection out to the
    /// operations. Local quantity recomputation still runs.
    pub fn blocks_line_sync(&self) -> bool {
        self.suppress_feedback || self.skip_sync_from_line
    }

    /// True when the operation hook must not push the reservation lot set
    /// back to the line.
    pub fn blocks_operation_sync(&self) -> bool {
        self.suppress_feedback || self.skip_sync_from_operation
    }
}

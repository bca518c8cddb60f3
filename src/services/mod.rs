// Read-side services
pub mod availability;
pub mod lot_directory;

// Confirmation pipeline
pub mod confirmation;
pub mod conflict;
pub mod reconciler;

// Post-confirmation propagation
pub mod sync_guard;

pub use availability::{AvailabilityFilter, BlockGroup, SelectableSlab, SlabFilters};
pub use confirmation::{AutoAssignCleaner, ConfirmationFlow, FifoConfirmation, StripAllCleaner};
pub use conflict::{CommitmentSource, ConflictValidator, LotConflict};
pub use lot_directory::LotDirectory;
pub use reconciler::{ConfirmOutcome, ReservationReconciler, SkipReason, SkippedLot};
pub use sync_guard::{LineSyncOutcome, OperationSyncOutcome, SyncGuard};

// Bidirectional file reconciliation between a local directory tree and an
// S3-compatible object store.
//
// The core is the `ReconciliationEngine`, which runs one pass per enabled
// sync rule under a selectable mode (full, selective, backup, incremental),
// detects divergence on both sides, and hands results to the history log.
// The `Scheduler` owns the run/stop state machine and the timer loop.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod hash;
pub mod history;
pub mod report;
pub mod rules;
pub mod scan;
pub mod scheduler;
pub mod store;

pub use config::{Config, ConfigExport, StoreSettings, SyncSettings};
pub use conflict::{ConflictEntry, DefaultResolution, Resolution, ResolutionPolicy};
pub use engine::{ReconciliationEngine, SyncMode, SyncStatus};
pub use error::{Result, SyncError};
pub use events::SyncEvent;
pub use history::{HistoryEntry, HistoryLog, HistoryStats, PassOutcome};
pub use report::ReportStore;
pub use rules::{Direction, RuleStore, SyncRule};
pub use scheduler::{Scheduler, SyncStats};
pub use store::{ObjectMetadata, ObjectStore};

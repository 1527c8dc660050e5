// SPDX-License-Identifier: GPL-3.0-only
pub mod changeset;
pub mod error;
pub mod fleet;
pub mod key_lock;
pub mod models;
pub mod orchestrator;
pub mod staleness;

pub use changeset::compute_change_set;
pub use error::{CriticalRefreshError, SyncError};
pub use fleet::FleetRefreshCoordinator;
pub use key_lock::SingleFlightKeyLock;
pub use models::{CollectionKey, RefreshKind, RefreshOutcome};
pub use orchestrator::{RefreshOrchestrator, RefreshSettings};
pub use staleness::StalenessCache;

// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

use crate::sync::models::{CollectionKey, RefreshOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCollectionKey {
    #[error("collection key must not be empty")]
    Empty,

    #[error("collection key is {len} characters long (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("collection key '{0}' has leading or trailing whitespace")]
    Whitespace(String),

    #[error("collection key '{0}' contains '/' or control characters")]
    IllegalCharacter(String),
}

/// Failures of one synchronization pass
///
/// These never escape `RefreshOrchestrator::refresh_one`; they are recorded
/// in the `RefreshOutcome` instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch posts for '{key}' from source: {source:#}")]
    SourceFetch {
        key: CollectionKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist posts for '{key}': {source:#}")]
    Persist {
        key: CollectionKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("refresh task for '{key}' did not finish: {reason}")]
    TaskFailed { key: CollectionKey, reason: String },
}

/// Raised by the fleet coordinator when at least one refresh failed critically
#[derive(Debug, Error)]
#[error("{} of {} collection refreshes failed critically: {}", .critical.len(), .outcomes.len(), describe(.critical))]
pub struct CriticalRefreshError {
    /// Every critical outcome, in input order
    pub critical: Vec<RefreshOutcome>,

    /// All outcomes of the batch, including non-critical ones
    pub outcomes: Vec<RefreshOutcome>,
}

fn describe(critical: &[RefreshOutcome]) -> String {
    critical
        .iter()
        .map(|outcome| match &outcome.error {
            Some(err) => format!("{} ({})", outcome.key, err),
            None => outcome.key.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// SPDX-License-Identifier: GPL-3.0-only
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{error, info};

use crate::sync::error::CriticalRefreshError;
use crate::sync::models::{CollectionKey, RefreshOutcome};
use crate::sync::orchestrator::RefreshOrchestrator;

/// Fans a refresh out over many collections and aggregates the outcomes
#[derive(Clone)]
pub struct FleetRefreshCoordinator {
    orchestrator: RefreshOrchestrator,
    max_parallel: Option<usize>,
}

impl FleetRefreshCoordinator {
    /// `max_parallel = None` runs every collection at once
    pub fn new(orchestrator: RefreshOrchestrator, max_parallel: Option<usize>) -> Self {
        Self {
            orchestrator,
            max_parallel: max_parallel.filter(|n| *n > 0),
        }
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    /// Refresh every key and fail only if some collection ended up critical
    ///
    /// Duplicate keys are refreshed once. Outcomes come back in the order the
    /// keys were first given; the error carries every critical outcome along
    /// with the full list.
    pub async fn refresh_all(
        &self,
        keys: &[CollectionKey],
        force: bool,
    ) -> Result<Vec<RefreshOutcome>, CriticalRefreshError> {
        let keys = unique_in_order(keys);

        let outcomes = match self.max_parallel {
            None => {
                join_all(keys.into_iter().map(|key| {
                    let orchestrator = self.orchestrator.clone();
                    async move { orchestrator.refresh_one(&key, force).await }
                }))
                .await
            }
            Some(limit) => {
                let orchestrator = self.orchestrator.clone();
                let mut indexed: Vec<(usize, RefreshOutcome)> = stream::iter(keys.into_iter().enumerate())
                    .map(move |(index, key)| {
                        let orchestrator = orchestrator.clone();
                        async move { (index, orchestrator.refresh_one(&key, force).await) }
                    })
                    .buffer_unordered(limit)
                    .collect()
                    .await;
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, outcome)| outcome).collect()
            }
        };

        let critical: Vec<RefreshOutcome> = outcomes
            .iter()
            .filter(|outcome| outcome.is_critical(force))
            .cloned()
            .collect();

        if critical.is_empty() {
            info!(collections = outcomes.len(), force, "Fleet refresh finished");
            return Ok(outcomes);
        }

        let err = CriticalRefreshError { critical, outcomes };
        error!(error = %err, force, "Fleet refresh failed");
        Err(err)
    }
}

/// First occurrence of each key, in input order
fn unique_in_order(keys: &[CollectionKey]) -> Vec<CollectionKey> {
    let mut seen = HashSet::new();
    keys.iter().filter(|key| seen.insert(*key)).cloned().collect()
}

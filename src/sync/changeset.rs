// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::sync::models::{ChangeSet, MatchedItem, SourceItem, StoredItemSummary};

/// Compute the writes needed to bring stored posts in line with the source
///
/// `last_synced_at == None` means a full resync: every matched item is
/// re-applied and stored posts missing from the source are deleted. With a
/// timestamp the source only returned changed items, so matched items are
/// updated only when their hash differs and nothing is deleted.
///
/// Duplicate source ids keep their first occurrence. Output order follows
/// the input order of `source_items` (inserted, updated) and `stored`
/// (deleted).
pub fn compute_change_set(
    source_items: Vec<SourceItem>,
    stored: &[StoredItemSummary],
    last_synced_at: Option<DateTime<Utc>>,
) -> ChangeSet {
    let full_resync = last_synced_at.is_none();

    let mut stored_by_source_id: HashMap<&str, &StoredItemSummary> = HashMap::with_capacity(stored.len());
    for summary in stored {
        stored_by_source_id
            .entry(summary.source_id.as_str())
            .or_insert(summary);
    }

    let mut changes = ChangeSet::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(source_items.len());

    for item in source_items {
        if !seen.insert(item.source_id.clone()) {
            continue;
        }

        match stored_by_source_id.get(item.source_id.as_str()) {
            None => changes.inserted.push(item),
            Some(summary) if full_resync || summary.hash != item.hash => {
                changes.updated.push(MatchedItem {
                    stored_id: summary.stored_id.clone(),
                    item,
                });
            }
            Some(_) => {}
        }
    }

    if full_resync {
        changes.deleted = stored
            .iter()
            .filter(|summary| !seen.contains(&summary.source_id))
            .cloned()
            .collect();
    }

    changes
}

// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;
use crate::item::Item;
use crate::side::{Side, SideAdapter};
use crate::state::{CorrespondenceTable, SnapshotStore};

/// The New/Modified/Deleted partition of one side's current items for one run.
///
/// Computed fresh every run and never persisted. Unchanged items are implicit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Ids present in the store but unknown to the correspondence table.
    pub new: BTreeSet<String>,

    /// Known ids whose current item differs from its snapshot.
    pub modified: BTreeSet<String>,

    /// Known ids absent from the fresh fetch.
    pub deleted: BTreeSet<String>,
}

impl ChangeSet {
    /// Whether the side reported no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Indexes freshly fetched items by their identity field.
///
/// # Errors
///
/// Returns [`SyncError::MissingField`] if an item lacks its identity and
/// [`SyncError::Adapter`] if two items carry the same id, since a duplicate
/// identity would corrupt the correspondence bijection downstream.
pub fn index_items(
    adapter: &impl SideAdapter,
    items: Vec<Item>,
) -> Result<BTreeMap<String, Item>, SyncError> {
    let id_key = adapter.id_key();
    let mut index = BTreeMap::new();
    for item in items {
        let id = item.id(id_key)?.to_string();
        if index.insert(id.clone(), item).is_some() {
            return Err(SyncError::Adapter(format!(
                "{} returned id {id:?} twice",
                adapter.name()
            )));
        }
    }
    Ok(index)
}

/// Computes one side's [`ChangeSet`] against the correspondence table and the
/// snapshot baseline.
///
/// Detection is side-effect-free: a failure here leaves all state untouched.
///
/// # Errors
///
/// Returns [`SyncError::State`] if a snapshot cannot be read.
pub async fn detect(
    side: Side,
    adapter: &impl SideAdapter,
    current: &BTreeMap<String, Item>,
    table: &CorrespondenceTable,
    snapshots: &SnapshotStore,
    ignore_keys: &BTreeSet<String>,
) -> Result<ChangeSet, SyncError> {
    let current_ids: BTreeSet<String> = current.keys().cloned().collect();
    let known_ids: BTreeSet<String> = table.ids(side).map(ToString::to_string).collect();

    let new: BTreeSet<String> = current_ids.difference(&known_ids).cloned().collect();

    // Known ids simply absent from the fresh fetch. Excluding anything also
    // classified New guards against concurrent external mutation of the
    // table; by construction the two sets are disjoint.
    let current_minus_new: BTreeSet<String> = current_ids.difference(&new).cloned().collect();
    let deleted: BTreeSet<String> = known_ids.difference(&current_minus_new).cloned().collect();

    let mut ignore = ignore_keys.clone();
    ignore.insert(adapter.id_key().to_string());

    let mut modified = BTreeSet::new();
    for id in current_ids.intersection(&known_ids) {
        let Some(item) = current.get(id) else {
            continue;
        };
        match snapshots.get(side, id).await? {
            // No baseline to prove equality against: conservatively treat the
            // item as modified so a possibly-missed change still propagates.
            None => {
                tracing::debug!(%side, %id, "no snapshot for known id, assuming modified");
                modified.insert(id.clone());
            }
            Some(snapshot) => {
                if !adapter.items_identical(&snapshot, item, &ignore) {
                    modified.insert(id.clone());
                }
            }
        }
    }

    tracing::debug!(
        %side,
        new = new.len(),
        modified = modified.len(),
        deleted = deleted.len(),
        "change detection finished"
    );
    Ok(ChangeSet {
        new,
        modified,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySide;

    async fn fixture() -> (MemorySide, CorrespondenceTable, SnapshotStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::open(dir.path().join("snapshots"))
            .await
            .unwrap();
        (
            MemorySide::new("mem-a"),
            CorrespondenceTable::new(),
            snapshots,
            dir,
        )
    }

    fn task(id: &str, summary: &str) -> Item {
        Item::new().with("uid", id).with("summary", summary)
    }

    #[tokio::test]
    async fn test_partitions_new_modified_deleted() {
        let (adapter, mut table, mut snapshots, _dir) = fixture().await;

        // a1 unchanged, a2 modified, a3 new; a4 known but gone.
        table.insert("a1", "b1").unwrap();
        table.insert("a2", "b2").unwrap();
        table.insert("a4", "b4").unwrap();
        let a1 = task("a1", "call mom");
        let a2_old = task("a2", "buy milk");
        snapshots.put(Side::A, "a1", &a1).await.unwrap();
        snapshots.put(Side::A, "a2", &a2_old).await.unwrap();

        let current = index_items(
            &adapter,
            vec![a1, task("a2", "buy milk and eggs"), task("a3", "water plants")],
        )
        .unwrap();

        let changes = detect(Side::A, &adapter, &current, &table, &snapshots, &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(changes.new.iter().collect::<Vec<_>>(), ["a3"]);
        assert_eq!(changes.modified.iter().collect::<Vec<_>>(), ["a2"]);
        assert_eq!(changes.deleted.iter().collect::<Vec<_>>(), ["a4"]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_counts_as_modified() {
        let (adapter, mut table, snapshots, _dir) = fixture().await;
        table.insert("a1", "b1").unwrap();

        let current = index_items(&adapter, vec![task("a1", "call mom")]).unwrap();
        let changes = detect(Side::A, &adapter, &current, &table, &snapshots, &BTreeSet::new())
            .await
            .unwrap();

        assert!(changes.modified.contains("a1"));
    }

    #[tokio::test]
    async fn test_orphaned_snapshot_never_consulted_for_new_ids() {
        let (adapter, table, mut snapshots, _dir) = fixture().await;

        // A stale snapshot equal to the current item, but no correspondence:
        // the id is still structurally new.
        let a1 = task("a1", "call mom");
        snapshots.put(Side::A, "a1", &a1).await.unwrap();

        let current = index_items(&adapter, vec![a1]).unwrap();
        let changes = detect(Side::A, &adapter, &current, &table, &snapshots, &BTreeSet::new())
            .await
            .unwrap();

        assert!(changes.new.contains("a1"));
        assert!(changes.modified.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_keys_suppress_modification() {
        let (adapter, mut table, mut snapshots, _dir) = fixture().await;
        table.insert("a1", "b1").unwrap();

        let old = task("a1", "call mom").with("etag", "v1");
        snapshots.put(Side::A, "a1", &old).await.unwrap();

        let current =
            index_items(&adapter, vec![task("a1", "call mom").with("etag", "v2")]).unwrap();

        let ignore: BTreeSet<String> = ["etag".to_string()].into();
        let changes = detect(Side::A, &adapter, &current, &table, &snapshots, &ignore)
            .await
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_index_items_rejects_duplicate_ids() {
        let adapter = MemorySide::new("mem-a");
        let items = vec![task("a1", "one"), task("a1", "two")];
        assert!(matches!(
            index_items(&adapter, items),
            Err(SyncError::Adapter(_))
        ));
    }
}

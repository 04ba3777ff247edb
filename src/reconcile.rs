// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The reconciliation algorithm.
//!
//! One run works through an explicit, ordered sequence of steps, each fully
//! side-effecting before the next begins so a mid-run failure has a bounded
//! blast radius:
//!
//! 1. conflict partition (items modified on both sides),
//! 2. new-item propagation,
//! 3. modified-item propagation (non-conflicting),
//! 4. deletion propagation,
//! 5. conflict resolution.
//!
//! Snapshots are written after a change has been successfully propagated, so
//! an interrupted run re-detects the pending change on its next pass instead
//! of forgetting it. The trade-off is that a retried create against a
//! non-idempotent store can duplicate an item; adapters that support it
//! should de-duplicate on create.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::convert::Converter;
use crate::detect::ChangeSet;
use crate::error::SyncError;
use crate::item::Item;
use crate::resolve::{ResolutionStrategy, Winner};
use crate::side::{Side, SideAdapter};
use crate::state::{CorrespondenceTable, SnapshotStore};

/// Mutation counts for one side over a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideCounts {
    /// Items created on this side.
    pub created: usize,
    /// Items updated on this side.
    pub updated: usize,
    /// Items deleted on this side.
    pub deleted: usize,
}

impl SideCounts {
    /// Total mutations on this side.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// The adapter operation an item-level failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Creating an item.
    Create,
    /// Updating an item.
    Update,
    /// Deleting an item.
    Delete,
    /// Fetching a single item.
    Fetch,
    /// Converting an item between schemas.
    Convert,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Fetch => "fetch",
            Self::Convert => "convert",
        };
        f.write_str(name)
    }
}

/// One failed item-level operation.
///
/// Item failures do not abort the run; unrelated items keep processing and
/// the failed change is re-detected on the next run.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    /// The side the operation was issued against.
    pub side: Side,
    /// The id driving the operation (source id for creates and conversions,
    /// target id otherwise).
    pub id: String,
    /// The operation that failed.
    pub op: Operation,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Mutations issued against side A.
    pub a: SideCounts,
    /// Mutations issued against side B.
    pub b: SideCounts,
    /// Item-level failures, in processing order.
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    /// The mutation counts for one side.
    #[must_use]
    pub fn counts(&self, side: Side) -> SideCounts {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// Whether the run changed nothing and hit no failures.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.a.total() == 0 && self.b.total() == 0 && self.failures.is_empty()
    }

    fn counts_mut(&mut self, side: Side) -> &mut SideCounts {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    fn fail(&mut self, side: Side, id: &str, op: Operation, err: &SyncError) {
        tracing::error!(%side, id, op = %op, error = %err, "item-level operation failed");
        self.failures.push(ItemFailure {
            side,
            id: id.to_string(),
            op,
            reason: err.to_string(),
        });
    }
}

/// Direction of a propagation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    AToB,
    BToA,
}

impl Direction {
    fn src(self) -> Side {
        match self {
            Self::AToB => Side::A,
            Self::BToA => Side::B,
        }
    }

    fn dst(self) -> Side {
        self.src().other()
    }
}

fn convert_dir<C: Converter>(
    converter: &C,
    dir: Direction,
    item: &Item,
) -> Result<Item, SyncError> {
    match dir {
        Direction::AToB => converter.a_to_b(item),
        Direction::BToA => converter.b_to_a(item),
    }
}

fn insert_pair(
    table: &mut CorrespondenceTable,
    dir: Direction,
    src_id: &str,
    dst_id: &str,
) -> Result<(), SyncError> {
    match dir {
        Direction::AToB => table.insert(src_id, dst_id),
        Direction::BToA => table.insert(dst_id, src_id),
    }
}

/// Projects a converted item into the partial update sent to a side: only the
/// integration's mutable fields, never the target's identity field.
fn restrict_changes(
    converted: &Item,
    mutable_keys: Option<&BTreeSet<String>>,
    dst_id_key: &str,
) -> Item {
    let restricted = match mutable_keys {
        Some(keys) => converted.restricted(keys),
        None => converted.clone(),
    };
    restricted.without(&BTreeSet::from([dst_id_key.to_string()]))
}

/// Runs the ordered reconciliation steps over both change sets.
///
/// The correspondence table and snapshot store are mutated incrementally as
/// each step completes; persisting the table is the caller's job.
///
/// # Errors
///
/// Item-level adapter failures are collected into the report. Only state
/// persistence failures and a correspondence bijection violation abort the
/// run.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn reconcile<A, B, C>(
    side_a: &mut A,
    side_b: &mut B,
    converter: &C,
    strategy: ResolutionStrategy,
    table: &mut CorrespondenceTable,
    snapshots: &mut SnapshotStore,
    mutable_keys: Option<&BTreeSet<String>>,
    current_a: &BTreeMap<String, Item>,
    current_b: &BTreeMap<String, Item>,
    mut changes_a: ChangeSet,
    mut changes_b: ChangeSet,
) -> Result<RunReport, SyncError>
where
    A: SideAdapter,
    B: SideAdapter,
    C: Converter,
{
    let mut report = RunReport::default();

    // Conflict partition: logical items modified on both sides are pulled out
    // of the per-side flows and handled last.
    let mut conflicts: Vec<(String, String)> = Vec::new();
    for a_id in &changes_a.modified {
        if let Some(b_id) = table.lookup(Side::A, a_id)
            && changes_b.modified.contains(b_id)
        {
            conflicts.push((a_id.clone(), b_id.to_string()));
        }
    }
    for (a_id, b_id) in &conflicts {
        changes_a.modified.remove(a_id);
        changes_b.modified.remove(b_id);
    }
    if !conflicts.is_empty() {
        tracing::info!(count = conflicts.len(), "conflicting pairs detected");
    }

    // Deletion wins over a concurrent edit of the counterpart: the surviving
    // edit is discarded together with the item.
    changes_a.modified.retain(|a_id| {
        table
            .lookup(Side::A, a_id)
            .is_none_or(|b_id| !changes_b.deleted.contains(b_id))
    });
    changes_b.modified.retain(|b_id| {
        table
            .lookup(Side::B, b_id)
            .is_none_or(|a_id| !changes_a.deleted.contains(a_id))
    });

    // New items.
    propagate_new(
        Direction::AToB,
        &changes_a.new,
        current_a,
        side_b,
        converter,
        table,
        snapshots,
        &mut report,
    )
    .await?;
    propagate_new(
        Direction::BToA,
        &changes_b.new,
        current_b,
        side_a,
        converter,
        table,
        snapshots,
        &mut report,
    )
    .await?;

    // Modified items. Pairs whose counterpart vanished out-of-band come back
    // as orphans and are repaired below by deleting the surviving item.
    let orphans_a = propagate_modified(
        Direction::AToB,
        &changes_a.modified,
        current_a,
        side_b,
        converter,
        table,
        snapshots,
        mutable_keys,
        &mut report,
    )
    .await?;
    let orphans_b = propagate_modified(
        Direction::BToA,
        &changes_b.modified,
        current_b,
        side_a,
        converter,
        table,
        snapshots,
        mutable_keys,
        &mut report,
    )
    .await?;

    for (a_id, b_id) in orphans_a {
        repair_orphan(side_a, Side::A, &a_id, &b_id, table, snapshots, &mut report).await?;
    }
    for (b_id, a_id) in orphans_b {
        repair_orphan(side_b, Side::B, &b_id, &a_id, table, snapshots, &mut report).await?;
    }

    // Deletions.
    propagate_deleted(
        Direction::AToB,
        &changes_a.deleted,
        side_b,
        table,
        snapshots,
        &mut report,
    )
    .await?;
    propagate_deleted(
        Direction::BToA,
        &changes_b.deleted,
        side_a,
        table,
        snapshots,
        &mut report,
    )
    .await?;

    // Conflicts: the strategy picks a winner, the loser is overwritten.
    // No merge is attempted.
    for (a_id, b_id) in &conflicts {
        let (Some(item_a), Some(item_b)) = (current_a.get(a_id), current_b.get(b_id)) else {
            continue;
        };
        let winner = strategy.resolve(item_a, side_a.modified_key(), item_b, side_b.modified_key());
        let winner_side = match winner {
            Winner::First => Side::A,
            Winner::Second => Side::B,
        };
        tracing::info!(%a_id, %b_id, winner = %winner_side, "resolving conflict");

        match winner {
            Winner::First => {
                overwrite_loser(
                    Direction::AToB,
                    a_id,
                    item_a,
                    b_id,
                    side_b,
                    converter,
                    snapshots,
                    mutable_keys,
                    &mut report,
                )
                .await?;
            }
            Winner::Second => {
                overwrite_loser(
                    Direction::BToA,
                    b_id,
                    item_b,
                    a_id,
                    side_a,
                    converter,
                    snapshots,
                    mutable_keys,
                    &mut report,
                )
                .await?;
            }
        }
    }

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn propagate_new<D, C>(
    dir: Direction,
    new_ids: &BTreeSet<String>,
    current_src: &BTreeMap<String, Item>,
    dst: &mut D,
    converter: &C,
    table: &mut CorrespondenceTable,
    snapshots: &mut SnapshotStore,
    report: &mut RunReport,
) -> Result<(), SyncError>
where
    D: SideAdapter,
    C: Converter,
{
    for src_id in new_ids {
        let Some(item) = current_src.get(src_id) else {
            continue;
        };

        let converted = match convert_dir(converter, dir, item) {
            Ok(converted) => converted,
            Err(e) => {
                report.fail(dir.src(), src_id, Operation::Convert, &e);
                continue;
            }
        };
        // The target assigns identity itself.
        let converted = converted.without(&BTreeSet::from([dst.id_key().to_string()]));

        let created = match dst.add_item(converted).await {
            Ok(created) => created,
            Err(e) => {
                report.fail(dir.dst(), src_id, Operation::Create, &e);
                continue;
            }
        };
        let dst_id = match created.id(dst.id_key()) {
            Ok(id) => id.to_string(),
            Err(e) => {
                report.fail(dir.dst(), src_id, Operation::Create, &e);
                continue;
            }
        };

        insert_pair(table, dir, src_id, &dst_id)?;
        snapshots.put(dir.src(), src_id, item).await?;
        snapshots.put(dir.dst(), &dst_id, &created).await?;
        report.counts_mut(dir.dst()).created += 1;
        tracing::debug!(src = %dir.src(), %src_id, %dst_id, "created counterpart");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn propagate_modified<D, C>(
    dir: Direction,
    modified_ids: &BTreeSet<String>,
    current_src: &BTreeMap<String, Item>,
    dst: &mut D,
    converter: &C,
    table: &CorrespondenceTable,
    snapshots: &mut SnapshotStore,
    mutable_keys: Option<&BTreeSet<String>>,
    report: &mut RunReport,
) -> Result<Vec<(String, String)>, SyncError>
where
    D: SideAdapter,
    C: Converter,
{
    let mut orphans = Vec::new();

    for src_id in modified_ids {
        let Some(item) = current_src.get(src_id) else {
            continue;
        };
        let Some(dst_id) = table.lookup(dir.src(), src_id).map(ToString::to_string) else {
            tracing::warn!(side = %dir.src(), %src_id, "modified id has no pair, skipping");
            continue;
        };

        // The table may reference an id the store no longer recognizes;
        // treat that as a deletion on the counterpart side.
        match dst.get_item(&dst_id, true).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    side = %dir.dst(),
                    %dst_id,
                    "counterpart vanished, repairing as deletion"
                );
                orphans.push((src_id.clone(), dst_id));
                continue;
            }
            Err(e) => {
                report.fail(dir.dst(), &dst_id, Operation::Fetch, &e);
                continue;
            }
        }

        let converted = match convert_dir(converter, dir, item) {
            Ok(converted) => converted,
            Err(e) => {
                report.fail(dir.src(), src_id, Operation::Convert, &e);
                continue;
            }
        };
        let changes = restrict_changes(&converted, mutable_keys, dst.id_key());

        if let Err(e) = dst.update_item(&dst_id, changes).await {
            report.fail(dir.dst(), &dst_id, Operation::Update, &e);
            continue;
        }
        report.counts_mut(dir.dst()).updated += 1;

        // Refresh both baselines only after the update landed, so a crash in
        // between re-detects the change next run instead of dropping it.
        match dst.get_item(&dst_id, false).await {
            Ok(Some(fresh)) => snapshots.put(dir.dst(), &dst_id, &fresh).await?,
            Ok(None) => {
                tracing::warn!(side = %dir.dst(), %dst_id, "item disappeared right after update");
            }
            Err(e) => report.fail(dir.dst(), &dst_id, Operation::Fetch, &e),
        }
        snapshots.put(dir.src(), src_id, item).await?;
        tracing::debug!(src = %dir.src(), %src_id, %dst_id, "propagated modification");
    }

    Ok(orphans)
}

/// Repairs a pair whose counterpart disappeared out-of-band: the surviving
/// item follows it, as if the counterpart side had deleted it.
async fn repair_orphan<S: SideAdapter>(
    survivor: &mut S,
    survivor_side: Side,
    survivor_id: &str,
    gone_id: &str,
    table: &mut CorrespondenceTable,
    snapshots: &mut SnapshotStore,
    report: &mut RunReport,
) -> Result<(), SyncError> {
    if let Err(e) = survivor.delete_item(survivor_id).await {
        report.fail(survivor_side, survivor_id, Operation::Delete, &e);
        return Ok(()); // keep the pair; the next run retries the repair
    }
    report.counts_mut(survivor_side).deleted += 1;
    table.remove(survivor_side, survivor_id);
    snapshots.delete(survivor_side, survivor_id).await?;
    snapshots.delete(survivor_side.other(), gone_id).await?;
    Ok(())
}

async fn propagate_deleted<D: SideAdapter>(
    dir: Direction,
    deleted_ids: &BTreeSet<String>,
    dst: &mut D,
    table: &mut CorrespondenceTable,
    snapshots: &mut SnapshotStore,
    report: &mut RunReport,
) -> Result<(), SyncError> {
    for src_id in deleted_ids {
        let Some(dst_id) = table.lookup(dir.src(), src_id).map(ToString::to_string) else {
            // No pair (concurrent table mutation); drop any stale baseline.
            snapshots.delete(dir.src(), src_id).await?;
            continue;
        };

        // The counterpart may already be gone; deletion is then a table repair.
        let present = match dst.get_item(&dst_id, true).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                report.fail(dir.dst(), &dst_id, Operation::Fetch, &e);
                continue;
            }
        };
        if present {
            if let Err(e) = dst.delete_item(&dst_id).await {
                report.fail(dir.dst(), &dst_id, Operation::Delete, &e);
                continue; // keep the pair so the next run retries
            }
            report.counts_mut(dir.dst()).deleted += 1;
        }

        table.remove(dir.src(), src_id);
        snapshots.delete(dir.src(), src_id).await?;
        snapshots.delete(dir.dst(), &dst_id).await?;
        tracing::debug!(src = %dir.src(), %src_id, %dst_id, "propagated deletion");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn overwrite_loser<D, C>(
    dir: Direction,
    winner_id: &str,
    winner_item: &Item,
    loser_id: &str,
    loser: &mut D,
    converter: &C,
    snapshots: &mut SnapshotStore,
    mutable_keys: Option<&BTreeSet<String>>,
    report: &mut RunReport,
) -> Result<(), SyncError>
where
    D: SideAdapter,
    C: Converter,
{
    let converted = match convert_dir(converter, dir, winner_item) {
        Ok(converted) => converted,
        Err(e) => {
            report.fail(dir.src(), winner_id, Operation::Convert, &e);
            return Ok(());
        }
    };
    let changes = restrict_changes(&converted, mutable_keys, loser.id_key());

    if let Err(e) = loser.update_item(loser_id, changes).await {
        report.fail(dir.dst(), loser_id, Operation::Update, &e);
        return Ok(());
    }
    report.counts_mut(dir.dst()).updated += 1;

    match loser.get_item(loser_id, false).await {
        Ok(Some(fresh)) => snapshots.put(dir.dst(), loser_id, &fresh).await?,
        Ok(None) => {
            tracing::warn!(side = %dir.dst(), loser_id, "item disappeared right after update");
        }
        Err(e) => report.fail(dir.dst(), loser_id, Operation::Fetch, &e),
    }
    snapshots.put(dir.src(), winner_id, winner_item).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrict_changes_drops_identity_and_immutables() {
        let converted = Item::new()
            .with("id", "b1")
            .with("title", "buy milk")
            .with("etag", "v7");

        let mutable: BTreeSet<String> = ["title".to_string(), "id".to_string()].into();
        let changes = restrict_changes(&converted, Some(&mutable), "id");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.text("title"), Some("buy milk"));

        let changes = restrict_changes(&converted, None, "id");
        assert_eq!(changes.len(), 2);
        assert!(changes.get("id").is_none());
    }

    #[test]
    fn test_report_noop() {
        let mut report = RunReport::default();
        assert!(report.is_noop());

        report.b.created = 1;
        assert!(!report.is_noop());
        assert_eq!(report.counts(Side::B).total(), 1);
    }
}

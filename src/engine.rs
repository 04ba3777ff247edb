// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use tokio::fs;

use crate::config::SyncConfig;
use crate::convert::Converter;
use crate::detect::{detect, index_items};
use crate::error::SyncError;
use crate::reconcile::{RunReport, reconcile};
use crate::side::{Side, SideAdapter};
use crate::state::{CorrespondenceTable, SnapshotStore};

/// The synchronization engine for one configured side pair.
///
/// An engine owns the pair's durable state (correspondence table and snapshot
/// store) and performs discrete, full-scan batch passes over the two stores.
/// State is not safe for concurrent runs against the same pair configuration;
/// callers must serialize invocations externally.
#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    table: CorrespondenceTable,
    snapshots: SnapshotStore,
    table_path: PathBuf,
}

impl SyncEngine {
    /// Opens the engine for the given configuration, creating the pair's
    /// state directory and loading any persisted correspondence table.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or state cannot be
    /// read.
    pub async fn open(mut config: SyncConfig) -> Result<Self, SyncError> {
        config.normalize()?;
        let pair_dir = config.pair_dir()?;
        fs::create_dir_all(&pair_dir).await?;

        let table_path = pair_dir.join("correspondence.json");
        let table = CorrespondenceTable::load_or_new(&table_path).await?;
        let snapshots = SnapshotStore::open(pair_dir.join("snapshots")).await?;

        tracing::debug!(
            pair = %config.pair_name,
            pairs = table.len(),
            "sync engine opened"
        );
        Ok(Self {
            config,
            table,
            snapshots,
            table_path,
        })
    }

    /// The normalized configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The current correspondence table.
    #[must_use]
    pub fn table(&self) -> &CorrespondenceTable {
        &self.table
    }

    /// Performs one full synchronization pass.
    ///
    /// Fetches all items from both sides, computes both change sets, and
    /// propagates the net effect. Enumeration failures abort before any
    /// mutation; item-level failures are collected into the returned report
    /// and re-detected on the next run. The correspondence table is persisted
    /// even when reconciliation stops early, so completed steps stay durable.
    ///
    /// # Errors
    ///
    /// Returns an error on enumeration failure, state-persistence failure, or
    /// a correspondence bijection violation.
    #[tracing::instrument(skip_all, fields(pair = %self.config.pair_name))]
    pub async fn run<A, B, C>(
        &mut self,
        side_a: &mut A,
        side_b: &mut B,
        converter: &C,
    ) -> Result<RunReport, SyncError>
    where
        A: SideAdapter,
        B: SideAdapter,
        C: Converter,
    {
        let items_a = side_a.all_items().await?;
        let items_b = side_b.all_items().await?;
        let current_a = index_items(side_a, items_a)?;
        let current_b = index_items(side_b, items_b)?;
        tracing::debug!(
            side_a = side_a.name(),
            count_a = current_a.len(),
            side_b = side_b.name(),
            count_b = current_b.len(),
            "fetched both sides"
        );

        let changes_a = detect(
            Side::A,
            side_a,
            &current_a,
            &self.table,
            &self.snapshots,
            &self.config.ignore_keys_a,
        )
        .await?;
        let changes_b = detect(
            Side::B,
            side_b,
            &current_b,
            &self.table,
            &self.snapshots,
            &self.config.ignore_keys_b,
        )
        .await?;

        let result = reconcile(
            side_a,
            side_b,
            converter,
            self.config.strategy,
            &mut self.table,
            &mut self.snapshots,
            self.config.mutable_keys.as_ref(),
            &current_a,
            &current_b,
            changes_a,
            changes_b,
        )
        .await;

        // Pairs inserted or removed by completed steps stay durable even when
        // a later step failed.
        self.table.dump(&self.table_path).await?;

        let report = result?;
        tracing::info!(
            created = report.a.created + report.b.created,
            updated = report.a.updated + report.b.updated,
            deleted = report.a.deleted + report.b.deleted,
            failures = report.failures.len(),
            "run finished"
        );
        Ok(report)
    }
}

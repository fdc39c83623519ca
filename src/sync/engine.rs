//! One batch reconciliation run.

use super::applicator::{
    ChangeApplicator, SyncStats, DEFAULT_CLUSTER_ORPHAN_COMMENT, DEFAULT_VM_ORPHAN_COMMENT,
};
use super::change::ChangeDetection;
use super::cluster::reconcile_clusters;
use super::vm::reconcile_vms;
use crate::allow_list::AllowList;
use crate::error::{SyncError, SyncResult};
use crate::inventory::{load_source_snapshot, load_store_snapshot, SourceInventory, StoreInventory};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Knobs for a run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub allow_list: AllowList,
    pub change_detection: ChangeDetection,
    pub dry_run: bool,
    pub cluster_orphan_comment: String,
    pub vm_orphan_comment: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            allow_list: AllowList::default(),
            change_detection: ChangeDetection::default(),
            dry_run: false,
            cluster_orphan_comment: DEFAULT_CLUSTER_ORPHAN_COMMENT.to_string(),
            vm_orphan_comment: DEFAULT_VM_ORPHAN_COMMENT.to_string(),
        }
    }
}

/// Drives loading, reconciliation and application for one run
pub struct SyncEngine {
    source: Arc<dyn SourceInventory>,
    store: Arc<dyn StoreInventory>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SourceInventory>,
        store: Arc<dyn StoreInventory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Run one full reconciliation.
    ///
    /// Clusters are applied before VMs are reconciled, and the store is
    /// reloaded in between so VM creation can resolve clusters created in the
    /// same run. Only listing failures abort; write failures are counted in
    /// the returned stats.
    pub async fn run(&self) -> SyncResult<SyncStats> {
        let run_id = Uuid::now_v7();
        let span = info_span!("sync_run", run_id = %run_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> SyncResult<SyncStats> {
        let started = Instant::now();
        info!(
            dry_run = self.settings.dry_run,
            change_detection = ?self.settings.change_detection,
            "Starting sync run"
        );

        let source = load_source_snapshot(self.source.as_ref(), &self.settings.allow_list)
            .await
            .map_err(SyncError::SourceUnavailable)?;

        let store_clusters = self
            .store
            .list_clusters()
            .await
            .context("Failed to list NetBox clusters")
            .map_err(SyncError::StoreUnavailable)?;

        let applicator = ChangeApplicator::new(self.store.clone())
            .with_dry_run(self.settings.dry_run)
            .with_orphan_comments(
                self.settings.cluster_orphan_comment.clone(),
                self.settings.vm_orphan_comment.clone(),
            );

        let cluster_decisions = reconcile_clusters(&source.clusters, &store_clusters);
        let mut stats = applicator.apply(&cluster_decisions).await;

        let store = load_store_snapshot(self.store.as_ref())
            .await
            .map_err(SyncError::StoreUnavailable)?;

        let vm_decisions = reconcile_vms(
            &source,
            &store,
            &self.settings.allow_list,
            self.settings.change_detection,
        );
        stats.merge(&applicator.apply(&vm_decisions).await);

        if stats.has_failures() {
            warn!(failed = stats.failed, "Some writes failed, they will be retried next run");
        }
        info!(
            clusters_created = stats.clusters_created,
            clusters_orphaned = stats.clusters_orphaned,
            vms_created = stats.vms_created,
            vms_updated = stats.vms_updated,
            vms_orphaned = stats.vms_orphaned,
            interfaces_created = stats.interfaces_created,
            interfaces_updated = stats.interfaces_updated,
            interfaces_deleted = stats.interfaces_deleted,
            ips_associated = stats.ips_associated,
            unchanged = stats.unchanged,
            failed = stats.failed,
            skipped = stats.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync run finished"
        );

        Ok(stats)
    }
}

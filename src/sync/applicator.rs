//! Change application.
//!
//! [`ChangeApplicator`] is the only writer against the store. Every write is
//! isolated: a failure is logged and counted, and the remaining decisions are
//! still applied.

use super::decision::{Decision, InterfaceCreate, IpAssociation};
use crate::inventory::StoreInventory;
use crate::types::{NewInterface, RecordRef};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CLUSTER_ORPHAN_COMMENT: &str = "Cluster does not exist in vCenter";
pub const DEFAULT_VM_ORPHAN_COMMENT: &str = "VM does not exist in vCenter";

/// Statistics about one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub clusters_created: usize,
    pub clusters_orphaned: usize,
    pub vms_created: usize,
    pub vms_updated: usize,
    pub vms_orphaned: usize,
    pub interfaces_created: usize,
    pub interfaces_updated: usize,
    pub interfaces_deleted: usize,
    pub ips_associated: usize,
    pub unchanged: usize,
    /// Writes that were attempted and failed
    pub failed: usize,
    /// Writes not attempted, because of dry-run or a failed parent write
    pub skipped: usize,
}

impl SyncStats {
    pub fn merge(&mut self, other: &SyncStats) {
        self.clusters_created += other.clusters_created;
        self.clusters_orphaned += other.clusters_orphaned;
        self.vms_created += other.vms_created;
        self.vms_updated += other.vms_updated;
        self.vms_orphaned += other.vms_orphaned;
        self.interfaces_created += other.interfaces_created;
        self.interfaces_updated += other.interfaces_updated;
        self.interfaces_deleted += other.interfaces_deleted;
        self.ips_associated += other.ips_associated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Successful writes
    pub fn writes(&self) -> usize {
        self.clusters_created
            + self.clusters_orphaned
            + self.vms_created
            + self.vms_updated
            + self.vms_orphaned
            + self.interfaces_created
            + self.interfaces_updated
            + self.interfaces_deleted
            + self.ips_associated
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Executes decisions against the store, one write per decided change
pub struct ChangeApplicator {
    store: Arc<dyn StoreInventory>,
    dry_run: bool,
    cluster_orphan_comment: String,
    vm_orphan_comment: String,
}

impl ChangeApplicator {
    pub fn new(store: Arc<dyn StoreInventory>) -> Self {
        Self {
            store,
            dry_run: false,
            cluster_orphan_comment: DEFAULT_CLUSTER_ORPHAN_COMMENT.to_string(),
            vm_orphan_comment: DEFAULT_VM_ORPHAN_COMMENT.to_string(),
        }
    }

    /// Log decisions instead of writing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_orphan_comments(
        mut self,
        cluster: impl Into<String>,
        vm: impl Into<String>,
    ) -> Self {
        self.cluster_orphan_comment = cluster.into();
        self.vm_orphan_comment = vm.into();
        self
    }

    /// Apply decisions in order
    pub async fn apply(&self, decisions: &[Decision]) -> SyncStats {
        let mut stats = SyncStats::default();
        for decision in decisions {
            if decision.is_noop() {
                stats.unchanged += 1;
                continue;
            }
            if self.dry_run {
                info!(operation = decision.kind(), "Dry run, would {}", decision);
                stats.skipped += write_count(decision);
                continue;
            }
            self.apply_one(decision, &mut stats).await;
        }
        stats
    }

    async fn apply_one(&self, decision: &Decision, stats: &mut SyncStats) {
        match decision {
            Decision::NoOp(_) => stats.unchanged += 1,

            Decision::CreateCluster(cluster) => {
                match self.store.create_cluster(cluster).await {
                    Ok(record) => {
                        info!(cluster = %cluster.name, record = %record, "Created cluster");
                        stats.clusters_created += 1;
                    }
                    Err(e) => {
                        error!(
                            cluster = %cluster.name,
                            persistent_id = %cluster.persistent_id,
                            "Failed to create cluster: {:#}", e
                        );
                        stats.failed += 1;
                    }
                }
            }

            Decision::MarkClusterOrphan { record, name } => {
                match self
                    .store
                    .set_cluster_comment(*record, &self.cluster_orphan_comment)
                    .await
                {
                    Ok(()) => {
                        info!(cluster = %name, "Flagged cluster as orphan");
                        stats.clusters_orphaned += 1;
                    }
                    Err(e) => {
                        error!(cluster = %name, "Failed to flag cluster as orphan: {:#}", e);
                        stats.failed += 1;
                    }
                }
            }

            Decision::CreateVm(create) => {
                let vm = &create.vm;
                match self.store.create_virtual_machine(vm).await {
                    Ok(record) => {
                        info!(vm = %vm.name, persistent_id = %vm.persistent_id, record = %record, "Created VM");
                        stats.vms_created += 1;
                        for interface in &create.interfaces {
                            self.create_interface(record, interface, stats).await;
                        }
                    }
                    Err(e) => {
                        error!(
                            vm = %vm.name,
                            persistent_id = %vm.persistent_id,
                            "Failed to create VM: {:#}", e
                        );
                        stats.failed += 1;
                        stats.skipped += create
                            .interfaces
                            .iter()
                            .map(|i| 1 + i.associations.len())
                            .sum::<usize>();
                    }
                }
            }

            Decision::UpdateVm(update) => {
                match self
                    .store
                    .update_virtual_machine(update.record, &update.changes)
                    .await
                {
                    Ok(()) => {
                        info!(
                            vm = %update.name,
                            fields = %update.changes.changed_fields().join(","),
                            "Updated VM"
                        );
                        stats.vms_updated += 1;
                    }
                    Err(e) => {
                        error!(vm = %update.name, "Failed to update VM: {:#}", e);
                        stats.failed += 1;
                    }
                }
            }

            Decision::MarkVmOrphan { record, name } => {
                match self.store.set_vm_comment(*record, &self.vm_orphan_comment).await {
                    Ok(()) => {
                        info!(vm = %name, "Flagged VM as orphan");
                        stats.vms_orphaned += 1;
                    }
                    Err(e) => {
                        error!(vm = %name, "Failed to flag VM as orphan: {:#}", e);
                        stats.failed += 1;
                    }
                }
            }

            Decision::CreateInterface(interface) => match interface.vm {
                Some(vm) => self.create_interface(vm, interface, stats).await,
                None => {
                    warn!(
                        vm = %interface.vm_name,
                        mac = %interface.mac_address,
                        "Interface create has no VM record, skipping"
                    );
                    stats.skipped += 1 + interface.associations.len();
                }
            },

            Decision::UpdateInterface(update) => {
                match self
                    .store
                    .update_interface(update.record, &update.changes)
                    .await
                {
                    Ok(()) => {
                        info!(vm = %update.vm_name, mac = %update.mac_address, "Updated interface");
                        stats.interfaces_updated += 1;
                    }
                    Err(e) => {
                        error!(
                            vm = %update.vm_name,
                            mac = %update.mac_address,
                            "Failed to update interface: {:#}", e
                        );
                        stats.failed += 1;
                    }
                }
            }

            Decision::DeleteInterface {
                record,
                vm_name,
                name,
                mac_address,
            } => match self.store.delete_interface(*record).await {
                Ok(()) => {
                    info!(vm = %vm_name, interface = %name, mac = %mac_address, "Deleted interface");
                    stats.interfaces_deleted += 1;
                }
                Err(e) => {
                    error!(
                        vm = %vm_name,
                        interface = %name,
                        mac = %mac_address,
                        "Failed to delete interface: {:#}", e
                    );
                    stats.failed += 1;
                }
            },

            Decision::AssociateExistingIp(association) => {
                self.associate(association, stats).await;
            }
        }
    }

    async fn create_interface(&self, vm: RecordRef, interface: &InterfaceCreate, stats: &mut SyncStats) {
        let new = NewInterface {
            vm,
            name: interface.name.clone(),
            mac_address: interface.mac_address.clone(),
            enabled: interface.connected,
            kind: interface.kind,
        };

        let record = match self.store.create_interface(&new).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    vm = %interface.vm_name,
                    mac = %interface.mac_address,
                    "Failed to create interface: {:#}", e
                );
                stats.failed += 1;
                stats.skipped += interface.associations.len();
                return;
            }
        };

        info!(
            vm = %interface.vm_name,
            interface = %interface.name,
            mac = %interface.mac_address,
            "Created interface"
        );
        stats.interfaces_created += 1;

        for pending in &interface.associations {
            let association = IpAssociation {
                vm_name: interface.vm_name.clone(),
                address: pending.address.clone(),
                ip: pending.ip,
                interface: record,
            };
            self.associate(&association, stats).await;
        }
    }

    async fn associate(&self, association: &IpAssociation, stats: &mut SyncStats) {
        match self
            .store
            .assign_ip_address(association.ip, association.interface)
            .await
        {
            Ok(()) => {
                debug!(
                    vm = %association.vm_name,
                    address = %association.address,
                    interface = %association.interface,
                    "Associated IP address"
                );
                stats.ips_associated += 1;
            }
            Err(e) => {
                error!(
                    vm = %association.vm_name,
                    address = %association.address,
                    "Failed to associate IP address: {:#}", e
                );
                stats.failed += 1;
            }
        }
    }
}

/// Number of writes a decision stands for, nested writes included
fn write_count(decision: &Decision) -> usize {
    match decision {
        Decision::NoOp(_) => 0,
        Decision::CreateVm(create) => {
            1 + create
                .interfaces
                .iter()
                .map(|i| 1 + i.associations.len())
                .sum::<usize>()
        }
        Decision::CreateInterface(interface) => 1 + interface.associations.len(),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::decision::{PendingIp, Subject, VmCreate, VmUpdate};
    use crate::inventory::StoreInventory;
    use crate::test_utils::{InMemoryStore, StoreWrite};
    use crate::types::{InterfaceKind, NewCluster, NewVm, VmChanges};
    use std::collections::BTreeMap;

    fn new_vm(cluster: RecordRef) -> NewVm {
        NewVm {
            name: "web01".to_string(),
            persistent_id: "uuid-1".to_string(),
            cluster,
            vcpu: 2,
            memory_mb: 2048,
            disk_gb: 40,
            comment: String::new(),
            custom_fields: BTreeMap::new(),
            interface_sync_enabled: true,
        }
    }

    fn nested_interface(ip: RecordRef) -> InterfaceCreate {
        InterfaceCreate {
            vm_name: "web01".to_string(),
            vm: None,
            name: "Network adapter 1".to_string(),
            mac_address: "00:50:56:00:00:0A".to_string(),
            connected: true,
            kind: InterfaceKind::Virtual,
            associations: vec![PendingIp {
                address: "10.0.0.5/24".to_string(),
                ip,
            }],
        }
    }

    #[tokio::test]
    async fn test_vm_create_chains_interfaces_and_ips() {
        let store = Arc::new(InMemoryStore::new());
        let ip = store.seed_ip_address("10.0.0.5/24");
        let applicator = ChangeApplicator::new(store.clone());

        let stats = applicator
            .apply(&[Decision::CreateVm(VmCreate {
                vm: new_vm(RecordRef(1)),
                interfaces: vec![nested_interface(ip)],
            })])
            .await;

        assert_eq!(stats.vms_created, 1);
        assert_eq!(stats.interfaces_created, 1);
        assert_eq!(stats.ips_associated, 1);
        assert_eq!(stats.failed, 0);
        assert!(store.ip_assignment(ip).is_some());
    }

    #[tokio::test]
    async fn test_failed_vm_create_skips_children_and_continues() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_on("create_virtual_machine");
        let applicator = ChangeApplicator::new(store.clone());

        let stats = applicator
            .apply(&[
                Decision::CreateVm(VmCreate {
                    vm: new_vm(RecordRef(1)),
                    interfaces: vec![nested_interface(RecordRef(50))],
                }),
                Decision::CreateCluster(NewCluster {
                    name: "C2".to_string(),
                    persistent_id: "domain-c9".to_string(),
                }),
            ])
            .await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.clusters_created, 1);
        assert!(!store
            .writes()
            .iter()
            .any(|w| matches!(w, StoreWrite::CreateInterface { .. })));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let applicator = ChangeApplicator::new(store.clone()).with_dry_run(true);

        let stats = applicator
            .apply(&[
                Decision::MarkVmOrphan {
                    record: RecordRef(7),
                    name: "old".to_string(),
                },
                Decision::NoOp(Subject::Vm {
                    name: "web01".to_string(),
                    persistent_id: "uuid-1".to_string(),
                }),
            ])
            .await;

        assert!(store.writes().is_empty());
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.unchanged, 1);
    }

    #[tokio::test]
    async fn test_orphan_comments_are_configurable() {
        let store = Arc::new(InMemoryStore::new());
        let vm = store.create_virtual_machine(&new_vm(RecordRef(1))).await.unwrap();
        let applicator =
            ChangeApplicator::new(store.clone()).with_orphan_comments("gone cluster", "gone vm");

        let stats = applicator
            .apply(&[Decision::MarkVmOrphan {
                record: vm,
                name: "web01".to_string(),
            }])
            .await;

        assert_eq!(stats.vms_orphaned, 1);
        assert_eq!(
            store.writes().last(),
            Some(&StoreWrite::SetVmComment {
                vm,
                comment: "gone vm".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_update_failure_is_isolated() {
        let store = Arc::new(InMemoryStore::new());
        let vm = store.create_virtual_machine(&new_vm(RecordRef(1))).await.unwrap();
        store.fail_on("update_virtual_machine");
        let applicator = ChangeApplicator::new(store.clone());

        let stats = applicator
            .apply(&[
                Decision::UpdateVm(VmUpdate {
                    record: vm,
                    name: "web01".to_string(),
                    changes: VmChanges {
                        vcpu: Some(4),
                        ..VmChanges::default()
                    },
                }),
                Decision::MarkVmOrphan {
                    record: vm,
                    name: "web01".to_string(),
                },
            ])
            .await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.vms_orphaned, 1);
    }

    #[test]
    fn test_stats_merge_and_writes() {
        let mut total = SyncStats {
            clusters_created: 1,
            ..SyncStats::default()
        };
        total.merge(&SyncStats {
            vms_updated: 2,
            failed: 1,
            ..SyncStats::default()
        });
        assert_eq!(total.writes(), 3);
        assert!(total.has_failures());
    }
}

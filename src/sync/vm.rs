//! Virtual machine reconciliation.

use super::change::{diff_vm_fields, ChangeDetection};
use super::decision::{Decision, Subject, VmCreate, VmUpdate};
use super::interface::{plan_interface_create, reconcile_interfaces, StoreNic};
use super::resolver::{find_source_vm, find_store_vm, resolve_store_cluster_id};
use crate::allow_list::AllowList;
use crate::inventory::loader::{in_synced_cluster, SourceSnapshot, StoreSnapshot};
use crate::normalize::{
    normalize_interface, normalize_vm, source_view, store_interface_view, store_view,
    NormalizedVm,
};
use crate::types::{NewVm, SourceVm, StoreInterface, StoreVm};
use tracing::{debug, info, warn};

/// Decide what to do with every VM on either side.
///
/// The update/orphan pass over NetBox VMs comes first, with interface
/// decisions for each matched VM placed ahead of its field update. The create
/// pass for VMs missing from NetBox follows. NetBox VMs outside the synced
/// clusters are left alone.
pub fn reconcile_vms(
    source: &SourceSnapshot,
    store: &StoreSnapshot,
    allow_list: &AllowList,
    policy: ChangeDetection,
) -> Vec<Decision> {
    let mut decisions = Vec::new();

    for store_vm in &store.vms {
        if !in_synced_cluster(&store.clusters, store_vm) {
            debug!(vm = %store_vm.name, "VM is outside the synced clusters, skipping");
            continue;
        }
        let matched = store_vm
            .persistent_id
            .as_deref()
            .and_then(|id| find_source_vm(&source.vms, id));

        match matched {
            Some(source_vm) => {
                decisions.extend(reconcile_matched_vm(
                    source_vm, store_vm, store, allow_list, policy,
                ));
            }
            None => {
                info!(
                    vm = %store_vm.name,
                    persistent_id = ?store_vm.persistent_id,
                    "VM does not exist in vCenter, flagging as orphan"
                );
                decisions.push(Decision::MarkVmOrphan {
                    record: store_vm.record,
                    name: store_vm.name.clone(),
                });
            }
        }
    }

    for source_vm in &source.vms {
        if find_store_vm(&store.vms, &source_vm.persistent_id).is_none() {
            if let Some(create) = plan_vm_create(source_vm, store, allow_list) {
                decisions.push(Decision::CreateVm(create));
            }
        }
    }

    decisions
}

/// Decisions for a VM present on both sides
pub fn reconcile_matched_vm(
    source_vm: &SourceVm,
    store_vm: &StoreVm,
    store: &StoreSnapshot,
    allow_list: &AllowList,
    policy: ChangeDetection,
) -> Vec<Decision> {
    debug!(
        vm = %source_vm.name,
        power_state = %source_vm.power_state,
        tools_status = ?source_vm.tools_status,
        primary_ip = ?source_vm.primary_ip,
        "Comparing VM"
    );

    let persistent_id = source_vm.persistent_id.as_str();
    let store_interfaces = store.interfaces_for(store_vm.record);
    let (source_normalized, store_normalized) =
        normalize_pair(source_vm, store_vm, store_interfaces, allow_list);

    let noop = || {
        vec![Decision::NoOp(Subject::Vm {
            name: store_vm.name.clone(),
            persistent_id: persistent_id.to_string(),
        })]
    };

    if source_normalized == store_normalized {
        debug!(vm = %store_vm.name, "VM is in sync");
        return noop();
    }

    let changes = diff_vm_fields(&source_normalized, &store_normalized, policy);
    let mut decisions = Vec::new();

    if store_vm.interface_sync_enabled {
        let store_nics: Vec<StoreNic> = store_interfaces
            .iter()
            .map(|(iface, addresses)| StoreNic {
                record: iface.record,
                normalized: normalize_interface(store_interface_view(iface, addresses)),
            })
            .collect();

        decisions.extend(reconcile_interfaces(
            &store_vm.name,
            store_vm.record,
            &source_normalized.interfaces,
            &store_nics,
            &store.ip_index,
            policy,
        ));
    }

    if !changes.is_empty() {
        info!(
            vm = %store_vm.name,
            persistent_id = %persistent_id,
            fields = %changes.changed_fields().join(","),
            "VM fields changed"
        );
        decisions.push(Decision::UpdateVm(VmUpdate {
            record: store_vm.record,
            name: store_vm.name.clone(),
            changes,
        }));
    }

    if decisions.is_empty() {
        return noop();
    }
    decisions
}

/// Normalize both sides of a matched VM.
///
/// When vCenter reported no annotation the NetBox comment is not compared.
fn normalize_pair(
    source_vm: &SourceVm,
    store_vm: &StoreVm,
    store_interfaces: &[(StoreInterface, Vec<String>)],
    allow_list: &AllowList,
) -> (NormalizedVm, NormalizedVm) {
    let source = normalize_vm(source_view(source_vm), allow_list);
    let mut store = normalize_vm(
        store_view(store_vm, &source_vm.persistent_id, store_interfaces),
        allow_list,
    );
    if source.comment.is_none() {
        store.comment = None;
    }
    (source, store)
}

/// Plan the creation of a VM missing from NetBox, or `None` when its cluster
/// cannot be resolved.
pub fn plan_vm_create(
    source_vm: &SourceVm,
    store: &StoreSnapshot,
    allow_list: &AllowList,
) -> Option<VmCreate> {
    let Some(cluster_name) = source_vm.cluster.as_deref() else {
        warn!(vm = %source_vm.name, "VM has no owning cluster, not creating");
        return None;
    };
    let Some(cluster) = resolve_store_cluster_id(&store.clusters, cluster_name) else {
        warn!(
            vm = %source_vm.name,
            cluster = %cluster_name,
            "Cluster not found in NetBox, not creating VM"
        );
        return None;
    };

    info!(
        vm = %source_vm.name,
        persistent_id = %source_vm.persistent_id,
        cluster = %cluster_name,
        "VM missing from NetBox, creating"
    );

    let normalized = normalize_vm(source_view(source_vm), allow_list);
    let interfaces = normalized
        .interfaces
        .iter()
        .filter_map(|nic| plan_interface_create(&source_vm.name, None, nic, &store.ip_index))
        .collect();

    Some(VmCreate {
        vm: NewVm {
            name: source_vm.name.clone(),
            persistent_id: source_vm.persistent_id.clone(),
            cluster,
            vcpu: source_vm.vcpu,
            memory_mb: source_vm.memory_mb,
            disk_gb: source_vm.disk_gb,
            comment: normalized.comment.unwrap_or_default(),
            custom_fields: normalized.custom_fields,
            interface_sync_enabled: true,
        },
        interfaces,
    })
}

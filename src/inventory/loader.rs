//! Inventory snapshot loading.
//!
//! Pulls both inventories once and turns them into the immutable snapshot
//! structs the reconcilers consume.

use super::{RawVm, SourceInventory, StoreInventory};
use crate::allow_list::{AllowList, ResolvedAllowList};
use crate::normalize::{canonical_address, canonical_mac};
use crate::sync::resolver::IdentityResolver;
use crate::types::{
    RecordRef, SourceCluster, SourceNic, SourceVm, StoreCluster, StoreInterface, StoreVm,
};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Point-in-time view of vCenter
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub clusters: Vec<SourceCluster>,
    /// Non-template VMs, first occurrence of each persistent id only
    pub vms: Vec<SourceVm>,
}

/// Existing address records keyed by canonical address string
#[derive(Debug, Clone, Default)]
pub struct IpIndex {
    by_address: HashMap<String, RecordRef>,
}

impl IpIndex {
    pub fn insert(&mut self, address: &str, record: RecordRef) {
        if let Some(key) = canonical_address(address) {
            self.by_address.entry(key).or_insert(record);
        }
    }

    pub fn lookup(&self, address: &str) -> Option<RecordRef> {
        let key = canonical_address(address)?;
        self.by_address.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Whether `vm` belongs to one of the synced clusters
pub fn in_synced_cluster(clusters: &[StoreCluster], vm: &StoreVm) -> bool {
    vm.cluster
        .is_some_and(|cluster| clusters.iter().any(|c| c.record == cluster))
}

/// Point-in-time view of NetBox
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub clusters: Vec<StoreCluster>,
    pub vms: Vec<StoreVm>,
    /// Interfaces per VM, each paired with the addresses assigned to it
    pub interfaces: HashMap<RecordRef, Vec<(StoreInterface, Vec<String>)>>,
    pub ip_index: IpIndex,
}

impl StoreSnapshot {
    pub fn interfaces_for(&self, vm: RecordRef) -> &[(StoreInterface, Vec<String>)] {
        self.interfaces
            .get(&vm)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Load clusters and VMs from vCenter.
///
/// Owning clusters are resolved through host membership and custom attributes
/// are projected through the allow-list here, so the snapshot only carries
/// resolved values.
pub async fn load_source_snapshot(
    source: &dyn SourceInventory,
    allow_list: &AllowList,
) -> Result<SourceSnapshot> {
    let clusters = source
        .clusters()
        .await
        .context("Failed to list vCenter clusters")?;
    let attribute_names = if allow_list.is_empty() {
        HashMap::new()
    } else {
        source
            .custom_attribute_names()
            .await
            .context("Failed to load vCenter custom attribute names")?
    };
    let raw_vms = source
        .virtual_machines()
        .await
        .context("Failed to list vCenter virtual machines")?;

    let resolved = allow_list.resolve(&attribute_names);
    let mut resolver = IdentityResolver::new(&clusters);
    let mut seen = HashSet::new();
    let mut vms = Vec::with_capacity(raw_vms.len());

    for raw in raw_vms {
        if raw.is_template {
            debug!(vm = %raw.name, "Skipping template");
            continue;
        }
        if !seen.insert(raw.instance_id.clone()) {
            warn!(
                vm = %raw.name,
                persistent_id = %raw.instance_id,
                "Duplicate persistent id in vCenter, keeping the first VM"
            );
            continue;
        }
        vms.push(source_vm_from_raw(raw, &resolved, &mut resolver));
    }

    info!(
        clusters = clusters.len(),
        vms = vms.len(),
        "Loaded vCenter inventory"
    );

    Ok(SourceSnapshot { clusters, vms })
}

fn source_vm_from_raw(
    raw: RawVm,
    allow_list: &ResolvedAllowList,
    resolver: &mut IdentityResolver,
) -> SourceVm {
    let cluster = raw
        .host_id
        .as_deref()
        .and_then(|host| resolver.resolve_cluster_for_host(host));
    if cluster.is_none() {
        warn!(vm = %raw.name, host = ?raw.host_id, "Could not resolve owning cluster");
    }

    let disk_bytes: u64 = raw.disks.iter().map(|d| d.capacity_bytes).sum();

    let nics = raw
        .nics
        .iter()
        .map(|nic| {
            let mac = canonical_mac(&nic.mac_address);
            let ip_addresses = raw
                .guest_nics
                .iter()
                .filter(|guest| mac.is_some() && canonical_mac(&guest.mac_address) == mac)
                .flat_map(|guest| guest.addresses.iter())
                .map(|ip| format!("{}/{}", ip.address, ip.prefix_length))
                .collect();
            SourceNic {
                label: nic.label.clone(),
                mac_address: nic.mac_address.clone(),
                connected: nic.connected,
                ip_addresses,
            }
        })
        .collect();

    SourceVm {
        custom_fields: allow_list.project(&raw.name, &raw.custom_values),
        name: raw.name,
        persistent_id: raw.instance_id,
        vcpu: raw.vcpu,
        memory_mb: raw.memory_mb,
        disk_gb: disk_bytes / BYTES_PER_GB,
        comment: raw.annotation,
        power_state: raw.power_state,
        tools_status: raw.tools_status,
        primary_ip: raw.primary_ip,
        is_template: raw.is_template,
        cluster,
        nics,
    }
}

/// Load clusters, VMs, interfaces and addresses from NetBox.
pub async fn load_store_snapshot(store: &dyn StoreInventory) -> Result<StoreSnapshot> {
    let clusters = store
        .list_clusters()
        .await
        .context("Failed to list NetBox clusters")?;
    let (vms, ignored): (Vec<StoreVm>, Vec<StoreVm>) = store
        .list_virtual_machines()
        .await
        .context("Failed to list NetBox virtual machines")?
        .into_iter()
        .partition(|vm| in_synced_cluster(&clusters, vm));
    if !ignored.is_empty() {
        debug!(
            count = ignored.len(),
            "Ignoring NetBox VMs outside the synced cluster type"
        );
    }
    let synced_vms: HashSet<RecordRef> = vms.iter().map(|vm| vm.record).collect();
    let interfaces = store
        .list_interfaces(None)
        .await
        .context("Failed to list NetBox VM interfaces")?;
    let addresses = store
        .list_ip_addresses(None)
        .await
        .context("Failed to list NetBox IP addresses")?;

    let mut ip_index = IpIndex::default();
    let mut by_interface: HashMap<RecordRef, Vec<String>> = HashMap::new();
    for address in &addresses {
        ip_index.insert(&address.address, address.record);
        if let Some(interface) = address.interface {
            by_interface
                .entry(interface)
                .or_default()
                .push(address.address.clone());
        }
    }

    let mut grouped: HashMap<RecordRef, Vec<(StoreInterface, Vec<String>)>> = HashMap::new();
    for interface in interfaces {
        if !synced_vms.contains(&interface.vm) {
            continue;
        }
        let assigned = by_interface.remove(&interface.record).unwrap_or_default();
        grouped
            .entry(interface.vm)
            .or_default()
            .push((interface, assigned));
    }

    info!(
        clusters = clusters.len(),
        vms = vms.len(),
        addresses = ip_index.len(),
        "Loaded NetBox inventory"
    );
    if ip_index.is_empty() {
        warn!("No IP addresses in NetBox, interface addresses will not be associated");
    }

    Ok(StoreSnapshot {
        clusters,
        vms,
        interfaces: grouped,
        ip_index,
    })
}

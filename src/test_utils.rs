//! In-memory inventories for exercising the loader, applicator and engine
//! without a vCenter or NetBox instance.

use crate::inventory::{RawVm, SourceInventory, StoreInventory};
use crate::types::{
    InterfaceChanges, NewCluster, NewInterface, NewVm, RecordRef, SourceCluster, StoreCluster,
    StoreInterface, StoreIpAddress, StoreVm, VmChanges,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Fixed hypervisor inventory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    clusters: Vec<SourceCluster>,
    attributes: HashMap<String, String>,
    vms: Vec<RawVm>,
    unavailable: bool,
}

impl InMemorySource {
    pub fn new(clusters: Vec<SourceCluster>) -> Self {
        Self {
            clusters,
            ..Self::default()
        }
    }

    pub fn with_vm(mut self, vm: RawVm) -> Self {
        self.vms.push(vm);
        self
    }

    pub fn with_attribute(mut self, id: &str, name: &str) -> Self {
        self.attributes.insert(id.to_string(), name.to_string());
        self
    }

    /// Every listing call fails
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            bail!("vCenter connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl SourceInventory for InMemorySource {
    async fn clusters(&self) -> Result<Vec<SourceCluster>> {
        self.check()?;
        Ok(self.clusters.clone())
    }

    async fn custom_attribute_names(&self) -> Result<HashMap<String, String>> {
        self.check()?;
        Ok(self.attributes.clone())
    }

    async fn virtual_machines(&self) -> Result<Vec<RawVm>> {
        self.check()?;
        Ok(self.vms.clone())
    }
}

/// One successful write against [`InMemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    CreateCluster { name: String },
    SetClusterComment { cluster: RecordRef, comment: String },
    CreateVm { name: String },
    UpdateVm { vm: RecordRef, changes: VmChanges },
    SetVmComment { vm: RecordRef, comment: String },
    CreateInterface { vm: RecordRef, mac_address: String },
    UpdateInterface { interface: RecordRef, changes: InterfaceChanges },
    DeleteInterface { interface: RecordRef },
    AssignIp { address: RecordRef, interface: RecordRef },
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    clusters: BTreeMap<RecordRef, StoreCluster>,
    vms: BTreeMap<RecordRef, StoreVm>,
    interfaces: BTreeMap<RecordRef, StoreInterface>,
    addresses: BTreeMap<RecordRef, StoreIpAddress>,
    writes: Vec<StoreWrite>,
    failing: HashSet<String>,
    unavailable: bool,
}

impl StoreState {
    fn allocate(&mut self) -> RecordRef {
        self.next_id += 1;
        RecordRef(self.next_id)
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        if self.failing.contains(operation) {
            bail!("{} failed: 500 Internal Server Error", operation);
        }
        Ok(())
    }

    fn check_list(&self) -> Result<()> {
        if self.unavailable {
            bail!("NetBox connection refused");
        }
        Ok(())
    }
}

/// Recording inventory store with per-operation failure injection
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an unassigned address record
    pub fn seed_ip_address(&self, address: &str) -> RecordRef {
        let mut state = self.state();
        let record = state.allocate();
        state.addresses.insert(
            record,
            StoreIpAddress {
                record,
                address: address.to_string(),
                interface: None,
            },
        );
        record
    }

    /// Add a cluster as if it had been created by hand
    pub fn seed_cluster(&self, name: &str, persistent_id: Option<&str>) -> RecordRef {
        let mut state = self.state();
        let record = state.allocate();
        state.clusters.insert(
            record,
            StoreCluster {
                record,
                name: name.to_string(),
                persistent_id: persistent_id.map(str::to_string),
            },
        );
        record
    }

    /// Make every call of `operation` fail
    pub fn fail_on(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    /// Make every listing call fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn writes(&self) -> Vec<StoreWrite> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn vm(&self, record: RecordRef) -> Option<StoreVm> {
        self.state().vms.get(&record).cloned()
    }

    pub fn cluster_comment(&self, record: RecordRef) -> Option<String> {
        self.state()
            .writes
            .iter()
            .rev()
            .find_map(|write| match write {
                StoreWrite::SetClusterComment { cluster, comment } if *cluster == record => {
                    Some(comment.clone())
                }
                _ => None,
            })
    }

    /// Interface an address record is assigned to
    pub fn ip_assignment(&self, address: RecordRef) -> Option<RecordRef> {
        self.state()
            .addresses
            .get(&address)
            .and_then(|ip| ip.interface)
    }
}

#[async_trait]
impl StoreInventory for InMemoryStore {
    async fn list_clusters(&self) -> Result<Vec<StoreCluster>> {
        let state = self.state();
        state.check_list()?;
        Ok(state.clusters.values().cloned().collect())
    }

    async fn list_virtual_machines(&self) -> Result<Vec<StoreVm>> {
        let state = self.state();
        state.check_list()?;
        Ok(state.vms.values().cloned().collect())
    }

    async fn list_interfaces(&self, vm: Option<RecordRef>) -> Result<Vec<StoreInterface>> {
        let state = self.state();
        state.check_list()?;
        Ok(state
            .interfaces
            .values()
            .filter(|iface| vm.map_or(true, |vm| iface.vm == vm))
            .cloned()
            .collect())
    }

    async fn list_ip_addresses(
        &self,
        interface: Option<RecordRef>,
    ) -> Result<Vec<StoreIpAddress>> {
        let state = self.state();
        state.check_list()?;
        Ok(state
            .addresses
            .values()
            .filter(|ip| interface.map_or(true, |wanted| ip.interface == Some(wanted)))
            .cloned()
            .collect())
    }

    async fn create_cluster(&self, cluster: &NewCluster) -> Result<RecordRef> {
        let mut state = self.state();
        state.check_write("create_cluster")?;
        if state.clusters.values().any(|c| c.name == cluster.name) {
            bail!("create_cluster failed: cluster with this name already exists");
        }
        let record = state.allocate();
        state.clusters.insert(
            record,
            StoreCluster {
                record,
                name: cluster.name.clone(),
                persistent_id: Some(cluster.persistent_id.clone()),
            },
        );
        state.writes.push(StoreWrite::CreateCluster {
            name: cluster.name.clone(),
        });
        Ok(record)
    }

    async fn set_cluster_comment(&self, cluster: RecordRef, comment: &str) -> Result<()> {
        let mut state = self.state();
        state.check_write("set_cluster_comment")?;
        if !state.clusters.contains_key(&cluster) {
            return Err(anyhow!("cluster {} not found", cluster));
        }
        state.writes.push(StoreWrite::SetClusterComment {
            cluster,
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn create_virtual_machine(&self, vm: &NewVm) -> Result<RecordRef> {
        let mut state = self.state();
        state.check_write("create_virtual_machine")?;
        let record = state.allocate();
        state.vms.insert(
            record,
            StoreVm {
                record,
                name: vm.name.clone(),
                persistent_id: Some(vm.persistent_id.clone()),
                cluster: Some(vm.cluster),
                vcpu: Some(vm.vcpu),
                memory_mb: Some(vm.memory_mb),
                disk_gb: Some(vm.disk_gb),
                comment: Some(vm.comment.clone()),
                custom_fields: vm.custom_fields.clone(),
                interface_sync_enabled: vm.interface_sync_enabled,
            },
        );
        state.writes.push(StoreWrite::CreateVm {
            name: vm.name.clone(),
        });
        Ok(record)
    }

    async fn update_virtual_machine(&self, vm: RecordRef, changes: &VmChanges) -> Result<()> {
        let mut state = self.state();
        state.check_write("update_virtual_machine")?;
        let existing = state
            .vms
            .get_mut(&vm)
            .ok_or_else(|| anyhow!("virtual machine {} not found", vm))?;
        if let Some(vcpu) = changes.vcpu {
            existing.vcpu = Some(vcpu);
        }
        if let Some(memory) = changes.memory_mb {
            existing.memory_mb = Some(memory);
        }
        if let Some(disk) = changes.disk_gb {
            existing.disk_gb = Some(disk);
        }
        if let Some(comment) = &changes.comment {
            existing.comment = Some(comment.clone());
        }
        for (key, value) in &changes.custom_fields {
            existing.custom_fields.insert(key.clone(), value.clone());
        }
        state.writes.push(StoreWrite::UpdateVm {
            vm,
            changes: changes.clone(),
        });
        Ok(())
    }

    async fn set_vm_comment(&self, vm: RecordRef, comment: &str) -> Result<()> {
        let mut state = self.state();
        state.check_write("set_vm_comment")?;
        let existing = state
            .vms
            .get_mut(&vm)
            .ok_or_else(|| anyhow!("virtual machine {} not found", vm))?;
        existing.comment = Some(comment.to_string());
        state.writes.push(StoreWrite::SetVmComment {
            vm,
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn create_interface(&self, interface: &NewInterface) -> Result<RecordRef> {
        let mut state = self.state();
        state.check_write("create_interface")?;
        if !state.vms.contains_key(&interface.vm) {
            bail!("virtual machine {} not found", interface.vm);
        }
        let record = state.allocate();
        state.interfaces.insert(
            record,
            StoreInterface {
                record,
                vm: interface.vm,
                name: interface.name.clone(),
                mac_address: Some(interface.mac_address.clone()),
                enabled: interface.enabled,
            },
        );
        state.writes.push(StoreWrite::CreateInterface {
            vm: interface.vm,
            mac_address: interface.mac_address.clone(),
        });
        Ok(record)
    }

    async fn update_interface(
        &self,
        interface: RecordRef,
        changes: &InterfaceChanges,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_write("update_interface")?;
        let existing = state
            .interfaces
            .get_mut(&interface)
            .ok_or_else(|| anyhow!("interface {} not found", interface))?;
        if let Some(name) = &changes.name {
            existing.name = name.clone();
        }
        if let Some(enabled) = changes.enabled {
            existing.enabled = enabled;
        }
        state.writes.push(StoreWrite::UpdateInterface {
            interface,
            changes: changes.clone(),
        });
        Ok(())
    }

    async fn delete_interface(&self, interface: RecordRef) -> Result<()> {
        let mut state = self.state();
        state.check_write("delete_interface")?;
        if state.interfaces.remove(&interface).is_none() {
            bail!("interface {} not found", interface);
        }
        for ip in state.addresses.values_mut() {
            if ip.interface == Some(interface) {
                ip.interface = None;
            }
        }
        state.writes.push(StoreWrite::DeleteInterface { interface });
        Ok(())
    }

    async fn assign_ip_address(&self, address: RecordRef, interface: RecordRef) -> Result<()> {
        let mut state = self.state();
        state.check_write("assign_ip_address")?;
        if !state.interfaces.contains_key(&interface) {
            bail!("interface {} not found", interface);
        }
        let ip = state
            .addresses
            .get_mut(&address)
            .ok_or_else(|| anyhow!("ip address {} not found", address))?;
        ip.interface = Some(interface);
        state.writes.push(StoreWrite::AssignIp { address, interface });
        Ok(())
    }
}

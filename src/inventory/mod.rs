//! Collaborator boundary for both inventories.
//!
//! [`SourceInventory`] is the read-only vCenter side and [`StoreInventory`]
//! the NetBox side. The reconcilers never see either trait; they work on the
//! snapshots produced by [`loader`]. Only the applicator holds a store writer.

pub mod loader;
pub mod netbox;
pub mod vcenter;

use crate::types::{
    InterfaceChanges, NewCluster, NewInterface, NewVm, RecordRef, SourceCluster, StoreCluster,
    StoreInterface, StoreIpAddress, StoreVm, VmChanges,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use loader::{load_source_snapshot, load_store_snapshot, SourceSnapshot, StoreSnapshot};
pub use netbox::NetboxClient;
pub use vcenter::VcenterClient;

/// Virtual disk device as reported by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDisk {
    pub capacity_bytes: u64,
}

/// Virtual NIC device as reported by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNic {
    pub label: String,
    pub mac_address: String,
    pub connected: bool,
}

/// Guest-reported IP configuration for one MAC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestNicInfo {
    pub mac_address: String,
    pub addresses: Vec<GuestIp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestIp {
    pub address: String,
    pub prefix_length: u8,
}

/// Raw per-VM field set from the hypervisor, before host and attribute
/// resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVm {
    pub name: String,
    pub instance_id: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub annotation: Option<String>,
    pub is_template: bool,
    pub power_state: String,
    pub tools_status: Option<String>,
    pub primary_ip: Option<String>,
    pub host_id: Option<String>,
    /// `(attribute id, value)` pairs; names come from
    /// [`SourceInventory::custom_attribute_names`]
    pub custom_values: Vec<(String, String)>,
    pub disks: Vec<RawDisk>,
    pub nics: Vec<RawNic>,
    pub guest_nics: Vec<GuestNicInfo>,
}

/// Read access to the hypervisor inventory
#[async_trait]
pub trait SourceInventory: Send + Sync {
    /// All clusters with their member host ids
    async fn clusters(&self) -> Result<Vec<SourceCluster>>;

    /// Attribute id to attribute name lookup table
    async fn custom_attribute_names(&self) -> Result<HashMap<String, String>>;

    /// Every VM with its raw field set
    async fn virtual_machines(&self) -> Result<Vec<RawVm>>;
}

/// Read and write access to the inventory store
#[async_trait]
pub trait StoreInventory: Send + Sync {
    // ========== Listing ==========

    /// Clusters of the configured cluster type
    async fn list_clusters(&self) -> Result<Vec<StoreCluster>>;

    async fn list_virtual_machines(&self) -> Result<Vec<StoreVm>>;

    /// VM interfaces, optionally restricted to one VM
    async fn list_interfaces(&self, vm: Option<RecordRef>) -> Result<Vec<StoreInterface>>;

    /// IP addresses, optionally restricted to those assigned to one interface
    async fn list_ip_addresses(&self, interface: Option<RecordRef>)
        -> Result<Vec<StoreIpAddress>>;

    // ========== Clusters ==========

    async fn create_cluster(&self, cluster: &NewCluster) -> Result<RecordRef>;

    async fn set_cluster_comment(&self, cluster: RecordRef, comment: &str) -> Result<()>;

    // ========== Virtual machines ==========

    async fn create_virtual_machine(&self, vm: &NewVm) -> Result<RecordRef>;

    async fn update_virtual_machine(&self, vm: RecordRef, changes: &VmChanges) -> Result<()>;

    async fn set_vm_comment(&self, vm: RecordRef, comment: &str) -> Result<()>;

    // ========== Interfaces ==========

    async fn create_interface(&self, interface: &NewInterface) -> Result<RecordRef>;

    async fn update_interface(
        &self,
        interface: RecordRef,
        changes: &InterfaceChanges,
    ) -> Result<()>;

    async fn delete_interface(&self, interface: RecordRef) -> Result<()>;

    // ========== IP addresses ==========

    /// Point an existing address record at an interface
    async fn assign_ip_address(&self, address: RecordRef, interface: RecordRef) -> Result<()>;
}

//! Inventory entities shared by the loaders, reconcilers and applicator.
//!
//! Everything here is a point-in-time snapshot value. Nothing is mutated after
//! a snapshot is loaded; writes go through the store and the next snapshot
//! reflects them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque handle to a record in the inventory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef(pub u64);

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cluster as reported by vCenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCluster {
    pub name: String,
    /// Managed object id, e.g. `domain-c8`
    pub persistent_id: String,
    pub member_host_ids: BTreeSet<String>,
}

/// A cluster record in NetBox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCluster {
    pub record: RecordRef,
    pub name: String,
    /// `None` when the persistent id custom field was never populated
    pub persistent_id: Option<String>,
}

/// A virtual NIC on a source VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNic {
    pub label: String,
    pub mac_address: String,
    pub connected: bool,
    /// Guest-reported addresses in `address/prefix` form
    pub ip_addresses: Vec<String>,
}

/// A virtual machine as reported by vCenter, after host and custom attribute
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVm {
    pub name: String,
    pub persistent_id: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    /// `None` when the source did not report an annotation at all
    pub comment: Option<String>,
    pub power_state: String,
    pub tools_status: Option<String>,
    pub primary_ip: Option<String>,
    pub is_template: bool,
    /// Allow-listed custom attribute values keyed by NetBox field name
    pub custom_fields: BTreeMap<String, String>,
    /// Owning cluster name, resolved through host membership
    pub cluster: Option<String>,
    pub nics: Vec<SourceNic>,
}

/// A virtual machine record in NetBox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreVm {
    pub record: RecordRef,
    pub name: String,
    pub persistent_id: Option<String>,
    pub cluster: Option<RecordRef>,
    pub vcpu: Option<u32>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub comment: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub interface_sync_enabled: bool,
}

/// A VM interface record in NetBox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInterface {
    pub record: RecordRef,
    pub vm: RecordRef,
    pub name: String,
    pub mac_address: Option<String>,
    pub enabled: bool,
}

/// An IP address record in NetBox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreIpAddress {
    pub record: RecordRef,
    /// Literal `address/prefix` string as stored
    pub address: String,
    pub interface: Option<RecordRef>,
}

/// Payload for a new cluster record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCluster {
    pub name: String,
    pub persistent_id: String,
}

/// Payload for a new virtual machine record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVm {
    pub name: String,
    pub persistent_id: String,
    pub cluster: RecordRef,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub comment: String,
    pub custom_fields: BTreeMap<String, String>,
    pub interface_sync_enabled: bool,
}

/// Field-level changes for an existing VM record. Only populated fields are
/// written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmChanges {
    pub vcpu: Option<u32>,
    pub memory_mb: Option<u64>,
    pub comment: Option<String>,
    pub disk_gb: Option<u64>,
    pub custom_fields: BTreeMap<String, String>,
}

impl VmChanges {
    pub fn is_empty(&self) -> bool {
        self.vcpu.is_none()
            && self.memory_mb.is_none()
            && self.comment.is_none()
            && self.disk_gb.is_none()
            && self.custom_fields.is_empty()
    }

    /// Names of the changed fields, in evaluation order
    pub fn changed_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.vcpu.is_some() {
            fields.push("vcpu".to_string());
        }
        if self.memory_mb.is_some() {
            fields.push("memory_mb".to_string());
        }
        if self.comment.is_some() {
            fields.push("comment".to_string());
        }
        if self.disk_gb.is_some() {
            fields.push("disk_gb".to_string());
        }
        for key in self.custom_fields.keys() {
            fields.push(format!("custom_fields.{}", key));
        }
        fields
    }
}

/// Interface kind written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Virtual,
}

/// Payload for a new VM interface record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterface {
    pub vm: RecordRef,
    pub name: String,
    pub mac_address: String,
    pub enabled: bool,
    pub kind: InterfaceKind,
}

/// Field-level changes for an existing interface record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceChanges {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl InterfaceChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.enabled.is_none()
    }
}

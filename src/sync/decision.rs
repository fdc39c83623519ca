//! Reconciliation decisions.
//!
//! Reconcilers emit these; the applicator executes them in order. A decision
//! carries everything its write needs, so applying it never consults a
//! snapshot again.

use crate::types::{InterfaceChanges, InterfaceKind, NewCluster, NewVm, RecordRef, VmChanges};
use std::fmt;

/// Entity a `NoOp` refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Cluster { name: String, persistent_id: String },
    Vm { name: String, persistent_id: String },
}

/// Existing address record to attach to an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIp {
    pub address: String,
    pub ip: RecordRef,
}

/// New interface, optionally nested under a VM that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCreate {
    /// Vm name, for logging
    pub vm_name: String,
    /// `None` when nested in a [`VmCreate`]; the VM record is filled in once
    /// the VM has been created.
    pub vm: Option<RecordRef>,
    pub name: String,
    pub mac_address: String,
    pub connected: bool,
    pub kind: InterfaceKind,
    pub associations: Vec<PendingIp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCreate {
    pub vm: NewVm,
    pub interfaces: Vec<InterfaceCreate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmUpdate {
    pub record: RecordRef,
    pub name: String,
    pub changes: VmChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceUpdate {
    pub record: RecordRef,
    pub vm_name: String,
    pub mac_address: String,
    pub changes: InterfaceChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAssociation {
    pub vm_name: String,
    pub address: String,
    pub ip: RecordRef,
    pub interface: RecordRef,
}

/// One change the applicator performs, or an explicit no-op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoOp(Subject),
    CreateCluster(NewCluster),
    MarkClusterOrphan { record: RecordRef, name: String },
    CreateVm(VmCreate),
    UpdateVm(VmUpdate),
    MarkVmOrphan { record: RecordRef, name: String },
    CreateInterface(InterfaceCreate),
    UpdateInterface(InterfaceUpdate),
    DeleteInterface {
        record: RecordRef,
        vm_name: String,
        name: String,
        mac_address: String,
    },
    AssociateExistingIp(IpAssociation),
}

impl Decision {
    pub fn is_noop(&self) -> bool {
        matches!(self, Decision::NoOp(_))
    }

    /// Short operation name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::NoOp(_) => "noop",
            Decision::CreateCluster(_) => "create_cluster",
            Decision::MarkClusterOrphan { .. } => "mark_cluster_orphan",
            Decision::CreateVm(_) => "create_vm",
            Decision::UpdateVm(_) => "update_vm",
            Decision::MarkVmOrphan { .. } => "mark_vm_orphan",
            Decision::CreateInterface(_) => "create_interface",
            Decision::UpdateInterface(_) => "update_interface",
            Decision::DeleteInterface { .. } => "delete_interface",
            Decision::AssociateExistingIp(_) => "associate_ip",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoOp(Subject::Cluster { name, .. }) => write!(f, "cluster {} unchanged", name),
            Decision::NoOp(Subject::Vm { name, .. }) => write!(f, "vm {} unchanged", name),
            Decision::CreateCluster(c) => {
                write!(f, "create cluster {} ({})", c.name, c.persistent_id)
            }
            Decision::MarkClusterOrphan { record, name } => {
                write!(f, "mark cluster {} {} as orphan", name, record)
            }
            Decision::CreateVm(c) => write!(
                f,
                "create vm {} ({}) with {} interface(s)",
                c.vm.name,
                c.vm.persistent_id,
                c.interfaces.len()
            ),
            Decision::UpdateVm(u) => write!(
                f,
                "update vm {} {}: {}",
                u.name,
                u.record,
                u.changes.changed_fields().join(", ")
            ),
            Decision::MarkVmOrphan { record, name } => {
                write!(f, "mark vm {} {} as orphan", name, record)
            }
            Decision::CreateInterface(c) => write!(
                f,
                "create interface {} ({}) on vm {}",
                c.name, c.mac_address, c.vm_name
            ),
            Decision::UpdateInterface(u) => write!(
                f,
                "update interface {} {} on vm {}",
                u.mac_address, u.record, u.vm_name
            ),
            Decision::DeleteInterface {
                record,
                vm_name,
                name,
                mac_address,
            } => write!(
                f,
                "delete interface {} ({}) {} on vm {}",
                name, mac_address, record, vm_name
            ),
            Decision::AssociateExistingIp(a) => write!(
                f,
                "associate {} with interface {} on vm {}",
                a.address, a.interface, a.vm_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_update_vm_lists_fields() {
        let decision = Decision::UpdateVm(VmUpdate {
            record: RecordRef(5),
            name: "web01".to_string(),
            changes: VmChanges {
                vcpu: Some(4),
                disk_gb: Some(80),
                ..VmChanges::default()
            },
        });
        assert_eq!(decision.to_string(), "update vm web01 #5: vcpu, disk_gb");
        assert_eq!(decision.kind(), "update_vm");
    }

    #[test]
    fn test_noop_detection() {
        let noop = Decision::NoOp(Subject::Cluster {
            name: "C1".to_string(),
            persistent_id: "domain-c8".to_string(),
        });
        assert!(noop.is_noop());
        assert_eq!(noop.to_string(), "cluster C1 unchanged");
    }
}

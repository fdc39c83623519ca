//! Interface and IP association reconciliation for a single VM.
//!
//! Interfaces are matched by MAC. Address records are never created here:
//! NetBox owns address existence, so a source address without a record is
//! logged and skipped.

use super::change::{diff_interface_fields, ChangeDetection};
use super::decision::{Decision, InterfaceCreate, InterfaceUpdate, IpAssociation, PendingIp};
use super::resolver::find_interface_by_mac;
use crate::inventory::loader::IpIndex;
use crate::normalize::NormalizedInterface;
use crate::types::{InterfaceKind, RecordRef};
use tracing::{info, warn};

/// A store interface with its normalized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNic {
    pub record: RecordRef,
    pub normalized: NormalizedInterface,
}

/// Decisions that converge the store interfaces of one VM on the source
/// interfaces.
///
/// Order: per source interface create or update plus associations, then
/// deletes for store interfaces with no source counterpart.
pub fn reconcile_interfaces(
    vm_name: &str,
    vm: RecordRef,
    source: &[NormalizedInterface],
    store: &[StoreNic],
    ip_index: &IpIndex,
    policy: ChangeDetection,
) -> Vec<Decision> {
    let mut decisions = Vec::new();

    for nic in source {
        let Some(mac) = nic.mac_address.as_deref() else {
            warn!(vm = %vm_name, interface = %nic.name, "Source interface has no usable MAC, skipping");
            continue;
        };

        let matched = find_interface_by_mac(store, mac, |candidate| &candidate.normalized);

        match matched {
            None => {
                if let Some(create) = plan_interface_create(vm_name, Some(vm), nic, ip_index) {
                    decisions.push(Decision::CreateInterface(create));
                }
            }
            Some(existing) => {
                let changes = diff_interface_fields(nic, &existing.normalized, policy);
                if !changes.is_empty() {
                    decisions.push(Decision::UpdateInterface(InterfaceUpdate {
                        record: existing.record,
                        vm_name: vm_name.to_string(),
                        mac_address: mac.to_string(),
                        changes,
                    }));
                }

                for address in nic.ip_addresses.difference(&existing.normalized.ip_addresses) {
                    match ip_index.lookup(address) {
                        Some(ip) => decisions.push(Decision::AssociateExistingIp(IpAssociation {
                            vm_name: vm_name.to_string(),
                            address: address.clone(),
                            ip,
                            interface: existing.record,
                        })),
                        None => log_address_miss(vm_name, mac, address),
                    }
                }
            }
        }
    }

    for existing in store {
        if source.iter().any(|nic| nic.same_mac(&existing.normalized)) {
            continue;
        }
        match existing.normalized.mac_address.as_deref() {
            Some(mac) => decisions.push(Decision::DeleteInterface {
                record: existing.record,
                vm_name: vm_name.to_string(),
                name: existing.normalized.name.clone(),
                mac_address: mac.to_string(),
            }),
            None => warn!(
                vm = %vm_name,
                interface = %existing.normalized.name,
                record = %existing.record,
                "Interface has no MAC address, refusing to delete"
            ),
        }
    }

    decisions
}

/// Plan a new interface with the associations that can be made for it.
///
/// `vm` is `None` when the VM itself is still to be created.
pub fn plan_interface_create(
    vm_name: &str,
    vm: Option<RecordRef>,
    nic: &NormalizedInterface,
    ip_index: &IpIndex,
) -> Option<InterfaceCreate> {
    let Some(mac) = nic.mac_address.as_deref() else {
        warn!(vm = %vm_name, interface = %nic.name, "Source interface has no usable MAC, skipping");
        return None;
    };

    let associations = nic
        .ip_addresses
        .iter()
        .filter_map(|address| match ip_index.lookup(address) {
            Some(ip) => Some(PendingIp {
                address: address.clone(),
                ip,
            }),
            None => {
                log_address_miss(vm_name, mac, address);
                None
            }
        })
        .collect();

    Some(InterfaceCreate {
        vm_name: vm_name.to_string(),
        vm,
        name: nic.name.clone(),
        mac_address: mac.to_string(),
        connected: nic.connected,
        kind: InterfaceKind::Virtual,
        associations,
    })
}

fn log_address_miss(vm_name: &str, mac: &str, address: &str) {
    info!(
        vm = %vm_name,
        mac = %mac,
        address = %address,
        "IP address not present in NetBox, skipping association"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn nic(name: &str, mac: Option<&str>, connected: bool, ips: &[&str]) -> NormalizedInterface {
        NormalizedInterface {
            name: name.to_string(),
            mac_address: mac.map(str::to_string),
            connected,
            ip_addresses: ips.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn store_nic(record: u64, nic: NormalizedInterface) -> StoreNic {
        StoreNic {
            record: RecordRef(record),
            normalized: nic,
        }
    }

    fn index(addresses: &[(&str, u64)]) -> IpIndex {
        let mut index = IpIndex::default();
        for (address, record) in addresses {
            index.insert(address, RecordRef(*record));
        }
        index
    }

    const MAC_A: &str = "00:50:56:00:00:0A";
    const MAC_B: &str = "00:50:56:00:00:0B";

    #[test]
    fn test_new_interface_with_existing_and_missing_ip() {
        let source = vec![nic("eth0", Some(MAC_A), true, &["10.0.0.5/24", "10.0.0.6/24"])];
        let ips = index(&[("10.0.0.5/24", 500)]);

        let decisions =
            reconcile_interfaces("web01", RecordRef(1), &source, &[], &ips, ChangeDetection::Independent);

        assert_eq!(decisions.len(), 1);
        let Decision::CreateInterface(create) = &decisions[0] else {
            panic!("expected interface create, got {:?}", decisions[0]);
        };
        assert_eq!(create.vm, Some(RecordRef(1)));
        assert_eq!(create.kind, InterfaceKind::Virtual);
        assert_eq!(
            create.associations,
            vec![PendingIp {
                address: "10.0.0.5/24".to_string(),
                ip: RecordRef(500),
            }]
        );
    }

    #[test]
    fn test_missing_ip_record_is_never_associated() {
        let source = vec![nic("eth0", Some(MAC_A), true, &["192.168.1.9/24"])];
        let store = vec![store_nic(10, nic("eth0", Some(MAC_A), true, &[]))];

        let decisions = reconcile_interfaces(
            "web01",
            RecordRef(1),
            &source,
            &store,
            &IpIndex::default(),
            ChangeDetection::Independent,
        );

        assert!(decisions.is_empty());
    }

    #[test]
    fn test_matched_interface_update_and_association() {
        let source = vec![nic("eth0-renamed", Some(MAC_A), false, &["10.0.0.5/24", "10.0.0.7/24"])];
        let store = vec![store_nic(
            10,
            nic("eth0", Some(&MAC_A.to_lowercase()), true, &["10.0.0.5/24", "10.0.0.99/24"]),
        )];
        let ips = index(&[("10.0.0.5/24", 500), ("10.0.0.7/24", 501)]);

        let decisions =
            reconcile_interfaces("web01", RecordRef(1), &source, &store, &ips, ChangeDetection::Independent);

        assert_eq!(decisions.len(), 2);
        let Decision::UpdateInterface(update) = &decisions[0] else {
            panic!("expected interface update");
        };
        assert_eq!(update.changes.name.as_deref(), Some("eth0-renamed"));
        assert_eq!(update.changes.enabled, Some(false));
        assert_eq!(
            decisions[1],
            Decision::AssociateExistingIp(IpAssociation {
                vm_name: "web01".to_string(),
                address: "10.0.0.7/24".to_string(),
                ip: RecordRef(501),
                interface: RecordRef(10),
            })
        );
    }

    #[test]
    fn test_store_only_interface_deleted_unless_mac_missing() {
        let source = vec![nic("eth0", Some(MAC_A), true, &[])];
        let store = vec![
            store_nic(10, nic("eth0", Some(MAC_A), true, &[])),
            store_nic(11, nic("eth1", Some(MAC_B), true, &[])),
            store_nic(12, nic("mgmt", None, true, &[])),
        ];

        let decisions = reconcile_interfaces(
            "web01",
            RecordRef(1),
            &source,
            &store,
            &IpIndex::default(),
            ChangeDetection::Independent,
        );

        assert_eq!(
            decisions,
            vec![Decision::DeleteInterface {
                record: RecordRef(11),
                vm_name: "web01".to_string(),
                name: "eth1".to_string(),
                mac_address: MAC_B.to_string(),
            }]
        );
    }

    #[test]
    fn test_unchanged_interfaces_produce_nothing() {
        let source = vec![nic("eth0", Some(MAC_A), true, &["10.0.0.5/24"])];
        let store = vec![store_nic(10, source[0].clone())];

        let decisions = reconcile_interfaces(
            "web01",
            RecordRef(1),
            &source,
            &store,
            &index(&[("10.0.0.5/24", 500)]),
            ChangeDetection::Legacy,
        );

        assert!(decisions.is_empty());
    }
}

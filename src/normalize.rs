//! Normalized VM and interface representation.
//!
//! Both inventories are reduced to the same shape by one pair of functions,
//! [`normalize_vm`] and [`normalize_interface`], so the VM reconciler can use
//! plain structural equality as its fast path.

use crate::allow_list::AllowList;
use crate::types::{SourceNic, SourceVm, StoreInterface, StoreVm};
use ipnetwork::IpNetwork;
use macaddr::MacAddr6;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Sentinel some NetBox records carry instead of a MAC
pub const MAC_SENTINEL: &str = "NONE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInterface {
    pub name: String,
    /// Uppercase colon-separated form, `None` when missing or unparseable
    pub mac_address: Option<String>,
    pub connected: bool,
    pub ip_addresses: BTreeSet<String>,
}

impl NormalizedInterface {
    /// Case-insensitive MAC comparison
    pub fn same_mac(&self, other: &NormalizedInterface) -> bool {
        match (&self.mac_address, &other.mac_address) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedVm {
    pub name: String,
    pub persistent_id: String,
    pub vcpu: Option<u32>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    /// Trimmed comment. `None` only when the source did not report one.
    pub comment: Option<String>,
    /// Sorted by MAC so comparison is order-independent
    pub interfaces: Vec<NormalizedInterface>,
    pub custom_fields: BTreeMap<String, String>,
    pub interface_sync_enabled: bool,
}

// interface_sync_enabled is a store-only flag and never part of equality.
impl PartialEq for NormalizedVm {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.persistent_id == other.persistent_id
            && self.vcpu == other.vcpu
            && self.memory_mb == other.memory_mb
            && self.disk_gb == other.disk_gb
            && self.comment == other.comment
            && self.interfaces == other.interfaces
            && self.custom_fields == other.custom_fields
    }
}

impl Eq for NormalizedVm {}

/// Borrowed view over either side's VM fields
#[derive(Debug, Clone)]
pub struct VmView<'a> {
    pub name: &'a str,
    pub persistent_id: &'a str,
    pub vcpu: Option<u32>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub comment: Option<&'a str>,
    pub interfaces: Vec<InterfaceView<'a>>,
    pub custom_fields: &'a BTreeMap<String, String>,
    pub interface_sync_enabled: bool,
}

/// Borrowed view over either side's interface fields
#[derive(Debug, Clone)]
pub struct InterfaceView<'a> {
    pub name: &'a str,
    pub mac_address: Option<&'a str>,
    pub connected: bool,
    pub ip_addresses: Vec<&'a str>,
}

pub fn normalize_vm(view: VmView<'_>, allow_list: &AllowList) -> NormalizedVm {
    let mut interfaces: Vec<NormalizedInterface> =
        view.interfaces.into_iter().map(normalize_interface).collect();
    interfaces.sort_by(|a, b| {
        a.mac_address
            .cmp(&b.mac_address)
            .then_with(|| a.name.cmp(&b.name))
    });

    let custom_fields = allow_list
        .filter_store_fields(view.custom_fields)
        .into_iter()
        .map(|(key, value)| (key, value.trim().to_string()))
        .collect();

    NormalizedVm {
        name: view.name.trim().to_string(),
        persistent_id: view.persistent_id.to_string(),
        vcpu: view.vcpu,
        memory_mb: view.memory_mb,
        disk_gb: view.disk_gb,
        comment: view.comment.map(|c| c.trim().to_string()),
        interfaces,
        custom_fields,
        interface_sync_enabled: view.interface_sync_enabled,
    }
}

pub fn normalize_interface(view: InterfaceView<'_>) -> NormalizedInterface {
    NormalizedInterface {
        name: view.name.trim().to_string(),
        mac_address: view.mac_address.and_then(canonical_mac),
        connected: view.connected,
        ip_addresses: view
            .ip_addresses
            .into_iter()
            .filter_map(canonical_address)
            .collect(),
    }
}

/// Uppercase colon-separated MAC, or `None` for blank, sentinel or garbage
pub fn canonical_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(MAC_SENTINEL) {
        return None;
    }
    raw.parse::<MacAddr6>()
        .ok()
        .map(|mac| mac.to_string().to_uppercase())
}

/// Canonical `address/prefix` form with IPv6 link-local addresses dropped.
///
/// Strings that do not parse are kept verbatim so they still compare equal to
/// an identical literal on the other side.
pub fn canonical_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<IpNetwork>() {
        Ok(network) if is_ipv6_link_local(network.ip()) => None,
        Ok(network) => Some(network.to_string()),
        Err(_) => Some(raw.to_string()),
    }
}

fn is_ipv6_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}

/// View over a source VM for [`normalize_vm`]
pub fn source_view(vm: &SourceVm) -> VmView<'_> {
    VmView {
        name: &vm.name,
        persistent_id: &vm.persistent_id,
        vcpu: Some(vm.vcpu),
        memory_mb: Some(vm.memory_mb),
        disk_gb: Some(vm.disk_gb),
        comment: vm.comment.as_deref(),
        interfaces: vm.nics.iter().map(source_interface_view).collect(),
        custom_fields: &vm.custom_fields,
        interface_sync_enabled: false,
    }
}

pub fn source_interface_view(nic: &SourceNic) -> InterfaceView<'_> {
    InterfaceView {
        name: &nic.label,
        mac_address: Some(&nic.mac_address),
        connected: nic.connected,
        ip_addresses: nic.ip_addresses.iter().map(String::as_str).collect(),
    }
}

/// View over a store VM and its interfaces for [`normalize_vm`].
///
/// `interfaces` pairs each interface with the addresses assigned to it.
pub fn store_view<'a>(
    vm: &'a StoreVm,
    persistent_id: &'a str,
    interfaces: &'a [(StoreInterface, Vec<String>)],
) -> VmView<'a> {
    VmView {
        name: &vm.name,
        persistent_id,
        vcpu: vm.vcpu,
        memory_mb: vm.memory_mb,
        disk_gb: vm.disk_gb,
        comment: Some(vm.comment.as_deref().unwrap_or("")),
        interfaces: interfaces
            .iter()
            .map(|(iface, addresses)| store_interface_view(iface, addresses))
            .collect(),
        custom_fields: &vm.custom_fields,
        interface_sync_enabled: vm.interface_sync_enabled,
    }
}

pub fn store_interface_view<'a>(
    iface: &'a StoreInterface,
    addresses: &'a [String],
) -> InterfaceView<'a> {
    InterfaceView {
        name: &iface.name,
        mac_address: iface.mac_address.as_deref(),
        connected: iface.enabled,
        ip_addresses: addresses.iter().map(String::as_str).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nic(label: &str, mac: &str, ips: &[&str]) -> SourceNic {
        SourceNic {
            label: label.to_string(),
            mac_address: mac.to_string(),
            connected: true,
            ip_addresses: ips.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn source_vm(nics: Vec<SourceNic>) -> SourceVm {
        SourceVm {
            name: "web01".to_string(),
            persistent_id: "5003a1b2".to_string(),
            vcpu: 2,
            memory_mb: 4096,
            disk_gb: 40,
            comment: Some("  frontend  ".to_string()),
            power_state: "POWERED_ON".to_string(),
            tools_status: None,
            primary_ip: None,
            is_template: false,
            custom_fields: BTreeMap::new(),
            cluster: Some("C1".to_string()),
            nics,
        }
    }

    #[test]
    fn test_canonical_mac() {
        assert_eq!(
            canonical_mac("00:50:56:ab:cd:ef").as_deref(),
            Some("00:50:56:AB:CD:EF")
        );
        assert_eq!(
            canonical_mac("00-50-56-AB-CD-EF").as_deref(),
            Some("00:50:56:AB:CD:EF")
        );
        assert_eq!(canonical_mac("NONE"), None);
        assert_eq!(canonical_mac(""), None);
        assert_eq!(canonical_mac("not-a-mac"), None);
    }

    #[test]
    fn test_link_local_ipv6_is_dropped() {
        assert_eq!(canonical_address("fe80::250:56ff:feab:cdef/64"), None);
        assert_eq!(
            canonical_address("2001:db8::10/64").as_deref(),
            Some("2001:db8::10/64")
        );
        assert_eq!(canonical_address("10.0.0.5/24").as_deref(), Some("10.0.0.5/24"));
    }

    #[test]
    fn test_interface_order_does_not_affect_equality() {
        let allow_list = AllowList::default();
        let a = source_vm(vec![
            nic("Network adapter 1", "00:50:56:00:00:01", &["10.0.0.5/24"]),
            nic("Network adapter 2", "00:50:56:00:00:02", &[]),
        ]);
        let mut b = a.clone();
        b.nics.reverse();

        assert_eq!(
            normalize_vm(source_view(&a), &allow_list),
            normalize_vm(source_view(&b), &allow_list)
        );
    }

    #[test]
    fn test_interface_sync_flag_excluded_from_equality() {
        let allow_list = AllowList::default();
        let vm = source_vm(vec![]);
        let a = normalize_vm(source_view(&vm), &allow_list);
        let mut b = a.clone();
        b.interface_sync_enabled = true;
        assert_eq!(a, b);
    }

    #[test]
    fn test_comment_is_trimmed() {
        let normalized = normalize_vm(source_view(&source_vm(vec![])), &AllowList::default());
        assert_eq!(normalized.comment.as_deref(), Some("frontend"));
    }

    #[test]
    fn test_store_and_source_normalize_to_same_shape() {
        let allow_list = AllowList::default();
        let source = source_vm(vec![nic(
            "Network adapter 1",
            "00:50:56:aa:bb:cc",
            &["10.0.0.5/24", "fe80::1/64"],
        )]);
        let store = StoreVm {
            record: crate::types::RecordRef(7),
            name: "web01".to_string(),
            persistent_id: Some("5003a1b2".to_string()),
            cluster: None,
            vcpu: Some(2),
            memory_mb: Some(4096),
            disk_gb: Some(40),
            comment: Some("frontend".to_string()),
            custom_fields: BTreeMap::new(),
            interface_sync_enabled: true,
        };
        let interfaces = vec![(
            StoreInterface {
                record: crate::types::RecordRef(70),
                vm: crate::types::RecordRef(7),
                name: "Network adapter 1".to_string(),
                mac_address: Some("00:50:56:AA:BB:CC".to_string()),
                enabled: true,
            },
            vec!["10.0.0.5/24".to_string()],
        )];

        let left = normalize_vm(source_view(&source), &allow_list);
        let right = normalize_vm(store_view(&store, "5003a1b2", &interfaces), &allow_list);
        assert_eq!(left, right);
    }
}

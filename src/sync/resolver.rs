use crate::normalize::{canonical_mac, NormalizedInterface};
use crate::types::{RecordRef, SourceCluster, SourceVm, StoreCluster, StoreVm};
use std::collections::HashMap;
use tracing::debug;

/// Identity resolution across the two inventories
///
/// Maps hosts to their owning cluster and keeps a per-run memo of those
/// lookups. Construct one per run; [`IdentityResolver::reset`] clears the memo
/// if the same instance is reused.
pub struct IdentityResolver {
    /// `(cluster name, member host ids)` in source iteration order
    clusters: Vec<(String, Vec<String>)>,
    host_cache: HashMap<String, Option<String>>,
    host_count: usize,
}

impl IdentityResolver {
    pub fn new(clusters: &[SourceCluster]) -> Self {
        let clusters: Vec<(String, Vec<String>)> = clusters
            .iter()
            .map(|c| (c.name.clone(), c.member_host_ids.iter().cloned().collect()))
            .collect();
        let host_count = clusters.iter().map(|(_, hosts)| hosts.len()).sum();

        Self {
            clusters,
            host_cache: HashMap::with_capacity(host_count),
            host_count,
        }
    }

    /// Drop memoized lookups
    pub fn reset(&mut self) {
        self.host_cache = HashMap::with_capacity(self.host_count);
    }

    /// Name of the cluster owning `host_id`.
    ///
    /// A cluster matches when the reported host id ends with one of its member
    /// ids, since VMs may report a longer qualified form. The first matching
    /// cluster in iteration order wins.
    pub fn resolve_cluster_for_host(&mut self, host_id: &str) -> Option<String> {
        if let Some(cached) = self.host_cache.get(host_id) {
            return cached.clone();
        }

        let resolved = self
            .clusters
            .iter()
            .find(|(_, hosts)| hosts.iter().any(|h| !h.is_empty() && host_id.ends_with(h.as_str())))
            .map(|(name, _)| name.clone());

        if resolved.is_none() {
            debug!(host = %host_id, "Host does not belong to any known cluster");
        }

        self.host_cache.insert(host_id.to_string(), resolved.clone());
        resolved
    }

    /// Number of memoized host lookups
    pub fn cached_hosts(&self) -> usize {
        self.host_cache.len()
    }
}

/// Store record of the cluster with this exact (case-sensitive) name
pub fn resolve_store_cluster_id(clusters: &[StoreCluster], cluster_name: &str) -> Option<RecordRef> {
    clusters
        .iter()
        .find(|c| c.name == cluster_name)
        .map(|c| c.record)
}

pub fn find_source_cluster<'a>(
    clusters: &'a [SourceCluster],
    persistent_id: &str,
) -> Option<&'a SourceCluster> {
    clusters.iter().find(|c| c.persistent_id == persistent_id)
}

/// Store clusters without a persistent id never match
pub fn find_store_cluster<'a>(
    clusters: &'a [StoreCluster],
    persistent_id: &str,
) -> Option<&'a StoreCluster> {
    clusters
        .iter()
        .find(|c| c.persistent_id.as_deref() == Some(persistent_id))
}

/// First source VM with this id; duplicates are not detected
pub fn find_source_vm<'a>(vms: &'a [SourceVm], persistent_id: &str) -> Option<&'a SourceVm> {
    vms.iter().find(|vm| vm.persistent_id == persistent_id)
}

pub fn find_store_vm<'a>(vms: &'a [StoreVm], persistent_id: &str) -> Option<&'a StoreVm> {
    vms.iter()
        .find(|vm| vm.persistent_id.as_deref() == Some(persistent_id))
}

/// Interface with the same MAC, compared case-insensitively
pub fn find_interface_by_mac<'a, T>(
    interfaces: &'a [T],
    mac_address: &str,
    normalized: impl Fn(&T) -> &NormalizedInterface,
) -> Option<&'a T> {
    let wanted = canonical_mac(mac_address)?;
    interfaces.iter().find(|candidate| {
        normalized(candidate)
            .mac_address
            .as_deref()
            .map(|mac| mac.eq_ignore_ascii_case(&wanted))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn cluster(name: &str, id: &str, hosts: &[&str]) -> SourceCluster {
        SourceCluster {
            name: name.to_string(),
            persistent_id: id.to_string(),
            member_host_ids: hosts.iter().map(|h| h.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_resolve_cluster_by_suffix() {
        let clusters = vec![
            cluster("C1", "domain-c8", &["host-10", "host-11"]),
            cluster("C2", "domain-c9", &["host-20"]),
        ];
        let mut resolver = IdentityResolver::new(&clusters);

        assert_eq!(
            resolver.resolve_cluster_for_host("vim.HostSystem:host-20").as_deref(),
            Some("C2")
        );
        assert_eq!(resolver.resolve_cluster_for_host("host-11").as_deref(), Some("C1"));
        assert_eq!(resolver.resolve_cluster_for_host("host-99"), None);
    }

    #[test]
    fn test_first_cluster_wins_on_ambiguous_suffix() {
        let clusters = vec![
            cluster("First", "domain-c1", &["st-5"]),
            cluster("Second", "domain-c2", &["host-5"]),
        ];
        let mut resolver = IdentityResolver::new(&clusters);
        assert_eq!(resolver.resolve_cluster_for_host("host-5").as_deref(), Some("First"));
    }

    #[test]
    fn test_host_lookups_are_memoized_and_reset() {
        let clusters = vec![cluster("C1", "domain-c8", &["host-10"])];
        let mut resolver = IdentityResolver::new(&clusters);

        resolver.resolve_cluster_for_host("host-10");
        resolver.resolve_cluster_for_host("host-10");
        resolver.resolve_cluster_for_host("host-77");
        assert_eq!(resolver.cached_hosts(), 2);

        resolver.reset();
        assert_eq!(resolver.cached_hosts(), 0);
    }

    #[test]
    fn test_store_cluster_lookup_is_exact() {
        let clusters = vec![StoreCluster {
            record: RecordRef(3),
            name: "Prod".to_string(),
            persistent_id: Some("domain-c8".to_string()),
        }];
        assert_eq!(resolve_store_cluster_id(&clusters, "Prod"), Some(RecordRef(3)));
        assert_eq!(resolve_store_cluster_id(&clusters, "prod"), None);
    }

    #[test]
    fn test_store_cluster_without_id_never_matches() {
        let clusters = vec![StoreCluster {
            record: RecordRef(3),
            name: "Legacy".to_string(),
            persistent_id: None,
        }];
        assert!(find_store_cluster(&clusters, "").is_none());
        assert!(find_store_cluster(&clusters, "domain-c8").is_none());
    }

    #[test]
    fn test_find_interface_by_mac_ignores_case() {
        let interfaces = vec![NormalizedInterface {
            name: "eth0".to_string(),
            mac_address: Some("00:50:56:AA:BB:CC".to_string()),
            connected: true,
            ip_addresses: BTreeSet::new(),
        }];
        let found = find_interface_by_mac(&interfaces, "00:50:56:aa:bb:cc", |i| i);
        assert!(found.is_some());
        assert!(find_interface_by_mac(&interfaces, "NONE", |i| i).is_none());
    }

    #[test]
    fn test_find_store_vm_skips_unset_ids() {
        let vm = StoreVm {
            record: RecordRef(1),
            name: "orphan".to_string(),
            persistent_id: None,
            cluster: None,
            vcpu: None,
            memory_mb: None,
            disk_gb: None,
            comment: None,
            custom_fields: BTreeMap::new(),
            interface_sync_enabled: false,
        };
        assert!(find_store_vm(&[vm], "").is_none());
    }
}

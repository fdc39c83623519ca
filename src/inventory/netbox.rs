//! NetBox REST client implementing [`StoreInventory`].
//!
//! Token authentication, paginated listing through the `next` link, and
//! one HTTP call per write.

use super::StoreInventory;
use crate::config::NetboxConfig;
use crate::types::{
    InterfaceChanges, NewCluster, NewInterface, NewVm, RecordRef, StoreCluster, StoreInterface,
    StoreIpAddress, StoreVm, VmChanges,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Object type NetBox uses for IP assignments to VM interfaces
pub const VM_INTERFACE_OBJECT_TYPE: &str = "virtualization.vminterface";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct NestedRecord {
    id: u64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClusterRecord {
    id: u64,
    name: String,
    #[serde(rename = "type", default)]
    cluster_type: Option<NestedRecord>,
    #[serde(default)]
    custom_fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct VmRecord {
    id: u64,
    name: String,
    #[serde(default)]
    cluster: Option<NestedRecord>,
    #[serde(default)]
    vcpus: Option<f64>,
    #[serde(default)]
    memory: Option<u64>,
    #[serde(default)]
    disk: Option<u64>,
    #[serde(default)]
    comments: Option<String>,
    #[serde(default)]
    custom_fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct MacRecord {
    mac_address: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InterfaceRecord {
    id: u64,
    virtual_machine: NestedRecord,
    name: String,
    #[serde(default)]
    mac_address: Option<String>,
    /// NetBox 4.2 and later
    #[serde(default)]
    primary_mac_address: Option<MacRecord>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct IpRecord {
    id: u64,
    address: String,
    #[serde(default)]
    assigned_object_type: Option<String>,
    #[serde(default)]
    assigned_object_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct StatusRecord {
    #[serde(rename = "netbox-version")]
    netbox_version: String,
}

/// Client for the NetBox REST API
pub struct NetboxClient {
    client: Client,
    api_base: String,
    config: NetboxConfig,
    /// Whether MACs are separate `dcim/mac-addresses/` records (NetBox 4.2+)
    mac_objects: OnceCell<bool>,
}

impl NetboxClient {
    /// Create a client for `base_uri`, with or without a trailing `/api`
    pub fn new(base_uri: &str, token: &str, config: &NetboxConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Token {}", token))
            .context("NetBox API token contains invalid characters")?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("Failed to build NetBox HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base(base_uri),
            config: config.clone(),
            mac_objects: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Fetch every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("limit", self.config.page_size.to_string()));

        let first = self.client.get(self.url(path)).query(&params);
        let mut response = check(first.send().await?, path).await?;

        loop {
            let page: Page<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode {} page", path))?;
            debug!(path = %path, count = page.results.len(), "Fetched NetBox page");
            results.extend(page.results);

            match page.next {
                Some(next) => {
                    response = check(self.client.get(&next).send().await?, path).await?;
                }
                None => break,
            }
        }

        Ok(results)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<RecordRef> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let created: CreatedRecord = check(response, path).await?.json().await?;
        Ok(RecordRef(created.id))
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<()> {
        let response = self.client.patch(self.url(path)).json(body).send().await?;
        check(response, path).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self.client.delete(self.url(path)).send().await?;
        check(response, path).await?;
        Ok(())
    }

    async fn uses_mac_objects(&self) -> Result<bool> {
        let supported = self
            .mac_objects
            .get_or_try_init(|| async {
                let response = self.client.get(self.url("status/")).send().await?;
                let status: StatusRecord = check(response, "status/").await?.json().await?;
                let supported = has_mac_address_objects(&status.netbox_version);
                debug!(
                    version = %status.netbox_version,
                    mac_objects = supported,
                    "Detected NetBox version"
                );
                Ok::<_, anyhow::Error>(supported)
            })
            .await?;
        Ok(*supported)
    }

    /// Create the MAC record for `interface` and make it the primary MAC
    async fn attach_primary_mac(&self, interface: RecordRef, mac_address: &str) -> Result<()> {
        let mac = self
            .post("dcim/mac-addresses/", &mac_address_body(mac_address, interface))
            .await?;
        self.patch(
            &format!("virtualization/interfaces/{}/", interface.0),
            &json!({ "primary_mac_address": mac.0 }),
        )
        .await
    }

    async fn cluster_type_id(&self) -> Result<u64> {
        let types: Vec<NestedRecord> = self
            .get_all(
                "virtualization/cluster-types/",
                &[("name", self.config.cluster_type.clone())],
            )
            .await?;
        types
            .first()
            .map(|t| t.id)
            .ok_or_else(|| anyhow!("Cluster type '{}' not found in NetBox", self.config.cluster_type))
    }
}

#[async_trait]
impl StoreInventory for NetboxClient {
    async fn list_clusters(&self) -> Result<Vec<StoreCluster>> {
        let records: Vec<ClusterRecord> = self.get_all("virtualization/clusters/", &[]).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| cluster_from_record(record, &self.config))
            .collect())
    }

    async fn list_virtual_machines(&self) -> Result<Vec<StoreVm>> {
        let records: Vec<VmRecord> = self
            .get_all("virtualization/virtual-machines/", &[])
            .await?;
        Ok(records
            .into_iter()
            .map(|record| vm_from_record(record, &self.config))
            .collect())
    }

    async fn list_interfaces(&self, vm: Option<RecordRef>) -> Result<Vec<StoreInterface>> {
        let query: Vec<(&str, String)> = vm
            .map(|vm| vec![("virtual_machine_id", vm.0.to_string())])
            .unwrap_or_default();
        let records: Vec<InterfaceRecord> =
            self.get_all("virtualization/interfaces/", &query).await?;
        Ok(records.into_iter().map(interface_from_record).collect())
    }

    async fn list_ip_addresses(
        &self,
        interface: Option<RecordRef>,
    ) -> Result<Vec<StoreIpAddress>> {
        let query: Vec<(&str, String)> = interface
            .map(|iface| vec![("vminterface_id", iface.0.to_string())])
            .unwrap_or_default();
        let records: Vec<IpRecord> = self.get_all("ipam/ip-addresses/", &query).await?;
        Ok(records.into_iter().map(ip_from_record).collect())
    }

    async fn create_cluster(&self, cluster: &NewCluster) -> Result<RecordRef> {
        let type_id = self.cluster_type_id().await?;
        let mut custom_fields = Map::new();
        custom_fields.insert(
            self.config.persistent_id_field.clone(),
            Value::String(cluster.persistent_id.clone()),
        );
        let body = json!({
            "name": cluster.name,
            "type": type_id,
            "custom_fields": custom_fields,
        });
        self.post("virtualization/clusters/", &body).await
    }

    async fn set_cluster_comment(&self, cluster: RecordRef, comment: &str) -> Result<()> {
        self.patch(
            &format!("virtualization/clusters/{}/", cluster.0),
            &json!({ "comments": comment }),
        )
        .await
    }

    async fn create_virtual_machine(&self, vm: &NewVm) -> Result<RecordRef> {
        self.post(
            "virtualization/virtual-machines/",
            &vm_create_body(vm, &self.config),
        )
        .await
    }

    async fn update_virtual_machine(&self, vm: RecordRef, changes: &VmChanges) -> Result<()> {
        self.patch(
            &format!("virtualization/virtual-machines/{}/", vm.0),
            &vm_update_body(changes),
        )
        .await
    }

    async fn set_vm_comment(&self, vm: RecordRef, comment: &str) -> Result<()> {
        self.patch(
            &format!("virtualization/virtual-machines/{}/", vm.0),
            &json!({ "comments": comment }),
        )
        .await
    }

    async fn create_interface(&self, interface: &NewInterface) -> Result<RecordRef> {
        let mac_objects = self.uses_mac_objects().await?;
        let record = self
            .post(
                "virtualization/interfaces/",
                &interface_create_body(interface, !mac_objects),
            )
            .await?;
        if !mac_objects {
            return Ok(record);
        }

        // An interface left without its MAC would never be matched again
        if let Err(e) = self.attach_primary_mac(record, &interface.mac_address).await {
            let path = format!("virtualization/interfaces/{}/", record.0);
            if let Err(cleanup) = self.delete(&path).await {
                warn!(
                    interface = %record,
                    "Failed to remove interface after MAC assignment failed: {:#}",
                    cleanup
                );
            }
            return Err(e.context(format!(
                "Failed to assign MAC {} to interface {}",
                interface.mac_address, interface.name
            )));
        }
        Ok(record)
    }

    async fn update_interface(
        &self,
        interface: RecordRef,
        changes: &InterfaceChanges,
    ) -> Result<()> {
        self.patch(
            &format!("virtualization/interfaces/{}/", interface.0),
            &interface_update_body(changes),
        )
        .await
    }

    async fn delete_interface(&self, interface: RecordRef) -> Result<()> {
        self.delete(&format!("virtualization/interfaces/{}/", interface.0))
            .await
    }

    async fn assign_ip_address(&self, address: RecordRef, interface: RecordRef) -> Result<()> {
        self.patch(
            &format!("ipam/ip-addresses/{}/", address.0),
            &json!({
                "assigned_object_type": VM_INTERFACE_OBJECT_TYPE,
                "assigned_object_id": interface.0,
            }),
        )
        .await
    }
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    bail!("NetBox request {} failed: {} {}", what, status, body)
}

fn api_base(base_uri: &str) -> String {
    let trimmed = base_uri.trim().trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{}/api", trimmed)
    }
}

/// NetBox 4.2 moved interface MACs into their own model
fn has_mac_address_objects(version: &str) -> bool {
    let mut parts = version.trim().trim_start_matches('v').split('.').map(|part| {
        part.chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u32>()
            .ok()
    });
    match (parts.next().flatten(), parts.next().flatten()) {
        (Some(major), Some(minor)) => (major, minor) >= (4, 2),
        (Some(major), None) => major > 4,
        _ => false,
    }
}

/// Text form of a custom field value, `None` for null
fn custom_field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn cluster_from_record(record: ClusterRecord, config: &NetboxConfig) -> Option<StoreCluster> {
    let type_name = record.cluster_type.as_ref().and_then(|t| t.name.as_deref());
    if type_name != Some(config.cluster_type.as_str()) {
        return None;
    }
    let persistent_id = record
        .custom_fields
        .get(&config.persistent_id_field)
        .and_then(custom_field_text)
        .filter(|id| !id.trim().is_empty());
    Some(StoreCluster {
        record: RecordRef(record.id),
        name: record.name,
        persistent_id,
    })
}

/// Null custom fields are kept as empty strings so they can be filled in
fn vm_from_record(record: VmRecord, config: &NetboxConfig) -> StoreVm {
    let mut persistent_id = None;
    let mut interface_sync_enabled = false;
    let mut custom_fields = BTreeMap::new();

    for (key, value) in &record.custom_fields {
        if *key == config.persistent_id_field {
            persistent_id = custom_field_text(value).filter(|id| !id.trim().is_empty());
        } else if *key == config.interface_sync_field {
            interface_sync_enabled = value.as_bool().unwrap_or(false);
        } else {
            custom_fields.insert(key.clone(), custom_field_text(value).unwrap_or_default());
        }
    }

    StoreVm {
        record: RecordRef(record.id),
        name: record.name,
        persistent_id,
        cluster: record.cluster.map(|c| RecordRef(c.id)),
        vcpu: record.vcpus.map(|v| v.round() as u32),
        memory_mb: record.memory,
        disk_gb: record.disk,
        comment: record.comments,
        custom_fields,
        interface_sync_enabled,
    }
}

fn interface_from_record(record: InterfaceRecord) -> StoreInterface {
    let mac_address = record
        .mac_address
        .or_else(|| record.primary_mac_address.map(|m| m.mac_address));
    StoreInterface {
        record: RecordRef(record.id),
        vm: RecordRef(record.virtual_machine.id),
        name: record.name,
        mac_address,
        enabled: record.enabled,
    }
}

fn ip_from_record(record: IpRecord) -> StoreIpAddress {
    let interface = match record.assigned_object_type.as_deref() {
        Some(VM_INTERFACE_OBJECT_TYPE) => record.assigned_object_id.map(RecordRef),
        _ => None,
    };
    StoreIpAddress {
        record: RecordRef(record.id),
        address: record.address,
        interface,
    }
}

fn vm_create_body(vm: &NewVm, config: &NetboxConfig) -> Value {
    let mut custom_fields = Map::new();
    for (key, value) in &vm.custom_fields {
        custom_fields.insert(key.clone(), Value::String(value.clone()));
    }
    custom_fields.insert(
        config.persistent_id_field.clone(),
        Value::String(vm.persistent_id.clone()),
    );
    custom_fields.insert(
        config.interface_sync_field.clone(),
        Value::Bool(vm.interface_sync_enabled),
    );

    json!({
        "name": vm.name,
        "cluster": vm.cluster.0,
        "status": "active",
        "vcpus": vm.vcpu,
        "memory": vm.memory_mb,
        "disk": vm.disk_gb,
        "comments": vm.comment,
        "custom_fields": custom_fields,
    })
}

/// Only the changed fields, so concurrent edits elsewhere survive
fn vm_update_body(changes: &VmChanges) -> Value {
    let mut body = Map::new();
    if let Some(vcpu) = changes.vcpu {
        body.insert("vcpus".to_string(), json!(vcpu));
    }
    if let Some(memory) = changes.memory_mb {
        body.insert("memory".to_string(), json!(memory));
    }
    if let Some(disk) = changes.disk_gb {
        body.insert("disk".to_string(), json!(disk));
    }
    if let Some(comment) = &changes.comment {
        body.insert("comments".to_string(), json!(comment));
    }
    if !changes.custom_fields.is_empty() {
        body.insert("custom_fields".to_string(), json!(changes.custom_fields));
    }
    Value::Object(body)
}

/// `mac_address` is only writable on the interface itself before NetBox 4.2
fn interface_create_body(interface: &NewInterface, inline_mac: bool) -> Value {
    let mut body = Map::new();
    body.insert("virtual_machine".to_string(), json!(interface.vm.0));
    body.insert("name".to_string(), json!(interface.name));
    body.insert("enabled".to_string(), json!(interface.enabled));
    if inline_mac {
        body.insert("mac_address".to_string(), json!(interface.mac_address));
    }
    Value::Object(body)
}

fn mac_address_body(mac_address: &str, interface: RecordRef) -> Value {
    json!({
        "mac_address": mac_address,
        "assigned_object_type": VM_INTERFACE_OBJECT_TYPE,
        "assigned_object_id": interface.0,
    })
}

fn interface_update_body(changes: &InterfaceChanges) -> Value {
    let mut body = Map::new();
    if let Some(name) = &changes.name {
        body.insert("name".to_string(), json!(name));
    }
    if let Some(enabled) = changes.enabled {
        body.insert("enabled".to_string(), json!(enabled));
    }
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetboxConfig {
        NetboxConfig::default()
    }

    #[test]
    fn test_api_base() {
        assert_eq!(api_base("https://netbox.example.com"), "https://netbox.example.com/api");
        assert_eq!(api_base("https://netbox.example.com/"), "https://netbox.example.com/api");
        assert_eq!(api_base("https://netbox.example.com/api/"), "https://netbox.example.com/api");
    }

    #[test]
    fn test_cluster_filtered_by_type() {
        let record: ClusterRecord = serde_json::from_value(json!({
            "id": 3,
            "name": "C1",
            "type": { "id": 1, "name": "vSphere" },
            "custom_fields": { "vcenter_persistent_id": "domain-c8" }
        }))
        .unwrap();
        let cluster = cluster_from_record(record.clone(), &config()).unwrap();
        assert_eq!(cluster.persistent_id.as_deref(), Some("domain-c8"));

        let mut other = record;
        other.cluster_type = Some(NestedRecord {
            id: 2,
            name: Some("Proxmox".to_string()),
        });
        assert!(cluster_from_record(other, &config()).is_none());
    }

    #[test]
    fn test_cluster_with_null_persistent_id() {
        let record: ClusterRecord = serde_json::from_value(json!({
            "id": 3,
            "name": "C1",
            "type": { "id": 1, "name": "vSphere" },
            "custom_fields": { "vcenter_persistent_id": null }
        }))
        .unwrap();
        assert_eq!(cluster_from_record(record, &config()).unwrap().persistent_id, None);
    }

    #[test]
    fn test_vm_record_mapping() {
        let record: VmRecord = serde_json::from_value(json!({
            "id": 42,
            "name": "web01",
            "cluster": { "id": 3, "name": "C1" },
            "vcpus": 2.0,
            "memory": 4096,
            "disk": null,
            "comments": "",
            "custom_fields": {
                "vcenter_persistent_id": "5003a1b2",
                "vcenter_sync_interfaces": true,
                "owner": "team-a",
                "backup": null
            }
        }))
        .unwrap();

        let vm = vm_from_record(record, &config());
        assert_eq!(vm.persistent_id.as_deref(), Some("5003a1b2"));
        assert!(vm.interface_sync_enabled);
        assert_eq!(vm.vcpu, Some(2));
        assert_eq!(vm.disk_gb, None);
        assert_eq!(vm.cluster, Some(RecordRef(3)));
        assert_eq!(vm.custom_fields.get("owner").map(String::as_str), Some("team-a"));
        assert_eq!(vm.custom_fields.get("backup").map(String::as_str), Some(""));
        assert!(!vm.custom_fields.contains_key("vcenter_persistent_id"));
    }

    #[test]
    fn test_interface_mac_from_either_field() {
        let legacy: InterfaceRecord = serde_json::from_value(json!({
            "id": 7,
            "virtual_machine": { "id": 42 },
            "name": "Network adapter 1",
            "mac_address": "00:50:56:AA:BB:CC",
            "enabled": false
        }))
        .unwrap();
        let modern: InterfaceRecord = serde_json::from_value(json!({
            "id": 8,
            "virtual_machine": { "id": 42 },
            "name": "Network adapter 2",
            "primary_mac_address": { "id": 1, "mac_address": "00:50:56:AA:BB:CD" }
        }))
        .unwrap();

        let legacy = interface_from_record(legacy);
        assert_eq!(legacy.mac_address.as_deref(), Some("00:50:56:AA:BB:CC"));
        assert!(!legacy.enabled);

        let modern = interface_from_record(modern);
        assert_eq!(modern.mac_address.as_deref(), Some("00:50:56:AA:BB:CD"));
        assert!(modern.enabled);
    }

    #[test]
    fn test_ip_assignment_only_for_vm_interfaces() {
        let vm_ip: IpRecord = serde_json::from_value(json!({
            "id": 1,
            "address": "10.0.0.5/24",
            "assigned_object_type": "virtualization.vminterface",
            "assigned_object_id": 7
        }))
        .unwrap();
        let device_ip: IpRecord = serde_json::from_value(json!({
            "id": 2,
            "address": "10.0.0.6/24",
            "assigned_object_type": "dcim.interface",
            "assigned_object_id": 7
        }))
        .unwrap();

        assert_eq!(ip_from_record(vm_ip).interface, Some(RecordRef(7)));
        assert_eq!(ip_from_record(device_ip).interface, None);
    }

    #[test]
    fn test_vm_update_body_has_only_changed_fields() {
        let mut custom_fields = BTreeMap::new();
        custom_fields.insert("owner".to_string(), "team-b".to_string());
        let body = vm_update_body(&VmChanges {
            disk_gb: Some(80),
            custom_fields,
            ..VmChanges::default()
        });
        assert_eq!(
            body,
            json!({ "disk": 80, "custom_fields": { "owner": "team-b" } })
        );
    }

    #[test]
    fn test_vm_create_body_sets_identity_fields() {
        let body = vm_create_body(
            &NewVm {
                name: "web01".to_string(),
                persistent_id: "5003a1b2".to_string(),
                cluster: RecordRef(3),
                vcpu: 2,
                memory_mb: 4096,
                disk_gb: 40,
                comment: String::new(),
                custom_fields: BTreeMap::new(),
                interface_sync_enabled: true,
            },
            &config(),
        );
        assert_eq!(body["cluster"], json!(3));
        assert_eq!(body["custom_fields"]["vcenter_persistent_id"], json!("5003a1b2"));
        assert_eq!(body["custom_fields"]["vcenter_sync_interfaces"], json!(true));
    }

    fn new_interface() -> NewInterface {
        NewInterface {
            vm: RecordRef(42),
            name: "Network adapter 1".to_string(),
            mac_address: "00:50:56:AA:BB:CC".to_string(),
            enabled: true,
            kind: crate::types::InterfaceKind::Virtual,
        }
    }

    #[test]
    fn test_interface_body_carries_mac_before_4_2() {
        assert_eq!(
            interface_create_body(&new_interface(), true),
            json!({
                "virtual_machine": 42,
                "name": "Network adapter 1",
                "enabled": true,
                "mac_address": "00:50:56:AA:BB:CC"
            })
        );
    }

    #[test]
    fn test_interface_body_omits_mac_with_mac_objects() {
        let body = interface_create_body(&new_interface(), false);
        assert!(body.get("mac_address").is_none());
        assert_eq!(body["virtual_machine"], json!(42));
    }

    #[test]
    fn test_mac_address_body_targets_vm_interface() {
        assert_eq!(
            mac_address_body("00:50:56:AA:BB:CC", RecordRef(7)),
            json!({
                "mac_address": "00:50:56:AA:BB:CC",
                "assigned_object_type": "virtualization.vminterface",
                "assigned_object_id": 7
            })
        );
    }

    #[test]
    fn test_mac_address_objects_by_version() {
        assert!(!has_mac_address_objects("3.7.8"));
        assert!(!has_mac_address_objects("4.1.11"));
        assert!(has_mac_address_objects("4.2.0"));
        assert!(has_mac_address_objects("4.3.2-Docker-3.2.1"));
        assert!(has_mac_address_objects("v4.2-beta1"));
        assert!(has_mac_address_objects("5"));
        assert!(!has_mac_address_objects("unknown"));
    }

    #[test]
    fn test_custom_field_text() {
        assert_eq!(custom_field_text(&Value::Null), None);
        assert_eq!(custom_field_text(&json!(3)).as_deref(), Some("3"));
        assert_eq!(custom_field_text(&json!("x")).as_deref(), Some("x"));
    }
}

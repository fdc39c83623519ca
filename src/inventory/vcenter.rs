//! vCenter REST automation API client implementing [`SourceInventory`].
//!
//! Custom attributes are read from vSphere tags: the tag category is the
//! attribute name and the tag name its value. Templates are not returned by
//! the VM listing endpoint, and annotations are not exposed by it either.

use super::{GuestIp, GuestNicInfo, RawDisk, RawNic, RawVm, SourceInventory};
use crate::config::VcenterConfig;
use crate::types::SourceCluster;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const SESSION_HEADER: &str = "vmware-api-session-id";

#[derive(Debug, Deserialize)]
struct ClusterSummary {
    cluster: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HostSummary {
    host: String,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmIdentity {
    instance_uuid: String,
}

#[derive(Debug, Deserialize)]
struct CpuInfo {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct MemoryInfo {
    #[serde(rename = "size_MiB")]
    size_mib: u64,
}

#[derive(Debug, Deserialize)]
struct DiskInfo {
    #[serde(default)]
    capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NicInfo {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    mac_address: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmInfo {
    name: String,
    #[serde(default)]
    identity: Option<VmIdentity>,
    cpu: CpuInfo,
    memory: MemoryInfo,
    #[serde(default)]
    disks: BTreeMap<String, DiskInfo>,
    #[serde(default)]
    nics: BTreeMap<String, NicInfo>,
    power_state: String,
}

#[derive(Debug, Deserialize)]
struct ToolsInfo {
    run_state: String,
}

#[derive(Debug, Deserialize)]
struct GuestIdentity {
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestIpEntry {
    ip_address: String,
    prefix_length: u8,
}

#[derive(Debug, Default, Deserialize)]
struct GuestIpConfig {
    #[serde(default)]
    ip_addresses: Vec<GuestIpEntry>,
}

#[derive(Debug, Deserialize)]
struct GuestInterface {
    #[serde(default)]
    mac_address: Option<String>,
    #[serde(default)]
    ip: Option<GuestIpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagInfo {
    id: String,
    name: String,
    category_id: String,
}

#[derive(Debug, Deserialize)]
struct CategoryInfo {
    name: String,
}

/// Tag id to (category name, tag name)
type TagCatalog = HashMap<String, (String, String)>;

/// Guest-side facts, only available while VMware Tools runs
#[derive(Debug, Default)]
struct GuestFacts {
    tools_status: Option<String>,
    primary_ip: Option<String>,
    interfaces: Vec<GuestInterface>,
}

/// Client for the vCenter REST automation API
pub struct VcenterClient {
    client: Client,
    api_base: String,
    username: String,
    password: String,
    session: OnceCell<String>,
    tags: OnceCell<TagCatalog>,
}

impl VcenterClient {
    pub fn new(
        hostname: &str,
        username: &str,
        password: &str,
        config: &VcenterConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("Failed to build vCenter HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base(hostname),
            username: username.to_string(),
            password: password.to_string(),
            session: OnceCell::new(),
            tags: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn session_id(&self) -> Result<&str> {
        let id = self
            .session
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(self.url("session"))
                    .basic_auth(&self.username, Some(&self.password))
                    .send()
                    .await
                    .context("Failed to reach vCenter")?;
                let id: String = check(response, "session").await?.json().await?;
                info!(host = %self.api_base, "Logged in to vCenter");
                Ok::<_, anyhow::Error>(id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.header(SESSION_HEADER, self.session_id().await?))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.authed(self.client.get(self.url(path))).await?;
        let response = request.send().await?;
        check(response, path)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to decode vCenter response for {}", path))
    }

    /// Like [`Self::get`], but `None` for guest endpoints that fail while
    /// VMware Tools is not running
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        match self.get(path).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path, "Guest information unavailable: {:#}", e);
                None
            }
        }
    }

    /// End the API session
    pub async fn logout(&self) -> Result<()> {
        let Some(id) = self.session.get() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(self.url("session"))
            .header(SESSION_HEADER, id.as_str())
            .send()
            .await?;
        check(response, "session").await?;
        debug!("Logged out of vCenter");
        Ok(())
    }

    async fn tag_catalog(&self) -> Result<&TagCatalog> {
        self.tags
            .get_or_try_init(|| async {
                let ids: Vec<String> = self.get("cis/tagging/tag").await?;
                let mut categories: HashMap<String, String> = HashMap::new();
                let mut catalog = TagCatalog::new();
                for id in ids {
                    let tag: TagInfo = self.get(&format!("cis/tagging/tag/{}", id)).await?;
                    if !categories.contains_key(&tag.category_id) {
                        let category: CategoryInfo = self
                            .get(&format!("cis/tagging/category/{}", tag.category_id))
                            .await?;
                        categories.insert(tag.category_id.clone(), category.name);
                    }
                    let category = categories
                        .get(&tag.category_id)
                        .cloned()
                        .unwrap_or_default();
                    catalog.insert(tag.id, (category, tag.name));
                }
                debug!(tags = catalog.len(), "Loaded vCenter tag catalog");
                Ok::<_, anyhow::Error>(catalog)
            })
            .await
    }

    async fn attached_tags(&self, vm: &str) -> Result<Vec<String>> {
        let request = self
            .client
            .post(self.url("cis/tagging/tag-association"))
            .query(&[("action", "list-attached-tags")])
            .json(&json!({ "object_id": { "id": vm, "type": "VirtualMachine" } }));
        let response = self.authed(request).await?.send().await?;
        Ok(check(response, "tag-association").await?.json().await?)
    }

    async fn guest_facts(&self, vm: &str) -> GuestFacts {
        let tools: Option<ToolsInfo> = self.get_optional(&format!("vcenter/vm/{}/tools", vm)).await;
        let identity: Option<GuestIdentity> = self
            .get_optional(&format!("vcenter/vm/{}/guest/identity", vm))
            .await;
        let interfaces: Option<Vec<GuestInterface>> = self
            .get_optional(&format!("vcenter/vm/{}/guest/networking/interfaces", vm))
            .await;

        GuestFacts {
            tools_status: tools.map(|t| t.run_state),
            primary_ip: identity.and_then(|i| i.ip_address),
            interfaces: interfaces.unwrap_or_default(),
        }
    }

    async fn load_vm(&self, summary: &VmSummary, host: &str, tags: &TagCatalog) -> Result<RawVm> {
        let info: VmInfo = self
            .get(&format!("vcenter/vm/{}", summary.vm))
            .await
            .with_context(|| format!("Failed to load VM {}", summary.name))?;
        let guest = self.guest_facts(&summary.vm).await;
        let attached = if tags.is_empty() {
            Vec::new()
        } else {
            self.attached_tags(&summary.vm).await?
        };

        Ok(raw_vm_from_parts(&summary.vm, host, info, guest, &attached, tags))
    }
}

#[async_trait]
impl SourceInventory for VcenterClient {
    async fn clusters(&self) -> Result<Vec<SourceCluster>> {
        let summaries: Vec<ClusterSummary> = self.get("vcenter/cluster").await?;
        let mut clusters = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let hosts: Vec<HostSummary> = self
                .get(&format!("vcenter/host?clusters={}", summary.cluster))
                .await?;
            clusters.push(SourceCluster {
                name: summary.name,
                persistent_id: summary.cluster,
                member_host_ids: hosts.into_iter().map(|h| h.host).collect::<BTreeSet<_>>(),
            });
        }
        Ok(clusters)
    }

    async fn custom_attribute_names(&self) -> Result<HashMap<String, String>> {
        let catalog = self.tag_catalog().await?;
        Ok(catalog
            .iter()
            .map(|(id, (category, _))| (id.clone(), category.clone()))
            .collect())
    }

    async fn virtual_machines(&self) -> Result<Vec<RawVm>> {
        let tags = self.tag_catalog().await?;
        let hosts: Vec<HostSummary> = self.get("vcenter/host").await?;
        let mut vms = Vec::new();

        for host in hosts {
            let summaries: Vec<VmSummary> = self
                .get(&format!("vcenter/vm?hosts={}", host.host))
                .await?;
            for summary in summaries {
                match self.load_vm(&summary, &host.host, tags).await {
                    Ok(vm) => vms.push(vm),
                    Err(e) if is_not_found(&e) => {
                        warn!(vm = %summary.name, "VM disappeared while listing, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(vms)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("vCenter request {path} failed: {status} {body}")]
struct RequestError {
    path: String,
    status: StatusCode,
    body: String,
}

async fn check(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(RequestError {
        path: path.to_string(),
        status,
        body,
    }
    .into())
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<RequestError>())
        .any(|e| e.status == StatusCode::NOT_FOUND)
}

fn api_base(hostname: &str) -> String {
    let trimmed = hostname.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    if with_scheme.ends_with("/api") {
        with_scheme
    } else {
        format!("{}/api", with_scheme)
    }
}

fn nic_connected(state: Option<&str>) -> bool {
    matches!(state, Some("CONNECTED"))
}

fn raw_vm_from_parts(
    moid: &str,
    host: &str,
    info: VmInfo,
    guest: GuestFacts,
    attached_tags: &[String],
    tags: &TagCatalog,
) -> RawVm {
    let instance_id = match info.identity {
        Some(identity) => identity.instance_uuid,
        None => moid.to_string(),
    };

    let disks = info
        .disks
        .values()
        .map(|disk| RawDisk {
            capacity_bytes: disk.capacity.unwrap_or(0),
        })
        .collect();

    let nics = info
        .nics
        .iter()
        .map(|(key, nic)| RawNic {
            label: nic
                .label
                .clone()
                .unwrap_or_else(|| format!("Network adapter {}", key)),
            mac_address: nic.mac_address.clone().unwrap_or_default(),
            connected: nic_connected(nic.state.as_deref()),
        })
        .collect();

    let guest_nics = guest
        .interfaces
        .into_iter()
        .filter_map(|iface| {
            let mac_address = iface.mac_address?;
            let addresses = iface
                .ip
                .unwrap_or_default()
                .ip_addresses
                .into_iter()
                .map(|ip| GuestIp {
                    address: ip.ip_address,
                    prefix_length: ip.prefix_length,
                })
                .collect();
            Some(GuestNicInfo {
                mac_address,
                addresses,
            })
        })
        .collect();

    let custom_values = attached_tags
        .iter()
        .filter_map(|id| tags.get(id).map(|(_, name)| (id.clone(), name.clone())))
        .collect();

    RawVm {
        name: info.name,
        instance_id,
        vcpu: info.cpu.count,
        memory_mb: info.memory.size_mib,
        annotation: None,
        is_template: false,
        power_state: info.power_state,
        tools_status: guest.tools_status,
        primary_ip: guest.primary_ip,
        host_id: Some(host.to_string()),
        custom_values,
        disks,
        nics,
        guest_nics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_info() -> VmInfo {
        serde_json::from_value(json!({
            "name": "web01",
            "identity": { "instance_uuid": "5003a1b2-0000", "bios_uuid": "4203", "name": "web01" },
            "cpu": { "count": 2, "cores_per_socket": 1 },
            "memory": { "size_MiB": 4096 },
            "power_state": "POWERED_ON",
            "disks": {
                "2000": { "label": "Hard disk 1", "capacity": 17179869184u64 },
                "2001": { "label": "Hard disk 2" }
            },
            "nics": {
                "4000": {
                    "label": "Network adapter 1",
                    "mac_address": "00:50:56:aa:bb:cc",
                    "state": "CONNECTED"
                },
                "4001": {
                    "label": "Network adapter 2",
                    "mac_address": "00:50:56:aa:bb:cd",
                    "state": "NOT_CONNECTED"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_api_base() {
        assert_eq!(api_base("vc.example.com"), "https://vc.example.com/api");
        assert_eq!(api_base("https://vc.example.com/"), "https://vc.example.com/api");
        assert_eq!(api_base("http://localhost:8989/api"), "http://localhost:8989/api");
    }

    #[test]
    fn test_raw_vm_from_parts() {
        let guest = GuestFacts {
            tools_status: Some("RUNNING".to_string()),
            primary_ip: Some("10.0.0.5".to_string()),
            interfaces: serde_json::from_value(json!([
                {
                    "mac_address": "00:50:56:aa:bb:cc",
                    "ip": { "ip_addresses": [
                        { "ip_address": "10.0.0.5", "prefix_length": 24, "state": "PREFERRED" }
                    ] }
                },
                { "ip": { "ip_addresses": [] } }
            ]))
            .unwrap(),
        };
        let mut tags = TagCatalog::new();
        tags.insert("urn:tag:1".to_string(), ("Owner".to_string(), "team-a".to_string()));

        let vm = raw_vm_from_parts(
            "vm-42",
            "host-10",
            vm_info(),
            guest,
            &["urn:tag:1".to_string(), "urn:tag:unknown".to_string()],
            &tags,
        );

        assert_eq!(vm.instance_id, "5003a1b2-0000");
        assert_eq!(vm.memory_mb, 4096);
        assert_eq!(vm.disks.len(), 2);
        assert_eq!(vm.disks[1].capacity_bytes, 0);
        assert!(vm.nics[0].connected);
        assert!(!vm.nics[1].connected);
        assert_eq!(vm.guest_nics.len(), 1);
        assert_eq!(vm.guest_nics[0].addresses[0].prefix_length, 24);
        assert_eq!(
            vm.custom_values,
            vec![("urn:tag:1".to_string(), "team-a".to_string())]
        );
        assert_eq!(vm.host_id.as_deref(), Some("host-10"));
    }

    #[test]
    fn test_missing_identity_falls_back_to_moid() {
        let mut info = vm_info();
        info.identity = None;
        let vm = raw_vm_from_parts("vm-42", "host-10", info, GuestFacts::default(), &[], &TagCatalog::new());
        assert_eq!(vm.instance_id, "vm-42");
        assert_eq!(vm.tools_status, None);
    }

    #[test]
    fn test_not_found_detection() {
        let error: anyhow::Error = RequestError {
            path: "vcenter/vm/vm-42".to_string(),
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        }
        .into();
        assert!(is_not_found(&error.context("Failed to load VM web01")));
        assert!(!is_not_found(&anyhow::anyhow!("connection reset")));
    }
}

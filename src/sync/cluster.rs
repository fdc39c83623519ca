//! Cluster reconciliation.
//!
//! Clusters are only ever created or flagged. There is no update path, so a
//! cluster renamed in vCenter keeps its old name in NetBox.

use super::decision::{Decision, Subject};
use super::resolver::{find_source_cluster, find_store_cluster};
use crate::types::{NewCluster, SourceCluster, StoreCluster};
use tracing::info;

/// Decide what to do with every cluster on either side.
///
/// Returns orphan marks first, then no-ops for matched clusters, then
/// creates. Every cluster appears in exactly one decision.
pub fn reconcile_clusters(source: &[SourceCluster], store: &[StoreCluster]) -> Vec<Decision> {
    let mut orphans = Vec::new();
    let mut unchanged = Vec::new();
    let mut creates = Vec::new();

    for cluster in store {
        let matched = cluster
            .persistent_id
            .as_deref()
            .and_then(|id| find_source_cluster(source, id));

        match matched {
            Some(source_cluster) => {
                info!(
                    cluster = %cluster.name,
                    persistent_id = %source_cluster.persistent_id,
                    "Cluster exists in vCenter, nothing to do"
                );
                unchanged.push(Decision::NoOp(Subject::Cluster {
                    name: cluster.name.clone(),
                    persistent_id: source_cluster.persistent_id.clone(),
                }));
            }
            None => {
                info!(
                    cluster = %cluster.name,
                    persistent_id = ?cluster.persistent_id,
                    "Cluster does not exist in vCenter, flagging as orphan"
                );
                orphans.push(Decision::MarkClusterOrphan {
                    record: cluster.record,
                    name: cluster.name.clone(),
                });
            }
        }
    }

    for cluster in source {
        if find_store_cluster(store, &cluster.persistent_id).is_none() {
            info!(
                cluster = %cluster.name,
                persistent_id = %cluster.persistent_id,
                "Cluster missing from NetBox, creating"
            );
            creates.push(Decision::CreateCluster(NewCluster {
                name: cluster.name.clone(),
                persistent_id: cluster.persistent_id.clone(),
            }));
        }
    }

    orphans.extend(unchanged);
    orphans.extend(creates);
    orphans
}

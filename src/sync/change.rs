//! Field-level change detection for matched VMs and interfaces.

use crate::normalize::{NormalizedInterface, NormalizedVm};
use crate::types::{InterfaceChanges, VmChanges};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How scalar field differences are collected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Every field is evaluated on its own
    #[default]
    Independent,
    /// Historical chained evaluation: only the first of vcpu, memory and
    /// comment is recorded, disk is evaluated separately. For interfaces the
    /// connected flag is only checked when the name is unchanged.
    Legacy,
}

/// Scalar and custom-field changes needed to bring `store` in line with
/// `source`.
///
/// A blank store comment is never reported, nor is a comment the source did
/// not report. A missing store disk size always counts as changed.
pub fn diff_vm_fields(
    source: &NormalizedVm,
    store: &NormalizedVm,
    policy: ChangeDetection,
) -> VmChanges {
    let mut changes = VmChanges::default();

    let vcpu_changed = source.vcpu.is_some() && source.vcpu != store.vcpu;
    let memory_changed = source.memory_mb.is_some() && source.memory_mb != store.memory_mb;
    let store_comment = store.comment.as_deref().unwrap_or("");
    let comment_changed = match source.comment.as_deref() {
        Some(comment) => !store_comment.is_empty() && comment != store_comment,
        None => false,
    };

    match policy {
        ChangeDetection::Independent => {
            if vcpu_changed {
                changes.vcpu = source.vcpu;
            }
            if memory_changed {
                changes.memory_mb = source.memory_mb;
            }
            if comment_changed {
                changes.comment = source.comment.clone();
            }
        }
        ChangeDetection::Legacy => {
            if vcpu_changed {
                changes.vcpu = source.vcpu;
            } else if memory_changed {
                changes.memory_mb = source.memory_mb;
            } else if comment_changed {
                changes.comment = source.comment.clone();
            }
        }
    }

    if store.disk_gb.is_none() || source.disk_gb != store.disk_gb {
        changes.disk_gb = source.disk_gb;
    }

    changes.custom_fields = diff_custom_fields(&source.custom_fields, &store.custom_fields);
    changes
}

/// Custom fields present on both sides whose values differ, skipping blank
/// source values
pub fn diff_custom_fields(
    source: &BTreeMap<String, String>,
    store: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    source
        .iter()
        .filter(|(key, value)| {
            let value = value.trim();
            match store.get(*key) {
                Some(existing) => !value.is_empty() && existing.trim() != value,
                None => false,
            }
        })
        .map(|(key, value)| (key.clone(), value.trim().to_string()))
        .collect()
}

/// Name and connected-flag changes for a MAC-matched interface pair
pub fn diff_interface_fields(
    source: &NormalizedInterface,
    store: &NormalizedInterface,
    policy: ChangeDetection,
) -> InterfaceChanges {
    let name_changed = source.name != store.name;
    let connected_changed = source.connected != store.connected;

    let mut changes = InterfaceChanges::default();
    if name_changed {
        changes.name = Some(source.name.clone());
    }
    if connected_changed && (policy == ChangeDetection::Independent || !name_changed) {
        changes.enabled = Some(source.connected);
    }
    changes
}

//! Allow-listed custom field mapping between NetBox and vCenter.
//!
//! The table maps a NetBox custom field name to the vCenter custom attribute
//! name that feeds it. It is resolved once per run against the source's
//! attribute-name lookup table, so per-VM projection is a plain id lookup.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One allow-list row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListEntry {
    pub store_field: String,
    pub source_attribute: String,
}

/// Static allow-list loaded from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    entries: Vec<AllowListEntry>,
}

impl AllowList {
    /// Build from a `{store field -> source attribute}` table
    pub fn new(mapping: &BTreeMap<String, String>) -> Self {
        let entries = mapping
            .iter()
            .map(|(store_field, source_attribute)| AllowListEntry {
                store_field: store_field.clone(),
                source_attribute: source_attribute.clone(),
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_store_field(&self, field: &str) -> bool {
        self.entries.iter().any(|e| e.store_field == field)
    }

    /// NetBox field fed by the given vCenter attribute name
    pub fn store_field_for(&self, source_attribute: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.source_attribute == source_attribute)
            .map(|e| e.store_field.as_str())
    }

    /// Resolve against the source's `attribute id -> attribute name` table.
    pub fn resolve(&self, attribute_names: &HashMap<String, String>) -> ResolvedAllowList {
        let mut by_attribute_id = HashMap::new();

        for (attribute_id, attribute_name) in attribute_names {
            if let Some(store_field) = self.store_field_for(attribute_name) {
                by_attribute_id.insert(attribute_id.clone(), store_field.to_string());
            }
        }

        for entry in &self.entries {
            if !attribute_names.values().any(|n| *n == entry.source_attribute) {
                warn!(
                    store_field = %entry.store_field,
                    source_attribute = %entry.source_attribute,
                    "Allow-listed attribute is not defined in vCenter"
                );
            }
        }

        ResolvedAllowList {
            by_attribute_id,
            attribute_names: attribute_names.clone(),
        }
    }

    /// Keep only allow-listed keys of a map already keyed by NetBox field name
    pub fn filter_store_fields(&self, fields: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        fields
            .iter()
            .filter(|(key, _)| self.contains_store_field(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Allow-list bound to one run's attribute-name table
#[derive(Debug, Clone, Default)]
pub struct ResolvedAllowList {
    by_attribute_id: HashMap<String, String>,
    attribute_names: HashMap<String, String>,
}

impl ResolvedAllowList {
    /// Project raw `(attribute id, value)` pairs onto NetBox field names.
    ///
    /// Attributes outside the allow-list are dropped and logged.
    pub fn project(&self, vm_name: &str, values: &[(String, String)]) -> BTreeMap<String, String> {
        let mut projected = BTreeMap::new();

        for (attribute_id, value) in values {
            match self.by_attribute_id.get(attribute_id) {
                Some(store_field) => {
                    projected.insert(store_field.clone(), value.trim().to_string());
                }
                None => {
                    let name = self
                        .attribute_names
                        .get(attribute_id)
                        .map(String::as_str)
                        .unwrap_or("<unknown>");
                    debug!(
                        vm = %vm_name,
                        attribute_id = %attribute_id,
                        attribute = %name,
                        "Ignoring custom attribute outside the allow-list"
                    );
                }
            }
        }

        projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> AllowList {
        let mut mapping = BTreeMap::new();
        mapping.insert("owner".to_string(), "Owner".to_string());
        mapping.insert("backup_policy".to_string(), "Backup".to_string());
        AllowList::new(&mapping)
    }

    fn attribute_names() -> HashMap<String, String> {
        let mut names = HashMap::new();
        names.insert("101".to_string(), "Owner".to_string());
        names.insert("102".to_string(), "Backup".to_string());
        names.insert("103".to_string(), "CreatedBy".to_string());
        names
    }

    #[test]
    fn test_project_keeps_only_allow_listed_attributes() {
        let resolved = allow_list().resolve(&attribute_names());
        let values = vec![
            ("101".to_string(), "  team-a ".to_string()),
            ("103".to_string(), "someone".to_string()),
        ];

        let projected = resolved.project("web01", &values);

        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get("owner").map(String::as_str), Some("team-a"));
    }

    #[test]
    fn test_empty_allow_list_projects_nothing() {
        let resolved = AllowList::default().resolve(&attribute_names());
        let values = vec![("101".to_string(), "team-a".to_string())];
        assert!(resolved.project("web01", &values).is_empty());
    }

    #[test]
    fn test_filter_store_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("owner".to_string(), "team-a".to_string());
        fields.insert("vcenter_persistent_id".to_string(), "vm-1".to_string());

        let filtered = allow_list().filter_store_fields(&fields);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("owner"));
    }

    #[test]
    fn test_store_field_lookup_is_case_sensitive() {
        let list = allow_list();
        assert_eq!(list.store_field_for("Owner"), Some("owner"));
        assert_eq!(list.store_field_for("owner"), None);
    }
}

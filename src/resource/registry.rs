//! Resource Registry - Load resource definitions from JSON
//!
//! Policy API resource trees and Manager API flat resources are described in
//! embedded JSON files and looked up by key from the rest of the crate.

use crate::error::ResourceError;
use crate::nsxt::urls::{render, PathVars};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/policy.json"),
    include_str!("../resources/manager.json"),
];

/// Where a display name is looked up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupApi {
    #[default]
    Policy,
    Manager,
}

/// How a resolved path is written into the request body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// `target = path`
    #[default]
    Set,
    /// append to the `target` array
    Push,
    /// `target = [path]`
    List,
}

/// A reference to another object, given by id or display name
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceDef {
    pub target: String,
    pub id_key: String,
    #[serde(default)]
    pub name_key: Option<String>,
    /// Policy path prefix the id is appended to
    pub path: String,
    #[serde(default)]
    pub lookup: LookupApi,
    /// Collection searched by display name, when it differs from `path`
    #[serde(default)]
    pub lookup_path: Option<String>,
    #[serde(default)]
    pub mode: ReferenceMode,
    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    1
}

/// One node of a Policy API resource tree
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDef {
    /// Name used in execution logs and hierarchy keys
    pub identifier: String,
    /// Wire `resource_type`
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Collection path template
    pub base_path: String,
    /// Key of this node's items inside the parent item (defaults to `identifier`)
    #[serde(default)]
    pub source: Option<String>,
    /// The parent item holds one object rather than a list
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub fixed_id: Option<String>,
    #[serde(default = "default_true")]
    pub deletable: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub references: Vec<ReferenceDef>,
    #[serde(default)]
    pub transforms: Vec<String>,
    #[serde(default)]
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    /// Key under which this node's id is bound for descendants
    pub fn id_key(&self) -> String {
        format!("{}_id", self.identifier)
    }

    pub fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.identifier)
    }

    /// Children by descending priority, ties kept in declaration order
    pub fn ordered_children(&self) -> Vec<&NodeDef> {
        let mut children: Vec<&NodeDef> = self.children.iter().collect();
        children.sort_by_key(|child| Reverse(child.priority));
        children
    }

    pub fn child(&self, identifier: &str) -> Option<&NodeDef> {
        self.children.iter().find(|c| c.identifier == identifier)
    }

    /// Collection path with ancestor ids filled in
    pub fn collection_path(&self, ids: &PathVars) -> Result<String, ResourceError> {
        render(&self.base_path, ids).map_err(|missing| {
            ResourceError::new(
                &self.identifier,
                format!("missing parent id {} for {}", missing, self.base_path),
            )
        })
    }

    /// This node's spec items inside a parent item
    pub fn items<'a>(&self, parent_item: &'a Value) -> Vec<&'a Value> {
        match parent_item.get(self.source_key()) {
            Some(object) if object.as_object().is_some_and(|map| !map.is_empty()) => vec![object],
            Some(Value::Array(items)) if !self.singleton => {
                items.iter().filter(|item| item.is_object()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// A Policy API resource tree
#[derive(Debug, Clone, Deserialize)]
pub struct TreeDef {
    /// Human readable name, e.g. "Tier-0 gateway"
    pub label: String,
    pub root: NodeDef,
}

/// A flat Manager API resource
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerResourceDef {
    pub label: String,
    pub base_path: String,
    /// Extra list query parameters accepted by this collection
    #[serde(default)]
    pub query_params: Vec<String>,
    pub create_fields: Vec<String>,
    pub update_fields: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Body values added on create unless the input sets them
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub trees: HashMap<String, TreeDef>,
    #[serde(default)]
    pub manager: HashMap<String, ManagerResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig::default();

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.trees.extend(partial.trees);
            final_config.manager.extend(partial.manager);
        }

        final_config
    })
}

/// Get a Policy API tree by key
pub fn get_tree(key: &str) -> Option<&'static TreeDef> {
    get_registry().trees.get(key)
}

/// Get a Manager API resource by key
pub fn get_manager_resource(key: &str) -> Option<&'static ManagerResourceDef> {
    get_registry().manager.get(key)
}

/// Sorted tree keys
pub fn get_all_tree_keys() -> Vec<&'static str> {
    let mut keys: Vec<&str> = get_registry().trees.keys().map(|s| s.as_str()).collect();
    keys.sort_unstable();
    keys
}

/// Sorted manager resource keys
pub fn get_all_manager_keys() -> Vec<&'static str> {
    let mut keys: Vec<&str> = get_registry().manager.keys().map(|s| s.as_str()).collect();
    keys.sort_unstable();
    keys
}

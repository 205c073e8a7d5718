//! Execution functions for Policy API trees (Tier-0, Tier-1, segments)

use super::log::ExecutionLog;
use super::walker::{get_hierarchy, WalkOptions, Walker};
use crate::error::ResourceError;
use crate::nsxt::fetcher::{find_by_display_name, list_page, ListParams};
use crate::nsxt::{NsxtClient, NsxtError};
use crate::resource::{get_all_tree_keys, get_tree, NodeDef, TreeDef};
use serde_json::Value;

/// One Policy API tree bound to its registry definition
#[derive(Debug, Clone, Copy)]
pub struct PolicyResource {
    key: &'static str,
    tree: &'static TreeDef,
}

impl PolicyResource {
    /// Look up a tree by key (`tier0`, `tier1`, `segments`)
    pub fn lookup(key: &str) -> Result<Self, ResourceError> {
        let Some(tree) = get_tree(key) else {
            return Err(ResourceError::new(
                key,
                format!(
                    "Unknown policy resource: {} (expected one of {})",
                    key,
                    get_all_tree_keys().join(", ")
                ),
            ));
        };
        Ok(Self {
            key: tree.root.identifier.as_str(),
            tree,
        })
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Human readable name, e.g. "Tier-0 gateway"
    pub fn label(&self) -> &'static str {
        &self.tree.label
    }

    pub fn root(&self) -> &'static NodeDef {
        &self.tree.root
    }

    fn collection_url(&self, client: &NsxtClient) -> String {
        client.policy_url(&self.tree.root.base_path)
    }

    /// One page of the root collection
    pub async fn get(&self, client: &NsxtClient, params: &ListParams) -> Result<Value, NsxtError> {
        list_page(client, &self.collection_url(client), params).await
    }

    /// `{"results": [...]}` of root objects with the given display name
    pub async fn get_by_display_name(
        &self,
        client: &NsxtClient,
        display_name: &str,
    ) -> Result<Value, NsxtError> {
        find_by_display_name(
            client,
            &self.collection_url(client),
            display_name,
            &ListParams::default(),
        )
        .await
    }

    pub async fn create_or_update(
        &self,
        client: &NsxtClient,
        spec: &Value,
        options: WalkOptions,
    ) -> ExecutionLog {
        tracing::info!("create_or_update {}", self.key);
        Walker::new(client, options)
            .create_or_update(&self.tree.root, spec)
            .await
    }

    pub async fn delete(&self, client: &NsxtClient, id: &str) -> ExecutionLog {
        tracing::info!("delete {} {}", self.key, id);
        Walker::new(client, WalkOptions::default())
            .delete(&self.tree.root, id)
            .await
    }

    pub async fn get_hierarchy(&self, client: &NsxtClient, id: &str) -> Result<Value, ResourceError> {
        get_hierarchy(client, &self.tree.root, id).await
    }
}

//! Flat Manager API resources
//!
//! IP pools, IP blocks, transport zones, host-switch (uplink) profiles,
//! edge clusters, compute managers and transport node profiles share one
//! create / update / delete shape; the differences are data in
//! `manager.json`.

pub mod transport_node;

use crate::diff::{fill_missing, has_changes, project_present};
use crate::nsxt::fetcher::{find_by_display_name, list_page, ListParams};
use crate::nsxt::urls::item_path;
use crate::nsxt::{NsxtClient, NsxtError};
use crate::resource::{get_all_manager_keys, get_manager_resource, ManagerResourceDef};
use serde_json::{Map, Value};

/// One Manager API collection bound to its registry definition
#[derive(Debug, Clone, Copy)]
pub struct ManagerResource {
    key: &'static str,
    def: &'static ManagerResourceDef,
}

impl ManagerResource {
    pub fn lookup(key: &str) -> Result<Self, NsxtError> {
        let keys = get_all_manager_keys();
        let Some(&found) = keys.iter().find(|k| **k == key) else {
            return Err(NsxtError::InvalidInput(format!(
                "Unknown manager resource: {} (expected one of {})",
                key,
                keys.join(", ")
            )));
        };
        let def = get_manager_resource(found)
            .ok_or_else(|| NsxtError::InvalidInput(format!("Unknown manager resource: {}", key)))?;
        Ok(Self { key: found, def })
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn label(&self) -> &'static str {
        &self.def.label
    }

    pub fn def(&self) -> &'static ManagerResourceDef {
        self.def
    }

    fn collection_url(&self, client: &NsxtClient) -> String {
        client.manager_url(&self.def.base_path)
    }

    /// Reject query parameters the collection does not accept
    pub fn check_query_params(&self, params: &ListParams) -> Result<(), NsxtError> {
        for (key, _) in &params.extra {
            if !self.def.query_params.iter().any(|allowed| allowed == key) {
                return Err(NsxtError::InvalidInput(format!(
                    "Unsupported query parameter {} for {}",
                    key, self.def.label
                )));
            }
        }
        Ok(())
    }

    /// One page of the collection
    pub async fn get(&self, client: &NsxtClient, params: &ListParams) -> Result<Value, NsxtError> {
        self.check_query_params(params)?;
        list_page(client, &self.collection_url(client), params).await
    }

    pub async fn get_by_id(&self, client: &NsxtClient, id: &str) -> Result<Value, NsxtError> {
        let url = item_path(&self.collection_url(client), id);
        Ok(client.get(&url, &[]).await?.unwrap_or(Value::Null))
    }

    /// `{"results": [...]}` of objects with the given display name
    pub async fn get_by_display_name(
        &self,
        client: &NsxtClient,
        display_name: &str,
        params: &ListParams,
    ) -> Result<Value, NsxtError> {
        self.check_query_params(params)?;
        find_by_display_name(client, &self.collection_url(client), display_name, params).await
    }

    /// Defaults plus the allow-listed create fields of `spec`
    pub fn create_body(&self, spec: &Value) -> Result<Value, NsxtError> {
        for field in &self.def.required_fields {
            if spec.get(field).map_or(true, Value::is_null) {
                return Err(NsxtError::InvalidInput(format!(
                    "required attribute {} not found",
                    field
                )));
            }
        }

        let mut body: Map<String, Value> = self.def.defaults.clone();
        body.extend(project_present(&self.def.create_fields, spec));
        Ok(Value::Object(body))
    }

    pub async fn create(&self, client: &NsxtClient, spec: &Value) -> Result<Value, NsxtError> {
        let body = self.create_body(spec)?;
        tracing::info!("Creating {}", self.def.label);
        Ok(client
            .post(&self.collection_url(client), &body)
            .await?
            .unwrap_or(Value::Null))
    }

    /// The updatable fields set in `spec` differ from `existing` once the
    /// keys the server adds on its own are filled in from `existing`
    pub fn needs_update(&self, existing: &Value, spec: &Value) -> bool {
        let mut desired = Value::Object(project_present(&self.def.update_fields, spec));
        fill_missing(&mut desired, existing);
        has_changes(existing, &desired)
    }

    /// `existing` with the updatable fields of `spec` applied
    pub fn merged_update(&self, existing: &Value, spec: &Value) -> Value {
        let mut body = existing.as_object().cloned().unwrap_or_default();
        body.extend(project_present(&self.def.update_fields, spec));
        Value::Object(body)
    }

    /// PUT `body` with the given id and revision
    pub async fn update(
        &self,
        client: &NsxtClient,
        id: &str,
        revision: i64,
        body: &Value,
    ) -> Result<Value, NsxtError> {
        let mut body = body.as_object().cloned().unwrap_or_default();
        body.insert("id".to_string(), Value::String(id.to_string()));
        body.insert("_revision".to_string(), Value::from(revision));

        tracing::info!("Updating {} {}", self.def.label, id);
        let url = item_path(&self.collection_url(client), id);
        Ok(client
            .put(&url, &Value::Object(body))
            .await?
            .unwrap_or(Value::Null))
    }

    pub async fn delete(&self, client: &NsxtClient, id: &str) -> Result<Value, NsxtError> {
        tracing::info!("Deleting {} {}", self.def.label, id);
        let url = item_path(&self.collection_url(client), id);
        Ok(client
            .delete(&url)
            .await?
            .unwrap_or_else(|| Value::String(format!("{} deleted successfully", self.def.label))))
    }
}

/// `_revision` of a fetched object
pub fn revision_of(object: &Value) -> i64 {
    object.get("_revision").and_then(Value::as_i64).unwrap_or(0)
}

//! Transport nodes
//!
//! Transport nodes reuse the generic Manager API resource for listing and
//! creation. Updates carry the node deployment revision, and request bodies
//! may name profiles, pools and zones by display name.

use super::ManagerResource;
use crate::diff::project_present;
use crate::error::ResourceError;
use crate::nsxt::fetcher::{resolve_id, ListParams};
use crate::nsxt::urls::{
    item_path, MANAGER_HOST_SWITCH_PROFILE_URL, MANAGER_IP_POOL_URL, MANAGER_TRANSPORT_ZONE_URL,
    TRANSPORT_NODE_URL,
};
use crate::nsxt::{NsxtClient, NsxtError};
use serde_json::{json, Map, Value};

const RESOURCE_TYPE: &str = "transport_nodes";

/// Edge VM deployment keys and their wire names
const VM_DEPLOYMENT_RENAMES: &[(&str, &str)] = &[
    ("host", "host_id"),
    ("compute", "compute_id"),
    ("storage", "storage_id"),
    ("management_network", "management_network_id"),
    ("data_networks", "data_network_ids"),
];

pub const MISSING_DEPLOYMENT_REVISION: &str = "Failed to update Transport Node. Either node deployment info is not provided or node deployment revision could not be fetched";

/// Execution functions for `/api/v1/transport-nodes`
#[derive(Debug, Clone, Copy)]
pub struct TransportNodes {
    resource: ManagerResource,
}

impl TransportNodes {
    pub fn new() -> Result<Self, NsxtError> {
        Ok(Self {
            resource: ManagerResource::lookup(RESOURCE_TYPE)?,
        })
    }

    pub fn resource(&self) -> &ManagerResource {
        &self.resource
    }

    pub async fn get(&self, client: &NsxtClient, params: &ListParams) -> Result<Value, NsxtError> {
        self.resource.get(client, params).await
    }

    pub async fn get_by_display_name(
        &self,
        client: &NsxtClient,
        display_name: &str,
    ) -> Result<Value, NsxtError> {
        self.resource
            .get_by_display_name(client, display_name, &ListParams::default())
            .await
    }

    /// Realization state of one node
    pub async fn get_state(&self, client: &NsxtClient, id: &str) -> Result<Value, NsxtError> {
        let url = format!(
            "{}/state",
            item_path(&client.manager_url(TRANSPORT_NODE_URL), id)
        );
        Ok(client.get(&url, &[]).await?.unwrap_or(Value::Null))
    }

    pub async fn create(&self, client: &NsxtClient, body: &Value) -> Result<Value, NsxtError> {
        self.resource.create(client, body).await
    }

    /// Build the update body for `id` at `revision`
    pub fn update_body(
        &self,
        id: &str,
        revision: i64,
        node_deployment_revision: Option<i64>,
        spec: &Value,
    ) -> Result<Value, NsxtError> {
        let mut body = project_present(&self.resource.def().create_fields, spec);

        if let Some(info) = body.get_mut("node_deployment_info") {
            let Some(deployment_revision) = node_deployment_revision else {
                return Err(NsxtError::InvalidInput(MISSING_DEPLOYMENT_REVISION.to_string()));
            };
            if let Value::Object(info) = info {
                info.insert("_revision".to_string(), Value::from(deployment_revision));
                info.insert("external_id".to_string(), Value::String(id.to_string()));
            }
        }

        body.insert("_revision".to_string(), Value::from(revision));
        body.insert("node_id".to_string(), Value::String(id.to_string()));
        Ok(Value::Object(body))
    }

    pub async fn update(
        &self,
        client: &NsxtClient,
        id: &str,
        revision: i64,
        node_deployment_revision: Option<i64>,
        spec: &Value,
    ) -> Result<Value, NsxtError> {
        let body = self.update_body(id, revision, node_deployment_revision, spec)?;
        tracing::info!("Updating transport node {}", id);
        let url = item_path(&client.manager_url(TRANSPORT_NODE_URL), id);
        Ok(client.put(&url, &body).await?.unwrap_or(Value::Null))
    }

    pub async fn delete(&self, client: &NsxtClient, id: &str) -> Result<Value, NsxtError> {
        tracing::info!("Deleting transport node {}", id);
        let url = item_path(&client.manager_url(TRANSPORT_NODE_URL), id);
        Ok(client
            .delete(&url)
            .await?
            .unwrap_or_else(|| json!("Deleted transport node successfully")))
    }
}

/// Resolve display names in a transport node spec to the ids the API expects
pub async fn prepare_body(client: &NsxtClient, spec: &Value) -> Result<Value, ResourceError> {
    let mut body = spec.clone();

    if let Some(switches) = body
        .pointer_mut("/host_switch_spec/host_switches")
        .and_then(Value::as_array_mut)
    {
        for switch in switches.iter_mut() {
            resolve_host_switch(client, switch).await?;
        }
    }

    if let Some(endpoints) = body.get_mut("transport_zone_endpoints") {
        resolve_zone_endpoints(client, endpoints).await?;
    }

    if let Some(Value::Object(config)) =
        body.pointer_mut("/node_deployment_info/deployment_config/vm_deployment_config")
    {
        rename_vm_deployment_keys(config);
    }

    Ok(body)
}

async fn resolve_host_switch(client: &NsxtClient, switch: &mut Value) -> Result<(), ResourceError> {
    let Value::Object(switch) = switch else {
        return Ok(());
    };

    if let Some(profiles) = switch.remove("host_switch_profiles") {
        let url = format!(
            "{}?include_system_owned=true",
            client.manager_url(MANAGER_HOST_SWITCH_PROFILE_URL)
        );
        let mut ids = match switch.remove("host_switch_profile_ids") {
            Some(Value::Array(existing)) => existing,
            _ => Vec::new(),
        };
        for profile in profiles.as_array().into_iter().flatten() {
            let (Some(name), Some(kind)) = (
                profile.get("name").and_then(Value::as_str),
                profile.get("type").and_then(Value::as_str),
            ) else {
                return Err(ResourceError::new(
                    RESOURCE_TYPE,
                    "host_switch_profiles entries need name and type",
                ));
            };
            let id = resolve_id(client, &url, name, RESOURCE_TYPE).await?;
            ids.push(json!({ "key": kind, "value": id }));
        }
        switch.insert("host_switch_profile_ids".to_string(), Value::Array(ids));
    }

    if let Some(Value::Object(ip_spec)) = switch.get_mut("ip_assignment_spec") {
        let is_static_pool =
            ip_spec.get("resource_type").and_then(Value::as_str) == Some("StaticIpPoolSpec");
        if is_static_pool {
            if let Some(Value::String(pool_name)) = ip_spec.remove("ip_pool_name") {
                let url = client.manager_url(MANAGER_IP_POOL_URL);
                let id = resolve_id(client, &url, &pool_name, RESOURCE_TYPE).await?;
                ip_spec.insert("ip_pool_id".to_string(), Value::String(id));
            }
        }
    }

    if let Some(endpoints) = switch.get_mut("transport_zone_endpoints") {
        resolve_zone_endpoints(client, endpoints).await?;
    }
    Ok(())
}

async fn resolve_zone_endpoints(
    client: &NsxtClient,
    endpoints: &mut Value,
) -> Result<(), ResourceError> {
    let url = client.manager_url(MANAGER_TRANSPORT_ZONE_URL);
    for endpoint in endpoints.as_array_mut().into_iter().flatten() {
        let Value::Object(endpoint) = endpoint else {
            continue;
        };
        if let Some(Value::String(name)) = endpoint.remove("transport_zone_name") {
            let id = resolve_id(client, &url, &name, RESOURCE_TYPE).await?;
            endpoint.insert("transport_zone_id".to_string(), Value::String(id));
        }
    }
    Ok(())
}

fn rename_vm_deployment_keys(config: &mut Map<String, Value>) {
    for (from, to) in VM_DEPLOYMENT_RENAMES {
        if let Some(value) = config.remove(*from) {
            config.insert(to.to_string(), value);
        }
    }
}

//! Transform Dispatch
//!
//! Maps transform names from `policy.json` to the code that turns
//! structured references (edge nodes, VRF settings, transport zones, ...)
//! into Policy paths on the request body.

use crate::diff::is_truthy;
use crate::error::ResourceError;
use crate::nsxt::fetcher::resolve_id;
use crate::nsxt::urls::{self, render_with, PathVars, DEFAULT_SITE};
use crate::nsxt::NsxtClient;
use crate::resource::NodeDef;
use serde_json::{Map, Value};

/// Inputs visible to a transform
pub(crate) struct TransformContext<'a> {
    pub client: &'a NsxtClient,
    pub node: &'a NodeDef,
    pub item: &'a Value,
    pub ids: &'a PathVars,
}

impl TransformContext<'_> {
    fn error(&self, message: impl Into<String>) -> ResourceError {
        ResourceError::new(&self.node.identifier, message)
    }

    fn render(&self, template: &str, vars: &[(&str, &str)]) -> Result<String, ResourceError> {
        render_with(template, vars)
            .map_err(|missing| self.error(format!("missing {} for {}", missing, template)))
    }

    /// `<id_key>` from `source`, else `<name_key>` looked up in the collection at `url`
    async fn id_or_lookup(
        &self,
        source: &Value,
        id_key: &str,
        name_key: &str,
        url: &str,
    ) -> Result<Option<String>, ResourceError> {
        if let Some(id) = str_field(source, id_key) {
            return Ok(Some(id.to_string()));
        }
        match str_field(source, name_key) {
            Some(name) => resolve_id(self.client, url, name, &self.node.identifier)
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn site_and_enforcement_point(value: &Value) -> (&str, &str) {
    (
        str_field(value, "site_id").unwrap_or(DEFAULT_SITE),
        str_field(value, "enforcementpoint_id").unwrap_or(DEFAULT_SITE),
    )
}

/// Apply a named transform to the request body
pub(crate) async fn apply_transform(
    name: &str,
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    tracing::debug!("apply_transform: node={}, transform={}", ctx.node.identifier, name);

    match name {
        "vrf_config" => vrf_config(ctx, body),
        "edge_cluster_path" => edge_cluster_path(ctx, body).await,
        "preferred_edge_paths" => preferred_edge_paths(ctx, body).await,
        "ha_vip_configs" => ha_vip_configs(ctx, body).await,
        "edge_path" => edge_path(ctx, body).await,
        "transport_zone_path" => transport_zone_path(ctx, body).await,
        "address_pool_paths" => address_pool_paths(ctx, body).await,
        _ => Err(ctx.error(format!("Unknown transform: {}", name))),
    }
}

// =============================================================================
// Gateways
// =============================================================================

fn vrf_config(ctx: &TransformContext<'_>, body: &mut Map<String, Value>) -> Result<(), ResourceError> {
    let Some(vrf) = ctx.item.get("vrf_config").filter(|v| is_truthy(v)) else {
        return Ok(());
    };
    let Some(tier0_id) = str_field(vrf, "tier0_id") else {
        return Err(ctx.error("Please specify the ID of the Tier 0 in the vrf_config"));
    };

    let mut out = Map::new();
    out.insert(
        "tier0_path".to_string(),
        Value::String(format!("{}/{}", urls::TIER_0_URL, tier0_id)),
    );
    for key in ["evpn_l2_vni_config", "evpn_transit_vni", "route_distinguisher"] {
        if let Some(value) = vrf.get(key).filter(|v| is_truthy(v)) {
            out.insert(key.to_string(), value.clone());
        }
    }
    if let Some(targets) = vrf.get("route_targets") {
        let targets: Vec<Value> = targets
            .as_array()
            .into_iter()
            .flatten()
            .map(|target| {
                let mut target = target.clone();
                if let Value::Object(map) = &mut target {
                    map.insert(
                        "resource_type".to_string(),
                        Value::String("VrfRouteTargets".to_string()),
                    );
                }
                target
            })
            .collect();
        out.insert("route_targets".to_string(), Value::Array(targets));
    }

    body.insert("vrf_config".to_string(), Value::Object(out));
    Ok(())
}

async fn edge_cluster_path(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let Some(info) = ctx.item.get("edge_cluster_info").filter(|v| is_truthy(v)) else {
        return Ok(());
    };
    let (site, enforcement_point) = site_and_enforcement_point(info);
    let base = ctx.render(
        urls::EDGE_CLUSTER_URL,
        &[("site_id", site), ("enforcementpoint_id", enforcement_point)],
    )?;

    let url = ctx.client.policy_url(&base);
    if let Some(id) = ctx
        .id_or_lookup(info, "edge_cluster_id", "edge_cluster_display_name", &url)
        .await?
    {
        body.insert(
            "edge_cluster_path".to_string(),
            Value::String(format!("{}/{}", base, id)),
        );
    }
    Ok(())
}

/// Path of one edge node given by cluster and node id or display name
async fn resolve_edge_node(
    ctx: &TransformContext<'_>,
    info: &Value,
) -> Result<String, ResourceError> {
    let (site, enforcement_point) = site_and_enforcement_point(info);
    let clusters = ctx.render(
        urls::EDGE_CLUSTER_URL,
        &[("site_id", site), ("enforcementpoint_id", enforcement_point)],
    )?;
    let Some(cluster_id) = ctx
        .id_or_lookup(
            info,
            "edge_cluster_id",
            "edge_cluster_display_name",
            &ctx.client.policy_url(&clusters),
        )
        .await?
    else {
        return Err(ctx.error("edge cluster id or display name is required for an edge node"));
    };

    let nodes = ctx.render(
        urls::EDGE_NODE_URL,
        &[
            ("site_id", site),
            ("enforcementpoint_id", enforcement_point),
            ("edge_cluster_id", cluster_id.as_str()),
        ],
    )?;
    let Some(node_id) = ctx
        .id_or_lookup(
            info,
            "edge_node_id",
            "edge_node_display_name",
            &ctx.client.policy_url(&nodes),
        )
        .await?
    else {
        return Err(ctx.error("edge node id or display name is required"));
    };

    Ok(format!("{}/{}", nodes, node_id))
}

async fn preferred_edge_paths(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let Some(infos) = ctx.item.get("preferred_edge_nodes_info").and_then(Value::as_array) else {
        return Ok(());
    };

    let mut paths = Vec::with_capacity(infos.len());
    for info in infos {
        paths.push(Value::String(resolve_edge_node(ctx, info).await?));
    }
    body.insert("preferred_edge_paths".to_string(), Value::Array(paths));
    Ok(())
}

async fn edge_path(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let Some(info) = ctx.item.get("edge_node_info").filter(|v| is_truthy(v)) else {
        return Err(ctx.error("required attribute edge_node_info not found"));
    };
    let path = resolve_edge_node(ctx, info).await?;
    body.insert("edge_path".to_string(), Value::String(path));
    Ok(())
}

async fn ha_vip_configs(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let Some(configs) = ctx.item.get("ha_vip_configs").and_then(Value::as_array) else {
        return Ok(());
    };

    let mut out = Vec::with_capacity(configs.len());
    for config in configs {
        let mut config = config.as_object().cloned().unwrap_or_default();
        let infos = config.remove("external_interface_info").unwrap_or(Value::Null);

        let mut paths = Vec::new();
        for info in infos.as_array().into_iter().flatten() {
            paths.push(Value::String(external_interface_path(ctx, body, info).await?));
        }
        if !paths.is_empty() {
            config.insert("external_interface_paths".to_string(), Value::Array(paths));
        }
        out.push(Value::Object(config));
    }

    body.insert("ha_vip_configs".to_string(), Value::Array(out));
    Ok(())
}

/// An interface given by path, by id on this gateway, or by Tier-0 display names
async fn external_interface_path(
    ctx: &TransformContext<'_>,
    body: &Map<String, Value>,
    info: &Value,
) -> Result<String, ResourceError> {
    if let Some(path) = str_field(info, "external_interface_path") {
        return Ok(path.to_string());
    }

    if let Some(interface_id) = str_field(info, "external_interface_id") {
        let Some(interfaces) = ctx.node.child("interfaces") else {
            return Err(ctx.error("external_interface_id needs an interfaces collection"));
        };
        let mut ids = ctx.ids.clone();
        if let Some(own_id) = body.get("id").and_then(Value::as_str) {
            ids.insert(ctx.node.id_key(), own_id.to_string());
        }
        let collection = interfaces.collection_path(&ids)?;
        return Ok(format!("{}/{}", collection, interface_id));
    }

    let (Some(tier0_name), Some(service_name), Some(interface_name)) = (
        str_field(info, "tier0_display_name"),
        str_field(info, "locale_service_display_name"),
        str_field(info, "interface_display_name"),
    ) else {
        return Err(ctx.error(
            "external_interface_info requires external_interface_path, external_interface_id or tier0, locale service and interface display names",
        ));
    };

    let client = ctx.client;
    let resource_type = ctx.node.identifier.as_str();
    let tier0_id = resolve_id(
        client,
        &client.policy_url(urls::TIER_0_URL),
        tier0_name,
        resource_type,
    )
    .await?;
    let services = ctx.render(urls::TIER_0_LOCALE_SERVICE_URL, &[("tier0_id", tier0_id.as_str())])?;
    let service_id = resolve_id(client, &client.policy_url(&services), service_name, resource_type).await?;
    let interfaces = ctx.render(
        urls::TIER_0_LS_INTERFACE_URL,
        &[("tier0_id", tier0_id.as_str()), ("locale_services_id", service_id.as_str())],
    )?;
    let interface_id =
        resolve_id(client, &client.policy_url(&interfaces), interface_name, resource_type).await?;

    Ok(format!("{}/{}", interfaces, interface_id))
}

// =============================================================================
// Segments
// =============================================================================

async fn transport_zone_path(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let url = ctx.client.manager_url(urls::MANAGER_TRANSPORT_ZONE_URL);
    let Some(zone_id) = ctx
        .id_or_lookup(ctx.item, "transport_zone_id", "transport_zone_display_name", &url)
        .await?
    else {
        return Ok(());
    };

    let (site, enforcement_point) = site_and_enforcement_point(ctx.item);
    let base = ctx.render(
        urls::TRANSPORT_ZONE_URL,
        &[("site_id", site), ("enforcementpoint_id", enforcement_point)],
    )?;
    body.insert(
        "transport_zone_path".to_string(),
        Value::String(format!("{}/{}", base, zone_id)),
    );
    Ok(())
}

async fn address_pool_paths(
    ctx: &TransformContext<'_>,
    body: &mut Map<String, Value>,
) -> Result<(), ResourceError> {
    let Some(advanced) = ctx.item.get("advanced_config").filter(|v| v.is_object()) else {
        return Ok(());
    };

    let url = ctx.client.policy_url(urls::IP_POOL_URL);
    let Some(pool_id) = ctx
        .id_or_lookup(advanced, "address_pool_id", "address_pool_name", &url)
        .await?
    else {
        return Ok(());
    };

    if let Some(Value::Object(config)) = body.get_mut("advanced_config") {
        config.remove("address_pool_id");
        config.remove("address_pool_name");
        config.insert(
            "address_pool_paths".to_string(),
            Value::Array(vec![Value::String(format!("{}/{}", urls::IP_POOL_URL, pool_id))]),
        );
    }
    Ok(())
}

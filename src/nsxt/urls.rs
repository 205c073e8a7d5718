//! Policy and Manager API paths
//!
//! Templates use `{name}` placeholders filled by [`render`].

use std::collections::BTreeMap;

/// Ids collected while descending a resource tree, keyed `<identifier>_id`
pub type PathVars = BTreeMap<String, String>;

pub const TIER_0_URL: &str = "/infra/tier-0s";
pub const TIER_1_URL: &str = "/infra/tier-1s";
pub const SEGMENT_URL: &str = "/infra/segments";
pub const IPV6_NDRA_PROFILE_URL: &str = "/infra/ipv6-ndra-profiles";
pub const IPV6_DAD_PROFILE_URL: &str = "/infra/ipv6-dad-profiles";
pub const DHCP_RELAY_CONFIG_URL: &str = "/infra/dhcp-relay-configs";
pub const BFD_PROFILE_URL: &str = "/infra/bfd-profiles";
pub const IP_POOL_URL: &str = "/infra/ip-pools";
pub const EDGE_CLUSTER_URL: &str =
    "/infra/sites/{site_id}/enforcement-points/{enforcementpoint_id}/edge-clusters";
pub const EDGE_NODE_URL: &str = "/infra/sites/{site_id}/enforcement-points/{enforcementpoint_id}/edge-clusters/{edge_cluster_id}/edge-nodes";
pub const TRANSPORT_ZONE_URL: &str =
    "/infra/sites/{site_id}/enforcement-points/{enforcementpoint_id}/transport-zones";
pub const TIER_0_LOCALE_SERVICE_URL: &str = "/infra/tier-0s/{tier0_id}/locale-services";
pub const TIER_0_LS_INTERFACE_URL: &str =
    "/infra/tier-0s/{tier0_id}/locale-services/{locale_services_id}/interfaces";

// Manager API
pub const MANAGER_TRANSPORT_ZONE_URL: &str = "/transport-zones";
pub const MANAGER_HOST_SWITCH_PROFILE_URL: &str = "/host-switch-profiles";
pub const MANAGER_IP_POOL_URL: &str = "/pools/ip-pools";
pub const TRANSPORT_NODE_URL: &str = "/transport-nodes";

/// Default site and enforcement point
pub const DEFAULT_SITE: &str = "default";

/// Fill `{name}` placeholders; the name of the first unbound placeholder is the error
pub fn render(template: &str, vars: &PathVars) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &rest[start + 1..start + len];
        let value = vars.get(name).ok_or_else(|| name.to_string())?;
        out.push_str(&urlencoding::encode(value));
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// `render` with inline bindings
pub fn render_with(template: &str, vars: &[(&str, &str)]) -> Result<String, String> {
    let vars: PathVars = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    render(template, &vars)
}

/// `<collection>/<id>` with the id percent-encoded
pub fn item_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, urlencoding::encode(id))
}

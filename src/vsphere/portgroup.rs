//! Distributed portgroups

use super::{
    to_changes, FailureCriteria, OutShaping, PortgroupConfig, SecurityPolicy, Teaming,
    VsphereApi, VsphereError,
};
use crate::state::{StateContext, StateResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

const PORTGROUP: &str = "Portgroup";

/// What `get` reports about one portgroup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortgroupSummary {
    pub name: String,
    pub vlan: Option<u32>,
    /// Uplinks of `host_name` on the parent switch
    pub pnic: Vec<String>,
}

/// Desired portgroup settings; unset fields keep the current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortgroupSpec {
    pub description: Option<String>,
    pub num_ports: Option<u32>,
    #[serde(rename = "type")]
    pub portgroup_type: Option<String>,
    pub vlan_id: Option<u32>,
    pub out_shaping: Option<OutShaping>,
    pub security_policy: Option<SecurityPolicy>,
    pub teaming: Option<Teaming>,
}

fn nonzero(value: Option<u64>) -> Option<u64> {
    value.filter(|v| *v > 0)
}

impl OutShaping {
    fn merged_over(&self, base: &OutShaping) -> OutShaping {
        OutShaping {
            average_bandwidth: nonzero(self.average_bandwidth).or(base.average_bandwidth),
            burst_size: nonzero(self.burst_size).or(base.burst_size),
            enabled: self.enabled.or(base.enabled),
            peak_bandwidth: nonzero(self.peak_bandwidth).or(base.peak_bandwidth),
        }
    }
}

impl FailureCriteria {
    fn merged_over(&self, base: &FailureCriteria) -> FailureCriteria {
        FailureCriteria {
            check_beacon: self.check_beacon.or(base.check_beacon),
            check_duplex: self.check_duplex.or(base.check_duplex),
            check_error_percent: self.check_error_percent.or(base.check_error_percent),
            check_speed: self.check_speed.clone().or_else(|| base.check_speed.clone()),
            full_duplex: self.full_duplex.or(base.full_duplex),
            percentage: self.percentage.or(base.percentage),
            speed: self.speed.or(base.speed),
        }
    }
}

impl Teaming {
    fn merged_over(&self, base: &Teaming) -> Teaming {
        let failure_criteria = match (&self.failure_criteria, &base.failure_criteria) {
            (Some(desired), Some(current)) => Some(desired.merged_over(current)),
            (desired, current) => desired.clone().or_else(|| current.clone()),
        };
        Teaming {
            notify_switches: self.notify_switches.or(base.notify_switches),
            policy: self.policy.clone().or_else(|| base.policy.clone()),
            reverse_policy: self.reverse_policy.or(base.reverse_policy),
            rolling_order: self.rolling_order.or(base.rolling_order),
            failure_criteria,
            port_order: self.port_order.clone().or_else(|| base.port_order.clone()),
        }
    }
}

impl PortgroupSpec {
    /// The configuration `name` ends up with once this spec is applied
    pub fn apply(&self, name: &str, current: Option<&PortgroupConfig>) -> PortgroupConfig {
        let mut config = current.cloned().unwrap_or_else(|| PortgroupConfig {
            name: name.to_string(),
            ..Default::default()
        });

        if self.description.is_some() {
            config.description = self.description.clone();
        }
        if self.num_ports.is_some() {
            config.num_ports = self.num_ports;
        }
        if self.portgroup_type.is_some() {
            config.portgroup_type = self.portgroup_type.clone();
        }
        if self.vlan_id.is_some() {
            config.vlan_id = self.vlan_id;
        }
        if let Some(shaping) = &self.out_shaping {
            let base = config.out_shaping.take().unwrap_or_default();
            config.out_shaping = Some(shaping.merged_over(&base));
        }
        if let Some(policy) = &self.security_policy {
            let base = config.security_policy.take().unwrap_or_default();
            config.security_policy = Some(policy.merged_over(&base));
        }
        if let Some(teaming) = &self.teaming {
            let base = config.teaming.take().unwrap_or_default();
            config.teaming = Some(teaming.merged_over(&base));
        }
        config
    }
}

async fn find<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    switch: &str,
    name: &str,
) -> Result<Option<PortgroupConfig>, VsphereError> {
    if api.find_switch(datacenter, switch).await?.is_none() {
        return Err(VsphereError::not_found("Distributed switch", switch));
    }
    Ok(api
        .list_portgroups(datacenter, switch)
        .await?
        .into_iter()
        .find(|pg| pg.name == name))
}

/// Portgroup `portgroup_key` on `switch_name`, `None` when either is missing
pub async fn get<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    switch_name: &str,
    portgroup_key: &str,
    host_name: Option<&str>,
) -> Result<Option<PortgroupSummary>, VsphereError> {
    let Some(switch) = api.find_switch(datacenter, switch_name).await? else {
        return Ok(None);
    };
    let portgroup = api
        .list_portgroups(datacenter, switch_name)
        .await?
        .into_iter()
        .find(|pg| pg.key.as_deref() == Some(portgroup_key));

    Ok(portgroup.map(|pg| {
        let pnic = host_name
            .and_then(|host| switch.hosts.iter().find(|member| member.name == host))
            .map(|member| member.pnics.clone())
            .unwrap_or_default();
        PortgroupSummary {
            name: pg.name,
            vlan: pg.vlan_id,
            pnic,
        }
    }))
}

pub async fn present<A: VsphereApi>(
    api: &A,
    ctx: StateContext,
    name: &str,
    datacenter: &str,
    switch: &str,
    spec: &PortgroupSpec,
) -> StateResult {
    let state = StateResult::new(name);
    let current = match find(api, datacenter, switch, name).await {
        Ok(current) => current,
        Err(e) => return state.fail(format!("Failed to get {} {}: {}", PORTGROUP, name, e)),
    };
    let desired = spec.apply(name, current.as_ref());

    match current {
        None => {
            if ctx.test {
                return state.pending(format!(
                    "{} {} will be created on {}",
                    PORTGROUP, name, switch
                ));
            }
            match api.create_portgroup(datacenter, switch, &desired).await {
                Ok(()) => state
                    .succeed(format!("{} {} created on {}", PORTGROUP, name, switch))
                    .with_changes(json!({}), to_changes(&desired)),
                Err(e) => state.fail(format!("Failed to create {} {}: {}", PORTGROUP, name, e)),
            }
        }
        Some(current) if current == desired => {
            state.succeed(format!("{} {} is already in the desired state", PORTGROUP, name))
        }
        Some(current) => {
            if ctx.test {
                return state.pending(format!("{} {} would be updated", PORTGROUP, name));
            }
            match api.reconfigure_portgroup(datacenter, switch, &desired).await {
                Ok(()) => state
                    .succeed(format!("{} {} updated", PORTGROUP, name))
                    .with_changes(to_changes(&current), to_changes(&desired)),
                Err(e) => state.fail(format!("Failed to update {} {}: {}", PORTGROUP, name, e)),
            }
        }
    }
}

pub async fn absent<A: VsphereApi>(
    api: &A,
    ctx: StateContext,
    name: &str,
    datacenter: &str,
    switch: &str,
) -> StateResult {
    let state = StateResult::new(name);
    let current = match find(api, datacenter, switch, name).await {
        Ok(current) => current,
        Err(VsphereError::NotFound { .. }) => None,
        Err(e) => return state.fail(format!("Failed to get {} {}: {}", PORTGROUP, name, e)),
    };

    let Some(current) = current else {
        return state.succeed(format!("{} {} does not exist", PORTGROUP, name));
    };
    let Some(key) = current.key.as_deref() else {
        return state.fail(format!("{} {} has no key", PORTGROUP, name));
    };

    if ctx.test {
        return state.pending(format!("{} {} will be deleted", PORTGROUP, name));
    }

    match api.destroy_portgroup(datacenter, switch, key).await {
        Ok(()) => state
            .succeed(format!("{} {} deleted", PORTGROUP, name))
            .with_changes(to_changes(&current), json!({})),
        Err(e) => state.fail(format!("Failed to delete {} {}: {}", PORTGROUP, name, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::memory::MemoryVsphere;
    use crate::vsphere::{DvsConfig, DvsHostMember};

    fn switch() -> DvsConfig {
        DvsConfig {
            name: "dvs1".to_string(),
            hosts: vec![DvsHostMember {
                name: "esx1".to_string(),
                pnics: vec!["vmnic1".to_string(), "vmnic2".to_string()],
            }],
            ..Default::default()
        }
    }

    fn portgroup() -> PortgroupConfig {
        PortgroupConfig {
            key: Some("dvportgroup-10".to_string()),
            name: "pg-vlan10".to_string(),
            vlan_id: Some(10),
            security_policy: Some(SecurityPolicy {
                allow_promiscuous: Some(false),
                forged_transmits: Some(false),
                mac_changes: Some(false),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_merges_nested_policies() {
        let spec: PortgroupSpec = serde_json::from_value(json!({
            "vlan_id": 20,
            "security_policy": {"mac_changes": true},
            "out_shaping": {"enabled": true, "average_bandwidth": 0},
            "teaming": {"policy": "loadbalance_srcid", "failure_criteria": {"check_beacon": true}}
        }))
        .unwrap();
        let config = spec.apply("pg-vlan10", Some(&portgroup()));

        assert_eq!(config.key.as_deref(), Some("dvportgroup-10"));
        assert_eq!(config.vlan_id, Some(20));
        assert_eq!(
            config.security_policy,
            Some(SecurityPolicy {
                allow_promiscuous: Some(false),
                forged_transmits: Some(false),
                mac_changes: Some(true),
            })
        );
        assert_eq!(
            config.out_shaping,
            Some(OutShaping {
                enabled: Some(true),
                ..Default::default()
            })
        );
        let teaming = config.teaming.unwrap();
        assert_eq!(teaming.policy.as_deref(), Some("loadbalance_srcid"));
        assert_eq!(teaming.failure_criteria.unwrap().check_beacon, Some(true));
    }

    #[tokio::test]
    async fn test_get_with_host_pnics() {
        let api = MemoryVsphere::default()
            .with_switch(switch())
            .with_portgroup("dvs1", portgroup());
        let summary = get(&api, "dc1", "dvs1", "dvportgroup-10", Some("esx1"))
            .await
            .unwrap();
        assert_eq!(
            summary,
            Some(PortgroupSummary {
                name: "pg-vlan10".to_string(),
                vlan: Some(10),
                pnic: vec!["vmnic1".to_string(), "vmnic2".to_string()],
            })
        );

        let missing = get(&api, "dc1", "dvs1", "dvportgroup-99", None).await.unwrap();
        assert_eq!(missing, None);
        let no_switch = get(&api, "dc1", "dvs9", "dvportgroup-10", None).await.unwrap();
        assert_eq!(no_switch, None);
    }

    #[tokio::test]
    async fn test_present_creates_then_noop() {
        let api = MemoryVsphere::default().with_switch(switch());
        let spec: PortgroupSpec = serde_json::from_value(json!({"vlan_id": 30})).unwrap();

        let created = present(&api, StateContext::default(), "pg-vlan30", "dc1", "dvs1", &spec).await;
        assert_eq!(created.result, Some(true));
        assert_eq!(created.changes["new"]["vlan_id"], json!(30));

        let again = present(&api, StateContext::default(), "pg-vlan30", "dc1", "dvs1", &spec).await;
        assert_eq!(again.comment, "Portgroup pg-vlan30 is already in the desired state");
        assert!(again.changes.is_empty());
        assert_eq!(api.calls(), vec!["create_portgroup pg-vlan30"]);
    }

    #[tokio::test]
    async fn test_present_updates() {
        let api = MemoryVsphere::default()
            .with_switch(switch())
            .with_portgroup("dvs1", portgroup());
        let spec: PortgroupSpec = serde_json::from_value(json!({"vlan_id": 11})).unwrap();
        let result = present(&api, StateContext::default(), "pg-vlan10", "dc1", "dvs1", &spec).await;

        assert_eq!(result.comment, "Portgroup pg-vlan10 updated");
        assert_eq!(result.changes["old"]["vlan_id"], json!(10));
        assert_eq!(result.changes["new"]["vlan_id"], json!(11));
        assert_eq!(api.portgroups("dvs1")[0].vlan_id, Some(11));
    }

    #[tokio::test]
    async fn test_present_missing_switch_fails() {
        let api = MemoryVsphere::default();
        let result = present(
            &api,
            StateContext::default(),
            "pg",
            "dc1",
            "dvs1",
            &PortgroupSpec::default(),
        )
        .await;
        assert_eq!(result.result, Some(false));
        assert!(result.comment.contains("Distributed switch dvs1 not found"));
    }

    #[tokio::test]
    async fn test_absent() {
        let api = MemoryVsphere::default()
            .with_switch(switch())
            .with_portgroup("dvs1", portgroup());

        let dry = absent(&api, StateContext { test: true }, "pg-vlan10", "dc1", "dvs1").await;
        assert_eq!(dry.result, None);

        let result = absent(&api, StateContext::default(), "pg-vlan10", "dc1", "dvs1").await;
        assert_eq!(result.comment, "Portgroup pg-vlan10 deleted");
        assert!(api.portgroups("dvs1").is_empty());

        let gone = absent(&api, StateContext::default(), "pg-vlan10", "dc1", "dvs1").await;
        assert_eq!(gone.comment, "Portgroup pg-vlan10 does not exist");
    }
}

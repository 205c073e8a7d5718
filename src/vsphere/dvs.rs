//! Distributed virtual switches and their host members

use super::{
    to_changes, ContactInfo, DvsConfig, HostFilter, HostSwitchSpec, LinkDiscovery,
    SecurityPolicy, VsphereApi, VsphereError,
};
use crate::state::{StateContext, StateResult};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

const SWITCH: &str = "Distributed switch";

const DEFAULT_UPLINK_PREFIX: &str = "Uplink ";
const DEFAULT_HOST_MTU: u32 = 1500;
const DEFAULT_HOST_PORTS: u32 = 128;

const DISCOVERY_PROTOCOLS: &[&str] = &["cdp", "lldp", "disabled"];
const DISCOVERY_OPERATIONS: &[&str] = &["both", "advertise", "listen"];
const MULTICAST_MODES: &[&str] = &["basic", "snooping"];

/// Desired switch settings; unset fields leave the current value alone
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DvsSpec {
    pub uplink_count: Option<u32>,
    pub uplink_prefix: String,
    pub switch_version: Option<String>,
    pub switch_description: Option<String>,
    pub mtu: Option<u32>,
    /// `cdp`, `lldp` or `disabled`
    pub discovery_protocol: Option<String>,
    /// `both`, `advertise` or `listen`
    pub discovery_operation: Option<String>,
    /// `basic` or `snooping`
    pub multicast_filtering_mode: Option<String>,
    pub contact_name: Option<String>,
    pub contact_description: Option<String>,
    pub network_forged_transmits: Option<bool>,
    pub network_mac_changes: Option<bool>,
    pub network_promiscuous: Option<bool>,
    pub health_check_teaming_failover: Option<bool>,
    pub health_teaming_failover_interval: Option<u32>,
    pub health_vlan_mtu: Option<bool>,
    pub health_vlan_mtu_interval: Option<u32>,
}

impl Default for DvsSpec {
    fn default() -> Self {
        Self {
            uplink_count: None,
            uplink_prefix: DEFAULT_UPLINK_PREFIX.to_string(),
            switch_version: None,
            switch_description: None,
            mtu: None,
            discovery_protocol: None,
            discovery_operation: None,
            multicast_filtering_mode: None,
            contact_name: None,
            contact_description: None,
            network_forged_transmits: None,
            network_mac_changes: None,
            network_promiscuous: None,
            health_check_teaming_failover: None,
            health_teaming_failover_interval: None,
            health_vlan_mtu: None,
            health_vlan_mtu_interval: None,
        }
    }
}

fn check_choice(field: &str, value: &Option<String>, valid: &[&str]) -> Result<(), VsphereError> {
    match value {
        Some(v) if !valid.contains(&v.as_str()) => Err(VsphereError::InvalidInput(format!(
            "Invalid {} '{}', expected one of: {}",
            field,
            v,
            valid.join(", ")
        ))),
        _ => Ok(()),
    }
}

impl DvsSpec {
    pub fn validate(&self) -> Result<(), VsphereError> {
        check_choice("discovery_protocol", &self.discovery_protocol, DISCOVERY_PROTOCOLS)?;
        check_choice("discovery_operation", &self.discovery_operation, DISCOVERY_OPERATIONS)?;
        check_choice(
            "multicast_filtering_mode",
            &self.multicast_filtering_mode,
            MULTICAST_MODES,
        )
    }

    fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            allow_promiscuous: self.network_promiscuous,
            forged_transmits: self.network_forged_transmits,
            mac_changes: self.network_mac_changes,
        }
    }

    /// The full configuration `name` ends up with once this spec is applied
    pub fn apply(&self, name: &str, current: Option<&DvsConfig>) -> DvsConfig {
        let mut config = current.cloned().unwrap_or_else(|| DvsConfig {
            name: name.to_string(),
            ..Default::default()
        });

        if let Some(mtu) = self.mtu.filter(|mtu| *mtu > 0) {
            config.max_mtu = Some(mtu);
        }

        if let Some(count) = self.uplink_count.filter(|count| *count > 0) {
            config.uplink_port_names = (1..=count)
                .map(|i| format!("{}{}", self.uplink_prefix, i))
                .collect();
        }

        if let Some(version) = &self.switch_version {
            config.version = Some(version.clone());
        }

        if let Some(description) = &self.switch_description {
            config.description = Some(description.clone());
        }

        if self.contact_name.is_some() || self.contact_description.is_some() {
            let current = std::mem::take(&mut config.contact);
            config.contact = ContactInfo {
                name: self.contact_name.clone().or(current.name),
                contact: self.contact_description.clone().or(current.contact),
            };
        }

        if self.discovery_protocol.is_some() || self.discovery_operation.is_some() {
            let current = config.link_discovery.take().unwrap_or_default();
            config.link_discovery = Some(if self.discovery_protocol.as_deref() == Some("disabled") {
                LinkDiscovery {
                    protocol: Some("cdp".to_string()),
                    operation: Some("none".to_string()),
                }
            } else {
                LinkDiscovery {
                    protocol: self.discovery_protocol.clone().or(current.protocol),
                    operation: self.discovery_operation.clone().or(current.operation),
                }
            });
        }

        if let Some(mode) = &self.multicast_filtering_mode {
            config.multicast_filtering_mode = Some(match mode.as_str() {
                "basic" => "legacyFiltering".to_string(),
                other => other.to_string(),
            });
        }

        config.security_policy = self.security_policy().merged_over(&config.security_policy);

        let vlan_mtu = &mut config.health_checks.vlan_mtu;
        if let Some(enable) = self.health_vlan_mtu {
            vlan_mtu.enable = enable;
        }
        if let Some(interval) = self.health_vlan_mtu_interval {
            vlan_mtu.interval = interval;
        }
        let teaming = &mut config.health_checks.teaming;
        if let Some(enable) = self.health_check_teaming_failover {
            teaming.enable = enable;
        }
        if let Some(interval) = self.health_teaming_failover_interval {
            teaming.interval = interval;
        }

        config
    }
}

/// Create the switch or bring it in line with `spec`; returns the applied configuration
pub async fn configure<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    name: &str,
    spec: &DvsSpec,
) -> Result<DvsConfig, VsphereError> {
    spec.validate()?;
    let current = api.find_switch(datacenter, name).await?;
    let desired = spec.apply(name, current.as_ref());
    match current {
        None => {
            tracing::info!("Creating distributed switch {}", name);
            api.create_switch(datacenter, &desired).await?;
        }
        Some(current) if current != desired => {
            tracing::info!("Reconfiguring distributed switch {}", name);
            api.reconfigure_switch(datacenter, &desired).await?;
        }
        Some(_) => {}
    }
    Ok(desired)
}

pub async fn present<A: VsphereApi>(
    api: &A,
    ctx: StateContext,
    name: &str,
    datacenter: &str,
    spec: &DvsSpec,
) -> StateResult {
    let state = StateResult::new(name);
    if let Err(e) = spec.validate() {
        return state.fail(e.to_string());
    }

    let current = match api.find_switch(datacenter, name).await {
        Ok(current) => current,
        Err(e) => return state.fail(format!("Failed to get {} {}: {}", SWITCH, name, e)),
    };
    let desired = spec.apply(name, current.as_ref());

    match current {
        None => {
            if ctx.test {
                return state.pending(format!("{} {} will be created", SWITCH, name));
            }
            match api.create_switch(datacenter, &desired).await {
                Ok(()) => state
                    .succeed(format!("{} {} created", SWITCH, name))
                    .with_changes(json!({}), to_changes(&desired)),
                Err(e) => state.fail(format!("Failed to create {} {}: {}", SWITCH, name, e)),
            }
        }
        Some(current) if current == desired => {
            state.succeed(format!("{} {} is already in the desired state", SWITCH, name))
        }
        Some(current) => {
            if ctx.test {
                return state.pending(format!("{} {} would be updated", SWITCH, name));
            }
            match api.reconfigure_switch(datacenter, &desired).await {
                Ok(()) => state
                    .succeed(format!("{} {} updated", SWITCH, name))
                    .with_changes(to_changes(&current), to_changes(&desired)),
                Err(e) => state.fail(format!("Failed to update {} {}: {}", SWITCH, name, e)),
            }
        }
    }
}

pub async fn absent<A: VsphereApi>(
    api: &A,
    ctx: StateContext,
    name: &str,
    datacenter: &str,
) -> StateResult {
    let state = StateResult::new(name);
    let current = match api.find_switch(datacenter, name).await {
        Ok(current) => current,
        Err(e) => return state.fail(format!("Failed to get {} {}: {}", SWITCH, name, e)),
    };

    let Some(current) = current else {
        return state.succeed(format!("{} {} does not exist", SWITCH, name));
    };

    if ctx.test {
        return state.pending(format!("{} {} will be deleted", SWITCH, name));
    }

    match api.destroy_switch(datacenter, name).await {
        Ok(()) => state
            .succeed(format!("{} {} deleted", SWITCH, name))
            .with_changes(to_changes(&current), json!({})),
        Err(e) => state.fail(format!("Failed to delete {} {}: {}", SWITCH, name, e)),
    }
}

// =============================================================================
// Host members
// =============================================================================

/// Overrides for [`update_hosts`]; unset values keep what the host has
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostSwitchUpdate {
    pub nics: Vec<String>,
    pub num_ports: Option<u32>,
    pub mtu: Option<u32>,
}

/// Device name of a physical NIC key (`key-vim.host.PhysicalNic-vmnic1` -> `vmnic1`)
fn pnic_device(key: &str) -> &str {
    key.splitn(4, '-').last().unwrap_or(key)
}

async fn require_switch<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    name: &str,
) -> Result<DvsConfig, VsphereError> {
    api.find_switch(datacenter, name)
        .await?
        .ok_or_else(|| VsphereError::not_found(SWITCH, name))
}

/// Attach the matching hosts to the switch; maps host name to whether it was attached
pub async fn add_hosts<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    switch_name: &str,
    filter: &HostFilter,
    nics: &[String],
) -> Result<BTreeMap<String, bool>, VsphereError> {
    let switch = require_switch(api, datacenter, switch_name).await?;
    let spec = HostSwitchSpec {
        mtu: switch.max_mtu.unwrap_or(DEFAULT_HOST_MTU),
        num_ports: switch.num_ports.unwrap_or(DEFAULT_HOST_PORTS),
        nics: nics.to_vec(),
    };

    let mut ret = BTreeMap::new();
    for host in api.list_hosts(datacenter, filter).await? {
        if !host.manageable {
            ret.insert(host.name, false);
            continue;
        }
        api.add_host_switch(&host.name, switch_name, &spec).await?;
        ret.insert(host.name, true);
    }
    Ok(ret)
}

/// Re-push switch settings to hosts that already carry it
pub async fn update_hosts<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    switch_name: &str,
    filter: &HostFilter,
    update: &HostSwitchUpdate,
) -> Result<BTreeMap<String, bool>, VsphereError> {
    let switch = require_switch(api, datacenter, switch_name).await?;

    let mut ret = BTreeMap::new();
    for host in api.list_hosts(datacenter, filter).await? {
        let mut updated = false;
        if host.manageable {
            for current in host.switches.iter().filter(|s| s.name == switch_name) {
                let nics = if update.nics.is_empty() {
                    current
                        .pnics
                        .iter()
                        .map(|key| pnic_device(key).to_string())
                        .collect()
                } else {
                    update.nics.clone()
                };
                let spec = HostSwitchSpec {
                    mtu: update
                        .mtu
                        .or(current.mtu)
                        .or(switch.max_mtu)
                        .unwrap_or(DEFAULT_HOST_MTU),
                    num_ports: update
                        .num_ports
                        .or(current.num_ports)
                        .or(switch.num_ports)
                        .unwrap_or(DEFAULT_HOST_PORTS),
                    nics,
                };
                api.update_host_switch(&host.name, switch_name, &spec).await?;
                updated = true;
            }
        }
        ret.insert(host.name, updated);
    }
    Ok(ret)
}

/// Detach the switch from the matching hosts
pub async fn remove_hosts<A: VsphereApi>(
    api: &A,
    datacenter: &str,
    switch_name: &str,
    filter: &HostFilter,
) -> Result<BTreeMap<String, bool>, VsphereError> {
    let mut ret = BTreeMap::new();
    for host in api.list_hosts(datacenter, filter).await? {
        let attached = host.manageable && host.switches.iter().any(|s| s.name == switch_name);
        if attached {
            api.remove_host_switch(&host.name, switch_name).await?;
        }
        ret.insert(host.name, attached);
    }
    Ok(ret)
}

//! vSphere distributed switches and portgroups
//!
//! The object-model SDK is reached through [`VsphereApi`]. Everything above
//! the trait is plain data: a desired spec is applied onto the current
//! configuration, and the backend is only called when the result differs.

pub mod dvs;
pub mod portgroup;

#[cfg(test)]
pub(crate) mod memory;

use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VsphereError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{0}")]
    Api(String),

    #[error("{0}")]
    InvalidInput(String),
}

impl VsphereError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

// =============================================================================
// Shared policy types
// =============================================================================

/// Allow/deny flags on a switch or portgroup default port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_promiscuous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forged_transmits: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_changes: Option<bool>,
}

impl SecurityPolicy {
    /// Set flags in `self` win, unset ones keep `base`
    pub fn merged_over(&self, base: &SecurityPolicy) -> SecurityPolicy {
        SecurityPolicy {
            allow_promiscuous: self.allow_promiscuous.or(base.allow_promiscuous),
            forged_transmits: self.forged_transmits.or(base.forged_transmits),
            mac_changes: self.mac_changes.or(base.mac_changes),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SecurityPolicy::default()
    }
}

// =============================================================================
// Distributed switch
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDiscovery {
    pub protocol: Option<String>,
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enable: bool,
    /// Minutes
    pub interval: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChecks {
    pub vlan_mtu: HealthCheckConfig,
    pub teaming: HealthCheckConfig,
}

/// A host attached to a distributed switch and the uplinks it backs it with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsHostMember {
    pub name: String,
    pub pnics: Vec<String>,
}

/// Complete configuration of a distributed switch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsConfig {
    pub name: String,
    pub description: Option<String>,
    pub max_mtu: Option<u32>,
    pub num_ports: Option<u32>,
    pub uplink_port_names: Vec<String>,
    pub version: Option<String>,
    pub contact: ContactInfo,
    pub link_discovery: Option<LinkDiscovery>,
    pub multicast_filtering_mode: Option<String>,
    pub security_policy: SecurityPolicy,
    pub health_checks: HealthChecks,
    pub hosts: Vec<DvsHostMember>,
}

// =============================================================================
// Portgroup
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutShaping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bandwidth: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_bandwidth: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_beacon: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_duplex: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_error_percent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_duplex: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortOrder {
    pub active: Vec<String>,
    pub standby: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Teaming {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_switches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_policy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_criteria: Option<FailureCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_order: Option<PortOrder>,
}

/// Configuration of one distributed portgroup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortgroupConfig {
    /// Server-assigned key, `None` until created
    pub key: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub num_ports: Option<u32>,
    #[serde(rename = "type")]
    pub portgroup_type: Option<String>,
    pub vlan_id: Option<u32>,
    pub out_shaping: Option<OutShaping>,
    pub security_policy: Option<SecurityPolicy>,
    pub teaming: Option<Teaming>,
}

// =============================================================================
// Host network
// =============================================================================

/// Which hosts a host-level operation targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostFilter {
    /// One host; all hosts of the datacenter/cluster when unset
    pub host_name: Option<String>,
    pub cluster_name: Option<String>,
}

/// A switch as a host sees it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSwitch {
    pub name: String,
    pub mtu: Option<u32>,
    pub num_ports: Option<u32>,
    /// Physical NIC keys, e.g. `key-vim.host.PhysicalNic-vmnic1`
    pub pnics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNetwork {
    pub name: String,
    /// `false` when the host exposes no network system
    pub manageable: bool,
    pub switches: Vec<HostSwitch>,
}

/// Switch settings pushed to one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSwitchSpec {
    pub mtu: u32,
    pub num_ports: u32,
    pub nics: Vec<String>,
}

// =============================================================================
// Backend seam
// =============================================================================

/// Operations the vSphere object model provides
///
/// Implementations wait for the vendor task to finish before returning.
pub trait VsphereApi: Send + Sync {
    fn find_switch(
        &self,
        datacenter: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<DvsConfig>, VsphereError>> + Send;

    fn create_switch(
        &self,
        datacenter: &str,
        config: &DvsConfig,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    /// Push `config` (including version and health checks) to the switch named in it
    fn reconfigure_switch(
        &self,
        datacenter: &str,
        config: &DvsConfig,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn destroy_switch(
        &self,
        datacenter: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn list_portgroups(
        &self,
        datacenter: &str,
        switch: &str,
    ) -> impl Future<Output = Result<Vec<PortgroupConfig>, VsphereError>> + Send;

    fn create_portgroup(
        &self,
        datacenter: &str,
        switch: &str,
        config: &PortgroupConfig,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    /// Reconfigure the portgroup identified by `config.key`
    fn reconfigure_portgroup(
        &self,
        datacenter: &str,
        switch: &str,
        config: &PortgroupConfig,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn destroy_portgroup(
        &self,
        datacenter: &str,
        switch: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn list_hosts(
        &self,
        datacenter: &str,
        filter: &HostFilter,
    ) -> impl Future<Output = Result<Vec<HostNetwork>, VsphereError>> + Send;

    fn add_host_switch(
        &self,
        host: &str,
        switch: &str,
        spec: &HostSwitchSpec,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn update_host_switch(
        &self,
        host: &str,
        switch: &str,
        spec: &HostSwitchSpec,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;

    fn remove_host_switch(
        &self,
        host: &str,
        switch: &str,
    ) -> impl Future<Output = Result<(), VsphereError>> + Send;
}

/// `value` as JSON for state changes
pub(crate) fn to_changes<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

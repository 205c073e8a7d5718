//! In-memory [`VsphereApi`] for tests

use super::{
    DvsConfig, HostFilter, HostNetwork, HostSwitch, HostSwitchSpec, PortgroupConfig, VsphereApi,
    VsphereError,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inventory {
    switches: BTreeMap<String, DvsConfig>,
    portgroups: BTreeMap<String, Vec<PortgroupConfig>>,
    hosts: Vec<HostNetwork>,
    host_specs: Vec<(String, HostSwitchSpec)>,
    calls: Vec<String>,
    next_key: u32,
}

/// Records every mutating call in order
#[derive(Debug, Default)]
pub(crate) struct MemoryVsphere {
    inventory: Mutex<Inventory>,
}

impl MemoryVsphere {
    fn inventory(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap()
    }

    pub fn with_switch(self, config: DvsConfig) -> Self {
        self.inventory()
            .switches
            .insert(config.name.clone(), config);
        self
    }

    pub fn with_portgroup(self, switch: &str, mut config: PortgroupConfig) -> Self {
        {
            let mut inventory = self.inventory();
            inventory.next_key += 1;
            config.key.get_or_insert_with(|| format!("dvportgroup-{}", inventory.next_key));
            inventory
                .portgroups
                .entry(switch.to_string())
                .or_default()
                .push(config);
        }
        self
    }

    pub fn with_hosts(self, hosts: Vec<HostNetwork>) -> Self {
        self.inventory().hosts = hosts;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inventory().calls.clone()
    }

    pub fn switch(&self, name: &str) -> Option<DvsConfig> {
        self.inventory().switches.get(name).cloned()
    }

    pub fn portgroups(&self, switch: &str) -> Vec<PortgroupConfig> {
        self.inventory()
            .portgroups
            .get(switch)
            .cloned()
            .unwrap_or_default()
    }

    pub fn host_specs(&self) -> Vec<(String, HostSwitchSpec)> {
        self.inventory().host_specs.clone()
    }
}

impl VsphereApi for MemoryVsphere {
    async fn find_switch(
        &self,
        _datacenter: &str,
        name: &str,
    ) -> Result<Option<DvsConfig>, VsphereError> {
        Ok(self.switch(name))
    }

    async fn create_switch(&self, _datacenter: &str, config: &DvsConfig) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("create_switch {}", config.name));
        inventory.switches.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn reconfigure_switch(
        &self,
        _datacenter: &str,
        config: &DvsConfig,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("reconfigure_switch {}", config.name));
        inventory.switches.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn destroy_switch(&self, _datacenter: &str, name: &str) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("destroy_switch {}", name));
        inventory.portgroups.remove(name);
        inventory
            .switches
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VsphereError::not_found("Distributed switch", name))
    }

    async fn list_portgroups(
        &self,
        _datacenter: &str,
        switch: &str,
    ) -> Result<Vec<PortgroupConfig>, VsphereError> {
        Ok(self.portgroups(switch))
    }

    async fn create_portgroup(
        &self,
        _datacenter: &str,
        switch: &str,
        config: &PortgroupConfig,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("create_portgroup {}", config.name));
        inventory.next_key += 1;
        let mut created = config.clone();
        created.key = Some(format!("dvportgroup-{}", inventory.next_key));
        inventory
            .portgroups
            .entry(switch.to_string())
            .or_default()
            .push(created);
        Ok(())
    }

    async fn reconfigure_portgroup(
        &self,
        _datacenter: &str,
        switch: &str,
        config: &PortgroupConfig,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("reconfigure_portgroup {}", config.name));
        let existing = inventory
            .portgroups
            .get_mut(switch)
            .and_then(|groups| groups.iter_mut().find(|pg| pg.key == config.key))
            .ok_or_else(|| VsphereError::not_found("Portgroup", config.name.clone()))?;
        *existing = config.clone();
        Ok(())
    }

    async fn destroy_portgroup(
        &self,
        _datacenter: &str,
        switch: &str,
        key: &str,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("destroy_portgroup {}", key));
        if let Some(groups) = inventory.portgroups.get_mut(switch) {
            groups.retain(|pg| pg.key.as_deref() != Some(key));
        }
        Ok(())
    }

    async fn list_hosts(
        &self,
        _datacenter: &str,
        filter: &HostFilter,
    ) -> Result<Vec<HostNetwork>, VsphereError> {
        Ok(self
            .inventory()
            .hosts
            .iter()
            .filter(|host| filter.host_name.as_ref().map_or(true, |name| *name == host.name))
            .cloned()
            .collect())
    }

    async fn add_host_switch(
        &self,
        host: &str,
        switch: &str,
        spec: &HostSwitchSpec,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("add_host_switch {} {}", host, switch));
        inventory.host_specs.push((host.to_string(), spec.clone()));
        if let Some(entry) = inventory.hosts.iter_mut().find(|h| h.name == host) {
            entry.switches.push(HostSwitch {
                name: switch.to_string(),
                mtu: Some(spec.mtu),
                num_ports: Some(spec.num_ports),
                pnics: spec.nics.clone(),
            });
        }
        Ok(())
    }

    async fn update_host_switch(
        &self,
        host: &str,
        switch: &str,
        spec: &HostSwitchSpec,
    ) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("update_host_switch {} {}", host, switch));
        inventory.host_specs.push((host.to_string(), spec.clone()));
        Ok(())
    }

    async fn remove_host_switch(&self, host: &str, switch: &str) -> Result<(), VsphereError> {
        let mut inventory = self.inventory();
        inventory.calls.push(format!("remove_host_switch {} {}", host, switch));
        if let Some(entry) = inventory.hosts.iter_mut().find(|h| h.name == host) {
            entry.switches.retain(|s| s.name != switch);
        }
        Ok(())
    }
}

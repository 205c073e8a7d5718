//! Configuration Management
//!
//! Persistent connection profiles for vmstate, plus the merge that turns a
//! profile, command-line overrides and the environment into the settings
//! used to reach an NSX-T manager.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Environment variable holding the NSX-T password
pub const PASSWORD_ENV: &str = "VMSTATE_NSXT_PASSWORD";

/// One saved NSX-T manager connection
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Prefer the environment over storing this on disk
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub cert_common_name: Option<String>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Profile used when none is named on the command line
    #[serde(default)]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectionProfile>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vmstate").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Look up a profile by name, falling back to the default profile
    pub fn profile(&self, name: Option<&str>) -> Option<&ConnectionProfile> {
        let name = name.or(self.default_profile.as_deref())?;
        self.profiles.get(name)
    }

    /// Store a profile and save
    pub fn set_profile(&mut self, name: &str, profile: ConnectionProfile) -> Result<()> {
        self.profiles.insert(name.to_string(), profile);
        if self.default_profile.is_none() {
            self.default_profile = Some(name.to_string());
        }
        self.save()
    }
}

/// Effective settings for talking to one NSX-T manager
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub cert: Option<PathBuf>,
    pub cert_common_name: Option<String>,
    pub verify_ssl: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"***")
            .field("cert", &self.cert)
            .field("cert_common_name", &self.cert_common_name)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl ConnectionConfig {
    /// Merge settings: overrides > environment password > profile > defaults
    pub fn resolve(
        profile: Option<&ConnectionProfile>,
        overrides: &ConnectionProfile,
        env_password: Option<String>,
    ) -> Result<Self> {
        let empty = ConnectionProfile::default();
        let profile = profile.unwrap_or(&empty);

        let Some(hostname) = overrides.hostname.clone().or_else(|| profile.hostname.clone())
        else {
            bail!("NSX-T hostname is required (use --hostname or a profile)");
        };
        let Some(username) = overrides.username.clone().or_else(|| profile.username.clone())
        else {
            bail!("NSX-T username is required (use --username or a profile)");
        };
        let Some(password) = overrides
            .password
            .clone()
            .or(env_password)
            .or_else(|| profile.password.clone())
        else {
            bail!("NSX-T password is required (use --password or {})", PASSWORD_ENV);
        };

        Ok(Self {
            hostname,
            username,
            password,
            cert: overrides.cert.clone().or_else(|| profile.cert.clone()),
            cert_common_name: overrides
                .cert_common_name
                .clone()
                .or_else(|| profile.cert_common_name.clone()),
            verify_ssl: overrides.verify_ssl.or(profile.verify_ssl).unwrap_or(true),
        })
    }
}

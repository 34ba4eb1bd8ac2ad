//! Engine configuration

use osdf_common::{OsdfError, OsdfResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Reactive engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Application id stamped on every rule and intercept
    pub app_id: String,
    /// Match exact IPv4 source/destination hosts
    pub match_ipv4_address: bool,
    /// Match TCP/UDP port pairs
    pub match_tcp_udp_ports: bool,
    /// Match ICMP type and code
    pub match_icmp_fields: bool,
    /// Intra matchers anchor only the destination MAC
    pub match_dst_mac_only: bool,
    /// Add the packet's VLAN id when tagged
    pub match_vlan_id: bool,
    /// Add the packet's IPv4 DSCP
    pub match_ipv4_dscp: bool,
    /// Require a TCP/UDP port to equal the application's well-known port
    pub match_application_port: bool,
    /// Idle timeout of intra-region rules, seconds
    pub intra_idle_timeout: u32,
    /// Idle timeout of inter-region rules, seconds
    pub inter_idle_timeout: u32,
    /// Pipeline table for installed rules
    pub table_id: u32,
    /// Prefix length used to map addresses to regions
    pub region_prefix_len: u8,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            app_id: "org.osdfreactive".into(),
            match_ipv4_address: true,
            match_tcp_udp_ports: true,
            match_icmp_fields: true,
            match_dst_mac_only: false,
            match_vlan_id: false,
            match_ipv4_dscp: false,
            match_application_port: false,
            intra_idle_timeout: 100,
            inter_idle_timeout: 100,
            table_id: 0,
            region_prefix_len: 24,
        }
    }
}

impl ReactiveConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> OsdfResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file, falling back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            warn!("Engine config {} not usable ({}), using defaults", path.display(), e);
            Self::default()
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> OsdfResult<()> {
        if self.region_prefix_len > 32 {
            return Err(OsdfError::ConfigError(format!(
                "region_prefix_len {} exceeds 32",
                self.region_prefix_len
            )));
        }
        if self.app_id.is_empty() {
            return Err(OsdfError::ConfigError("app_id is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReactiveConfig::default();
        assert!(config.match_ipv4_address);
        assert!(config.match_tcp_udp_ports);
        assert!(config.match_icmp_fields);
        assert!(!config.match_vlan_id);
        assert_eq!(config.intra_idle_timeout, 100);
        assert_eq!(config.inter_idle_timeout, 100);
        assert_eq!(config.region_prefix_len, 24);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ReactiveConfig = serde_json::from_str(r#"{"match_vlan_id": true, "table_id": 3}"#).unwrap();
        assert!(config.match_vlan_id);
        assert_eq!(config.table_id, 3);
        assert!(config.match_ipv4_address);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = ReactiveConfig::load_or_default("/nonexistent/osdf/engine.json");
        assert_eq!(config, ReactiveConfig::default());
    }

    #[test]
    fn test_load_rejects_bad_prefix() {
        let path = std::env::temp_dir().join(format!("osdf-engine-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"region_prefix_len": 40}"#).unwrap();
        assert!(matches!(ReactiveConfig::load(&path), Err(OsdfError::ConfigError(_))));
        std::fs::remove_file(&path).ok();
    }
}

//! Region and virtual-gateway configuration
//!
//! Maps local IP prefixes to regions. The whole table is swapped atomically
//! on reload so packet workers never observe a half-applied update.

use arc_swap::ArcSwap;
use ipnetwork::{IpNetwork, Ipv4Network};
use osdf_common::{MacAddress, OsdfResult, RegionId, RegionService};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One locally attached prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPrefixEntry {
    /// Prefix, e.g. `10.0.1.0/24`
    pub prefix: IpNetwork,
    /// Gateway address serving the prefix
    pub gateway_ip: IpAddr,
    /// Region the prefix belongs to
    pub region: RegionId,
}

/// Region configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Local prefixes
    #[serde(default)]
    pub prefixes: Vec<LocalPrefixEntry>,
    /// MAC answered for gateway ARP requests
    #[serde(default)]
    pub virtual_gateway_mac: Option<MacAddress>,
}

impl RegionConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> OsdfResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Network address of `ip` under a `len`-bit mask
pub fn ipv4_prefix(ip: Ipv4Addr, len: u8) -> Option<Ipv4Network> {
    let net = Ipv4Network::new(ip, len).ok()?;
    Ipv4Network::new(net.network(), len).ok()
}

fn normalize(net: IpNetwork) -> IpNetwork {
    match net {
        IpNetwork::V4(v4) => ipv4_prefix(v4.ip(), v4.prefix())
            .map(IpNetwork::V4)
            .unwrap_or(net),
        IpNetwork::V6(v6) => ipnetwork::Ipv6Network::new(v6.network(), v6.prefix())
            .map(IpNetwork::V6)
            .unwrap_or(net),
    }
}

#[derive(Debug, Default)]
struct RegionTable {
    regions_v4: HashMap<Ipv4Network, RegionId>,
    prefixes: Vec<IpNetwork>,
    gateways: HashSet<IpAddr>,
    gateway_mac: Option<MacAddress>,
}

impl RegionTable {
    fn build(config: &RegionConfig) -> Self {
        let mut table = Self {
            gateway_mac: config.virtual_gateway_mac,
            ..Self::default()
        };
        for entry in &config.prefixes {
            let prefix = normalize(entry.prefix);
            if let IpNetwork::V4(v4) = prefix {
                table.regions_v4.insert(v4, entry.region.clone());
            }
            table.prefixes.push(prefix);
            table.gateways.insert(entry.gateway_ip);
        }
        table
    }
}

/// Hot-swappable region lookup
pub struct RegionDirectory {
    table: ArcSwap<RegionTable>,
}

impl RegionDirectory {
    /// Build from a configuration
    pub fn new(config: &RegionConfig) -> Self {
        Self {
            table: ArcSwap::from_pointee(RegionTable::build(config)),
        }
    }

    /// Replace the whole configuration
    pub fn reload(&self, config: &RegionConfig) {
        let table = RegionTable::build(config);
        info!(
            "Region config reloaded: {} prefixes, {} gateways",
            table.prefixes.len(),
            table.gateways.len()
        );
        self.table.store(Arc::new(table));
    }

    /// Region of the configured prefix containing `ip` at `len` bits
    pub fn region_of_ip(&self, ip: Ipv4Addr, len: u8) -> Option<RegionId> {
        self.region_of(&ipv4_prefix(ip, len)?)
    }
}

impl RegionService for RegionDirectory {
    fn region_of(&self, prefix: &Ipv4Network) -> Option<RegionId> {
        let key = ipv4_prefix(prefix.ip(), prefix.prefix())?;
        self.table.load().regions_v4.get(&key).cloned()
    }

    fn is_ip_local(&self, ip: IpAddr) -> bool {
        self.table.load().prefixes.iter().any(|p| p.contains(ip))
    }

    fn is_prefix_local(&self, prefix: &IpNetwork) -> bool {
        let prefix = normalize(*prefix);
        self.table.load().prefixes.contains(&prefix)
    }

    fn is_virtual_gateway_ip(&self, ip: IpAddr) -> bool {
        self.table.load().gateways.contains(&ip)
    }

    fn virtual_gateway_mac(&self) -> Option<MacAddress> {
        self.table.load().gateway_mac
    }
}

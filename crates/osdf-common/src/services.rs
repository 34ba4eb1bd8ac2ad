//! Controller collaborator interfaces
//!
//! The engine only talks to the controller through these traits. Every call
//! is synchronous and infallible from the engine's point of view: backend
//! failures are the backend's concern.

use crate::flow::FlowRule;
use crate::net::{DeviceId, Host, HostId, MacAddress, Path};
use crate::packet::OutboundPacket;
use crate::policy::RegionId;
use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Flow-rule installation backend
pub trait FlowRuleService: Send + Sync {
    /// Install rules
    fn apply_flow_rules(&self, rules: &[FlowRule]);

    /// Remove rules
    fn remove_flow_rules(&self, rules: &[FlowRule]);
}

/// Host tracking
pub trait HostService: Send + Sync {
    /// Host by id
    fn host(&self, id: &HostId) -> Option<Host>;

    /// Hosts bound to an IPv4 address
    fn hosts_by_ip(&self, ip: Ipv4Addr) -> Vec<Host>;

    /// Probe for a host owning `ip`
    fn start_monitoring_ip(&self, ip: Ipv4Addr);
}

/// Topology queries
pub trait TopologyService: Send + Sync {
    /// Shortest candidate paths from `src` to `dst`
    fn paths(&self, src: &DeviceId, dst: &DeviceId) -> Vec<Path>;
}

/// Packet-in interception priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketPriority {
    /// Control traffic
    Control,
    /// Reactive forwarding
    Reactive,
}

impl PacketPriority {
    /// Rule priority of the intercept
    pub const fn value(&self) -> u16 {
        match self {
            Self::Control => 40000,
            Self::Reactive => 5,
        }
    }
}

/// Packet transport
pub trait PacketService: Send + Sync {
    /// Send a frame out of a connect point
    fn emit(&self, packet: OutboundPacket);

    /// Ask for packet-ins of `ether_type`
    fn request_packets(&self, ether_type: u16, priority: PacketPriority, app_id: &str);

    /// Withdraw a packet-in request
    fn cancel_packets(&self, ether_type: u16, priority: PacketPriority, app_id: &str);
}

/// Region and gateway configuration
pub trait RegionService: Send + Sync {
    /// Region of an exactly configured prefix
    fn region_of(&self, prefix: &Ipv4Network) -> Option<RegionId>;

    /// True when some configured prefix contains `ip`
    fn is_ip_local(&self, ip: IpAddr) -> bool;

    /// True when `prefix` is configured exactly
    fn is_prefix_local(&self, prefix: &IpNetwork) -> bool;

    /// True when `ip` is a configured gateway address
    fn is_virtual_gateway_ip(&self, ip: IpAddr) -> bool;

    /// MAC to answer gateway ARP requests with
    fn virtual_gateway_mac(&self) -> Option<MacAddress>;
}

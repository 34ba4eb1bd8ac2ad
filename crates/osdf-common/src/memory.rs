//! In-memory collaborators
//!
//! Stand-ins for the controller services, used by tests and by offline
//! scenario replay.

use crate::flow::{FlowRule, FlowRuleId};
use crate::net::{DeviceId, Host, HostId};
use crate::packet::OutboundPacket;
use crate::services::{FlowRuleService, HostService, PacketPriority, PacketService};
use crate::AtomicCounter;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::Ipv4Addr;

/// Flow-rule backend keeping installed rules in a map
#[derive(Debug, Default)]
pub struct MemoryFlowRuleService {
    rules: DashMap<FlowRuleId, FlowRule>,
    applied: AtomicCounter,
    removed: AtomicCounter,
}

impl MemoryFlowRuleService {
    /// Create empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Every installed rule
    pub fn rules(&self) -> Vec<FlowRule> {
        let mut rules: Vec<FlowRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.device_id.cmp(&b.device_id).then(a.id.cmp(&b.id)));
        rules
    }

    /// Rules installed on one device
    pub fn rules_on(&self, device: &DeviceId) -> Vec<FlowRule> {
        self.rules()
            .into_iter()
            .filter(|r| &r.device_id == device)
            .collect()
    }

    /// True when the rule is installed
    pub fn contains(&self, id: FlowRuleId) -> bool {
        self.rules.contains_key(&id)
    }

    /// Number of installed rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Install calls seen (per rule)
    pub fn applied(&self) -> u64 {
        self.applied.get()
    }

    /// Remove calls seen (per rule)
    pub fn removed(&self) -> u64 {
        self.removed.get()
    }
}

impl FlowRuleService for MemoryFlowRuleService {
    fn apply_flow_rules(&self, rules: &[FlowRule]) {
        for rule in rules {
            self.applied.inc();
            self.rules.insert(rule.id, rule.clone());
        }
    }

    fn remove_flow_rules(&self, rules: &[FlowRule]) {
        for rule in rules {
            self.removed.inc();
            self.rules.remove(&rule.id);
        }
    }
}

/// Host service over a fixed host table
#[derive(Debug, Default)]
pub struct MemoryHostService {
    hosts: DashMap<HostId, Host>,
    monitored: Mutex<Vec<Ipv4Addr>>,
}

impl MemoryHostService {
    /// Create empty host table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a host list
    pub fn with_hosts(hosts: impl IntoIterator<Item = Host>) -> Self {
        let service = Self::new();
        for host in hosts {
            service.add_host(host);
        }
        service
    }

    /// Learn a host
    pub fn add_host(&self, host: Host) {
        self.hosts.insert(host.id, host);
    }

    /// Forget a host
    pub fn remove_host(&self, id: &HostId) -> Option<Host> {
        self.hosts.remove(id).map(|(_, h)| h)
    }

    /// Addresses discovery was requested for, in order
    pub fn monitored_ips(&self) -> Vec<Ipv4Addr> {
        self.monitored.lock().clone()
    }
}

impl HostService for MemoryHostService {
    fn host(&self, id: &HostId) -> Option<Host> {
        self.hosts.get(id).map(|h| h.clone())
    }

    fn hosts_by_ip(&self, ip: Ipv4Addr) -> Vec<Host> {
        self.hosts
            .iter()
            .filter(|h| h.ips.contains(&ip))
            .map(|h| h.value().clone())
            .collect()
    }

    fn start_monitoring_ip(&self, ip: Ipv4Addr) {
        let mut monitored = self.monitored.lock();
        if !monitored.contains(&ip) {
            monitored.push(ip);
        }
    }
}

/// Packet transport that records what it is asked to do
#[derive(Debug, Default)]
pub struct MemoryPacketService {
    emitted: Mutex<Vec<OutboundPacket>>,
    intercepts: DashMap<(u16, PacketPriority), String>,
}

impl MemoryPacketService {
    /// Create empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames emitted so far
    pub fn emitted(&self) -> Vec<OutboundPacket> {
        self.emitted.lock().clone()
    }

    /// True when packet-ins of `ether_type` are requested
    pub fn is_intercepting(&self, ether_type: u16, priority: PacketPriority) -> bool {
        self.intercepts.contains_key(&(ether_type, priority))
    }

    /// Number of active intercepts
    pub fn intercept_count(&self) -> usize {
        self.intercepts.len()
    }
}

impl PacketService for MemoryPacketService {
    fn emit(&self, packet: OutboundPacket) {
        self.emitted.lock().push(packet);
    }

    fn request_packets(&self, ether_type: u16, priority: PacketPriority, app_id: &str) {
        self.intercepts.insert((ether_type, priority), app_id.to_string());
    }

    fn cancel_packets(&self, ether_type: u16, priority: PacketPriority, _app_id: &str) {
        self.intercepts.remove(&(ether_type, priority));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{MatchSpec, Treatment};
    use crate::net::{ConnectPoint, MacAddress, PortNumber};

    #[test]
    fn test_flow_backend_apply_remove() {
        let backend = MemoryFlowRuleService::new();
        let rule = FlowRule::builder(DeviceId::new("of:1"))
            .selector(MatchSpec::new())
            .treatment(Treatment::output(PortNumber(3)))
            .priority(10)
            .build();

        backend.apply_flow_rules(&[rule.clone(), rule.clone()]);
        assert_eq!(backend.rule_count(), 1);
        assert_eq!(backend.applied(), 2);
        assert_eq!(backend.rules_on(&DeviceId::new("of:1")).len(), 1);

        backend.remove_flow_rules(&[rule.clone()]);
        assert!(!backend.contains(rule.id));
        assert_eq!(backend.removed(), 1);
    }

    #[test]
    fn test_hosts_by_ip_and_monitoring() {
        let mac = MacAddress::new([0, 0, 0, 0, 0, 1]);
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let hosts = MemoryHostService::with_hosts([Host::new(mac, vec![ip], ConnectPoint::new("of:1", 1))]);

        assert_eq!(hosts.hosts_by_ip(ip).len(), 1);
        assert!(hosts.host(&HostId::from_mac(mac)).is_some());

        hosts.start_monitoring_ip(Ipv4Addr::new(10, 0, 0, 9));
        hosts.start_monitoring_ip(Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(hosts.monitored_ips(), vec![Ipv4Addr::new(10, 0, 0, 9)]);
    }

    #[test]
    fn test_packet_intercepts() {
        let packets = MemoryPacketService::new();
        packets.request_packets(0x0800, PacketPriority::Reactive, "app");
        assert!(packets.is_intercepting(0x0800, PacketPriority::Reactive));
        packets.cancel_packets(0x0800, PacketPriority::Reactive, "app");
        assert_eq!(packets.intercept_count(), 0);
    }
}

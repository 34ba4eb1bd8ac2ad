//! Device-level forwarding rules
//!
//! A [`FlowRule`] is what the engine hands to the flow-rule backend: a match
//! specification, a treatment and the bookkeeping fields the backend needs
//! to program and later expire the entry.

use crate::net::{DeviceId, MacAddress, PortNumber};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

/// Single match field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Criterion {
    /// Ingress port
    InPort(PortNumber),
    /// Ethernet type
    EthType(u16),
    /// Source MAC
    EthSrc(MacAddress),
    /// Destination MAC
    EthDst(MacAddress),
    /// 802.1Q VLAN id
    VlanId(u16),
    /// IPv4 DSCP
    IpDscp(u8),
    /// IP protocol number
    IpProto(u8),
    /// IPv4 source prefix
    Ipv4Src(Ipv4Network),
    /// IPv4 destination prefix
    Ipv4Dst(Ipv4Network),
    /// TCP source port
    TcpSrc(u16),
    /// TCP destination port
    TcpDst(u16),
    /// UDP source port
    UdpSrc(u16),
    /// UDP destination port
    UdpDst(u16),
    /// ICMPv4 type
    Icmpv4Type(u8),
    /// ICMPv4 code
    Icmpv4Code(u8),
}

/// Traffic selector: conjunction of criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchSpec {
    criteria: Vec<Criterion>,
}

impl MatchSpec {
    /// Empty selector (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion, replacing any earlier one of the same kind
    pub fn with(mut self, criterion: Criterion) -> Self {
        self.add(criterion);
        self
    }

    /// Add a criterion in place, replacing any earlier one of the same kind
    pub fn add(&mut self, criterion: Criterion) {
        let kind = std::mem::discriminant(&criterion);
        self.criteria.retain(|c| std::mem::discriminant(c) != kind);
        self.criteria.push(criterion);
    }

    /// Exact IPv4 host match on source
    pub fn ipv4_src_host(self, ip: Ipv4Addr) -> Self {
        self.with(Criterion::Ipv4Src(host_prefix(ip)))
    }

    /// Exact IPv4 host match on destination
    pub fn ipv4_dst_host(self, ip: Ipv4Addr) -> Self {
        self.with(Criterion::Ipv4Dst(host_prefix(ip)))
    }

    /// All criteria in insertion order
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Look up a criterion by predicate
    pub fn find<F>(&self, pred: F) -> Option<&Criterion>
    where
        F: Fn(&Criterion) -> bool,
    {
        self.criteria.iter().find(|c| pred(c))
    }

    /// True when `criterion` is part of the selector
    pub fn contains(&self, criterion: &Criterion) -> bool {
        self.criteria.contains(criterion)
    }

    /// Number of criteria
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// True for the match-all selector
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

fn host_prefix(ip: Ipv4Addr) -> Ipv4Network {
    // /32 is always a valid prefix length
    Ipv4Network::from(ip)
}

/// Treatment instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Instruction {
    /// Rewrite destination MAC
    SetEthDst(MacAddress),
    /// Forward out a port
    Output(PortNumber),
}

/// Ordered list of instructions
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Treatment {
    instructions: Vec<Instruction>,
}

impl Treatment {
    /// Treatment that only forwards out `port`
    pub fn output(port: PortNumber) -> Self {
        Self {
            instructions: vec![Instruction::Output(port)],
        }
    }

    /// Rewrite the destination MAC, then forward out `port`
    pub fn rewrite_and_output(mac: MacAddress, port: PortNumber) -> Self {
        Self {
            instructions: vec![Instruction::SetEthDst(mac), Instruction::Output(port)],
        }
    }

    /// Instructions in execution order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Output port, if the treatment forwards
    pub fn output_port(&self) -> Option<PortNumber> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::Output(p) => Some(*p),
            _ => None,
        })
    }
}

/// Rule expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum RuleTimeout {
    /// Never expires
    Permanent,
    /// Expires after this many idle seconds
    Idle(u32),
    /// Expires this many seconds after install
    Hard(u32),
}

/// Flow rule identifier, derived from the rule's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowRuleId(pub u64);

impl fmt::Display for FlowRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Forwarding rule destined for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    /// Content-derived id
    pub id: FlowRuleId,
    /// Target device
    pub device_id: DeviceId,
    /// Match
    pub selector: MatchSpec,
    /// Actions
    pub treatment: Treatment,
    /// Rule priority
    pub priority: u16,
    /// Expiry
    pub timeout: RuleTimeout,
    /// Pipeline table
    pub table_id: u32,
    /// Owning application
    pub app_id: String,
}

impl FlowRule {
    /// Start building a rule for `device_id`
    pub fn builder(device_id: DeviceId) -> FlowRuleBuilder {
        FlowRuleBuilder {
            device_id,
            selector: MatchSpec::default(),
            treatment: Treatment::default(),
            priority: 0,
            timeout: RuleTimeout::Permanent,
            table_id: 0,
            app_id: String::new(),
        }
    }
}

/// Builder for [`FlowRule`]
#[derive(Debug, Clone)]
pub struct FlowRuleBuilder {
    device_id: DeviceId,
    selector: MatchSpec,
    treatment: Treatment,
    priority: u16,
    timeout: RuleTimeout,
    table_id: u32,
    app_id: String,
}

impl FlowRuleBuilder {
    /// Set match
    pub fn selector(mut self, selector: MatchSpec) -> Self {
        self.selector = selector;
        self
    }

    /// Set actions
    pub fn treatment(mut self, treatment: Treatment) -> Self {
        self.treatment = treatment;
        self
    }

    /// Set priority
    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// Set expiry
    pub fn timeout(mut self, timeout: RuleTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set table
    pub fn table(mut self, table_id: u32) -> Self {
        self.table_id = table_id;
        self
    }

    /// Set owning application
    pub fn app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Finish, computing the content id
    pub fn build(self) -> FlowRule {
        let mut hasher = DefaultHasher::new();
        self.device_id.hash(&mut hasher);
        self.selector.hash(&mut hasher);
        self.priority.hash(&mut hasher);
        self.table_id.hash(&mut hasher);
        self.app_id.hash(&mut hasher);

        FlowRule {
            id: FlowRuleId(hasher.finish()),
            device_id: self.device_id,
            selector: self.selector,
            treatment: self.treatment,
            priority: self.priority,
            timeout: self.timeout,
            table_id: self.table_id,
            app_id: self.app_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_spec_replaces_same_kind() {
        let spec = MatchSpec::new()
            .with(Criterion::TcpDst(80))
            .with(Criterion::TcpDst(8080))
            .with(Criterion::IpProto(6));
        assert_eq!(spec.len(), 2);
        assert!(spec.contains(&Criterion::TcpDst(8080)));
        assert!(!spec.contains(&Criterion::TcpDst(80)));
    }

    #[test]
    fn test_host_prefix_is_slash_32() {
        let spec = MatchSpec::new().ipv4_src_host(Ipv4Addr::new(10, 0, 0, 1));
        match spec.criteria()[0] {
            Criterion::Ipv4Src(net) => {
                assert_eq!(net.prefix(), 32);
                assert_eq!(net.ip(), Ipv4Addr::new(10, 0, 0, 1));
            }
            other => panic!("unexpected criterion {:?}", other),
        }
    }

    #[test]
    fn test_rule_id_ignores_treatment() {
        let selector = MatchSpec::new().with(Criterion::EthType(0x0800));
        let a = FlowRule::builder(DeviceId::new("of:1"))
            .selector(selector.clone())
            .treatment(Treatment::output(PortNumber(1)))
            .priority(50)
            .build();
        let b = FlowRule::builder(DeviceId::new("of:1"))
            .selector(selector)
            .treatment(Treatment::output(PortNumber(2)))
            .priority(50)
            .build();
        let c = FlowRule::builder(DeviceId::new("of:2")).priority(50).build();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(b.treatment.output_port(), Some(PortNumber(2)));
    }
}

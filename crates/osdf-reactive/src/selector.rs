//! Traffic selector construction
//!
//! A policy's `(transport protocol, application)` pair selects a matcher
//! from a fixed table; pairs without an entry are not actionable. Matchers
//! build the device-level match for one packet, and every build first has
//! to pass the policy's host filter.

use crate::config::ReactiveConfig;
use osdf_common::packet::{ether_type, ip_proto, Ipv4Packet};
use osdf_common::{
    ApplicationType, Criterion, EthernetFrame, HostId, MatchSpec, Policy, Transport,
    TransportProtocol,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Intra-region or inter-region handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Both ends in the same region
    Intra,
    /// Ends in different regions
    Inter,
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intra => f.write_str("intra"),
            Self::Inter => f.write_str("inter"),
        }
    }
}

/// Everything a matcher may look at
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Route class being built for
    pub class: RouteClass,
    /// Packet headers
    pub frame: &'a EthernetFrame,
    /// IPv4 header of the packet
    pub ip: &'a Ipv4Packet,
    /// Governing policy
    pub policy: &'a Policy,
    /// Engine switches
    pub config: &'a ReactiveConfig,
}

type Matcher = fn(&MatchContext<'_>) -> Option<MatchSpec>;

/// Builds per-packet match specifications for policies
pub struct SelectorBuilder {
    config: Arc<ReactiveConfig>,
    matchers: HashMap<(RouteClass, TransportProtocol, ApplicationType), Matcher>,
}

impl SelectorBuilder {
    /// Create with the standard matcher table
    pub fn new(config: Arc<ReactiveConfig>) -> Self {
        use ApplicationType::*;
        use RouteClass::*;
        use TransportProtocol::*;

        let mut matchers: HashMap<_, Matcher> = HashMap::new();
        matchers.insert((Intra, TcpV4, Web), http);
        matchers.insert((Intra, UdpV4, Voip), voip);
        matchers.insert((Intra, IcmpV4, Ping), icmp);
        matchers.insert((Intra, TcpV4, VideoStreaming), video_streaming);
        matchers.insert((Inter, TcpV4, Web), http);
        matchers.insert((Inter, IcmpV4, Ping), icmp);
        matchers.insert((Inter, TcpV4, VideoStreaming), video_streaming);

        Self { config, matchers }
    }

    /// True when the policy's profile has a matcher for `class`
    pub fn supports(&self, class: RouteClass, policy: &Policy) -> bool {
        self.matchers.contains_key(&Self::key(class, policy))
    }

    fn key(class: RouteClass, policy: &Policy) -> (RouteClass, TransportProtocol, ApplicationType) {
        let profile = policy.traffic_profile();
        (class, profile.protocol(), profile.application())
    }

    /// Build the match for `frame` under `policy`
    ///
    /// `dst_host` is the host the packet is really destined to: the frame's
    /// destination MAC for intra-region traffic, the host resolved by IP for
    /// inter-region traffic (which may arrive addressed to a gateway).
    pub fn build(
        &self,
        class: RouteClass,
        frame: &EthernetFrame,
        policy: &Policy,
        dst_host: HostId,
    ) -> Option<MatchSpec> {
        let matcher = self.matchers.get(&Self::key(class, policy))?;
        let ip = frame.ipv4()?;

        let src_host = HostId::from_mac(frame.src_mac);
        if !host_filter_allows(policy, &src_host, &dst_host) {
            trace!("Policy {} host filter rejects {} -> {}", policy.id(), src_host, dst_host);
            return None;
        }

        let ctx = MatchContext {
            class,
            frame,
            ip,
            policy,
            config: &self.config,
        };
        matcher(&ctx)
    }
}

/// Host-list gate
///
/// Empty lists on both sides allow everything. Otherwise the pair must sit
/// in the lists in either orientation, or, when one list is empty, one of
/// the hosts must appear in the other list.
pub fn host_filter_allows(policy: &Policy, src: &HostId, dst: &HostId) -> bool {
    let src_list = policy.src_hosts();
    let dst_list = policy.dst_hosts();
    match (src_list.is_empty(), dst_list.is_empty()) {
        (true, true) => true,
        (false, false) => {
            (src_list.contains(src) && dst_list.contains(dst))
                || (src_list.contains(dst) && dst_list.contains(src))
        }
        (true, false) => dst_list.contains(dst) || dst_list.contains(src),
        (false, true) => src_list.contains(src) || src_list.contains(dst),
    }
}

/// Ethertype, addresses, MAC anchoring and optional VLAN/DSCP
fn base(ctx: &MatchContext<'_>, protocol: u8) -> Option<MatchSpec> {
    if ctx.frame.ether_type != ether_type::IPV4 || ctx.ip.protocol != protocol {
        return None;
    }

    let mut spec = MatchSpec::new().with(Criterion::EthType(ether_type::IPV4));
    if ctx.config.match_ipv4_address {
        spec = spec.ipv4_src_host(ctx.ip.src).ipv4_dst_host(ctx.ip.dst);
        if ctx.class == RouteClass::Intra {
            if !ctx.config.match_dst_mac_only {
                spec.add(Criterion::EthSrc(ctx.frame.src_mac));
            }
            spec.add(Criterion::EthDst(ctx.frame.dst_mac));
        }
    }
    if ctx.config.match_vlan_id {
        if let Some(vlan) = ctx.frame.vlan {
            spec.add(Criterion::VlanId(vlan));
        }
    }
    if ctx.config.match_ipv4_dscp {
        spec.add(Criterion::IpDscp(ctx.ip.dscp));
    }
    Some(spec)
}

fn application_port_ok(ctx: &MatchContext<'_>, src_port: u16, dst_port: u16) -> bool {
    if !ctx.config.match_application_port {
        return true;
    }
    let port = ctx.policy.traffic_profile().port();
    src_port == port || dst_port == port
}

fn tcp(ctx: &MatchContext<'_>) -> Option<MatchSpec> {
    let mut spec = base(ctx, ip_proto::TCP)?;
    let Transport::Tcp { src_port, dst_port } = ctx.ip.transport else {
        return None;
    };
    if !application_port_ok(ctx, src_port, dst_port) {
        return None;
    }
    if ctx.config.match_tcp_udp_ports {
        spec.add(Criterion::IpProto(ip_proto::TCP));
        spec.add(Criterion::TcpSrc(src_port));
        spec.add(Criterion::TcpDst(dst_port));
    }
    Some(spec)
}

fn http(ctx: &MatchContext<'_>) -> Option<MatchSpec> {
    tcp(ctx)
}

fn video_streaming(ctx: &MatchContext<'_>) -> Option<MatchSpec> {
    tcp(ctx)
}

fn voip(ctx: &MatchContext<'_>) -> Option<MatchSpec> {
    let mut spec = base(ctx, ip_proto::UDP)?;
    let Transport::Udp { src_port, dst_port } = ctx.ip.transport else {
        return None;
    };
    if !application_port_ok(ctx, src_port, dst_port) {
        return None;
    }
    if ctx.config.match_tcp_udp_ports {
        spec.add(Criterion::IpProto(ip_proto::UDP));
        spec.add(Criterion::UdpSrc(src_port));
        spec.add(Criterion::UdpDst(dst_port));
    }
    Some(spec)
}

fn icmp(ctx: &MatchContext<'_>) -> Option<MatchSpec> {
    let mut spec = base(ctx, ip_proto::ICMP)?;
    let Transport::Icmp { icmp_type, code } = ctx.ip.transport else {
        return None;
    };
    if ctx.config.match_icmp_fields {
        spec.add(Criterion::IpProto(ip_proto::ICMP));
        spec.add(Criterion::Icmpv4Type(icmp_type));
        spec.add(Criterion::Icmpv4Code(code));
    }
    Some(spec)
}

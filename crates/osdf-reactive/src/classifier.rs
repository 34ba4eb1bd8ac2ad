//! Packet classification and policy dispatch
//!
//! Every inbound packet walks the same guard sequence and stops at the first
//! guard that applies:
//!
//! ```text
//! no frame ──► Unparsed
//! LLDP/BSN ──► Control
//! ARP ───────► VirtualGatewayResponder ──► ArpHandled
//! not IPv4 ──► NotIpv4
//! region?  ──► UnknownRegion
//! policies ──► NoMatch | Routed { matched, installed }
//! ```
//!
//! All current policies are considered, and every one whose action and
//! region pair match is executed. Priority only becomes the rule priority.

use crate::config::ReactiveConfig;
use crate::gateway::{GatewayReply, VirtualGatewayResponder};
use crate::region::ipv4_prefix;
use crate::route::{RouteAction, RouteOutcome};
use crate::selector::RouteClass;
use osdf_common::packet::ether_type;
use osdf_common::{AtomicCounter, InboundPacket, Policy, PolicyAction, RegionId, RegionService};
use osdf_policy::PolicyStore;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Terminal state of one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// No Ethernet frame could be decoded
    Unparsed,
    /// Discovery traffic
    Control,
    /// Handed to the gateway responder
    ArpHandled {
        /// What the responder did
        reply: GatewayReply,
    },
    /// Neither ARP nor IPv4
    NotIpv4,
    /// Source or destination prefix has no region
    UnknownRegion,
    /// No policy applies
    NoMatch,
    /// At least one policy applied
    Routed {
        /// Policies executed
        matched: usize,
        /// Rules installed across them
        installed: usize,
    },
}

/// Route class dispatched to for a policy action
pub fn route_class(action: PolicyAction) -> RouteClass {
    match action {
        PolicyAction::IntraRoute => RouteClass::Intra,
        PolicyAction::InterRoute => RouteClass::Inter,
    }
}

/// Region test for a policy against a packet's resolved regions
///
/// Intra requires the exact pair; inter accepts either direction.
pub fn region_match(class: RouteClass, policy: &Policy, src: &RegionId, dst: &RegionId) -> bool {
    let forward = policy.src_region() == src && policy.dst_region() == dst;
    match class {
        RouteClass::Intra => forward,
        RouteClass::Inter => forward || (policy.src_region() == dst && policy.dst_region() == src),
    }
}

/// Classifier counters
#[derive(Debug, Default)]
pub(crate) struct ClassifierCounters {
    pub packets: AtomicCounter,
    pub control: AtomicCounter,
    pub not_ipv4: AtomicCounter,
    pub unknown_region: AtomicCounter,
    pub policy_matches: AtomicCounter,
    pub rules_installed: AtomicCounter,
    pub hosts_unknown: AtomicCounter,
    pub selectors_rejected: AtomicCounter,
    pub path_fallbacks: AtomicCounter,
}

/// Classifies packets and runs the matching route actions
pub struct PacketClassifier {
    config: Arc<ReactiveConfig>,
    store: Arc<PolicyStore>,
    regions: Arc<dyn RegionService>,
    gateway: VirtualGatewayResponder,
    actions: Vec<Box<dyn RouteAction>>,
    pub(crate) counters: ClassifierCounters,
}

impl PacketClassifier {
    /// Create classifier
    pub fn new(
        config: Arc<ReactiveConfig>,
        store: Arc<PolicyStore>,
        regions: Arc<dyn RegionService>,
        gateway: VirtualGatewayResponder,
        actions: Vec<Box<dyn RouteAction>>,
    ) -> Self {
        Self {
            config,
            store,
            regions,
            gateway,
            actions,
            counters: ClassifierCounters::default(),
        }
    }

    /// Gateway responder
    pub fn gateway(&self) -> &VirtualGatewayResponder {
        &self.gateway
    }

    fn region_of(&self, ip: Ipv4Addr) -> Option<RegionId> {
        self.regions.region_of(&ipv4_prefix(ip, self.config.region_prefix_len)?)
    }

    /// Classify one packet and execute every matching policy
    pub fn classify(&self, pkt: &InboundPacket) -> Disposition {
        self.counters.packets.inc();

        let Some(frame) = pkt.frame.as_ref() else {
            return Disposition::Unparsed;
        };
        if frame.is_control() {
            self.counters.control.inc();
            return Disposition::Control;
        }
        if frame.ether_type == ether_type::ARP {
            return match frame.arp() {
                Some(arp) => Disposition::ArpHandled {
                    reply: self.gateway.handle(&pkt.receiver, frame, arp),
                },
                None => Disposition::Unparsed,
            };
        }
        let Some(ip) = frame.ipv4() else {
            self.counters.not_ipv4.inc();
            return Disposition::NotIpv4;
        };

        let (Some(src_region), Some(dst_region)) = (self.region_of(ip.src), self.region_of(ip.dst)) else {
            trace!("No region for {} -> {}", ip.src, ip.dst);
            self.counters.unknown_region.inc();
            return Disposition::UnknownRegion;
        };

        let mut matched = 0;
        let mut installed = 0;
        for policy in self.store.current_policies() {
            let class = route_class(policy.action());
            if !region_match(class, &policy, &src_region, &dst_region) {
                continue;
            }
            let Some(action) = self.actions.iter().find(|a| a.class() == class) else {
                continue;
            };

            matched += 1;
            let outcome = action.execute(&policy, frame);
            trace!("Policy {} on {} -> {}: {:?}", policy.id(), ip.src, ip.dst, outcome);
            installed += self.record(outcome);
        }

        if matched == 0 {
            return Disposition::NoMatch;
        }
        self.counters.policy_matches.add(matched as u64);
        debug!(
            "{} -> {} ({} -> {}) matched {} policies, {} rules",
            ip.src, ip.dst, src_region, dst_region, matched, installed
        );
        Disposition::Routed { matched, installed }
    }

    fn record(&self, outcome: RouteOutcome) -> usize {
        match outcome {
            RouteOutcome::Installed { rules, constraint_met } => {
                self.counters.rules_installed.add(rules as u64);
                if !constraint_met {
                    self.counters.path_fallbacks.inc();
                }
                rules
            }
            RouteOutcome::SourceUnknown | RouteOutcome::DestinationUnknown => {
                self.counters.hosts_unknown.inc();
                0
            }
            RouteOutcome::NoSelector => {
                self.counters.selectors_rejected.inc();
                0
            }
            RouteOutcome::NoPath | RouteOutcome::Withdrawn => 0,
        }
    }
}

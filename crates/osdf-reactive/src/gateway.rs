//! Virtual gateway ARP responder

use osdf_common::packet::ArpPacket;
use osdf_common::{
    AtomicCounter, ConnectPoint, EthernetFrame, OutboundPacket, PacketService, RegionService,
};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

/// What the responder did with an ARP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayReply {
    /// Reply emitted out of the receiving port
    Replied,
    /// Not a request
    NotRequest,
    /// Target is not a gateway address
    NotGateway,
    /// No gateway MAC configured
    NoGatewayMac,
}

/// Answers ARP requests for configured gateway addresses
pub struct VirtualGatewayResponder {
    regions: Arc<dyn RegionService>,
    packets: Arc<dyn PacketService>,
    replies: AtomicCounter,
}

impl VirtualGatewayResponder {
    /// Create responder
    pub fn new(regions: Arc<dyn RegionService>, packets: Arc<dyn PacketService>) -> Self {
        Self {
            regions,
            packets,
            replies: AtomicCounter::default(),
        }
    }

    /// Handle one ARP packet received at `receiver`
    pub fn handle(&self, receiver: &ConnectPoint, frame: &EthernetFrame, arp: &ArpPacket) -> GatewayReply {
        if !arp.is_request() {
            return GatewayReply::NotRequest;
        }
        if !self.regions.is_virtual_gateway_ip(IpAddr::V4(arp.target_ip)) {
            trace!("ARP for {} is not a gateway request", arp.target_ip);
            return GatewayReply::NotGateway;
        }
        let Some(mac) = self.regions.virtual_gateway_mac() else {
            debug!("ARP for gateway {} but no gateway MAC configured", arp.target_ip);
            return GatewayReply::NoGatewayMac;
        };

        self.packets.emit(OutboundPacket {
            output: receiver.clone(),
            data: arp.reply_frame(mac, frame.vlan),
        });
        self.replies.inc();
        debug!("Answered ARP for gateway {} to {} at {}", arp.target_ip, arp.sender_ip, receiver);
        GatewayReply::Replied
    }

    /// Replies sent so far
    pub fn replies(&self) -> u64 {
        self.replies.get()
    }
}

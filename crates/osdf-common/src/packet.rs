//! Packet-in parsing and frame construction
//!
//! Frames are decoded straight from the byte slice handed over by the
//! packet transport. Only the headers the engine matches on are decoded:
//! Ethernet (with one optional 802.1Q tag), ARP, IPv4 and the first four
//! bytes of TCP/UDP/ICMP.

use crate::net::{ConnectPoint, MacAddress};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Ethernet type codes
pub mod ether_type {
    /// IPv4
    pub const IPV4: u16 = 0x0800;
    /// ARP
    pub const ARP: u16 = 0x0806;
    /// 802.1Q tag
    pub const VLAN: u16 = 0x8100;
    /// IPv6
    pub const IPV6: u16 = 0x86DD;
    /// Link-layer discovery
    pub const LLDP: u16 = 0x88CC;
    /// Big Switch Networks discovery
    pub const BSN: u16 = 0x8942;
}

/// IP protocol numbers
pub mod ip_proto {
    /// ICMP
    pub const ICMP: u8 = 1;
    /// TCP
    pub const TCP: u8 = 6;
    /// UDP
    pub const UDP: u8 = 17;
}

/// ARP request opcode
pub const ARP_REQUEST: u16 = 1;
/// ARP reply opcode
pub const ARP_REPLY: u16 = 2;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const ARP_LEN: usize = 28;

/// Transport header summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TCP ports
    Tcp { src_port: u16, dst_port: u16 },
    /// UDP ports
    Udp { src_port: u16, dst_port: u16 },
    /// ICMP type and code
    Icmp { icmp_type: u8, code: u8 },
    /// Anything else, or truncated
    Other,
}

/// Decoded IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// IP protocol number
    pub protocol: u8,
    /// DSCP (upper six bits of the TOS byte)
    pub dscp: u8,
    /// Transport header
    pub transport: Transport,
}

impl Ipv4Packet {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < IPV4_MIN_HEADER_LEN || data[0] >> 4 != 4 {
            return None;
        }
        let ihl = ((data[0] & 0x0f) as usize) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || data.len() < ihl {
            return None;
        }

        let protocol = data[9];
        let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

        let l4 = &data[ihl..];
        let transport = match protocol {
            ip_proto::TCP | ip_proto::UDP if l4.len() >= 4 => {
                let src_port = u16::from_be_bytes([l4[0], l4[1]]);
                let dst_port = u16::from_be_bytes([l4[2], l4[3]]);
                if protocol == ip_proto::TCP {
                    Transport::Tcp { src_port, dst_port }
                } else {
                    Transport::Udp { src_port, dst_port }
                }
            }
            ip_proto::ICMP if l4.len() >= 2 => Transport::Icmp {
                icmp_type: l4[0],
                code: l4[1],
            },
            _ => Transport::Other,
        };

        Some(Self {
            src,
            dst,
            protocol,
            dscp: data[1] >> 2,
            transport,
        })
    }
}

/// Decoded ARP body (Ethernet/IPv4 only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Request or reply
    pub opcode: u16,
    /// Sender hardware address
    pub sender_mac: MacAddress,
    /// Sender protocol address
    pub sender_ip: Ipv4Addr,
    /// Target hardware address
    pub target_mac: MacAddress,
    /// Target protocol address
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_LEN {
            return None;
        }
        let htype = u16::from_be_bytes([data[0], data[1]]);
        let ptype = u16::from_be_bytes([data[2], data[3]]);
        if htype != 1 || ptype != ether_type::IPV4 || data[4] != 6 || data[5] != 4 {
            return None;
        }
        Some(Self {
            opcode: u16::from_be_bytes([data[6], data[7]]),
            sender_mac: MacAddress::from_slice(&data[8..14])?,
            sender_ip: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_mac: MacAddress::from_slice(&data[18..24])?,
            target_ip: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    /// True for an ARP request
    pub fn is_request(&self) -> bool {
        self.opcode == ARP_REQUEST
    }

    /// Build the Ethernet frame answering this request on behalf of `mac`
    pub fn reply_frame(&self, mac: MacAddress, vlan: Option<u16>) -> Bytes {
        let mut frame = FrameBuilder::new(mac, self.sender_mac);
        if let Some(vlan) = vlan {
            frame = frame.vlan(vlan);
        }
        frame.arp(ARP_REPLY, mac, self.target_ip, self.sender_mac, self.sender_ip)
    }
}

/// Layer-3 payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// IPv4 datagram
    Ipv4(Ipv4Packet),
    /// ARP message
    Arp(ArpPacket),
    /// Not decoded (other ethertype or malformed body)
    Unparsed,
}

/// Decoded Ethernet frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame {
    /// Destination MAC
    pub dst_mac: MacAddress,
    /// Source MAC
    pub src_mac: MacAddress,
    /// 802.1Q VLAN id, if tagged
    pub vlan: Option<u16>,
    /// Ethernet type (after any VLAN tag)
    pub ether_type: u16,
    /// Decoded payload
    pub payload: Payload,
}

impl EthernetFrame {
    /// Parse from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HEADER_LEN {
            return None;
        }

        let dst_mac = MacAddress::from_slice(&data[0..6])?;
        let src_mac = MacAddress::from_slice(&data[6..12])?;
        let mut ether_type = u16::from_be_bytes([data[12], data[13]]);
        let mut offset = ETH_HEADER_LEN;
        let mut vlan = None;

        if ether_type == ether_type::VLAN {
            if data.len() < ETH_HEADER_LEN + VLAN_TAG_LEN {
                return None;
            }
            vlan = Some(u16::from_be_bytes([data[14], data[15]]) & 0x0fff);
            ether_type = u16::from_be_bytes([data[16], data[17]]);
            offset += VLAN_TAG_LEN;
        }

        let body = &data[offset..];
        let payload = match ether_type {
            ether_type::IPV4 => Ipv4Packet::parse(body).map(Payload::Ipv4),
            ether_type::ARP => ArpPacket::parse(body).map(Payload::Arp),
            _ => None,
        }
        .unwrap_or(Payload::Unparsed);

        Some(Self {
            dst_mac,
            src_mac,
            vlan,
            ether_type,
            payload,
        })
    }

    /// Discovery traffic the controller itself generates
    pub fn is_control(&self) -> bool {
        self.ether_type == ether_type::LLDP || self.ether_type == ether_type::BSN
    }

    /// IPv4 payload, if any
    pub fn ipv4(&self) -> Option<&Ipv4Packet> {
        match &self.payload {
            Payload::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    /// ARP payload, if any
    pub fn arp(&self) -> Option<&ArpPacket> {
        match &self.payload {
            Payload::Arp(arp) => Some(arp),
            _ => None,
        }
    }
}

/// A packet-in event
#[derive(Debug, Clone)]
pub struct InboundPacket {
    /// Where the packet entered the network
    pub receiver: ConnectPoint,
    /// Decoded headers
    pub frame: Option<EthernetFrame>,
    /// Original bytes
    pub raw: Bytes,
}

impl InboundPacket {
    /// Wrap raw bytes received on `receiver`
    pub fn new(receiver: ConnectPoint, raw: impl Into<Bytes>) -> Self {
        let raw = raw.into();
        let frame = EthernetFrame::parse(&raw);
        Self { receiver, frame, raw }
    }
}

/// A packet-out request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Egress connect point
    pub output: ConnectPoint,
    /// Frame bytes
    pub data: Bytes,
}

/// Raw frame encoder
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    src_mac: MacAddress,
    dst_mac: MacAddress,
    vlan: Option<u16>,
    dscp: u8,
}

impl FrameBuilder {
    /// Start a frame from `src_mac` to `dst_mac`
    pub fn new(src_mac: MacAddress, dst_mac: MacAddress) -> Self {
        Self {
            src_mac,
            dst_mac,
            vlan: None,
            dscp: 0,
        }
    }

    /// Add an 802.1Q tag
    pub fn vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan & 0x0fff);
        self
    }

    /// Set IPv4 DSCP
    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp & 0x3f;
        self
    }

    fn header(&self, buf: &mut BytesMut, ether_type: u16) {
        buf.put_slice(&self.dst_mac.octets());
        buf.put_slice(&self.src_mac.octets());
        if let Some(vlan) = self.vlan {
            buf.put_u16(ether_type::VLAN);
            buf.put_u16(vlan);
        }
        buf.put_u16(ether_type);
    }

    fn ipv4(&self, src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, l4: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(ETH_HEADER_LEN + VLAN_TAG_LEN + IPV4_MIN_HEADER_LEN + l4.len());
        self.header(&mut buf, ether_type::IPV4);
        buf.put_u8(0x45);
        buf.put_u8(self.dscp << 2);
        buf.put_u16((IPV4_MIN_HEADER_LEN + l4.len()) as u16);
        buf.put_u32(0); // id, flags, fragment
        buf.put_u8(64);
        buf.put_u8(protocol);
        buf.put_u16(0); // checksum
        buf.put_slice(&src.octets());
        buf.put_slice(&dst.octets());
        buf.put_slice(l4);
        buf.freeze()
    }

    /// IPv4/TCP frame (header-only segment)
    pub fn tcp(&self, src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Bytes {
        let mut l4 = [0u8; 20];
        l4[0..2].copy_from_slice(&src_port.to_be_bytes());
        l4[2..4].copy_from_slice(&dst_port.to_be_bytes());
        l4[12] = 0x50;
        self.ipv4(src, dst, ip_proto::TCP, &l4)
    }

    /// IPv4/UDP frame
    pub fn udp(&self, src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Bytes {
        let mut l4 = [0u8; 8];
        l4[0..2].copy_from_slice(&src_port.to_be_bytes());
        l4[2..4].copy_from_slice(&dst_port.to_be_bytes());
        l4[4..6].copy_from_slice(&8u16.to_be_bytes());
        self.ipv4(src, dst, ip_proto::UDP, &l4)
    }

    /// IPv4/ICMP frame
    pub fn icmp(&self, src: Ipv4Addr, dst: Ipv4Addr, icmp_type: u8, code: u8) -> Bytes {
        let l4 = [icmp_type, code, 0, 0, 0, 0, 0, 0];
        self.ipv4(src, dst, ip_proto::ICMP, &l4)
    }

    /// ARP frame
    pub fn arp(
        &self,
        opcode: u16,
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) -> Bytes {
        let mut buf = BytesMut::with_capacity(ETH_HEADER_LEN + VLAN_TAG_LEN + ARP_LEN);
        self.header(&mut buf, ether_type::ARP);
        buf.put_u16(1); // Ethernet
        buf.put_u16(ether_type::IPV4);
        buf.put_u8(6);
        buf.put_u8(4);
        buf.put_u16(opcode);
        buf.put_slice(&sender_mac.octets());
        buf.put_slice(&sender_ip.octets());
        buf.put_slice(&target_mac.octets());
        buf.put_slice(&target_ip.octets());
        buf.freeze()
    }

    /// Frame with an arbitrary ethertype and empty body
    pub fn raw(&self, ether_type: u16, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(ETH_HEADER_LEN + VLAN_TAG_LEN + body.len());
        self.header(&mut buf, ether_type);
        buf.put_slice(body);
        buf.freeze()
    }
}

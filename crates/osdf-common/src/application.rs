//! Application catalog
//!
//! Binds each known application to its well-known port, transport protocol
//! and traffic class.

use crate::error::{OsdfError, OsdfResult};
use crate::packet::ip_proto;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    /// TCP over IPv4
    #[serde(rename = "TCPv4")]
    TcpV4,
    /// UDP over IPv4
    #[serde(rename = "UDPv4")]
    UdpV4,
    /// TCP over IPv6
    #[serde(rename = "TCPv6")]
    TcpV6,
    /// UDP over IPv6
    #[serde(rename = "UDPv6")]
    UdpV6,
    /// MPLS in IP
    Mpls,
    /// ICMP over IPv4
    #[serde(rename = "ICMPv4")]
    IcmpV4,
}

impl TransportProtocol {
    /// IP protocol number
    pub const fn number(&self) -> u8 {
        match self {
            Self::TcpV4 | Self::TcpV6 => ip_proto::TCP,
            Self::UdpV4 | Self::UdpV6 => ip_proto::UDP,
            Self::Mpls => 137,
            Self::IcmpV4 => ip_proto::ICMP,
        }
    }
}

/// Traffic class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficClass {
    /// No latency guarantees
    BestEffort,
    /// Latency sensitive
    RealTime,
}

/// Known applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    /// HTTP
    Web,
    /// FTP data
    Ftp,
    /// Voice over IP (BFD-echo port range)
    Voip,
    /// Trivial FTP
    Tftp,
    /// ICMP echo
    Ping,
    /// HTTP video streaming
    VideoStreaming,
}

impl ApplicationType {
    /// Every catalog entry
    pub const ALL: [ApplicationType; 6] = [
        Self::Web,
        Self::Ftp,
        Self::Voip,
        Self::Tftp,
        Self::Ping,
        Self::VideoStreaming,
    ];

    /// Well-known port (0 for portless protocols)
    pub const fn port(&self) -> u16 {
        match self {
            Self::Web => 80,
            Self::Ftp => 20,
            Self::Voip => 3784,
            Self::Tftp => 69,
            Self::Ping => 0,
            Self::VideoStreaming => 8080,
        }
    }

    /// Transport protocol
    pub const fn protocol(&self) -> TransportProtocol {
        match self {
            Self::Web | Self::Ftp | Self::Tftp | Self::VideoStreaming => TransportProtocol::TcpV4,
            Self::Voip => TransportProtocol::UdpV4,
            Self::Ping => TransportProtocol::IcmpV4,
        }
    }

    /// Traffic class
    pub const fn traffic_class(&self) -> TrafficClass {
        match self {
            Self::Voip | Self::VideoStreaming => TrafficClass::RealTime,
            _ => TrafficClass::BestEffort,
        }
    }

    /// Catalog name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Ftp => "FTP",
            Self::Voip => "VOIP",
            Self::Tftp => "TFTP",
            Self::Ping => "PING",
            Self::VideoStreaming => "VIDEO_STREAMING",
        }
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApplicationType {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|app| app.name() == wanted)
            .ok_or_else(|| OsdfError::UnknownApplication(s.to_string()))
    }
}

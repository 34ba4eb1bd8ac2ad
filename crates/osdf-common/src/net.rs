//! Network identity types
//!
//! Addresses and topology elements as seen by the controller: MAC addresses,
//! devices and their ports, hosts, links and multi-hop paths.

use crate::error::{OsdfError, OsdfResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// 48-bit Ethernet address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);
    /// All-zero address
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Create from raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Read from the first six bytes of a slice
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = data.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }

    /// Raw octets
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group bit set (multicast or broadcast)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(OsdfError::InvalidMac(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(OsdfError::InvalidMac(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| OsdfError::InvalidMac(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = OsdfError;

    fn try_from(value: String) -> OsdfResult<Self> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Infrastructure device identifier (e.g. `of:0000000000000001`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create device id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port number on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNumber(pub u32);

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device port: where a host or link attaches
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectPoint {
    /// Device
    pub device_id: DeviceId,
    /// Port on the device
    pub port: PortNumber,
}

impl ConnectPoint {
    /// Create connect point
    pub fn new(device_id: impl Into<String>, port: u32) -> Self {
        Self {
            device_id: DeviceId::new(device_id),
            port: PortNumber(port),
        }
    }

    /// Parse a comma separated list, ignoring empty tokens
    pub fn parse_list(s: &str) -> OsdfResult<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.port)
    }
}

impl FromStr for ConnectPoint {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        let (device, port) = s
            .trim()
            .rsplit_once('/')
            .ok_or_else(|| OsdfError::InvalidConnectPoint(s.to_string()))?;
        if device.is_empty() {
            return Err(OsdfError::InvalidConnectPoint(s.to_string()));
        }
        let port: u32 = port
            .parse()
            .map_err(|_| OsdfError::InvalidConnectPoint(s.to_string()))?;
        Ok(Self::new(device, port))
    }
}

impl TryFrom<String> for ConnectPoint {
    type Error = OsdfError;

    fn try_from(value: String) -> OsdfResult<Self> {
        value.parse()
    }
}

impl From<ConnectPoint> for String {
    fn from(cp: ConnectPoint) -> Self {
        cp.to_string()
    }
}

/// Host identifier: MAC address plus optional VLAN (`00:00:00:00:00:01/None`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostId {
    /// Host MAC
    pub mac: MacAddress,
    /// VLAN, `None` when untagged
    pub vlan: Option<u16>,
}

impl HostId {
    /// Untagged host id for a MAC
    pub const fn from_mac(mac: MacAddress) -> Self {
        Self { mac, vlan: None }
    }

    /// Host id for a MAC on a VLAN
    pub const fn with_vlan(mac: MacAddress, vlan: Option<u16>) -> Self {
        Self { mac, vlan }
    }

    /// Parse a comma separated list, ignoring empty tokens
    pub fn parse_list(s: &str) -> OsdfResult<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vlan {
            Some(vlan) => write!(f, "{}/{}", self.mac, vlan),
            None => write!(f, "{}/None", self.mac),
        }
    }
}

impl FromStr for HostId {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        let s = s.trim();
        let (mac, vlan) = match s.split_once('/') {
            Some((mac, vlan)) => (mac, Some(vlan)),
            None => (s, None),
        };
        let mac: MacAddress = mac.parse().map_err(|_| OsdfError::InvalidHostId(s.to_string()))?;
        let vlan = match vlan {
            None | Some("None") | Some("-1") => None,
            Some(v) => Some(v.parse().map_err(|_| OsdfError::InvalidHostId(s.to_string()))?),
        };
        Ok(Self { mac, vlan })
    }
}

impl TryFrom<String> for HostId {
    type Error = OsdfError;

    fn try_from(value: String) -> OsdfResult<Self> {
        value.parse()
    }
}

impl From<HostId> for String {
    fn from(id: HostId) -> Self {
        id.to_string()
    }
}

/// End station known to the host service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Identifier
    pub id: HostId,
    /// IPv4 addresses bound to the host
    #[serde(default)]
    pub ips: Vec<Ipv4Addr>,
    /// Attachment point
    pub location: ConnectPoint,
}

impl Host {
    /// Create host
    pub fn new(mac: MacAddress, ips: Vec<Ipv4Addr>, location: ConnectPoint) -> Self {
        Self {
            id: HostId::from_mac(mac),
            ips,
            location,
        }
    }

    /// Host MAC
    pub fn mac(&self) -> MacAddress {
        self.id.mac
    }
}

/// Unidirectional infrastructure link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Egress side
    pub src: ConnectPoint,
    /// Ingress side
    pub dst: ConnectPoint,
}

impl Link {
    /// Create link
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        Self { src, dst }
    }

    /// Same link in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }
}

/// Ordered link sequence between two devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Links in traversal order
    pub links: Vec<Link>,
    /// Path cost (hop count unless weighted)
    pub cost: f64,
}

impl Path {
    /// Create path with hop-count cost
    pub fn new(links: Vec<Link>) -> Self {
        let cost = links.len() as f64;
        Self { links, cost }
    }

    /// First connect point
    pub fn src(&self) -> Option<&ConnectPoint> {
        self.links.first().map(|l| &l.src)
    }

    /// Last connect point
    pub fn dst(&self) -> Option<&ConnectPoint> {
        self.links.last().map(|l| &l.dst)
    }

    /// Every connect point touched by the path's links
    pub fn endpoints(&self) -> HashSet<&ConnectPoint> {
        self.links.iter().flat_map(|l| [&l.src, &l.dst]).collect()
    }

    /// True when every point in `required` is touched by this path
    pub fn visits_all(&self, required: &[ConnectPoint]) -> bool {
        let endpoints = self.endpoints();
        required.iter().all(|cp| endpoints.contains(cp))
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True for a zero-hop path
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_display() {
        let mac: MacAddress = "00:00:00:00:00:0a".parse().unwrap();
        assert_eq!(mac.octets(), [0, 0, 0, 0, 0, 10]);
        assert_eq!(mac.to_string(), "00:00:00:00:00:0A");
        assert!("00:00:00:00:0a".parse::<MacAddress>().is_err());
        assert!("zz:00:00:00:00:0a".parse::<MacAddress>().is_err());
        assert!(MacAddress::BROADCAST.is_multicast());
    }

    #[test]
    fn test_host_id_forms() {
        let a: HostId = "00:00:00:00:00:01/None".parse().unwrap();
        let b: HostId = "00:00:00:00:00:01/-1".parse().unwrap();
        let c: HostId = "00:00:00:00:00:01".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);

        let tagged: HostId = "00:00:00:00:00:01/100".parse().unwrap();
        assert_eq!(tagged.vlan, Some(100));
        assert_eq!(tagged.to_string(), "00:00:00:00:00:01/100");

        assert!("bogus/None".parse::<HostId>().is_err());
        assert!("00:00:00:00:00:01/x".parse::<HostId>().is_err());
    }

    #[test]
    fn test_connect_point_list() {
        let cps = ConnectPoint::parse_list("of:0000000000000001/2, of:0000000000000002/3,").unwrap();
        assert_eq!(cps.len(), 2);
        assert_eq!(cps[0], ConnectPoint::new("of:0000000000000001", 2));
        assert!(ConnectPoint::parse_list("of:1/x").is_err());
        assert!(ConnectPoint::parse_list("/3").is_err());
        assert!(ConnectPoint::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_path_visits() {
        let a = ConnectPoint::new("s1", 1);
        let b = ConnectPoint::new("s2", 1);
        let c = ConnectPoint::new("s2", 2);
        let d = ConnectPoint::new("s3", 1);
        let path = Path::new(vec![Link::new(a.clone(), b.clone()), Link::new(c.clone(), d.clone())]);

        assert_eq!(path.src(), Some(&a));
        assert_eq!(path.dst(), Some(&d));
        assert!(path.visits_all(&[b, c]));
        assert!(path.visits_all(&[]));
        assert!(!path.visits_all(&[ConnectPoint::new("s9", 1)]));
    }

    #[test]
    fn test_serde_as_strings() {
        let cp = ConnectPoint::new("of:1", 4);
        let json = serde_json::to_string(&cp).unwrap();
        assert_eq!(json, "\"of:1/4\"");
        let back: ConnectPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
    }
}

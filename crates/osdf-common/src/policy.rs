//! Routing policies
//!
//! A [`Policy`] is immutable once built. Lifecycle changes produce a new
//! value via [`Policy::with_state`] which replaces the stored one wholesale.

use crate::application::ApplicationType;
use crate::error::{OsdfError, OsdfResult};
use crate::net::{ConnectPoint, HostId};
use crate::profile::TrafficProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest accepted priority
pub const MIN_PRIORITY: u32 = 1;
/// Highest accepted priority
pub const MAX_PRIORITY: u32 = 65535;
/// Priority used when none is given
pub const DEFAULT_PRIORITY: u32 = 50;

/// Dense policy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub u32);

impl PolicyId {
    /// Raw value
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PolicyId {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| OsdfError::PolicyNotFound(s.to_string()))
    }
}

/// Policy lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyState {
    /// Installation requested
    InstallReq,
    /// Installed
    Installed,
    /// Installation failed
    Failed,
    /// Withdrawal requested
    WithdrawReq,
    /// Withdrawn
    Withdrawn,
    /// Inconsistent with the data plane
    Corrupt,
    /// Removed for good
    Purged,
}

impl PolicyState {
    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstallReq => "INSTALL_REQ",
            Self::Installed => "INSTALLED",
            Self::Failed => "FAILED",
            Self::WithdrawReq => "WITHDRAW_REQ",
            Self::Withdrawn => "WITHDRAWN",
            Self::Corrupt => "CORRUPT",
            Self::Purged => "PURGED",
        }
    }
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch class of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    /// Source and destination in the same region
    IntraRoute,
    /// Between two regions
    InterRoute,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntraRoute => f.write_str("INTRA_ROUTE"),
            Self::InterRoute => f.write_str("INTER_ROUTE"),
        }
    }
}

impl FromStr for PolicyAction {
    type Err = OsdfError;

    fn from_str(s: &str) -> OsdfResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTRA" | "INTRA_ROUTE" => Ok(Self::IntraRoute),
            "INTER" | "INTER_ROUTE" => Ok(Self::InterRoute),
            _ => Err(OsdfError::InvalidPolicy(format!("unknown action: {}", s))),
        }
    }
}

/// Path selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathSelectionAlgo {
    /// Equal-cost multipath (handled like the default)
    Ecmp,
    /// Uniformly random candidate
    Random,
    /// First candidate visiting the whole partial path
    #[default]
    BestPossiblePath,
    /// Same as best possible path, chosen per request
    OnDemand,
}

impl PathSelectionAlgo {
    /// Parse an algorithm name; unknown names select the default
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ECMP" => Self::Ecmp,
            "RANDOM" => Self::Random,
            "ON_DEMAND" => Self::OnDemand,
            _ => Self::BestPossiblePath,
        }
    }
}

impl fmt::Display for PathSelectionAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ecmp => "ECMP",
            Self::Random => "RANDOM",
            Self::BestPossiblePath => "BEST_POSSIBLE_PATH",
            Self::OnDemand => "ON_DEMAND",
        };
        f.write_str(s)
    }
}

/// Operator-defined region identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Create region id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Traffic-steering policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    id: PolicyId,
    name: String,
    priority: u16,
    state: PolicyState,
    version: u64,
    action: PolicyAction,
    src_region: RegionId,
    dst_region: RegionId,
    #[serde(default)]
    src_hosts: Vec<HostId>,
    #[serde(default)]
    dst_hosts: Vec<HostId>,
    #[serde(default)]
    partial_path: Vec<ConnectPoint>,
    #[serde(default)]
    path_selection: PathSelectionAlgo,
    traffic_profile: TrafficProfile,
    created_at: DateTime<Utc>,
}

impl Policy {
    /// Start building a policy for `profile`
    pub fn builder(profile: TrafficProfile) -> PolicyBuilder {
        PolicyBuilder::new(profile)
    }

    /// Id
    pub fn id(&self) -> PolicyId {
        self.id
    }

    /// `APP:profile` name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rule priority
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// Lifecycle state
    pub fn state(&self) -> PolicyState {
        self.state
    }

    /// Caller supplied version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Dispatch class
    pub fn action(&self) -> PolicyAction {
        self.action
    }

    /// Source region
    pub fn src_region(&self) -> &RegionId {
        &self.src_region
    }

    /// Destination region
    pub fn dst_region(&self) -> &RegionId {
        &self.dst_region
    }

    /// Source host filter (empty matches any)
    pub fn src_hosts(&self) -> &[HostId] {
        &self.src_hosts
    }

    /// Destination host filter (empty matches any)
    pub fn dst_hosts(&self) -> &[HostId] {
        &self.dst_hosts
    }

    /// Connect points a selected path must visit
    pub fn partial_path(&self) -> &[ConnectPoint] {
        &self.partial_path
    }

    /// Path selection algorithm
    pub fn path_selection(&self) -> PathSelectionAlgo {
        self.path_selection
    }

    /// Owned traffic profile
    pub fn traffic_profile(&self) -> &TrafficProfile {
        &self.traffic_profile
    }

    /// Profile's application
    pub fn application(&self) -> ApplicationType {
        self.traffic_profile.application()
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy of this policy in another lifecycle state
    pub fn with_state(&self, state: PolicyState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Copy of this policy under another id
    pub fn with_id(&self, id: PolicyId) -> Self {
        Self { id, ..self.clone() }
    }
}

/// Builder for [`Policy`]
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    id: PolicyId,
    priority: u32,
    state: PolicyState,
    version: u64,
    action: PolicyAction,
    src_region: Option<RegionId>,
    dst_region: Option<RegionId>,
    src_hosts: Vec<HostId>,
    dst_hosts: Vec<HostId>,
    partial_path: Vec<ConnectPoint>,
    path_selection: PathSelectionAlgo,
    profile: TrafficProfile,
}

impl PolicyBuilder {
    fn new(profile: TrafficProfile) -> Self {
        Self {
            id: PolicyId(0),
            priority: DEFAULT_PRIORITY,
            state: PolicyState::InstallReq,
            version: 1,
            action: PolicyAction::IntraRoute,
            src_region: None,
            dst_region: None,
            src_hosts: Vec::new(),
            dst_hosts: Vec::new(),
            partial_path: Vec::new(),
            path_selection: PathSelectionAlgo::default(),
            profile,
        }
    }

    /// Set id
    pub fn id(mut self, id: PolicyId) -> Self {
        self.id = id;
        self
    }

    /// Set priority (validated on build)
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set lifecycle state
    pub fn state(mut self, state: PolicyState) -> Self {
        self.state = state;
        self
    }

    /// Set version
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Set dispatch class
    pub fn action(mut self, action: PolicyAction) -> Self {
        self.action = action;
        self
    }

    /// Use `region` as both source and destination
    pub fn region(self, region: impl Into<RegionId>) -> Self {
        let region = region.into();
        self.regions(region.clone(), region)
    }

    /// Set source and destination regions
    pub fn regions(mut self, src: impl Into<RegionId>, dst: impl Into<RegionId>) -> Self {
        self.src_region = Some(src.into());
        self.dst_region = Some(dst.into());
        self
    }

    /// Set source host filter
    pub fn src_hosts(mut self, hosts: Vec<HostId>) -> Self {
        self.src_hosts = hosts;
        self
    }

    /// Set destination host filter
    pub fn dst_hosts(mut self, hosts: Vec<HostId>) -> Self {
        self.dst_hosts = hosts;
        self
    }

    /// Set partial path constraint
    pub fn partial_path(mut self, path: Vec<ConnectPoint>) -> Self {
        self.partial_path = path;
        self
    }

    /// Set path selection algorithm
    pub fn path_selection(mut self, algo: PathSelectionAlgo) -> Self {
        self.path_selection = algo;
        self
    }

    /// Validate and build
    pub fn build(self) -> OsdfResult<Policy> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(OsdfError::InvalidPriority(self.priority));
        }
        let src_region = self.src_region.filter(|r| !r.as_str().is_empty());
        let dst_region = self.dst_region.filter(|r| !r.as_str().is_empty());
        let (src_region, dst_region) = match (src_region, dst_region) {
            (Some(s), Some(d)) => (s, d),
            _ => return Err(OsdfError::RegionMissing),
        };
        if self.profile.name().is_empty() {
            return Err(OsdfError::InvalidPolicy("profile name is empty".into()));
        }

        Ok(Policy {
            id: self.id,
            name: format!("{}:{}", self.profile.application(), self.profile.name()),
            priority: self.priority as u16,
            state: self.state,
            version: self.version,
            action: self.action,
            src_region,
            dst_region,
            src_hosts: self.src_hosts,
            dst_hosts: self.dst_hosts,
            partial_path: self.partial_path,
            path_selection: self.path_selection,
            traffic_profile: self.profile,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web(name: &str) -> TrafficProfile {
        TrafficProfile::new(name, ApplicationType::Web)
    }

    #[test]
    fn test_builder_defaults() {
        let policy = Policy::builder(web("profile1")).region("r1").build().unwrap();
        assert_eq!(policy.name(), "WEB:profile1");
        assert_eq!(policy.priority(), 50);
        assert_eq!(policy.state(), PolicyState::InstallReq);
        assert_eq!(policy.version(), 1);
        assert_eq!(policy.action(), PolicyAction::IntraRoute);
        assert_eq!(policy.src_region(), policy.dst_region());
        assert_eq!(policy.path_selection(), PathSelectionAlgo::BestPossiblePath);
        assert!(policy.src_hosts().is_empty());
    }

    #[test]
    fn test_priority_bounds() {
        for bad in [0, 65536, 100_000] {
            let err = Policy::builder(web("p")).region("r1").priority(bad).build();
            assert!(matches!(err, Err(OsdfError::InvalidPriority(p)) if p == bad));
        }
        for good in [1, 65535] {
            assert!(Policy::builder(web("p")).region("r1").priority(good).build().is_ok());
        }
    }

    #[test]
    fn test_region_required() {
        assert!(matches!(
            Policy::builder(web("p")).build(),
            Err(OsdfError::RegionMissing)
        ));
        assert!(matches!(
            Policy::builder(web("p")).region("").build(),
            Err(OsdfError::RegionMissing)
        ));
    }

    #[test]
    fn test_with_state_keeps_identity() {
        let policy = Policy::builder(web("p")).id(PolicyId(7)).region("r1").build().unwrap();
        let installed = policy.with_state(PolicyState::Installed);
        assert_eq!(installed.id(), PolicyId(7));
        assert_eq!(installed.state(), PolicyState::Installed);
        assert_eq!(policy.state(), PolicyState::InstallReq);
    }

    #[test]
    fn test_algo_fallback() {
        assert_eq!(PathSelectionAlgo::parse_lenient("random"), PathSelectionAlgo::Random);
        assert_eq!(PathSelectionAlgo::parse_lenient("on-demand"), PathSelectionAlgo::OnDemand);
        assert_eq!(PathSelectionAlgo::parse_lenient("ECMP"), PathSelectionAlgo::Ecmp);
        assert_eq!(
            PathSelectionAlgo::parse_lenient("shortest"),
            PathSelectionAlgo::BestPossiblePath
        );
    }

    #[test]
    fn test_policy_serde() {
        let policy = Policy::builder(web("p"))
            .regions("r1", "r2")
            .action(PolicyAction::InterRoute)
            .src_hosts(vec!["00:00:00:00:00:01/None".parse().unwrap()])
            .build()
            .unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"INTER_ROUTE\""));
        assert!(json.contains("00:00:00:00:00:01/None"));
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}

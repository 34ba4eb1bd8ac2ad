//! Traffic profiles

use crate::application::{ApplicationType, TrafficClass, TransportProtocol};
use crate::flow::Criterion;
use crate::AtomicCounter;
use serde::{Deserialize, Serialize};
use std::fmt;

static NEXT_PROFILE_ID: AtomicCounter = AtomicCounter::new(1);

/// Traffic profile identifier (process-wide, monotonic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficProfileId(pub u64);

impl TrafficProfileId {
    /// Next unused id
    pub fn next() -> Self {
        Self(NEXT_PROFILE_ID.inc())
    }
}

impl fmt::Display for TrafficProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named application-level match intent, owned by exactly one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficProfile {
    id: TrafficProfileId,
    name: String,
    application: ApplicationType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    criteria: Vec<Criterion>,
}

impl TrafficProfile {
    /// New profile for `application`
    pub fn new(name: impl Into<String>, application: ApplicationType) -> Self {
        Self {
            id: TrafficProfileId::next(),
            name: name.into(),
            application,
            criteria: Vec::new(),
        }
    }

    /// Attach extra low-level criteria
    pub fn with_criteria(mut self, criteria: Vec<Criterion>) -> Self {
        self.criteria = criteria;
        self
    }

    /// Id
    pub fn id(&self) -> TrafficProfileId {
        self.id
    }

    /// Profile name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application
    pub fn application(&self) -> ApplicationType {
        self.application
    }

    /// Application's transport protocol
    pub fn protocol(&self) -> TransportProtocol {
        self.application.protocol()
    }

    /// Application's well-known port
    pub fn port(&self) -> u16 {
        self.application.port()
    }

    /// Application's traffic class
    pub fn traffic_class(&self) -> TrafficClass {
        self.application.traffic_class()
    }

    /// Extra criteria (empty by default)
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let a = TrafficProfile::new("a", ApplicationType::Web);
        let b = TrafficProfile::new("b", ApplicationType::Voip);
        assert!(b.id() > a.id());
        assert_eq!(b.port(), 3784);
        assert_eq!(b.traffic_class(), TrafficClass::RealTime);
        assert!(a.criteria().is_empty());
    }
}

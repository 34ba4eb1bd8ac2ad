//! Policy lifecycle events
//!
//! Events are observation-only: listeners log or record them, nothing
//! feeds back into policy state.

use crate::policy::{Policy, PolicyState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Policy lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvent {
    /// Transition, mirrors the policy's state
    pub kind: PolicyState,
    /// Policy after the transition
    pub policy: Arc<Policy>,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

impl PolicyEvent {
    /// Event for `policy` in its current state
    pub fn for_policy(policy: Arc<Policy>) -> Self {
        Self::with_kind(policy.state(), policy)
    }

    /// Event of an explicit kind
    pub fn with_kind(kind: PolicyState, policy: Arc<Policy>) -> Self {
        Self {
            kind,
            policy,
            timestamp: crate::now_millis(),
        }
    }

    /// Dotted event name
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            PolicyState::InstallReq => "policy.install_req",
            PolicyState::Installed => "policy.installed",
            PolicyState::Failed => "policy.failed",
            PolicyState::WithdrawReq => "policy.withdraw_req",
            PolicyState::Withdrawn => "policy.withdrawn",
            PolicyState::Corrupt => "policy.corrupt",
            PolicyState::Purged => "policy.purged",
        }
    }
}

/// Receives policy events synchronously after each committed store mutation
pub trait PolicyListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &PolicyEvent);
}

/// Logs every event
#[derive(Debug, Default)]
pub struct LoggingListener;

impl PolicyListener for LoggingListener {
    fn on_event(&self, event: &PolicyEvent) {
        info!(
            "{} id={} name={} priority={}",
            event.event_type(),
            event.policy.id(),
            event.policy.name(),
            event.policy.priority()
        );
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: parking_lot::Mutex<Vec<PolicyEvent>>,
}

impl RecordingListener {
    /// Create empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far
    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events.lock().clone()
    }

    /// Kinds seen so far, in order
    pub fn kinds(&self) -> Vec<PolicyState> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl PolicyListener for RecordingListener {
    fn on_event(&self, event: &PolicyEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApplicationType, TrafficProfile};

    #[test]
    fn test_event_names_follow_state() {
        let policy = Policy::builder(TrafficProfile::new("p", ApplicationType::Ping))
            .region("r1")
            .build()
            .unwrap();
        let event = PolicyEvent::for_policy(Arc::new(policy));
        assert_eq!(event.kind, PolicyState::InstallReq);
        assert_eq!(event.event_type(), "policy.install_req");

        let recorder = RecordingListener::new();
        recorder.on_event(&event);
        recorder.on_event(&PolicyEvent::with_kind(PolicyState::Withdrawn, event.policy.clone()));
        assert_eq!(recorder.kinds(), vec![PolicyState::InstallReq, PolicyState::Withdrawn]);
    }
}

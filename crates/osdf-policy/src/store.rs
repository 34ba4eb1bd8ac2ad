//! Authoritative policy table
//!
//! Packet-processing threads read the table concurrently through
//! [`PolicyStore::current_policies`] and record rules through
//! [`PolicyStore::install_flow_rule`]. Administrative writes (create,
//! remove, transitions) serialize on a short admin lock that packet
//! processing never takes.

use crate::allocator::PolicyIdAllocator;
use dashmap::DashMap;
use osdf_common::{
    FlowRule, FlowRuleService, OsdfError, OsdfResult, Policy, PolicyEvent, PolicyId, PolicyListener,
    PolicyState,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Policy table plus per-policy flow-rule ownership
pub struct PolicyStore {
    /// Active policies
    current: DashMap<PolicyId, Arc<Policy>>,
    /// Accepted but not yet active
    pending: DashMap<PolicyId, Arc<Policy>>,
    /// Rules installed on behalf of each policy
    flow_rules: DashMap<PolicyId, Vec<FlowRule>>,
    /// Backend used to withdraw rules on removal
    flow_rule_service: Arc<dyn FlowRuleService>,
    /// Observers, invoked after each committed mutation
    listeners: RwLock<Vec<Arc<dyn PolicyListener>>>,
    /// Serializes administrative writes
    admin: Mutex<()>,
    /// Held shared while recording a rule, exclusively while detaching a policy
    ownership: RwLock<()>,
    allocator: PolicyIdAllocator,
    version: AtomicU64,
}

impl PolicyStore {
    /// Create empty store backed by `flow_rule_service`
    pub fn new(flow_rule_service: Arc<dyn FlowRuleService>) -> Self {
        Self {
            current: DashMap::new(),
            pending: DashMap::new(),
            flow_rules: DashMap::new(),
            flow_rule_service,
            listeners: RwLock::new(Vec::new()),
            admin: Mutex::new(()),
            ownership: RwLock::new(()),
            allocator: PolicyIdAllocator::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Register an observer
    pub fn add_listener(&self, listener: Arc<dyn PolicyListener>) {
        self.listeners.write().push(listener);
    }

    /// Mutation counter
    #[inline(always)]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn notify(&self, event: PolicyEvent) {
        self.version.fetch_add(1, Ordering::Release);
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    /// Insert or overwrite a current policy by id
    pub fn add_current(&self, policy: Policy) -> Arc<Policy> {
        let policy = Arc::new(policy);
        {
            let _admin = self.admin.lock();
            self.pending.remove(&policy.id());
            self.current.insert(policy.id(), policy.clone());
        }
        info!("Policy {} ({}) is current, state {}", policy.id(), policy.name(), policy.state());
        self.notify(PolicyEvent::for_policy(policy.clone()));
        policy
    }

    /// Reload a previously saved current policy
    ///
    /// Not a lifecycle change: listeners are not notified and the version
    /// is left alone.
    pub fn restore_current(&self, policy: Policy) -> Arc<Policy> {
        let policy = Arc::new(policy);
        {
            let _admin = self.admin.lock();
            self.pending.remove(&policy.id());
            self.current.insert(policy.id(), policy.clone());
        }
        debug!("Restored policy {} ({})", policy.id(), policy.name());
        policy
    }

    /// Allocate an id and insert the policy built for it, atomically
    ///
    /// No other administrative write can run between the id snapshot and
    /// the insert, so concurrent creations never share an id.
    pub fn create_current<F>(&self, build: F) -> OsdfResult<Arc<Policy>>
    where
        F: FnOnce(PolicyId) -> OsdfResult<Policy>,
    {
        let policy = {
            let _admin = self.admin.lock();
            let id = self.next_id();
            let policy = Arc::new(build(id)?.with_id(id));
            self.current.insert(id, policy.clone());
            policy
        };
        info!(
            "Created policy {} ({}) priority {} action {}",
            policy.id(),
            policy.name(),
            policy.priority(),
            policy.action()
        );
        self.notify(PolicyEvent::for_policy(policy.clone()));
        Ok(policy)
    }

    fn next_id(&self) -> PolicyId {
        let in_use = self
            .current
            .iter()
            .map(|e| *e.key())
            .chain(self.pending.iter().map(|e| *e.key()))
            .collect::<Vec<_>>();
        self.allocator.allocate(in_use)
    }

    /// Park a policy outside the active table
    pub fn add_pending(&self, policy: Policy) -> Arc<Policy> {
        let policy = Arc::new(policy);
        let _admin = self.admin.lock();
        self.pending.insert(policy.id(), policy.clone());
        debug!("Policy {} pending", policy.id());
        policy
    }

    /// Pending policies ordered by id
    pub fn pending_policies(&self) -> Vec<Arc<Policy>> {
        let mut policies: Vec<_> = self.pending.iter().map(|e| e.value().clone()).collect();
        policies.sort_by_key(|p| p.id());
        policies
    }

    /// Move a pending policy into the active table
    pub fn promote_pending(&self, id: PolicyId) -> OsdfResult<Arc<Policy>> {
        let policy = {
            let _admin = self.admin.lock();
            let (_, policy) = self
                .pending
                .remove(&id)
                .ok_or_else(|| OsdfError::PolicyNotFound(id.to_string()))?;
            self.current.insert(id, policy.clone());
            policy
        };
        info!("Promoted pending policy {}", id);
        self.notify(PolicyEvent::for_policy(policy.clone()));
        Ok(policy)
    }

    /// Replace a current policy with a copy in `state`
    pub fn transition(&self, id: PolicyId, state: PolicyState) -> OsdfResult<Arc<Policy>> {
        let policy = {
            let _admin = self.admin.lock();
            let existing = self
                .current
                .get(&id)
                .map(|p| p.clone())
                .ok_or_else(|| OsdfError::PolicyNotFound(id.to_string()))?;
            let updated = Arc::new(existing.with_state(state));
            self.current.insert(id, updated.clone());
            updated
        };
        debug!("Policy {} -> {}", id, state);
        self.notify(PolicyEvent::for_policy(policy.clone()));
        Ok(policy)
    }

    /// Remove a current policy and withdraw every rule it owns
    ///
    /// Returns the number of rules withdrawn. The policy and its rule list
    /// are detached together, so no rule can be recorded for it afterwards.
    /// Readers see the policy gone before its rules leave the backend.
    pub fn remove_current_policy(&self, id: PolicyId) -> OsdfResult<usize> {
        let _admin = self.admin.lock();
        let (policy, rules) = {
            let _detach = self.ownership.write();
            let (_, policy) = self
                .current
                .remove(&id)
                .ok_or_else(|| OsdfError::PolicyNotFound(id.to_string()))?;
            let rules = self.flow_rules.remove(&id).map(|(_, r)| r).unwrap_or_default();
            (policy, rules)
        };

        if !rules.is_empty() {
            self.flow_rule_service.remove_flow_rules(&rules);
        }
        info!("Removed policy {} ({}), withdrew {} rules", id, policy.name(), rules.len());

        let withdrawn = Arc::new(policy.with_state(PolicyState::Withdrawn));
        self.notify(PolicyEvent::for_policy(withdrawn));
        Ok(rules.len())
    }

    /// Record a rule against a current policy
    ///
    /// Returns false, recording nothing, when the policy is not current.
    /// Duplicates are recorded as given.
    pub fn add_flow_rule(&self, id: PolicyId, rule: FlowRule) -> bool {
        let _owner = self.ownership.read();
        if !self.current.contains_key(&id) {
            return false;
        }
        self.flow_rules.entry(id).or_default().push(rule);
        true
    }

    /// Install a rule through the backend and record it, if the policy is current
    ///
    /// A rule already owned by the policy (same content id) is re-applied to
    /// the backend but recorded once.
    pub fn install_flow_rule(&self, id: PolicyId, rule: FlowRule) -> bool {
        let _owner = self.ownership.read();
        if !self.current.contains_key(&id) {
            warn!("Not installing rule {} for withdrawn policy {}", rule.id, id);
            return false;
        }
        self.flow_rule_service.apply_flow_rules(std::slice::from_ref(&rule));
        let mut owned = self.flow_rules.entry(id).or_default();
        if !owned.iter().any(|r| r.id == rule.id) {
            owned.push(rule);
        }
        true
    }

    /// Current policy by id
    pub fn get_policy(&self, id: PolicyId) -> OsdfResult<Arc<Policy>> {
        self.current
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| OsdfError::PolicyNotFound(id.to_string()))
    }

    /// Current policy by textual id
    pub fn get_policy_str(&self, id: &str) -> OsdfResult<Arc<Policy>> {
        self.get_policy(id.parse()?)
    }

    /// Snapshot of current policies ordered by id
    pub fn current_policies(&self) -> Vec<Arc<Policy>> {
        let mut policies: Vec<_> = self.current.iter().map(|e| e.value().clone()).collect();
        policies.sort_by_key(|p| p.id());
        policies
    }

    /// Number of current policies
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// True when no policy is current
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Rules recorded for a policy
    pub fn rules_count(&self, id: PolicyId) -> usize {
        self.flow_rules.get(&id).map(|r| r.len()).unwrap_or(0)
    }

    /// Copy of the rules recorded for a policy
    pub fn flow_rules_for_policy(&self, id: PolicyId) -> Vec<FlowRule> {
        self.flow_rules.get(&id).map(|r| r.clone()).unwrap_or_default()
    }

    /// Copy of the whole ownership multimap
    pub fn flow_rules_list(&self) -> HashMap<PolicyId, Vec<FlowRule>> {
        self.flow_rules
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osdf_common::memory::MemoryFlowRuleService;
    use osdf_common::{
        ApplicationType, DeviceId, MatchSpec, PortNumber, RecordingListener, TrafficProfile,
        Treatment,
    };
    use std::collections::HashSet;

    fn store() -> (PolicyStore, Arc<MemoryFlowRuleService>) {
        let backend = Arc::new(MemoryFlowRuleService::new());
        (PolicyStore::new(backend.clone()), backend)
    }

    fn policy(name: &str) -> OsdfResult<Policy> {
        Policy::builder(TrafficProfile::new(name, ApplicationType::Web))
            .region("r1")
            .build()
    }

    fn rule(device: &str, port: u32) -> FlowRule {
        FlowRule::builder(DeviceId::new(device))
            .selector(MatchSpec::new())
            .treatment(Treatment::output(PortNumber(port)))
            .priority(50)
            .build()
    }

    #[test]
    fn test_create_allocates_dense_ids() {
        let (store, _) = store();
        let a = store.create_current(|_| policy("a")).unwrap();
        let b = store.create_current(|_| policy("b")).unwrap();
        let c = store.create_current(|_| policy("c")).unwrap();
        assert_eq!((a.id(), b.id(), c.id()), (PolicyId(0), PolicyId(1), PolicyId(2)));

        store.remove_current_policy(PolicyId(1)).unwrap();
        let d = store.create_current(|_| policy("d")).unwrap();
        assert_eq!(d.id(), PolicyId(1));
    }

    #[test]
    fn test_create_propagates_build_error() {
        let (store, _) = store();
        let err = store.create_current(|_| {
            Policy::builder(TrafficProfile::new("x", ApplicationType::Web)).build()
        });
        assert!(matches!(err, Err(OsdfError::RegionMissing)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_withdraws_all_rules() {
        let (store, backend) = store();
        let p = store.create_current(|_| policy("a")).unwrap();

        assert!(store.install_flow_rule(p.id(), rule("of:1", 1)));
        assert!(store.install_flow_rule(p.id(), rule("of:2", 2)));
        assert!(store.install_flow_rule(p.id(), rule("of:2", 2)));
        assert_eq!(store.rules_count(p.id()), 2);
        assert_eq!(backend.rule_count(), 2);

        let withdrawn = store.remove_current_policy(p.id()).unwrap();
        assert_eq!(withdrawn, 2);
        assert_eq!(backend.rule_count(), 0);
        assert!(store.flow_rules_for_policy(p.id()).is_empty());
        assert!(store.current_policies().iter().all(|q| q.id() != p.id()));
    }

    #[test]
    fn test_no_rules_recorded_after_removal() {
        let (store, backend) = store();
        let p = store.create_current(|_| policy("a")).unwrap();
        store.remove_current_policy(p.id()).unwrap();

        assert!(!store.install_flow_rule(p.id(), rule("of:1", 1)));
        assert!(!store.add_flow_rule(p.id(), rule("of:1", 1)));
        assert_eq!(backend.rule_count(), 0);
        assert_eq!(store.rules_count(p.id()), 0);
    }

    #[test]
    fn test_remove_unknown_policy() {
        let (store, _) = store();
        assert!(matches!(
            store.remove_current_policy(PolicyId(9)),
            Err(OsdfError::PolicyNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_rules_allowed() {
        let (store, _) = store();
        let p = store.create_current(|_| policy("a")).unwrap();
        let r = rule("of:1", 1);
        store.add_flow_rule(p.id(), r.clone());
        store.add_flow_rule(p.id(), r);
        assert_eq!(store.rules_count(p.id()), 2);
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let (store, _) = store();
        let recorder = Arc::new(RecordingListener::new());
        store.add_listener(recorder.clone());

        let p = store.create_current(|_| policy("a")).unwrap();
        store.transition(p.id(), PolicyState::Installed).unwrap();
        store.remove_current_policy(p.id()).unwrap();

        assert_eq!(
            recorder.kinds(),
            vec![PolicyState::InstallReq, PolicyState::Installed, PolicyState::Withdrawn]
        );
        assert_eq!(store.version(), 3);
    }

    #[test]
    fn test_add_current_notifies_restore_does_not() {
        let (store, _) = store();
        let recorder = Arc::new(RecordingListener::new());
        store.add_listener(recorder.clone());

        store.restore_current(policy("a").unwrap().with_id(PolicyId(3)));
        assert_eq!(store.len(), 1);
        assert!(recorder.events().is_empty());
        assert_eq!(store.version(), 0);

        store.add_current(policy("b").unwrap().with_id(PolicyId(4)));
        assert_eq!(recorder.kinds(), vec![PolicyState::InstallReq]);
        assert_eq!(store.version(), 1);

        // restored ids stay reserved
        let created = store.create_current(|_| policy("c")).unwrap();
        assert_eq!(created.id(), PolicyId(0));
        assert!(store.get_policy(PolicyId(3)).is_ok());
    }

    #[test]
    fn test_pending_promotion() {
        let (store, _) = store();
        let parked = policy("p").unwrap().with_id(PolicyId(0));
        store.add_pending(parked);
        assert_eq!(store.pending_policies().len(), 1);
        assert!(store.get_policy(PolicyId(0)).is_err());

        // pending ids are reserved
        let created = store.create_current(|_| policy("q")).unwrap();
        assert_eq!(created.id(), PolicyId(1));

        store.promote_pending(PolicyId(0)).unwrap();
        assert!(store.pending_policies().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_policy_str() {
        let (store, _) = store();
        store.create_current(|_| policy("a")).unwrap();
        assert!(store.get_policy_str("0").is_ok());
        assert!(matches!(store.get_policy_str("x"), Err(OsdfError::PolicyNotFound(_))));
        assert!(matches!(store.get_policy_str("4"), Err(OsdfError::PolicyNotFound(_))));
    }

    #[test]
    fn test_concurrent_creates_get_unique_ids() {
        let (store, _) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| store.create_current(|_| policy(&format!("{}-{}", t, i))).unwrap().id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(store.len(), 200);
    }
}

//! Administrative policy operations
//!
//! Text-in, typed-out: requests carry the raw tokens an operator typed, and
//! malformed tokens are reported before anything reaches the store.

use osdf_common::{
    ApplicationType, ConnectPoint, FlowRule, HostId, OsdfError, OsdfResult, PathSelectionAlgo,
    Policy, PolicyAction, PolicyId, RegionId, TrafficProfile, DEFAULT_PRIORITY,
};
use osdf_policy::PolicyStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Policy creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePolicyRequest {
    /// Traffic profile name
    pub profile_name: String,
    /// Application type name, WEB when absent
    pub application: Option<String>,
    /// Priority, 50 when absent
    pub priority: Option<String>,
    /// Comma-separated connect points the path must visit
    pub partial_path: Option<String>,
    /// Path selection algorithm name
    pub path_selection: Option<String>,
    /// Source region (and destination region for intra policies)
    pub region: String,
    /// Destination region for inter policies
    pub dst_region: Option<String>,
    /// `intra` or `inter`, intra when absent
    pub action: Option<String>,
    /// Comma-separated source host ids
    pub src_hosts: Option<String>,
    /// Comma-separated destination host ids
    pub dst_hosts: Option<String>,
}

impl CreatePolicyRequest {
    /// Request with only the mandatory fields
    pub fn new(profile_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            region: region.into(),
            ..Self::default()
        }
    }
}

/// One row of a policy listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    /// Policy id
    pub id: u32,
    /// Traffic profile name
    pub profile_name: String,
    /// Rule priority
    pub priority: u16,
    /// Application type
    pub application: String,
    /// Partial path connect points
    pub devices: Vec<String>,
    /// Source hosts
    pub src_hosts: Vec<String>,
    /// Destination hosts
    pub dst_hosts: Vec<String>,
    /// Source region
    pub src_region: String,
    /// Destination region
    pub dst_region: String,
    /// Dispatch class
    pub action: String,
    /// Path selection algorithm
    pub path_selection: String,
    /// Lifecycle state
    pub state: String,
    /// Rules currently owned
    pub rules: usize,
}

impl PolicySummary {
    fn of(policy: &Policy, rules: usize) -> Self {
        fn strings<T: ToString>(items: &[T]) -> Vec<String> {
            items.iter().map(ToString::to_string).collect()
        }
        Self {
            id: policy.id().value(),
            profile_name: policy.traffic_profile().name().to_string(),
            priority: policy.priority(),
            application: policy.application().to_string(),
            devices: strings(policy.partial_path()),
            src_hosts: strings(policy.src_hosts()),
            dst_hosts: strings(policy.dst_hosts()),
            src_region: policy.src_region().to_string(),
            dst_region: policy.dst_region().to_string(),
            action: policy.action().to_string(),
            path_selection: policy.path_selection().to_string(),
            state: policy.state().to_string(),
            rules,
        }
    }
}

/// Rules owned by one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRules {
    /// Owner
    pub policy: PolicyId,
    /// Rules
    pub rules: Vec<FlowRule>,
}

/// Serializable copy of a policy store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Current policies
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Rule ownership
    #[serde(default)]
    pub rules: Vec<OwnedRules>,
}

impl StoreSnapshot {
    /// Copy the current policies and their rules
    pub fn capture(store: &PolicyStore) -> Self {
        let policies: Vec<Policy> = store.current_policies().iter().map(|p| (**p).clone()).collect();
        let rules = policies
            .iter()
            .map(|p| OwnedRules {
                policy: p.id(),
                rules: store.flow_rules_for_policy(p.id()),
            })
            .filter(|owned| !owned.rules.is_empty())
            .collect();
        Self { policies, rules }
    }

    /// Load into `store`, keeping ids; rules are recorded, not re-applied
    ///
    /// No lifecycle events are emitted.
    pub fn restore(self, store: &PolicyStore) {
        for policy in self.policies {
            store.restore_current(policy);
        }
        for owned in self.rules {
            for rule in owned.rules {
                store.add_flow_rule(owned.policy, rule);
            }
        }
    }
}

/// Create, list and remove policies
pub struct PolicyAdmin {
    store: Arc<PolicyStore>,
}

impl PolicyAdmin {
    /// Create over `store`
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Validate a request and add the policy as current
    pub fn create_policy(&self, req: &CreatePolicyRequest) -> OsdfResult<Arc<Policy>> {
        let application = match req.application.as_deref() {
            Some(name) => name.parse::<ApplicationType>()?,
            None => ApplicationType::Web,
        };
        let priority = match req.priority.as_deref() {
            Some(p) => p
                .trim()
                .parse::<u32>()
                .map_err(|_| OsdfError::InvalidPolicy(format!("priority '{}' is not a number", p)))?,
            None => DEFAULT_PRIORITY,
        };
        let action = match req.action.as_deref() {
            Some(a) => a.parse::<PolicyAction>()?,
            None => PolicyAction::IntraRoute,
        };
        let partial_path = parse_opt(req.partial_path.as_deref(), ConnectPoint::parse_list)?;
        let src_hosts = parse_opt(req.src_hosts.as_deref(), HostId::parse_list)?;
        let dst_hosts = parse_opt(req.dst_hosts.as_deref(), HostId::parse_list)?;
        let path_selection = req
            .path_selection
            .as_deref()
            .map(PathSelectionAlgo::parse_lenient)
            .unwrap_or_default();

        let src_region = RegionId::new(req.region.trim());
        let dst_region = match req.dst_region.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => RegionId::new(r),
            _ => src_region.clone(),
        };
        match action {
            PolicyAction::IntraRoute if src_region != dst_region => {
                return Err(OsdfError::InvalidPolicy(format!(
                    "intra-route policy spans regions {} and {}",
                    src_region, dst_region
                )));
            }
            PolicyAction::InterRoute if src_region == dst_region => {
                return Err(OsdfError::InvalidPolicy(
                    "inter-route policy needs a distinct destination region".into(),
                ));
            }
            _ => {}
        }

        let profile = TrafficProfile::new(req.profile_name.trim(), application);
        let policy = self.store.create_current(|id| {
            Policy::builder(profile)
                .id(id)
                .priority(priority)
                .action(action)
                .regions(src_region, dst_region)
                .partial_path(partial_path)
                .path_selection(path_selection)
                .src_hosts(src_hosts)
                .dst_hosts(dst_hosts)
                .build()
        })?;
        Ok(policy)
    }

    /// Summaries of current policies ordered by id
    pub fn list_policies(&self) -> Vec<PolicySummary> {
        self.store
            .current_policies()
            .iter()
            .map(|p| PolicySummary::of(p, self.store.rules_count(p.id())))
            .collect()
    }

    /// Summary of one policy by textual id
    pub fn get_policy(&self, id: &str) -> OsdfResult<PolicySummary> {
        let policy = self.store.get_policy_str(id)?;
        Ok(PolicySummary::of(&policy, self.store.rules_count(policy.id())))
    }

    /// Remove a policy by textual id, returning the rules withdrawn
    pub fn remove_policy(&self, id: &str) -> OsdfResult<usize> {
        let id: PolicyId = id.parse()?;
        let withdrawn = self.store.remove_current_policy(id)?;
        info!("Policy {} removed by operator", id);
        Ok(withdrawn)
    }
}

fn parse_opt<T>(raw: Option<&str>, parse: fn(&str) -> OsdfResult<Vec<T>>) -> OsdfResult<Vec<T>> {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => parse(s),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osdf_common::memory::MemoryFlowRuleService;
    use osdf_common::{DeviceId, MatchSpec, PolicyState, PortNumber, RecordingListener, Treatment};

    fn admin() -> (PolicyAdmin, Arc<PolicyStore>) {
        let store = Arc::new(PolicyStore::new(Arc::new(MemoryFlowRuleService::new())));
        (PolicyAdmin::new(store.clone()), store)
    }

    #[test]
    fn test_create_defaults() {
        let (admin, _) = admin();
        let policy = admin.create_policy(&CreatePolicyRequest::new("profile1", "r1")).unwrap();
        assert_eq!(policy.id(), PolicyId(0));
        assert_eq!(policy.name(), "WEB:profile1");
        assert_eq!(policy.priority(), 50);
        assert_eq!(policy.action(), PolicyAction::IntraRoute);
        assert_eq!(policy.path_selection(), PathSelectionAlgo::BestPossiblePath);
        assert_eq!(policy.state(), PolicyState::InstallReq);
    }

    #[test]
    fn test_create_full_request() {
        let (admin, _) = admin();
        let req = CreatePolicyRequest {
            application: Some("ping".into()),
            priority: Some("700".into()),
            partial_path: Some("of:1/2, of:3/4".into()),
            path_selection: Some("random".into()),
            dst_region: Some("r2".into()),
            action: Some("inter".into()),
            src_hosts: Some("00:00:00:00:00:01/None".into()),
            ..CreatePolicyRequest::new("p", "r1")
        };
        let policy = admin.create_policy(&req).unwrap();
        assert_eq!(policy.name(), "PING:p");
        assert_eq!(policy.priority(), 700);
        assert_eq!(policy.partial_path(), &[ConnectPoint::new("of:1", 2), ConnectPoint::new("of:3", 4)]);
        assert_eq!(policy.path_selection(), PathSelectionAlgo::Random);
        assert_eq!(policy.dst_region(), &RegionId::new("r2"));
        assert_eq!(policy.src_hosts().len(), 1);
        assert!(policy.dst_hosts().is_empty());
    }

    #[test]
    fn test_create_rejects_bad_tokens() {
        let (admin, store) = admin();
        let bad = [
            CreatePolicyRequest {
                priority: Some("0".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest {
                priority: Some("high".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest {
                application: Some("gopher".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest {
                partial_path: Some("of:1".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest {
                dst_hosts: Some("not-a-mac".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest::new("p", ""),
            CreatePolicyRequest {
                dst_region: Some("r2".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
            CreatePolicyRequest {
                action: Some("inter".into()),
                ..CreatePolicyRequest::new("p", "r1")
            },
        ];
        for req in &bad {
            assert!(admin.create_policy(req).is_err(), "{:?}", req);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_get_remove() {
        let (admin, store) = admin();
        let listener = Arc::new(RecordingListener::new());
        store.add_listener(listener.clone());

        admin.create_policy(&CreatePolicyRequest::new("a", "r1")).unwrap();
        admin.create_policy(&CreatePolicyRequest::new("b", "r1")).unwrap();
        let rule = FlowRule::builder(DeviceId::new("of:1"))
            .selector(MatchSpec::new())
            .treatment(Treatment::output(PortNumber(1)))
            .build();
        assert!(store.install_flow_rule(PolicyId(1), rule));

        let list = admin.list_policies();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].profile_name, "b");
        assert_eq!(list[1].rules, 1);
        assert_eq!(admin.get_policy("1").unwrap().application, "WEB");

        assert_eq!(admin.remove_policy("1").unwrap(), 1);
        assert!(matches!(admin.get_policy("1"), Err(OsdfError::PolicyNotFound(_))));
        assert!(admin.remove_policy("1").is_err());
        assert!(admin.remove_policy("x").is_err());
        assert_eq!(
            listener.kinds(),
            vec![PolicyState::InstallReq, PolicyState::InstallReq, PolicyState::Withdrawn]
        );

        // freed id is reused
        let again = admin.create_policy(&CreatePolicyRequest::new("c", "r1")).unwrap();
        assert_eq!(again.id(), PolicyId(1));
    }

    #[test]
    fn test_snapshot_restore() {
        let (admin, store) = admin();
        admin.create_policy(&CreatePolicyRequest::new("a", "r1")).unwrap();
        let rule = FlowRule::builder(DeviceId::new("of:1"))
            .treatment(Treatment::output(PortNumber(3)))
            .build();
        store.install_flow_rule(PolicyId(0), rule.clone());

        let json = serde_json::to_string(&StoreSnapshot::capture(&store)).unwrap();
        let snapshot: StoreSnapshot = serde_json::from_str(&json).unwrap();

        let (_, restored) = self::admin();
        let listener = Arc::new(RecordingListener::new());
        restored.add_listener(listener.clone());
        snapshot.restore(&restored);
        assert!(listener.events().is_empty());
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.flow_rules_for_policy(PolicyId(0)), vec![rule]);
        assert_eq!(restored.get_policy(PolicyId(0)).unwrap().name(), "WEB:a");
    }
}

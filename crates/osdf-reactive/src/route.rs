//! Route actions
//!
//! A route action turns one `(policy, packet)` pair into forwarding rules
//! along a selected path. Every rule goes through
//! [`PolicyStore::install_flow_rule`], which both programs the backend and
//! records ownership, and refuses once the policy has been removed.
//!
//! Rules are installed hop by hop: each link's source device forwards out of
//! the link's source port, and the destination device forwards out of the
//! destination host's port. On a multi-hop path the inter-region action
//! additionally rewrites the destination MAC on the first hop, because such
//! traffic is addressed to the gateway rather than to the real host. When
//! both hosts share a device the single rule only outputs.

use crate::config::ReactiveConfig;
use crate::selector::{RouteClass, SelectorBuilder};
use osdf_common::{
    ConnectPoint, DeviceId, EthernetFrame, FlowRule, Host, HostId, HostService, MacAddress,
    MatchSpec, Policy, RuleTimeout, TopologyService, Treatment,
};
use osdf_path::PathSelector;
use osdf_policy::PolicyStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of executing a route action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Rules installed
    Installed {
        /// Rules installed for this packet
        rules: usize,
        /// False when the partial-path constraint could not be honored
        constraint_met: bool,
    },
    /// No selector for this packet under this policy
    NoSelector,
    /// Source host not known
    SourceUnknown,
    /// Destination host not known; discovery was requested
    DestinationUnknown,
    /// No path between the two devices
    NoPath,
    /// Policy was removed while installing
    Withdrawn,
}

/// Shared collaborators for route actions
#[derive(Clone)]
pub struct RouteContext {
    /// Engine switches and rule constants
    pub config: Arc<ReactiveConfig>,
    /// Policy table and rule ownership
    pub store: Arc<PolicyStore>,
    /// Host tracking
    pub hosts: Arc<dyn HostService>,
    /// Candidate paths
    pub topology: Arc<dyn TopologyService>,
    /// Match construction
    pub selectors: Arc<SelectorBuilder>,
    /// Path choice
    pub paths: Arc<PathSelector>,
}

/// Installs rules realizing a policy for a packet
pub trait RouteAction: Send + Sync {
    /// Dispatch class handled by this action
    fn class(&self) -> RouteClass;

    /// Handle one packet governed by `policy`
    fn execute(&self, policy: &Policy, frame: &EthernetFrame) -> RouteOutcome;
}

/// Intra-region forwarding
pub struct IntraRouteAction {
    ctx: RouteContext,
}

impl IntraRouteAction {
    /// Create action
    pub fn new(ctx: RouteContext) -> Self {
        Self { ctx }
    }
}

impl RouteAction for IntraRouteAction {
    fn class(&self) -> RouteClass {
        RouteClass::Intra
    }

    fn execute(&self, policy: &Policy, frame: &EthernetFrame) -> RouteOutcome {
        let Some(ip) = frame.ipv4() else {
            return RouteOutcome::NoSelector;
        };

        let dst_id = HostId::from_mac(frame.dst_mac);
        let Some(dst) = self.ctx.hosts.host(&dst_id) else {
            debug!("Destination {} unknown, probing {}", dst_id, ip.dst);
            self.ctx.hosts.start_monitoring_ip(ip.dst);
            return RouteOutcome::DestinationUnknown;
        };
        let Some(src) = self.ctx.hosts.host(&HostId::from_mac(frame.src_mac)) else {
            return RouteOutcome::SourceUnknown;
        };

        let Some(selector) = self.ctx.selectors.build(RouteClass::Intra, frame, policy, dst_id) else {
            return RouteOutcome::NoSelector;
        };

        Installer::new(&self.ctx, policy, RuleTimeout::Idle(self.ctx.config.intra_idle_timeout))
            .install_path(&src, &dst, selector, None)
    }
}

/// Inter-region forwarding
pub struct InterRouteAction {
    ctx: RouteContext,
}

impl InterRouteAction {
    /// Create action
    pub fn new(ctx: RouteContext) -> Self {
        Self { ctx }
    }

    fn resolve_source(&self, frame: &EthernetFrame) -> Option<Host> {
        if let Some(host) = self.ctx.hosts.host(&HostId::from_mac(frame.src_mac)) {
            return Some(host);
        }
        let ip = frame.ipv4()?;
        self.ctx.hosts.hosts_by_ip(ip.src).into_iter().next()
    }
}

impl RouteAction for InterRouteAction {
    fn class(&self) -> RouteClass {
        RouteClass::Inter
    }

    fn execute(&self, policy: &Policy, frame: &EthernetFrame) -> RouteOutcome {
        let Some(ip) = frame.ipv4() else {
            return RouteOutcome::NoSelector;
        };

        // the frame may be addressed to a gateway, so resolve by IP
        let Some(dst) = self.ctx.hosts.hosts_by_ip(ip.dst).into_iter().next() else {
            debug!("No host owns {}, probing", ip.dst);
            self.ctx.hosts.start_monitoring_ip(ip.dst);
            return RouteOutcome::DestinationUnknown;
        };
        let Some(src) = self.resolve_source(frame) else {
            return RouteOutcome::SourceUnknown;
        };

        let Some(selector) = self.ctx.selectors.build(RouteClass::Inter, frame, policy, dst.id) else {
            return RouteOutcome::NoSelector;
        };

        let rewrite = dst.mac();
        Installer::new(&self.ctx, policy, RuleTimeout::Idle(self.ctx.config.inter_idle_timeout))
            .install_path(&src, &dst, selector, Some(rewrite))
    }
}

struct Installer<'a> {
    ctx: &'a RouteContext,
    policy: &'a Policy,
    timeout: RuleTimeout,
    installed: usize,
}

impl<'a> Installer<'a> {
    fn new(ctx: &'a RouteContext, policy: &'a Policy, timeout: RuleTimeout) -> Self {
        Self {
            ctx,
            policy,
            timeout,
            installed: 0,
        }
    }

    /// Install along the selected path; `rewrite` sets the destination MAC on the first link hop
    fn install_path(
        mut self,
        src: &Host,
        dst: &Host,
        selector: MatchSpec,
        rewrite: Option<MacAddress>,
    ) -> RouteOutcome {
        let src_device = &src.location.device_id;
        let dst_device = &dst.location.device_id;

        if src_device == dst_device {
            let treatment = Treatment::output(dst.location.port);
            if !self.install(dst_device, &selector, treatment) {
                return RouteOutcome::Withdrawn;
            }
            return self.done(true);
        }

        let candidates = self.ctx.topology.paths(src_device, dst_device);
        let Some(selected) = self.ctx.paths.select_for(&candidates, self.policy) else {
            debug!("No path {} -> {} for policy {}", src_device, dst_device, self.policy.id());
            return RouteOutcome::NoPath;
        };

        for (hop, link) in selected.path.links.iter().enumerate() {
            let treatment = if hop == 0 {
                Self::treatment(rewrite, &link.src)
            } else {
                Treatment::output(link.src.port)
            };
            if !self.install(&link.src.device_id, &selector, treatment) {
                return RouteOutcome::Withdrawn;
            }
        }
        if !self.install(dst_device, &selector, Treatment::output(dst.location.port)) {
            return RouteOutcome::Withdrawn;
        }

        self.done(selected.constraint_met())
    }

    fn treatment(rewrite: Option<MacAddress>, out: &ConnectPoint) -> Treatment {
        match rewrite {
            Some(mac) => Treatment::rewrite_and_output(mac, out.port),
            None => Treatment::output(out.port),
        }
    }

    fn install(&mut self, device: &DeviceId, selector: &MatchSpec, treatment: Treatment) -> bool {
        let rule = FlowRule::builder(device.clone())
            .selector(selector.clone())
            .treatment(treatment)
            .priority(self.policy.priority())
            .timeout(self.timeout)
            .table(self.ctx.config.table_id)
            .app(self.ctx.config.app_id.clone())
            .build();
        trace!("Policy {} rule {} on {}", self.policy.id(), rule.id, device);
        if !self.ctx.store.install_flow_rule(self.policy.id(), rule) {
            return false;
        }
        self.installed += 1;
        true
    }

    fn done(self, constraint_met: bool) -> RouteOutcome {
        RouteOutcome::Installed {
            rules: self.installed,
            constraint_met,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osdf_common::memory::{MemoryFlowRuleService, MemoryHostService};
    use osdf_common::{
        ApplicationType, FrameBuilder, Instruction, Link, PolicyAction, PortNumber, TrafficProfile,
    };
    use osdf_path::TopologyGraph;
    use std::net::Ipv4Addr;

    fn mac(n: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, n])
    }

    fn ip(subnet: u8, n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, subnet, n)
    }

    struct Fixture {
        ctx: RouteContext,
        backend: Arc<MemoryFlowRuleService>,
        hosts: Arc<MemoryHostService>,
    }

    /// Line topology a - b - c, hosts 1 on a:1, 2 on a:2, 3 on c:1
    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryFlowRuleService::new());
        let hosts = Arc::new(MemoryHostService::with_hosts([
            Host::new(mac(1), vec![ip(1, 1)], ConnectPoint::new("a", 1)),
            Host::new(mac(2), vec![ip(1, 2)], ConnectPoint::new("a", 2)),
            Host::new(mac(3), vec![ip(2, 3)], ConnectPoint::new("c", 1)),
        ]));
        let topology = Arc::new(TopologyGraph::new());
        topology.add_bidirectional(Link::new(ConnectPoint::new("a", 10), ConnectPoint::new("b", 10)));
        topology.add_bidirectional(Link::new(ConnectPoint::new("b", 11), ConnectPoint::new("c", 11)));

        let config = Arc::new(ReactiveConfig::default());
        let ctx = RouteContext {
            config: config.clone(),
            store: Arc::new(PolicyStore::new(backend.clone())),
            hosts: hosts.clone(),
            topology,
            selectors: Arc::new(SelectorBuilder::new(config)),
            paths: Arc::new(PathSelector::new()),
        };
        Fixture { ctx, backend, hosts }
    }

    fn web_policy(store: &PolicyStore, action: PolicyAction) -> Arc<Policy> {
        store
            .create_current(|_| {
                let builder = Policy::builder(TrafficProfile::new("p", ApplicationType::Web)).action(action);
                match action {
                    PolicyAction::IntraRoute => builder.region("r1"),
                    PolicyAction::InterRoute => builder.regions("r1", "r2"),
                }
                .build()
            })
            .unwrap()
    }

    fn tcp(src: (u8, Ipv4Addr), dst: (u8, Ipv4Addr)) -> EthernetFrame {
        EthernetFrame::parse(&FrameBuilder::new(mac(src.0), mac(dst.0)).tcp(src.1, dst.1, 40000, 80)).unwrap()
    }

    #[test]
    fn test_intra_same_device_single_rule() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::IntraRoute);
        let action = IntraRouteAction::new(f.ctx.clone());

        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (2, ip(1, 2))));
        assert_eq!(outcome, RouteOutcome::Installed { rules: 1, constraint_met: true });

        let rules = f.ctx.store.flow_rules_for_policy(policy.id());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device_id, DeviceId::new("a"));
        assert_eq!(rules[0].treatment.output_port(), Some(PortNumber(2)));
        assert_eq!(rules[0].timeout, RuleTimeout::Idle(100));
        assert_eq!(rules[0].priority, 50);
        assert_eq!(f.backend.rule_count(), 1);
    }

    #[test]
    fn test_intra_multi_hop() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::IntraRoute);
        let action = IntraRouteAction::new(f.ctx.clone());

        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (3, ip(2, 3))));
        assert_eq!(outcome, RouteOutcome::Installed { rules: 3, constraint_met: true });

        let rules = f.ctx.store.flow_rules_for_policy(policy.id());
        let hops: Vec<_> = rules
            .iter()
            .map(|r| (r.device_id.as_str().to_string(), r.treatment.output_port()))
            .collect();
        assert_eq!(
            hops,
            vec![
                ("a".to_string(), Some(PortNumber(10))),
                ("b".to_string(), Some(PortNumber(11))),
                ("c".to_string(), Some(PortNumber(1))),
            ]
        );
    }

    #[test]
    fn test_intra_unknown_destination_probes() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::IntraRoute);
        let action = IntraRouteAction::new(f.ctx.clone());

        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (9, ip(1, 9))));
        assert_eq!(outcome, RouteOutcome::DestinationUnknown);
        assert_eq!(f.hosts.monitored_ips(), vec![ip(1, 9)]);
        assert_eq!(f.backend.rule_count(), 0);
    }

    #[test]
    fn test_inter_rewrites_first_hop() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::InterRoute);
        let action = InterRouteAction::new(f.ctx.clone());

        // addressed to the gateway MAC, real destination is host 3
        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (0xfe, ip(2, 3))));
        assert_eq!(outcome, RouteOutcome::Installed { rules: 3, constraint_met: true });

        let rules = f.ctx.store.flow_rules_for_policy(policy.id());
        assert_eq!(
            rules[0].treatment.instructions(),
            &[Instruction::SetEthDst(mac(3)), Instruction::Output(PortNumber(10))]
        );
        assert_eq!(rules[1].treatment.instructions(), &[Instruction::Output(PortNumber(11))]);
        assert!(rules.iter().all(|r| r.timeout == RuleTimeout::Idle(100)));
    }

    #[test]
    fn test_inter_same_device_only_outputs() {
        let f = fixture();
        f.hosts.add_host(Host::new(mac(4), vec![ip(2, 4)], ConnectPoint::new("a", 4)));
        let policy = web_policy(&f.ctx.store, PolicyAction::InterRoute);
        let action = InterRouteAction::new(f.ctx.clone());

        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (0xfe, ip(2, 4))));
        assert_eq!(outcome, RouteOutcome::Installed { rules: 1, constraint_met: true });

        let rules = f.backend.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device_id, DeviceId::new("a"));
        assert_eq!(rules[0].treatment.instructions(), &[Instruction::Output(PortNumber(4))]);
        assert_eq!(rules[0].timeout, RuleTimeout::Idle(100));
    }

    #[test]
    fn test_inter_unknown_destination_probes() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::InterRoute);
        let action = InterRouteAction::new(f.ctx.clone());

        let outcome = action.execute(&policy, &tcp((1, ip(1, 1)), (0xfe, ip(2, 77))));
        assert_eq!(outcome, RouteOutcome::DestinationUnknown);
        assert_eq!(f.hosts.monitored_ips(), vec![ip(2, 77)]);
    }

    #[test]
    fn test_no_path_and_unsupported_app() {
        let f = fixture();
        f.hosts.add_host(Host::new(mac(5), vec![ip(1, 5)], ConnectPoint::new("island", 1)));
        let policy = web_policy(&f.ctx.store, PolicyAction::IntraRoute);
        let action = IntraRouteAction::new(f.ctx.clone());
        assert_eq!(action.execute(&policy, &tcp((1, ip(1, 1)), (5, ip(1, 5)))), RouteOutcome::NoPath);

        let ftp = f
            .ctx
            .store
            .create_current(|_| Policy::builder(TrafficProfile::new("f", ApplicationType::Ftp)).region("r1").build())
            .unwrap();
        assert_eq!(action.execute(&ftp, &tcp((1, ip(1, 1)), (2, ip(1, 2)))), RouteOutcome::NoSelector);
    }

    #[test]
    fn test_withdrawn_policy_installs_nothing() {
        let f = fixture();
        let policy = web_policy(&f.ctx.store, PolicyAction::IntraRoute);
        f.ctx.store.remove_current_policy(policy.id()).unwrap();

        let action = IntraRouteAction::new(f.ctx.clone());
        assert_eq!(
            action.execute(&policy, &tcp((1, ip(1, 1)), (2, ip(1, 2)))),
            RouteOutcome::Withdrawn
        );
        assert_eq!(f.backend.rule_count(), 0);
    }
}

//! Reactive engine
//!
//! Wires the classifier, route actions and collaborators together, owns the
//! packet intercepts, and drives packet processing from a channel.

use crate::classifier::{Disposition, PacketClassifier};
use crate::config::ReactiveConfig;
use crate::gateway::VirtualGatewayResponder;
use crate::route::{InterRouteAction, IntraRouteAction, RouteAction, RouteContext};
use crate::selector::SelectorBuilder;
use osdf_common::packet::ether_type;
use osdf_common::{
    FlowRuleService, HostService, InboundPacket, LoggingListener, PacketPriority, PacketService,
    RegionService, TopologyService,
};
use osdf_path::{PathSelector, SelectorStats};
use osdf_policy::PolicyStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// External collaborators
#[derive(Clone)]
pub struct Collaborators {
    /// Flow-rule backend
    pub flow_rules: Arc<dyn FlowRuleService>,
    /// Host tracking
    pub hosts: Arc<dyn HostService>,
    /// Topology queries
    pub topology: Arc<dyn TopologyService>,
    /// Packet transport
    pub packets: Arc<dyn PacketService>,
    /// Region configuration
    pub regions: Arc<dyn RegionService>,
}

/// Engine counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Packets classified
    pub packets_seen: u64,
    /// Discovery packets dropped
    pub control_dropped: u64,
    /// Packets neither ARP nor IPv4
    pub non_ipv4_dropped: u64,
    /// Gateway ARP replies sent
    pub arp_replies: u64,
    /// Packets without a source or destination region
    pub unknown_region: u64,
    /// Policy executions
    pub policy_matches: u64,
    /// Rules installed
    pub rules_installed: u64,
    /// Executions abandoned for an unknown host
    pub hosts_unknown: u64,
    /// Executions without a selector
    pub selectors_rejected: u64,
    /// Paths chosen without honoring the partial path
    pub path_fallbacks: u64,
    /// Path selector counters
    pub path_selection: SelectorStats,
}

/// Policy-driven reactive forwarding engine
pub struct ReactiveEngine {
    config: Arc<ReactiveConfig>,
    services: Collaborators,
    store: Arc<PolicyStore>,
    paths: Arc<PathSelector>,
    classifier: PacketClassifier,
    active: AtomicBool,
}

impl ReactiveEngine {
    /// Create engine with an empty policy store
    pub fn new(config: ReactiveConfig, services: Collaborators) -> Self {
        let store = Arc::new(PolicyStore::new(services.flow_rules.clone()));
        store.add_listener(Arc::new(LoggingListener));
        Self::with_store(config, services, store)
    }

    /// Create engine over an existing policy store
    pub fn with_store(config: ReactiveConfig, services: Collaborators, store: Arc<PolicyStore>) -> Self {
        let config = Arc::new(config);
        let paths = Arc::new(PathSelector::new());
        let ctx = RouteContext {
            config: config.clone(),
            store: store.clone(),
            hosts: services.hosts.clone(),
            topology: services.topology.clone(),
            selectors: Arc::new(SelectorBuilder::new(config.clone())),
            paths: paths.clone(),
        };
        let actions: Vec<Box<dyn RouteAction>> = vec![
            Box::new(IntraRouteAction::new(ctx.clone())),
            Box::new(InterRouteAction::new(ctx)),
        ];
        let gateway = VirtualGatewayResponder::new(services.regions.clone(), services.packets.clone());
        let classifier = PacketClassifier::new(
            config.clone(),
            store.clone(),
            services.regions.clone(),
            gateway,
            actions,
        );

        Self {
            config,
            services,
            store,
            paths,
            classifier,
            active: AtomicBool::new(false),
        }
    }

    /// Policy store
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Engine configuration
    pub fn config(&self) -> &ReactiveConfig {
        &self.config
    }

    /// Request IPv4 and ARP packet-ins
    pub fn activate(&self) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        for et in [ether_type::IPV4, ether_type::ARP] {
            self.services
                .packets
                .request_packets(et, PacketPriority::Reactive, &self.config.app_id);
        }
        info!("Reactive engine {} activated", self.config.app_id);
    }

    /// Withdraw the packet-in requests
    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        for et in [ether_type::IPV4, ether_type::ARP] {
            self.services
                .packets
                .cancel_packets(et, PacketPriority::Reactive, &self.config.app_id);
        }
        info!("Reactive engine {} deactivated", self.config.app_id);
    }

    /// True between activate and deactivate
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Process one packet to completion
    pub fn process(&self, pkt: &InboundPacket) -> Disposition {
        self.classifier.classify(pkt)
    }

    /// Process packets from `rx`, each on its own task
    ///
    /// Returns the number of packets processed once the channel is closed
    /// and every in-flight packet has finished.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundPacket>) -> u64 {
        let mut tasks = JoinSet::new();
        let mut processed = 0u64;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(pkt) => {
                        let engine = self.clone();
                        tasks.spawn(async move { engine.process(&pkt) });
                    }
                    None => break,
                },
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    processed += Self::finished(done);
                }
            }
        }

        while let Some(done) = tasks.join_next().await {
            processed += Self::finished(done);
        }
        debug!("Packet channel closed after {} packets", processed);
        processed
    }

    fn finished(done: Result<Disposition, tokio::task::JoinError>) -> u64 {
        match done {
            Ok(disposition) => {
                debug!("Packet done: {:?}", disposition);
                1
            }
            Err(e) => {
                warn!("Packet task failed: {}", e);
                0
            }
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> EngineStats {
        let c = &self.classifier.counters;
        EngineStats {
            packets_seen: c.packets.get(),
            control_dropped: c.control.get(),
            non_ipv4_dropped: c.not_ipv4.get(),
            arp_replies: self.classifier.gateway().replies(),
            unknown_region: c.unknown_region.get(),
            policy_matches: c.policy_matches.get(),
            rules_installed: c.rules_installed.get(),
            hosts_unknown: c.hosts_unknown.get(),
            selectors_rejected: c.selectors_rejected.get(),
            path_fallbacks: c.path_fallbacks.get(),
            path_selection: self.paths.stats(),
        }
    }
}

impl Drop for ReactiveEngine {
    fn drop(&mut self) {
        self.deactivate();
    }
}

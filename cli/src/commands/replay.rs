//! Replay command
//!
//! Builds the engine over in-memory collaborators described by a scenario
//! file, pushes the scenario's frames through it against the stored
//! policies, and saves the resulting rule ownership.

use super::Context;
use crate::output::{stat_rows, OutputFormat, RuleRow};
use anyhow::{anyhow, Context as _, Result};
use colored::Colorize;
use osdf_common::memory::{MemoryFlowRuleService, MemoryHostService, MemoryPacketService};
use osdf_common::{ConnectPoint, Host, InboundPacket, Link};
use osdf_path::TopologyGraph;
use osdf_reactive::admin::OwnedRules;
use osdf_reactive::{Collaborators, EngineStats, ReactiveConfig, ReactiveEngine, RegionConfig, RegionDirectory};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub regions: RegionConfig,
    #[serde(default)]
    pub engine: Option<ReactiveConfig>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Add the reverse of every link
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub packets: Vec<ScenarioPacket>,
}

fn default_bidirectional() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ScenarioPacket {
    pub receiver: ConnectPoint,
    /// Hex-encoded Ethernet frame; whitespace and ':' are ignored
    pub frame: String,
}

impl ScenarioPacket {
    fn decode(&self) -> Result<InboundPacket> {
        let cleaned: String = self
            .frame
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let raw = hex::decode(&cleaned).with_context(|| format!("bad frame hex for {}", self.receiver))?;
        Ok(InboundPacket::new(self.receiver.clone(), raw))
    }
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    processed: u64,
    arp_replies_emitted: usize,
    rules: Vec<OwnedRules>,
    stats: EngineStats,
}

fn engine_config(explicit: Option<&Path>, scenario: Option<ReactiveConfig>, ctx: &Context) -> Result<ReactiveConfig> {
    let config = match (explicit, scenario, &ctx.config.engine_config) {
        (Some(path), _, _) => ReactiveConfig::load(path)?,
        (None, Some(config), _) => config,
        (None, None, Some(path)) => ReactiveConfig::load_or_default(path),
        (None, None, None) => ReactiveConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

pub async fn handle(path: &Path, explicit_config: Option<&Path>, ctx: &Context) -> Result<()> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    let config = engine_config(explicit_config, scenario.engine.clone(), ctx)?;
    let frames = scenario
        .packets
        .iter()
        .map(ScenarioPacket::decode)
        .collect::<Result<Vec<_>>>()?;

    let backend = Arc::new(MemoryFlowRuleService::new());
    let store = ctx.load_store(backend.clone())?;
    let topology = Arc::new(TopologyGraph::new());
    for link in &scenario.links {
        if scenario.bidirectional {
            topology.add_bidirectional(link.clone());
        } else {
            topology.add_link(link.clone());
        }
    }
    let packets = Arc::new(MemoryPacketService::new());
    let services = Collaborators {
        flow_rules: backend.clone(),
        hosts: Arc::new(MemoryHostService::with_hosts(scenario.hosts.iter().cloned())),
        topology,
        packets: packets.clone(),
        regions: Arc::new(RegionDirectory::new(&scenario.regions)),
    };
    info!(
        "Replaying {} frames over {} links, {} hosts, {} policies",
        frames.len(),
        scenario.links.len(),
        scenario.hosts.len(),
        store.len()
    );

    let engine = Arc::new(ReactiveEngine::with_store(config, services, store.clone()));
    engine.activate();

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn(engine.clone().run(rx));
    for pkt in frames {
        tx.send(pkt).await.map_err(|_| anyhow!("engine stopped before all frames were sent"))?;
    }
    drop(tx);
    let processed = runner.await?;
    engine.deactivate();

    // only the rules this replay installed
    let mut rules: Vec<OwnedRules> = store
        .flow_rules_list()
        .into_iter()
        .map(|(policy, rules)| OwnedRules {
            policy,
            rules: rules.into_iter().filter(|r| backend.contains(r.id)).collect(),
        })
        .filter(|owned| !owned.rules.is_empty())
        .collect();
    rules.sort_by_key(|owned| owned.policy);

    let report = ReplayReport {
        processed,
        arp_replies_emitted: packets.emitted().len(),
        rules,
        stats: engine.stats(),
    };
    ctx.save_store(&store)?;

    match ctx.format {
        OutputFormat::Table => {
            println!(
                "{} {} frames, {} rules installed",
                "Replayed".green().bold(),
                report.processed,
                backend.rule_count()
            );
            let rows: Vec<RuleRow> = report
                .rules
                .iter()
                .flat_map(|owned| owned.rules.iter().map(|r| RuleRow::new(owned.policy, r)))
                .collect();
            if !rows.is_empty() {
                ctx.format.print(&report.rules, rows);
            }
            ctx.format.print(&report.stats, stat_rows(&report.stats));
        }
        format => format.print(&report, Vec::<RuleRow>::new()),
    }
    Ok(())
}

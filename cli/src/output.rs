//! Output formatting

use clap::ValueEnum;
use osdf_common::{FlowRule, Instruction, PolicyId, RuleTimeout};
use osdf_reactive::{EngineStats, PolicySummary};
use serde::{Deserialize, Serialize};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print `data`, or `rows` as a table in table mode
    pub fn print<T: Serialize, R: Tabled>(&self, data: &T, rows: Vec<R>) {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(data).unwrap_or_default());
            }
            OutputFormat::Table => {
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{}", table);
            }
        }
    }
}

fn join(items: &[String]) -> String {
    if items.is_empty() {
        "-".into()
    } else {
        items.join(",")
    }
}

#[derive(Tabled)]
pub struct PolicyRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Profile")]
    profile: String,
    #[tabled(rename = "Priority")]
    priority: u16,
    #[tabled(rename = "App")]
    application: String,
    #[tabled(rename = "Via")]
    devices: String,
    #[tabled(rename = "Src hosts")]
    src_hosts: String,
    #[tabled(rename = "Dst hosts")]
    dst_hosts: String,
    #[tabled(rename = "Regions")]
    regions: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Rules")]
    rules: usize,
}

impl From<&PolicySummary> for PolicyRow {
    fn from(p: &PolicySummary) -> Self {
        Self {
            id: p.id,
            profile: p.profile_name.clone(),
            priority: p.priority,
            application: p.application.clone(),
            devices: join(&p.devices),
            src_hosts: join(&p.src_hosts),
            dst_hosts: join(&p.dst_hosts),
            regions: format!("{} -> {}", p.src_region, p.dst_region),
            action: p.action.clone(),
            rules: p.rules,
        }
    }
}

pub fn policy_rows(policies: &[PolicySummary]) -> Vec<PolicyRow> {
    policies.iter().map(PolicyRow::from).collect()
}

#[derive(Tabled)]
pub struct RuleRow {
    #[tabled(rename = "Policy")]
    policy: u32,
    #[tabled(rename = "Rule")]
    id: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Priority")]
    priority: u16,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Match")]
    selector: usize,
    #[tabled(rename = "Actions")]
    actions: String,
}

impl RuleRow {
    pub fn new(policy: PolicyId, rule: &FlowRule) -> Self {
        let actions = rule
            .treatment
            .instructions()
            .iter()
            .map(|i| match i {
                Instruction::SetEthDst(mac) => format!("eth_dst={}", mac),
                Instruction::Output(port) => format!("output:{}", port),
            })
            .collect::<Vec<_>>()
            .join(" ");
        let timeout = match rule.timeout {
            RuleTimeout::Permanent => "permanent".to_string(),
            RuleTimeout::Idle(s) => format!("idle {}s", s),
            RuleTimeout::Hard(s) => format!("hard {}s", s),
        };
        Self {
            policy: policy.value(),
            id: rule.id.to_string(),
            device: rule.device_id.to_string(),
            priority: rule.priority,
            timeout,
            selector: rule.selector.len(),
            actions,
        }
    }
}

#[derive(Tabled)]
pub struct StatRow {
    #[tabled(rename = "Counter")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: u64,
}

pub fn stat_rows(stats: &EngineStats) -> Vec<StatRow> {
    let row = |name, value| StatRow { name, value };
    vec![
        row("packets seen", stats.packets_seen),
        row("control dropped", stats.control_dropped),
        row("non-IPv4 dropped", stats.non_ipv4_dropped),
        row("ARP replies", stats.arp_replies),
        row("unknown region", stats.unknown_region),
        row("policy matches", stats.policy_matches),
        row("rules installed", stats.rules_installed),
        row("hosts unknown", stats.hosts_unknown),
        row("selectors rejected", stats.selectors_rejected),
        row("path fallbacks", stats.path_fallbacks),
        row("paths selected", stats.path_selection.selections),
    ]
}

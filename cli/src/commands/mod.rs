//! CLI Commands

pub mod config;
pub mod policies;
pub mod replay;

use crate::config::Config;
use crate::output::OutputFormat;
use anyhow::{Context as _, Result};
use osdf_common::memory::MemoryFlowRuleService;
use osdf_common::{FlowRuleService, LoggingListener};
use osdf_policy::PolicyStore;
use osdf_reactive::StoreSnapshot;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Resolved settings shared by every command
pub struct Context {
    pub config: Config,
    pub state_path: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config: Config, state: Option<PathBuf>, format: Option<OutputFormat>) -> Result<Self> {
        let state_path = match state {
            Some(path) => path,
            None => config.state_path()?,
        };
        let format = format.or(config.default_format).unwrap_or(OutputFormat::Table);
        Ok(Self {
            config,
            state_path,
            format,
        })
    }

    /// Policy store rebuilt from the state file, over `backend`
    pub fn load_store(&self, backend: Arc<dyn FlowRuleService>) -> Result<Arc<PolicyStore>> {
        let store = Arc::new(PolicyStore::new(backend));
        if self.state_path.exists() {
            let content = fs::read_to_string(&self.state_path)
                .with_context(|| format!("reading {}", self.state_path.display()))?;
            let snapshot: StoreSnapshot = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", self.state_path.display()))?;
            debug!("Loaded {} policies from {}", snapshot.policies.len(), self.state_path.display());
            snapshot.restore(&store);
        }
        store.add_listener(Arc::new(LoggingListener));
        Ok(store)
    }

    /// Policy store over an in-memory backend
    pub fn open_store(&self) -> Result<Arc<PolicyStore>> {
        self.load_store(Arc::new(MemoryFlowRuleService::new()))
    }

    pub fn save_store(&self, store: &PolicyStore) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = StoreSnapshot::capture(store);
        fs::write(&self.state_path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("writing {}", self.state_path.display()))?;
        Ok(())
    }
}

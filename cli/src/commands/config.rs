//! Config commands

use super::Context;
use crate::config::Config;
use crate::ConfigCommands;
use anyhow::Result;

pub fn handle(action: ConfigCommands, ctx: &Context) -> Result<()> {
    match action {
        ConfigCommands::Init => {
            let config = Config {
                state_file: Some(ctx.state_path.clone()),
                ..Config::default()
            };
            let path = config.save()?;
            println!("Configuration initialized at {}", path.display());
        }
        ConfigCommands::Show => {
            let show = |p: &Option<std::path::PathBuf>| {
                p.as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".into())
            };
            println!("state_file: {}", show(&ctx.config.state_file));
            println!("engine_config: {}", show(&ctx.config.engine_config));
            println!(
                "default_format: {}",
                ctx.config
                    .default_format
                    .map(|f| format!("{:?}", f).to_lowercase())
                    .unwrap_or_else(|| "(not set)".into())
            );
            println!("effective state: {}", ctx.state_path.display());
        }
    }
    Ok(())
}

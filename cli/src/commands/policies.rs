//! Policy commands

use super::Context;
use crate::output::{policy_rows, OutputFormat, RuleRow};
use crate::PolicyCommands;
use anyhow::Result;
use colored::Colorize;
use osdf_reactive::{CreatePolicyRequest, PolicyAdmin};

pub fn handle(action: PolicyCommands, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let admin = PolicyAdmin::new(store.clone());

    match action {
        PolicyCommands::Create {
            profile,
            application,
            priority,
            via,
            psa,
            region,
            dst_region,
            action,
            src_hosts,
            dst_hosts,
        } => {
            let req = CreatePolicyRequest {
                profile_name: profile,
                application,
                priority,
                partial_path: via,
                path_selection: psa,
                region,
                dst_region,
                action,
                src_hosts,
                dst_hosts,
            };
            let policy = admin.create_policy(&req)?;
            ctx.save_store(&store)?;
            println!(
                "{} policy {} ({}) priority {}",
                "Created".green().bold(),
                policy.id(),
                policy.name(),
                policy.priority()
            );
        }
        PolicyCommands::List => {
            let policies = admin.list_policies();
            if policies.is_empty() && ctx.format == OutputFormat::Table {
                println!("No policies");
                return Ok(());
            }
            ctx.format.print(&policies, policy_rows(&policies));
        }
        PolicyCommands::Get { id } => {
            let summary = admin.get_policy(&id)?;
            ctx.format.print(&summary, policy_rows(std::slice::from_ref(&summary)));
            let policy = store.get_policy_str(&id)?;
            let rules = store.flow_rules_for_policy(policy.id());
            if !rules.is_empty() && ctx.format == OutputFormat::Table {
                let rows: Vec<_> = rules.iter().map(|r| RuleRow::new(policy.id(), r)).collect();
                ctx.format.print(&rules, rows);
            }
        }
        PolicyCommands::Remove { id } => {
            let withdrawn = admin.remove_policy(&id)?;
            ctx.save_store(&store)?;
            println!("{} policy {} ({} rules withdrawn)", "Removed".yellow().bold(), id, withdrawn);
        }
    }
    Ok(())
}

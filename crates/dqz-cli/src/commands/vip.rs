use super::common::Output;
use crate::{print_info, print_success, VipCommands};
use colored::*;
use dqz_ledger::DqzEngine;

pub fn handle(
    action: VipCommands,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        VipCommands::Grant {
            account,
            days,
            cost,
        } => {
            let plan = &engine.config().vip;
            let grant = engine.vip.grant(
                &account,
                days.unwrap_or(plan.duration_days),
                cost.unwrap_or(plan.cost),
            )?;
            let value = serde_json::json!({
                "account": account,
                "expires_at": grant.expires_at,
                "transaction": grant.transaction,
                "new_balance": grant.new_balance,
            });
            out.emit(&value, || {
                print_success(&format!(
                    "'{}' is VIP until {}",
                    account,
                    grant.expires_at.to_rfc3339()
                ));
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    grant.new_balance.to_string().cyan().bold()
                );
            })?;
        }
        VipCommands::Status { account } => {
            let status = engine.vip.status(&account)?;
            let value = serde_json::json!({
                "account": account,
                "active": status.active,
                "expires_at": status.expires_at,
                "remaining_secs": status.remaining.map(|d| d.num_seconds()),
            });
            out.emit(&value, || match status.remaining {
                Some(left) => println!(
                    "{} {} ({}d {}h left)",
                    "VIP:".bold(),
                    "active".green().bold(),
                    left.num_days(),
                    left.num_hours() % 24
                ),
                None => print_info(&format!("'{}' has no active VIP", account)),
            })?;
        }
    }
    Ok(())
}

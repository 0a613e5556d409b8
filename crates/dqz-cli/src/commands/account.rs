use super::common::{print_transaction, Output};
use crate::{print_info, print_success, AccountCommands};
use colored::*;
use dqz_core::MAX_BALANCE;
use dqz_ledger::DqzEngine;

pub fn handle(
    action: AccountCommands,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AccountCommands::Register { id } => {
            let account = engine.wallet.register_account(&id)?;
            out.emit(&account, || {
                print_success(&format!("Account '{}' registered", account.id));
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    account.diamond_balance.to_string().cyan().bold()
                );
            })?;
        }
        AccountCommands::Show { id } => {
            let account = engine.wallet.account(&id)?;
            let now = engine.now();
            out.emit(&account, || {
                println!("{} {}", "Account:".bold(), account.id.green());
                println!(
                    "{} {} / {} diamonds",
                    "Balance:".bold(),
                    account.diamond_balance.to_string().cyan().bold(),
                    MAX_BALANCE
                );
                println!("{} {}", "Earnings:".bold(), account.total_earnings);
                println!(
                    "{} {} played, {} won",
                    "Quizzes:".bold(),
                    account.quizzes_played,
                    account.quizzes_won
                );
                match account.vip_expires_at {
                    Some(expires) if account.is_vip(now) => {
                        println!("{} until {}", "VIP:".bold(), expires.to_rfc3339().yellow())
                    }
                    Some(expires) => println!(
                        "{} {}",
                        "VIP:".bold(),
                        format!("expired {}", expires.to_rfc3339()).dimmed()
                    ),
                    None => println!("{} {}", "VIP:".bold(), "no".dimmed()),
                }
            })?;
        }
        AccountCommands::History { id } => {
            let history = engine.log.history(&id)?;
            out.emit(&history, || {
                if history.is_empty() {
                    print_info(&format!("No ledger entries for '{}'", id));
                    return;
                }
                println!("{} {}", "Ledger for".bold(), id.green());
                for tx in &history {
                    print_transaction(tx);
                }
            })?;
        }
    }
    Ok(())
}

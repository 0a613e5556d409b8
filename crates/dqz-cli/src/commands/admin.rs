use super::common::{print_transaction, Output};
use crate::{print_error, print_info, print_success};
use colored::*;
use dqz_core::TxKind;
use dqz_ledger::DqzEngine;

/// Admin queue: every open deposit and withdrawal, oldest first.
pub fn pending(
    kind: Option<TxKind>,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let open = engine.log.pending(kind)?;
    out.emit(&open, || {
        if open.is_empty() {
            print_info("Nothing pending.");
            return;
        }
        for tx in &open {
            print!("{:<10}", tx.account_id);
            print_transaction(tx);
        }
        println!(
            "{} {} {}",
            "Total:".bold(),
            open.len().to_string().cyan(),
            "open transaction(s)".dimmed()
        );
    })
}

pub fn audit(
    account: Option<&str>,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let reports = match account {
        Some(id) => vec![engine.audit(id)?],
        None => engine.audit_all()?,
    };
    let root = engine.state_root()?;
    let value = serde_json::json!({ "state_root": root, "accounts": reports });

    out.emit(&value, || {
        for report in &reports {
            if report.is_consistent() {
                print_success(&format!(
                    "{}: {} diamonds = {} opening + {} over {} entries",
                    report.account_id,
                    report.balance,
                    report.opening_balance,
                    report.ledger_sum,
                    report.entries
                ));
            } else {
                for issue in &report.issues {
                    print_error(&format!("{}: {}", report.account_id, issue));
                }
            }
        }
        println!("{} {}", "State root:".bold(), root.dimmed());
    })?;

    if reports.iter().any(|r| !r.is_consistent()) {
        return Err("ledger audit failed".into());
    }
    Ok(())
}

use super::common::{print_transaction, Output};
use crate::{print_info, print_success, DepositCommands, WithdrawalCommands};
use colored::*;
use dqz_core::converter::to_diamonds;
use dqz_ledger::{DqzEngine, PaymentEvent, ReconcileOutcome};

pub fn handle_deposit(
    action: DepositCommands,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        DepositCommands::Create {
            account,
            amount,
            reference,
        } => {
            let tx = engine.payments.create_deposit(&account, amount, &reference)?;
            out.emit(&tx, || {
                print_success(&format!(
                    "Deposit #{} opened: {} currency units → {} diamonds",
                    tx.id,
                    amount,
                    to_diamonds(amount)
                ));
                print_info("Balance changes once the payment is reconciled.");
            })?;
        }
        DepositCommands::Reconcile {
            account,
            reference,
            amount,
        } => {
            let outcome = engine
                .payments
                .reconcile_deposit(&reference, amount, &account)?;
            report_outcome(&outcome, out)?;
        }
        DepositCommands::Webhook { file } => {
            let event: PaymentEvent = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let outcome = engine.payments.handle_webhook(&event)?;
            report_outcome(&outcome, out)?;
        }
        DepositCommands::Cancel { account, id } => {
            let tx = engine.payments.cancel_deposit(&account, id)?;
            out.emit(&tx, || print_success(&format!("Deposit #{} cancelled", tx.id)))?;
        }
        DepositCommands::Submit { id } => {
            let tx = engine.payments.submit_deposit_for_approval(id)?;
            out.emit(&tx, || {
                print_success(&format!("Deposit #{} is awaiting admin approval", tx.id))
            })?;
        }
        DepositCommands::Decide { id, decision } => {
            let tx = engine
                .payments
                .reconcile_deposit_decision(id, decision.into())?;
            out.emit(&tx, || print_transaction(&tx))?;
        }
    }
    Ok(())
}

pub fn handle_withdrawal(
    action: WithdrawalCommands,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        WithdrawalCommands::Create {
            account,
            amount,
            reference,
        } => {
            let tx = engine
                .payments
                .create_withdrawal(&account, amount, reference.as_deref())?;
            let balance = engine.wallet.balance(&account)?;
            out.emit(&tx, || {
                print_success(&format!("Withdrawal #{} opened for {} diamonds", tx.id, amount));
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    balance.to_string().cyan().bold()
                );
            })?;
        }
        WithdrawalCommands::Escalate { id } => {
            let tx = engine.payments.escalate_withdrawal(id)?;
            out.emit(&tx, || {
                print_success(&format!("Withdrawal #{} sent to admin review", tx.id))
            })?;
        }
        WithdrawalCommands::Decide { id, decision } => {
            let outcome = engine
                .payments
                .reconcile_withdrawal_decision(id, decision.into())?;
            let value = serde_json::json!({
                "withdrawal": outcome.withdrawal,
                "refund": outcome.refund,
                "new_balance": outcome.new_balance,
            });
            out.emit(&value, || {
                print_transaction(&outcome.withdrawal);
                if let Some(refund) = &outcome.refund {
                    print_transaction(refund);
                }
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    outcome.new_balance.to_string().cyan().bold()
                );
            })?;
        }
    }
    Ok(())
}

fn report_outcome(
    outcome: &ReconcileOutcome,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    out.emit(outcome.transaction(), || match outcome {
        ReconcileOutcome::Credited {
            transaction,
            new_balance,
        } => {
            print_success(&format!(
                "Deposit #{} credited {} diamonds",
                transaction.id, transaction.amount
            ));
            println!(
                "{} {} diamonds",
                "Balance:".bold(),
                new_balance.to_string().cyan().bold()
            );
        }
        ReconcileOutcome::AlreadyCompleted(tx) => {
            print_info(&format!("Deposit #{} was already completed", tx.id))
        }
        ReconcileOutcome::Closed(tx) => print_info(&format!(
            "Deposit #{} is {}; nothing credited",
            tx.id, tx.status
        )),
    })
}

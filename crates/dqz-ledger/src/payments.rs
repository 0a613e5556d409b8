// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - PAYMENT RECONCILER
//
// Deposits credit the wallet only when a verified payment event (or an admin
// approval) completes them. Withdrawals debit at creation and are either
// confirmed or refunded by an admin decision.
//
// Reconciling is idempotent: the external reference is the key, and a
// completed deposit is reported as already handled instead of credited again.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::{abort, LedgerTxn, TxResult};
use crate::locks::safe_lock;
use crate::txlog::{signed_amount, NewTransaction, TransactionLog};
use crate::wallet::WalletLedger;
use crate::Context;
use chrono::{DateTime, Utc};
use dqz_core::converter::{to_currency, to_diamonds};
use dqz_core::{CoreError, CoreResult, Transaction, TxKind, TxStatus};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Admin verdict on a manual deposit or a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEventType {
    #[serde(rename = "payment.succeeded")]
    Succeeded,
    #[serde(rename = "payment.failed")]
    Failed,
}

/// Verified webhook payload from the payment provider. `amount` is in
/// real-currency minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub external_reference: String,
    pub amount: u64,
    pub event_type: PaymentEventType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The deposit completed now.
    Credited {
        transaction: Transaction,
        new_balance: u64,
    },
    /// An earlier call already completed it; nothing changed.
    AlreadyCompleted(Transaction),
    /// The deposit is failed or cancelled; nothing changed.
    Closed(Transaction),
}

impl ReconcileOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            ReconcileOutcome::Credited { transaction, .. } => transaction,
            ReconcileOutcome::AlreadyCompleted(tx) | ReconcileOutcome::Closed(tx) => tx,
        }
    }
}

/// Result of an admin decision on a withdrawal.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalOutcome {
    pub withdrawal: Transaction,
    pub refund: Option<Transaction>,
    pub new_balance: u64,
}

/// Amount a payment claims, in the unit it was stated in.
#[derive(Debug, Clone, Copy)]
enum Stated {
    Diamonds(u64),
    Currency(u64),
}

enum Reconciled {
    Done(ReconcileOutcome),
    Mismatch {
        transaction: Transaction,
        stated: u64,
        recorded: u64,
    },
}

#[derive(Clone)]
pub struct PaymentReconciler {
    ctx: Context,
    wallet: WalletLedger,
    log: TransactionLog,
}

impl PaymentReconciler {
    pub fn new(ctx: Context, wallet: WalletLedger, log: TransactionLog) -> Self {
        Self { ctx, wallet, log }
    }

    // ─────────────────────────────────────────────────────────────────
    // DEPOSITS
    // ─────────────────────────────────────────────────────────────────

    /// Record a pending deposit of `currency_amount` (minor units). The
    /// wallet is untouched until the payment is reconciled.
    pub fn create_deposit(
        &self,
        account_id: &str,
        currency_amount: u64,
        external_reference: &str,
    ) -> CoreResult<Transaction> {
        if external_reference.is_empty() {
            return Err(CoreError::UnknownReference(String::new()));
        }
        let diamonds = to_diamonds(currency_amount);
        if diamonds == 0 {
            return Err(CoreError::InvalidAmount(format!(
                "{} currency units buys no diamonds",
                currency_amount
            )));
        }
        let amount = signed_amount(TxKind::Deposit, diamonds)?;
        let new = NewTransaction::new(account_id, TxKind::Deposit, amount)
            .currency(currency_amount)
            .reference(Some(external_reference));
        let id = self.ctx.db.next_id()?;
        let now = self.ctx.now();

        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);
        let tx = self.ctx.db.atomic("create_deposit", |txn| {
            txn.account(account_id)?;
            self.log.create_in(txn, id, &new, TxStatus::Pending, now)
        })?;
        info!(
            "deposit {} opened for {}: {} diamonds ({})",
            tx.id, account_id, diamonds, external_reference
        );
        Ok(tx)
    }

    /// Complete the deposit behind `external_reference` if `stated_amount`
    /// (diamonds) matches what was recorded.
    ///
    /// A mismatch fails the deposit for good and returns `AmountMismatch`.
    pub fn reconcile_deposit(
        &self,
        external_reference: &str,
        stated_amount: u64,
        account_id: &str,
    ) -> CoreResult<ReconcileOutcome> {
        self.reconcile(external_reference, Stated::Diamonds(stated_amount), account_id)
    }

    /// Entry point for the payment provider's webhook. Safe to call again
    /// with the same event.
    pub fn handle_webhook(&self, event: &PaymentEvent) -> CoreResult<ReconcileOutcome> {
        let reference = &event.external_reference;
        let tx = self
            .log
            .find_by_reference(reference)?
            .filter(|tx| tx.kind == TxKind::Deposit)
            .ok_or_else(|| CoreError::UnknownReference(reference.clone()))?;

        match event.event_type {
            PaymentEventType::Succeeded => {
                self.reconcile(reference, Stated::Currency(event.amount), &tx.account_id)
            }
            PaymentEventType::Failed => {
                let now = self.ctx.now();
                let lock = self.ctx.locks.account(&tx.account_id);
                let _guard = safe_lock(&lock);
                let outcome = self.ctx.db.atomic("deposit_failed", |txn| {
                    let current = txn.transaction(tx.id)?;
                    match current.status {
                        TxStatus::Completed => Ok(ReconcileOutcome::AlreadyCompleted(current)),
                        TxStatus::Failed | TxStatus::Cancelled => {
                            Ok(ReconcileOutcome::Closed(current))
                        }
                        open => Ok(ReconcileOutcome::Closed(self.log.transition_in(
                            txn,
                            tx.id,
                            open,
                            TxStatus::Failed,
                            now,
                        )?)),
                    }
                })?;
                info!("deposit {} failed by provider ({})", tx.id, reference);
                Ok(outcome)
            }
        }
    }

    fn reconcile(
        &self,
        reference: &str,
        stated: Stated,
        account_id: &str,
    ) -> CoreResult<ReconcileOutcome> {
        let now = self.ctx.now();
        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);

        let reconciled = self.ctx.db.atomic("reconcile_deposit", |txn| {
            let unknown = || abort(CoreError::UnknownReference(reference.to_string()));
            let id = txn.reference_owner(reference)?.ok_or_else(unknown)?;
            let tx = txn.transaction(id)?;
            if tx.account_id != account_id || tx.kind != TxKind::Deposit {
                return Err(unknown());
            }

            match tx.status {
                TxStatus::Completed => {
                    return Ok(Reconciled::Done(ReconcileOutcome::AlreadyCompleted(tx)))
                }
                TxStatus::Failed | TxStatus::Cancelled => {
                    return Ok(Reconciled::Done(ReconcileOutcome::Closed(tx)))
                }
                TxStatus::Pending | TxStatus::PendingApproval => {}
            }

            let (stated_value, recorded) = match stated {
                Stated::Diamonds(n) => (n, tx.nominal_amount.unsigned_abs()),
                Stated::Currency(c) => (
                    c,
                    tx.currency_amount
                        .unwrap_or_else(|| to_currency(tx.nominal_amount.unsigned_abs())),
                ),
            };
            if stated_value != recorded {
                let failed = self
                    .log
                    .transition_in(txn, id, tx.status, TxStatus::Failed, now)?;
                return Ok(Reconciled::Mismatch {
                    transaction: failed,
                    stated: stated_value,
                    recorded,
                });
            }

            let (transaction, new_balance) = self.complete_deposit(txn, tx, now)?;
            Ok(Reconciled::Done(ReconcileOutcome::Credited {
                transaction,
                new_balance,
            }))
        })?;

        match reconciled {
            Reconciled::Done(outcome) => {
                if let ReconcileOutcome::Credited {
                    transaction,
                    new_balance,
                } = &outcome
                {
                    self.ctx.metrics.record_posted(transaction);
                    info!(
                        "deposit {} completed for {}: +{} (balance {})",
                        transaction.id, account_id, transaction.amount, new_balance
                    );
                }
                Ok(outcome)
            }
            Reconciled::Mismatch {
                transaction,
                stated,
                recorded,
            } => {
                self.ctx.metrics.deposit_mismatches_total.inc();
                warn!(
                    "deposit {} for {} failed: stated {} but recorded {} ({})",
                    transaction.id, account_id, stated, recorded, reference
                );
                Err(CoreError::AmountMismatch {
                    reference: reference.to_string(),
                    stated,
                    recorded,
                })
            }
        }
    }

    /// Credit an open deposit (clamped) and post it as completed.
    fn complete_deposit(
        &self,
        txn: &LedgerTxn<'_>,
        tx: Transaction,
        now: DateTime<Utc>,
    ) -> TxResult<(Transaction, u64)> {
        let change = self.wallet.apply(txn, &tx.account_id, tx.nominal_amount)?;
        let mut completed = self
            .log
            .transition_in(txn, tx.id, tx.status, TxStatus::Completed, now)?;
        completed.amount = change.applied;
        self.log.post_in(txn, &mut completed)?;
        Ok((completed, change.new_balance))
    }

    /// Withdraw a deposit the user no longer wants to pay. Pending only.
    pub fn cancel_deposit(&self, account_id: &str, transaction_id: u64) -> CoreResult<Transaction> {
        let now = self.ctx.now();
        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);
        let tx = self.ctx.db.atomic("cancel_deposit", |txn| {
            let tx = txn.transaction(transaction_id)?;
            if tx.account_id != account_id || tx.kind != TxKind::Deposit {
                return Err(abort(CoreError::UnknownTransaction(transaction_id)));
            }
            self.log
                .transition_in(txn, transaction_id, TxStatus::Pending, TxStatus::Cancelled, now)
        })?;
        info!("deposit {} cancelled by {}", tx.id, account_id);
        Ok(tx)
    }

    /// Park a manual-transfer deposit for admin review.
    pub fn submit_deposit_for_approval(&self, transaction_id: u64) -> CoreResult<Transaction> {
        self.move_open(
            transaction_id,
            TxKind::Deposit,
            TxStatus::PendingApproval,
            "submit_deposit",
        )
    }

    /// Admin verdict on a deposit. Approve credits like a matching
    /// reconcile; reject fails it without touching the wallet.
    pub fn reconcile_deposit_decision(
        &self,
        transaction_id: u64,
        decision: Decision,
    ) -> CoreResult<Transaction> {
        let account_id = self.owner_of(transaction_id, TxKind::Deposit)?;
        let now = self.ctx.now();
        let lock = self.ctx.locks.account(&account_id);
        let _guard = safe_lock(&lock);

        let tx = self.ctx.db.atomic("decide_deposit", |txn| {
            let tx = txn.transaction(transaction_id)?;
            let from = open_or_pending(tx.status);
            match decision {
                Decision::Approve => {
                    if !tx.status.is_open() {
                        return Err(abort(CoreError::InvalidTransition {
                            id: transaction_id,
                            expected: from,
                            found: tx.status,
                            to: TxStatus::Completed,
                        }));
                    }
                    Ok(self.complete_deposit(txn, tx, now)?.0)
                }
                Decision::Reject => {
                    self.log
                        .transition_in(txn, transaction_id, from, TxStatus::Failed, now)
                }
            }
        })?;

        if decision == Decision::Approve {
            self.ctx.metrics.record_posted(&tx);
        }
        info!(
            "deposit {} {} by admin ({} -> {})",
            tx.id,
            decision.past_tense(),
            tx.account_id,
            tx.status
        );
        Ok(tx)
    }

    // ─────────────────────────────────────────────────────────────────
    // WITHDRAWALS
    // ─────────────────────────────────────────────────────────────────

    /// Debit `diamonds` now and open a pending withdrawal for payout.
    pub fn create_withdrawal(
        &self,
        account_id: &str,
        diamonds: u64,
        external_reference: Option<&str>,
    ) -> CoreResult<Transaction> {
        if diamonds == 0 {
            return Err(CoreError::InvalidAmount("withdrawal of 0 diamonds".to_string()));
        }
        let new = NewTransaction::new(
            account_id,
            TxKind::Withdrawal,
            signed_amount(TxKind::Withdrawal, diamonds)?,
        )
        .currency(to_currency(diamonds))
        .reference(external_reference);
        let id = self.ctx.db.next_id()?;
        let now = self.ctx.now();

        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);
        let tx = self.ctx.db.atomic("create_withdrawal", |txn| {
            let mut tx = self.log.create_in(txn, id, &new, TxStatus::Pending, now)?;
            let change = self.wallet.apply(txn, account_id, new.amount)?;
            tx.amount = change.applied;
            self.log.post_in(txn, &mut tx)?;
            Ok(tx)
        })?;

        self.ctx.metrics.record_posted(&tx);
        info!(
            "withdrawal {} opened for {}: {} diamonds",
            tx.id, account_id, diamonds
        );
        Ok(tx)
    }

    /// Send a pending withdrawal to the admin queue.
    pub fn escalate_withdrawal(&self, transaction_id: u64) -> CoreResult<Transaction> {
        self.move_open(
            transaction_id,
            TxKind::Withdrawal,
            TxStatus::PendingApproval,
            "escalate_withdrawal",
        )
    }

    /// Admin verdict on a withdrawal. Approve completes it; reject fails it
    /// and credits the debited diamonds back as a refund entry.
    pub fn reconcile_withdrawal_decision(
        &self,
        transaction_id: u64,
        decision: Decision,
    ) -> CoreResult<WithdrawalOutcome> {
        let account_id = self.owner_of(transaction_id, TxKind::Withdrawal)?;
        let refund_id = self.ctx.db.next_id()?;
        let now = self.ctx.now();
        let lock = self.ctx.locks.account(&account_id);
        let _guard = safe_lock(&lock);

        let outcome = self.ctx.db.atomic("decide_withdrawal", |txn| {
            let tx = txn.transaction(transaction_id)?;
            let from = open_or_pending(tx.status);
            match decision {
                Decision::Approve => {
                    let withdrawal = self.log.transition_in(
                        txn,
                        transaction_id,
                        from,
                        TxStatus::Completed,
                        now,
                    )?;
                    Ok(WithdrawalOutcome {
                        withdrawal,
                        refund: None,
                        new_balance: txn.account(&account_id)?.diamond_balance,
                    })
                }
                Decision::Reject => {
                    let withdrawal =
                        self.log
                            .transition_in(txn, transaction_id, from, TxStatus::Failed, now)?;
                    // Only a withdrawal that actually debited gets money back.
                    let refund = match withdrawal.ledger_seq {
                        Some(_) => Some(self.refund(txn, refund_id, &withdrawal, now)?),
                        None => None,
                    };
                    Ok(WithdrawalOutcome {
                        withdrawal,
                        refund,
                        new_balance: txn.account(&account_id)?.diamond_balance,
                    })
                }
            }
        })?;

        self.ctx
            .metrics
            .withdrawal_decisions_total
            .with_label_values(&[decision.as_str()])
            .inc();
        if let Some(refund) = &outcome.refund {
            self.ctx.metrics.record_posted(refund);
        }
        info!(
            "withdrawal {} {} by admin (balance {})",
            transaction_id,
            decision.past_tense(),
            outcome.new_balance
        );
        Ok(outcome)
    }

    fn refund(
        &self,
        txn: &LedgerTxn<'_>,
        id: u64,
        withdrawal: &Transaction,
        now: DateTime<Utc>,
    ) -> TxResult<Transaction> {
        let amount = withdrawal.amount.unsigned_abs();
        let signed = signed_amount(TxKind::Refund, amount).map_err(abort)?;
        let change = self.wallet.apply(txn, &withdrawal.account_id, signed)?;
        let new = NewTransaction::new(&withdrawal.account_id, TxKind::Refund, signed)
            .related(withdrawal.id);
        let mut refund = self
            .log
            .create_in(txn, id, &new, TxStatus::Completed, now)?;
        refund.amount = change.applied;
        self.log.post_in(txn, &mut refund)?;
        Ok(refund)
    }

    // ─────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────

    fn owner_of(&self, transaction_id: u64, kind: TxKind) -> CoreResult<String> {
        let tx = self.log.get(transaction_id)?;
        if tx.kind != kind {
            return Err(CoreError::UnknownTransaction(transaction_id));
        }
        Ok(tx.account_id)
    }

    fn move_open(
        &self,
        transaction_id: u64,
        kind: TxKind,
        to: TxStatus,
        op: &str,
    ) -> CoreResult<Transaction> {
        let account_id = self.owner_of(transaction_id, kind)?;
        let now = self.ctx.now();
        let lock = self.ctx.locks.account(&account_id);
        let _guard = safe_lock(&lock);
        let tx = self.ctx.db.atomic(op, |txn| {
            self.log
                .transition_in(txn, transaction_id, TxStatus::Pending, to, now)
        })?;
        info!("{} {} moved to {}", kind, tx.id, tx.status);
        Ok(tx)
    }
}

/// Source status for a decision. Closed entries report against `Pending`
/// so the transition check names what was expected.
fn open_or_pending(status: TxStatus) -> TxStatus {
    if status.is_open() {
        status
    } else {
        TxStatus::Pending
    }
}

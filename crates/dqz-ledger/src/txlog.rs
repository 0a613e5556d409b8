// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - TRANSACTION LOG
//
// Append-only record of every balance-affecting event.
//
// - External references are unique across non-failed entries.
// - Status moves are compare-and-set over the allowed transition table.
// - An entry that moved a balance is "posted": it takes the account's next
//   ledger seq and lands in the per-account history index.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::{abort, LedgerTxn, TxResult};
use crate::locks::safe_lock;
use crate::Context;
use chrono::{DateTime, Utc};
use dqz_core::{CoreError, CoreResult, Transaction, TxKind, TxStatus};
use log::debug;

/// Fields the initiator supplies for a new entry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: String,
    pub kind: TxKind,
    /// Signed diamonds; debit kinds are negative.
    pub amount: i64,
    pub currency_amount: Option<u64>,
    pub external_reference: Option<String>,
    pub related_transaction: Option<u64>,
}

impl NewTransaction {
    pub fn new(account_id: &str, kind: TxKind, amount: i64) -> Self {
        Self {
            account_id: account_id.to_string(),
            kind,
            amount,
            currency_amount: None,
            external_reference: None,
            related_transaction: None,
        }
    }

    pub fn currency(mut self, currency_amount: u64) -> Self {
        self.currency_amount = Some(currency_amount);
        self
    }

    pub fn reference(mut self, reference: Option<&str>) -> Self {
        self.external_reference = reference.map(str::to_string);
        self
    }

    pub fn related(mut self, id: u64) -> Self {
        self.related_transaction = Some(id);
        self
    }
}

/// Signed ledger amount for `diamonds` of `kind`.
pub fn signed_amount(kind: TxKind, diamonds: u64) -> CoreResult<i64> {
    let magnitude = i64::try_from(diamonds)
        .map_err(|_| CoreError::InvalidAmount(format!("{} diamonds is out of range", diamonds)))?;
    Ok(if kind.is_debit() { -magnitude } else { magnitude })
}

#[derive(Clone)]
pub struct TransactionLog {
    ctx: Context,
}

impl TransactionLog {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    // ─────────────────────────────────────────────────────────────────
    // Inside an atomic unit
    // ─────────────────────────────────────────────────────────────────

    /// Write a new entry with id `id`.
    ///
    /// A reference held by a failed entry may be reused; the index then
    /// points at the new entry.
    pub fn create_in(
        &self,
        txn: &LedgerTxn<'_>,
        id: u64,
        new: &NewTransaction,
        status: TxStatus,
        now: DateTime<Utc>,
    ) -> TxResult<Transaction> {
        if let Some(reference) = &new.external_reference {
            if let Some(owner) = txn.reference_owner(reference)? {
                if txn.transaction(owner)?.status != TxStatus::Failed {
                    return Err(abort(CoreError::DuplicateReference(reference.clone())));
                }
            }
            txn.index_reference(reference, id)?;
        }

        let tx = Transaction {
            id,
            account_id: new.account_id.clone(),
            kind: new.kind,
            amount: new.amount,
            nominal_amount: new.amount,
            currency_amount: new.currency_amount,
            status,
            external_reference: new.external_reference.clone(),
            related_transaction: new.related_transaction,
            ledger_seq: None,
            created_at: now,
            updated_at: now,
        };
        txn.put_transaction(&tx)?;
        Ok(tx)
    }

    /// Give `tx` the account's next ledger seq and persist it.
    /// `tx.amount` must already hold the applied delta.
    pub fn post_in(&self, txn: &LedgerTxn<'_>, tx: &mut Transaction) -> TxResult<()> {
        let mut account = txn.account(&tx.account_id)?;
        account.ledger_seq += 1;
        txn.put_account(&account)?;
        txn.index_history(&account.id, account.ledger_seq, tx.id)?;
        tx.ledger_seq = Some(account.ledger_seq);
        txn.put_transaction(tx)
    }

    /// Compare-and-set `from -> to`.
    pub fn transition_in(
        &self,
        txn: &LedgerTxn<'_>,
        id: u64,
        from: TxStatus,
        to: TxStatus,
        now: DateTime<Utc>,
    ) -> TxResult<Transaction> {
        let mut tx = txn.transaction(id)?;
        if tx.status != from || !from.can_transition_to(to) {
            return Err(abort(CoreError::InvalidTransition {
                id,
                expected: from,
                found: tx.status,
                to,
            }));
        }
        tx.status = to;
        tx.updated_at = now;
        txn.put_transaction(&tx)?;
        Ok(tx)
    }

    // ─────────────────────────────────────────────────────────────────
    // Standalone operations
    // ─────────────────────────────────────────────────────────────────

    /// Record a pending entry. No balance moves until a reconciler
    /// completes it.
    pub fn create(
        &self,
        account_id: &str,
        kind: TxKind,
        diamonds: u64,
        external_reference: Option<&str>,
    ) -> CoreResult<Transaction> {
        let new = NewTransaction::new(account_id, kind, signed_amount(kind, diamonds)?)
            .reference(external_reference);
        let id = self.ctx.db.next_id()?;
        let now = self.ctx.now();

        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);
        let tx = self.ctx.db.atomic("create_transaction", |txn| {
            txn.account(account_id)?;
            self.create_in(txn, id, &new, TxStatus::Pending, now)
        })?;
        debug!("created {} transaction {} for {}", tx.kind, tx.id, tx.account_id);
        Ok(tx)
    }

    /// Status-only compare-and-set. Balance effects belong to the
    /// reconcilers; this never touches a wallet.
    pub fn transition(&self, id: u64, from: TxStatus, to: TxStatus) -> CoreResult<Transaction> {
        let account_id = self.get(id)?.account_id;
        let now = self.ctx.now();

        let lock = self.ctx.locks.account(&account_id);
        let _guard = safe_lock(&lock);
        self.ctx
            .db
            .atomic("transition", |txn| self.transition_in(txn, id, from, to, now))
    }

    pub fn get(&self, id: u64) -> CoreResult<Transaction> {
        self.ctx
            .db
            .get_transaction(id)?
            .ok_or(CoreError::UnknownTransaction(id))
    }

    pub fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Transaction>> {
        self.ctx.db.find_by_reference(reference)
    }

    /// Posted entries of one account in ledger seq order.
    pub fn history(&self, account_id: &str) -> CoreResult<Vec<Transaction>> {
        self.ctx.db.history(account_id)
    }

    /// Open (pending or awaiting approval) entries, oldest first.
    pub fn pending(&self, kind: Option<TxKind>) -> CoreResult<Vec<Transaction>> {
        let mut open: Vec<Transaction> = self
            .ctx
            .db
            .all_transactions()?
            .into_iter()
            .filter(|tx| tx.status.is_open() && kind.map_or(true, |k| tx.kind == k))
            .collect();
        open.sort_by_key(|tx| tx.id);
        Ok(open)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - LEDGER AUDIT
//
// Diagnostic replay. On a correctly functioning engine every check passes;
// a failure means a balance moved without its ledger entry (or the reverse).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::LedgerDatabase;
use dqz_core::{CoreError, CoreResult, MAX_BALANCE};
use serde::Serialize;
use sha3::{Digest, Sha3_256};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub account_id: String,
    pub balance: u64,
    pub opening_balance: u64,
    /// Sum of every posted entry's amount.
    pub ledger_sum: i64,
    pub entries: usize,
    pub issues: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Verify: opening_balance + sum(posted amounts) == balance, ledger seqs run
/// 1..=n without gaps, and the balance is within bounds.
pub fn audit_account(db: &LedgerDatabase, account_id: &str) -> CoreResult<AuditReport> {
    let account = db
        .get_account(account_id)?
        .ok_or_else(|| CoreError::UnknownAccount(account_id.to_string()))?;
    let history = db.history(account_id)?;

    let mut issues = Vec::new();
    let mut ledger_sum: i64 = 0;
    for (i, tx) in history.iter().enumerate() {
        ledger_sum = ledger_sum.saturating_add(tx.amount);
        let expected = i as u64 + 1;
        if tx.ledger_seq != Some(expected) {
            issues.push(format!(
                "entry {} has seq {:?}, expected {}",
                tx.id, tx.ledger_seq, expected
            ));
        }
        if tx.account_id != account.id {
            issues.push(format!("entry {} belongs to {}", tx.id, tx.account_id));
        }
    }
    if account.ledger_seq != history.len() as u64 {
        issues.push(format!(
            "account seq {} but {} posted entries",
            account.ledger_seq,
            history.len()
        ));
    }

    let replayed = (account.opening_balance as i64).saturating_add(ledger_sum);
    if replayed != account.diamond_balance as i64 {
        issues.push(format!(
            "replayed balance {} != stored balance {} (delta {})",
            replayed,
            account.diamond_balance,
            account.diamond_balance as i64 - replayed
        ));
    }
    if account.diamond_balance > MAX_BALANCE {
        issues.push(format!(
            "balance {} above capacity {}",
            account.diamond_balance, MAX_BALANCE
        ));
    }

    Ok(AuditReport {
        account_id: account.id,
        balance: account.diamond_balance,
        opening_balance: account.opening_balance,
        ledger_sum,
        entries: history.len(),
        issues,
    })
}

pub fn audit_all(db: &LedgerDatabase) -> CoreResult<Vec<AuditReport>> {
    db.all_accounts()?
        .iter()
        .map(|account| audit_account(db, &account.id))
        .collect()
}

/// SHA3-256 over (account id, balance) pairs in id order. Two databases with
/// the same balances produce the same root. Each id is length-prefixed so
/// the encoding is unambiguous.
pub fn state_root(db: &LedgerDatabase) -> CoreResult<String> {
    // sled iterates keys in sorted order
    let accounts = db.all_accounts()?;
    Ok(root_of(
        accounts
            .iter()
            .map(|account| (account.id.as_str(), account.diamond_balance)),
    ))
}

fn root_of<'a>(entries: impl IntoIterator<Item = (&'a str, u64)>) -> String {
    let mut hasher = Sha3_256::new();
    for (id, balance) in entries {
        hasher.update((id.len() as u64).to_le_bytes());
        hasher.update(id.as_bytes());
        hasher.update(balance.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

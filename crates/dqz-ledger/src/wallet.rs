// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - WALLET LEDGER
//
// Sole writer of diamond balances. `apply` runs inside a caller's atomic
// unit so the balance change and its ledger entry commit together.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::{abort, LedgerTxn, TxResult};
use crate::locks::safe_lock;
use crate::Context;
use dqz_core::{apply_delta, Account, BalanceChange, CoreError, CoreResult};
use log::info;

/// Longest accepted account id, in bytes.
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

pub fn validate_account_id(id: &str) -> CoreResult<()> {
    if id.is_empty() || id.len() > MAX_ACCOUNT_ID_LEN || id.chars().any(char::is_control) {
        return Err(CoreError::InvalidAccountId(id.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct WalletLedger {
    ctx: Context,
}

impl WalletLedger {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Create an account holding the configured welcome balance.
    pub fn register_account(&self, account_id: &str) -> CoreResult<Account> {
        validate_account_id(account_id)?;
        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);

        let now = self.ctx.now();
        let welcome = self.ctx.config.welcome_balance;
        let account = self.ctx.db.atomic("register_account", |txn| {
            if txn.account_opt(account_id)?.is_some() {
                return Err(abort(CoreError::AccountExists(account_id.to_string())));
            }
            let account = Account::new(account_id, welcome, now);
            txn.put_account(&account)?;
            Ok(account)
        })?;

        self.ctx.metrics.accounts_registered_total.inc();
        info!(
            "registered account {} with {} diamonds",
            account.id, account.diamond_balance
        );
        Ok(account)
    }

    pub fn account(&self, account_id: &str) -> CoreResult<Account> {
        self.ctx
            .db
            .get_account(account_id)?
            .ok_or_else(|| CoreError::UnknownAccount(account_id.to_string()))
    }

    pub fn balance(&self, account_id: &str) -> CoreResult<u64> {
        Ok(self.account(account_id)?.diamond_balance)
    }

    /// Move `account_id`'s balance by `delta` inside `txn`.
    ///
    /// The caller must hold the account lock and write exactly one ledger
    /// entry for the returned `applied` amount in the same unit.
    pub fn apply(
        &self,
        txn: &LedgerTxn<'_>,
        account_id: &str,
        delta: i64,
    ) -> TxResult<BalanceChange> {
        let mut account = txn.account(account_id)?;
        let change = apply_delta(account.diamond_balance, delta).map_err(abort)?;
        account.diamond_balance = change.new_balance;
        txn.put_account(&account)?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use dqz_core::MAX_BALANCE;

    #[test]
    fn test_register_grants_welcome_balance() {
        let (engine, _) = testutil::engine();
        let acct = engine.wallet.register_account("alice").unwrap();
        assert_eq!(acct.diamond_balance, engine.config().welcome_balance);
        assert_eq!(acct.opening_balance, acct.diamond_balance);
        assert_eq!(engine.wallet.balance("alice").unwrap(), acct.diamond_balance);
    }

    #[test]
    fn test_register_twice_fails() {
        let (engine, _) = testutil::engine();
        engine.wallet.register_account("alice").unwrap();
        assert_eq!(
            engine.wallet.register_account("alice").unwrap_err(),
            CoreError::AccountExists("alice".to_string())
        );
    }

    #[test]
    fn test_rejects_bad_ids() {
        let (engine, _) = testutil::engine();
        let long = "x".repeat(MAX_ACCOUNT_ID_LEN + 1);
        for id in ["", "tab\there", long.as_str()] {
            assert!(matches!(
                engine.wallet.register_account(id),
                Err(CoreError::InvalidAccountId(_))
            ));
        }
    }

    #[test]
    fn test_unknown_account() {
        let (engine, _) = testutil::engine();
        assert_eq!(
            engine.wallet.balance("ghost").unwrap_err(),
            CoreError::UnknownAccount("ghost".to_string())
        );
    }

    #[test]
    fn test_apply_clamps_and_refuses_overdraft() {
        let (engine, _) = testutil::engine();
        engine.wallet.register_account("alice").unwrap();
        let db = engine.database();

        let change = db
            .atomic("test", |txn| engine.wallet.apply(txn, "alice", 5_000))
            .unwrap();
        assert_eq!(change.new_balance, MAX_BALANCE);

        let err = db
            .atomic("test", |txn| {
                engine.wallet.apply(txn, "alice", -(MAX_BALANCE as i64) - 1)
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert_eq!(engine.wallet.balance("alice").unwrap(), MAX_BALANCE);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - VIP ENTITLEMENTS
//
// A purchased, time-boxed flag on the account. Buying it debits the cost as
// a quiz_fee entry and sets the expiry in the same atomic unit.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::abort;
use crate::locks::safe_lock;
use crate::txlog::{signed_amount, NewTransaction, TransactionLog};
use crate::wallet::WalletLedger;
use crate::Context;
use chrono::{DateTime, Duration, Utc};
use dqz_core::{vip, CoreError, CoreResult, Transaction, TxKind, TxStatus};
use log::info;

#[derive(Debug, Clone, PartialEq)]
pub struct VipGrant {
    pub expires_at: DateTime<Utc>,
    /// None for a free grant.
    pub transaction: Option<Transaction>,
    pub new_balance: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VipStatus {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining: Option<Duration>,
}

#[derive(Clone)]
pub struct VipService {
    ctx: Context,
    wallet: WalletLedger,
    log: TransactionLog,
}

impl VipService {
    pub fn new(ctx: Context, wallet: WalletLedger, log: TransactionLog) -> Self {
        Self { ctx, wallet, log }
    }

    /// Charge `cost` and make the account VIP for `duration_days` from now.
    pub fn grant(&self, account_id: &str, duration_days: u32, cost: u64) -> CoreResult<VipGrant> {
        if duration_days == 0 {
            return Err(CoreError::InvalidAmount("VIP duration of 0 days".to_string()));
        }
        let amount = signed_amount(TxKind::QuizFee, cost)?;
        let id = self.ctx.db.next_id()?;
        let now = self.ctx.now();
        let expires_at = vip::expiry_after(now, duration_days);

        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);
        let grant = self.ctx.db.atomic("grant_vip", |txn| {
            let account = txn.account(account_id)?;
            if account.diamond_balance < cost {
                return Err(abort(CoreError::InsufficientFunds {
                    balance: account.diamond_balance,
                    required: cost,
                }));
            }

            let transaction = if cost > 0 {
                let change = self.wallet.apply(txn, account_id, amount)?;
                let new = NewTransaction::new(account_id, TxKind::QuizFee, change.applied);
                let mut tx = self.log.create_in(txn, id, &new, TxStatus::Completed, now)?;
                self.log.post_in(txn, &mut tx)?;
                Some(tx)
            } else {
                None
            };

            let mut account = txn.account(account_id)?;
            account.vip_expires_at = Some(expires_at);
            txn.put_account(&account)?;
            Ok(VipGrant {
                expires_at,
                transaction,
                new_balance: account.diamond_balance,
            })
        })?;

        if let Some(tx) = &grant.transaction {
            self.ctx.metrics.record_posted(tx);
        }
        info!(
            "{} is VIP until {} (paid {})",
            account_id,
            expires_at.to_rfc3339(),
            cost
        );
        Ok(grant)
    }

    /// Grant the configured plan.
    pub fn grant_plan(&self, account_id: &str) -> CoreResult<VipGrant> {
        let plan = &self.ctx.config.vip;
        self.grant(account_id, plan.duration_days, plan.cost)
    }

    pub fn status(&self, account_id: &str) -> CoreResult<VipStatus> {
        let account = self.wallet.account(account_id)?;
        let now = self.ctx.now();
        Ok(VipStatus {
            active: vip::is_active(&account, now),
            expires_at: account.vip_expires_at,
            remaining: vip::remaining(&account, now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, funded};

    #[test]
    fn test_grant_debits_and_activates() {
        let (engine, _) = testutil::engine();
        funded(&engine, "alice", 600);
        let grant = engine.vip.grant("alice", 30, 500).unwrap();
        assert_eq!(grant.new_balance, 100);
        let tx = grant.transaction.unwrap();
        assert_eq!(tx.kind, TxKind::QuizFee);
        assert_eq!(tx.amount, -500);

        let status = engine.vip.status("alice").unwrap();
        assert!(status.active);
        assert_eq!(status.remaining, Some(Duration::days(30)));
    }

    #[test]
    fn test_grant_without_funds() {
        let (engine, _) = testutil::engine();
        funded(&engine, "alice", 100);
        assert_eq!(
            engine.vip.grant("alice", 30, 500).unwrap_err(),
            CoreError::InsufficientFunds {
                balance: 100,
                required: 500
            }
        );
        assert!(!engine.vip.status("alice").unwrap().active);
    }

    #[test]
    fn test_entitlement_expires() {
        let (engine, clock) = testutil::engine();
        funded(&engine, "alice", 600);
        engine.vip.grant_plan("alice").unwrap();
        clock.advance(Duration::days(30));
        let status = engine.vip.status("alice").unwrap();
        assert!(!status.active);
        assert!(status.remaining.is_none());
        assert!(status.expires_at.is_some());
    }
}

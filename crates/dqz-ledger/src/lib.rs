// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - LEDGER ENGINE
//
// Wallet ledger, transaction log, quiz attempt controller, payment
// reconciler and VIP entitlements over one sled database.
//
// Every public operation:
//   1. takes the per-entity locks it needs (quiz before account),
//   2. runs one atomic unit that re-reads state, checks invariants and
//      writes balance + ledger entry together,
//   3. returns the authoritative result. Callers never predict balances.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{DateTime, Utc};
use dqz_core::config::DqzConfig;
use dqz_core::CoreResult;
use std::sync::{Arc, Mutex};

pub mod audit;
pub mod controller;
pub mod db;
pub mod locks;
pub mod metrics;
pub mod payments;
pub mod txlog;
pub mod vip;
pub mod wallet;

pub use controller::{AttemptResult, QuizAttemptController};
pub use audit::AuditReport;
pub use db::{LedgerDatabase, LedgerTxn};
pub use locks::LockRegistry;
pub use metrics::LedgerMetrics;
pub use payments::{
    Decision, PaymentEvent, PaymentEventType, PaymentReconciler, ReconcileOutcome,
    WithdrawalOutcome,
};
pub use txlog::{NewTransaction, TransactionLog};
pub use vip::{VipGrant, VipService, VipStatus};
pub use wallet::WalletLedger;

/// Wall-clock source. Tests swap in a `ManualClock` to move time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replay tooling.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *locks::safe_lock(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = locks::safe_lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *locks::safe_lock(&self.now)
    }
}

/// Shared handles every component works through. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub(crate) db: Arc<LedgerDatabase>,
    pub(crate) locks: Arc<LockRegistry>,
    pub(crate) metrics: Arc<LedgerMetrics>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Arc<DqzConfig>,
}

impl Context {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// The whole economy engine. Clone it freely across request handlers.
#[derive(Clone)]
pub struct DqzEngine {
    ctx: Context,
    pub wallet: WalletLedger,
    pub log: TransactionLog,
    pub quizzes: QuizAttemptController,
    pub payments: PaymentReconciler,
    pub vip: VipService,
}

impl DqzEngine {
    /// Open the database under `config.data_dir` with the system clock.
    pub fn open(config: DqzConfig) -> CoreResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: DqzConfig, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        config.validate()?;
        let metrics = Arc::new(LedgerMetrics::new()?);
        let db = LedgerDatabase::open(&config.data_dir, config.storage.clone(), metrics.clone())?;
        Ok(Self::assemble(db, metrics, clock, config))
    }

    /// In-memory engine, discarded on drop.
    pub fn temporary(config: DqzConfig, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        config.validate()?;
        let metrics = Arc::new(LedgerMetrics::new()?);
        let db = LedgerDatabase::open_temporary(config.storage.clone(), metrics.clone())?;
        Ok(Self::assemble(db, metrics, clock, config))
    }

    fn assemble(
        db: LedgerDatabase,
        metrics: Arc<LedgerMetrics>,
        clock: Arc<dyn Clock>,
        config: DqzConfig,
    ) -> Self {
        let ctx = Context {
            db: Arc::new(db),
            locks: Arc::new(LockRegistry::new()),
            metrics,
            clock,
            config: Arc::new(config),
        };
        let wallet = WalletLedger::new(ctx.clone());
        let log = TransactionLog::new(ctx.clone());
        Self {
            quizzes: QuizAttemptController::new(ctx.clone(), wallet.clone(), log.clone()),
            payments: PaymentReconciler::new(ctx.clone(), wallet.clone(), log.clone()),
            vip: VipService::new(ctx.clone(), wallet.clone(), log.clone()),
            wallet,
            log,
            ctx,
        }
    }

    pub fn database(&self) -> &LedgerDatabase {
        &self.ctx.db
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.ctx.metrics
    }

    /// Prometheus text exposition, with store gauges refreshed first.
    pub fn export_metrics(&self) -> CoreResult<String> {
        self.ctx.metrics.update_db_metrics(&self.ctx.db.stats());
        self.ctx.metrics.gather_text()
    }

    pub fn config(&self) -> &DqzConfig {
        &self.ctx.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.ctx.db.flush()
    }

    pub fn audit(&self, account_id: &str) -> CoreResult<AuditReport> {
        audit::audit_account(&self.ctx.db, account_id)
    }

    pub fn audit_all(&self) -> CoreResult<Vec<AuditReport>> {
        audit::audit_all(&self.ctx.db)
    }

    pub fn state_root(&self) -> CoreResult<String> {
        audit::state_root(&self.ctx.db)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::TimeZone;

    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn engine() -> (DqzEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = DqzEngine::temporary(DqzConfig::default(), clock.clone()).unwrap();
        (engine, clock)
    }

    /// Register `id` and move its balance to exactly `balance` through the
    /// ledger (a completed deposit), so audits stay consistent.
    pub fn funded(engine: &DqzEngine, id: &str, balance: u64) {
        let acct = engine.wallet.register_account(id).unwrap();
        if balance > acct.diamond_balance {
            let top_up = balance - acct.diamond_balance;
            let reference = format!("seed-{}", id);
            engine
                .payments
                .create_deposit(id, dqz_core::converter::to_currency(top_up), &reference)
                .unwrap();
            engine.payments.reconcile_deposit(&reference, top_up, id).unwrap();
        } else if balance < acct.diamond_balance {
            let tx = engine
                .payments
                .create_withdrawal(id, acct.diamond_balance - balance, None)
                .unwrap();
            engine
                .payments
                .reconcile_withdrawal_decision(tx.id, Decision::Approve)
                .unwrap();
        }
        assert_eq!(engine.wallet.balance(id).unwrap(), balance);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - METRICS MODULE
//
// Prometheus counters for the wallet ledger. Each engine owns its registry;
// `gather_text` renders the text exposition format.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::DatabaseStats;
use dqz_core::{CoreError, CoreResult, Transaction};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct LedgerMetrics {
    registry: Registry,

    // Ledger
    pub transactions_total: IntCounterVec,
    pub diamonds_credited_total: IntCounter,
    pub diamonds_debited_total: IntCounter,
    pub accounts_registered_total: IntCounter,

    // Quiz attempts
    pub attempts_started_total: IntCounter,
    pub attempts_finished_total: IntCounterVec,
    pub slot_conflicts_total: IntCounter,

    // Payments
    pub deposit_mismatches_total: IntCounter,
    pub withdrawal_decisions_total: IntCounterVec,

    // Storage
    pub storage_retries_total: IntCounter,
    pub db_accounts: IntGauge,
    pub db_transactions: IntGauge,
    pub db_quizzes: IntGauge,
    pub db_attempts: IntGauge,
    pub db_size_bytes: IntGauge,
}

fn metric_err(e: prometheus::Error) -> CoreError {
    CoreError::Config(format!("metrics: {}", e))
}

impl LedgerMetrics {
    pub fn new() -> CoreResult<Self> {
        let registry = Registry::new();

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "dqz_transactions_total",
                "Ledger entries that moved a balance, by kind",
            ),
            &["kind"],
        )
        .map_err(metric_err)?;
        registry
            .register(Box::new(transactions_total.clone()))
            .map_err(metric_err)?;

        let diamonds_credited_total = IntCounter::with_opts(Opts::new(
            "dqz_diamonds_credited_total",
            "Diamonds credited to wallets",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(diamonds_credited_total.clone()))
            .map_err(metric_err)?;

        let diamonds_debited_total = IntCounter::with_opts(Opts::new(
            "dqz_diamonds_debited_total",
            "Diamonds debited from wallets",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(diamonds_debited_total.clone()))
            .map_err(metric_err)?;

        let accounts_registered_total = IntCounter::with_opts(Opts::new(
            "dqz_accounts_registered_total",
            "Accounts created",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(accounts_registered_total.clone()))
            .map_err(metric_err)?;

        let attempts_started_total = IntCounter::with_opts(Opts::new(
            "dqz_attempts_started_total",
            "Quiz attempts that reserved a slot and paid the fee",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(attempts_started_total.clone()))
            .map_err(metric_err)?;

        let attempts_finished_total = IntCounterVec::new(
            Opts::new(
                "dqz_attempts_finished_total",
                "Finished quiz attempts, by termination reason",
            ),
            &["reason"],
        )
        .map_err(metric_err)?;
        registry
            .register(Box::new(attempts_finished_total.clone()))
            .map_err(metric_err)?;

        let slot_conflicts_total = IntCounter::with_opts(Opts::new(
            "dqz_slot_conflicts_total",
            "start_attempt calls that found the slot already reserved",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(slot_conflicts_total.clone()))
            .map_err(metric_err)?;

        let deposit_mismatches_total = IntCounter::with_opts(Opts::new(
            "dqz_deposit_mismatches_total",
            "Deposits failed because the stated amount did not match",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(deposit_mismatches_total.clone()))
            .map_err(metric_err)?;

        let withdrawal_decisions_total = IntCounterVec::new(
            Opts::new(
                "dqz_withdrawal_decisions_total",
                "Admin withdrawal decisions, by outcome",
            ),
            &["decision"],
        )
        .map_err(metric_err)?;
        registry
            .register(Box::new(withdrawal_decisions_total.clone()))
            .map_err(metric_err)?;

        let storage_retries_total = IntCounter::with_opts(Opts::new(
            "dqz_storage_retries_total",
            "Atomic units retried after a storage failure",
        ))
        .map_err(metric_err)?;
        registry
            .register(Box::new(storage_retries_total.clone()))
            .map_err(metric_err)?;

        let db_accounts = IntGauge::new("dqz_db_accounts", "Accounts in the store")
            .map_err(metric_err)?;
        registry
            .register(Box::new(db_accounts.clone()))
            .map_err(metric_err)?;
        let db_transactions = IntGauge::new("dqz_db_transactions", "Transactions in the store")
            .map_err(metric_err)?;
        registry
            .register(Box::new(db_transactions.clone()))
            .map_err(metric_err)?;
        let db_quizzes = IntGauge::new("dqz_db_quizzes", "Published quiz instances")
            .map_err(metric_err)?;
        registry
            .register(Box::new(db_quizzes.clone()))
            .map_err(metric_err)?;
        let db_attempts = IntGauge::new("dqz_db_attempts", "Finished attempts recorded")
            .map_err(metric_err)?;
        registry
            .register(Box::new(db_attempts.clone()))
            .map_err(metric_err)?;
        let db_size_bytes = IntGauge::new("dqz_db_size_bytes", "Database size on disk")
            .map_err(metric_err)?;
        registry
            .register(Box::new(db_size_bytes.clone()))
            .map_err(metric_err)?;

        Ok(Self {
            registry,
            transactions_total,
            diamonds_credited_total,
            diamonds_debited_total,
            accounts_registered_total,
            attempts_started_total,
            attempts_finished_total,
            slot_conflicts_total,
            deposit_mismatches_total,
            withdrawal_decisions_total,
            storage_retries_total,
            db_accounts,
            db_transactions,
            db_quizzes,
            db_attempts,
            db_size_bytes,
        })
    }

    pub fn update_db_metrics(&self, stats: &DatabaseStats) {
        self.db_accounts.set(stats.accounts_count as i64);
        self.db_transactions.set(stats.transactions_count as i64);
        self.db_quizzes.set(stats.quizzes_count as i64);
        self.db_attempts.set(stats.attempts_count as i64);
        self.db_size_bytes.set(stats.size_on_disk as i64);
    }

    /// Count an entry that moved a balance.
    pub fn record_posted(&self, tx: &Transaction) {
        self.transactions_total
            .with_label_values(&[tx.kind.as_str()])
            .inc();
        if tx.amount >= 0 {
            self.diamonds_credited_total.inc_by(tx.amount as u64);
        } else {
            self.diamonds_debited_total.inc_by(tx.amount.unsigned_abs());
        }
    }

    pub fn gather_text(&self) -> CoreResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_err)?;
        String::from_utf8(buffer).map_err(|e| CoreError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dqz_core::{TxKind, TxStatus};

    #[test]
    fn test_record_posted_splits_direction() {
        let metrics = LedgerMetrics::new().unwrap();
        let now = Utc::now();
        let mut tx = Transaction {
            id: 1,
            account_id: "a".to_string(),
            kind: TxKind::QuizFee,
            amount: -50,
            nominal_amount: -50,
            currency_amount: None,
            status: TxStatus::Completed,
            external_reference: None,
            related_transaction: None,
            ledger_seq: Some(1),
            created_at: now,
            updated_at: now,
        };
        metrics.record_posted(&tx);
        tx.kind = TxKind::QuizReward;
        tx.amount = 120;
        metrics.record_posted(&tx);

        assert_eq!(metrics.diamonds_debited_total.get(), 50);
        assert_eq!(metrics.diamonds_credited_total.get(), 120);
        let text = metrics.gather_text().unwrap();
        assert!(text.contains("dqz_transactions_total{kind=\"quiz_fee\"} 1"));
    }
}

//! Shared fixtures for the cross-crate integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dqz_core::config::DqzConfig;
use dqz_core::converter::to_currency;
use dqz_core::{CoreResult, QuizInstance, QuizStatus, RewardStep, SlotState};
use dqz_ledger::{Decision, DqzEngine, ManualClock};
use std::sync::Arc;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// In-memory engine on a manual clock set to `epoch()`.
pub fn temp_engine() -> CoreResult<(DqzEngine, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(epoch()));
    let engine = DqzEngine::temporary(DqzConfig::default(), clock.clone())?;
    Ok((engine, clock))
}

/// Live quiz open for an hour either side of `epoch()`.
pub fn live_quiz(id: &str, entry_fee: u64, rewards: &[u64]) -> QuizInstance {
    QuizInstance {
        id: id.to_string(),
        title: format!("Live quiz {}", id),
        entry_fee,
        prize_pool: rewards.iter().sum(),
        reward_progression: rewards
            .iter()
            .enumerate()
            .map(|(i, r)| RewardStep {
                question_index: i as u32,
                correct_reward: *r,
            })
            .collect(),
        penalty_per_wrong: 10,
        slot_state: SlotState::Open,
        status: QuizStatus::Live,
        is_vip: false,
        start_time: epoch() - Duration::hours(1),
        end_time: epoch() + Duration::hours(1),
        questions: Vec::new(),
    }
}

/// Register `account_id` and bring it to exactly `balance` through the
/// ledger, so every audit stays consistent.
pub fn fund(engine: &DqzEngine, account_id: &str, balance: u64) -> CoreResult<()> {
    let account = engine.wallet.register_account(account_id)?;
    if balance > account.diamond_balance {
        let top_up = balance - account.diamond_balance;
        let reference = format!("fund-{}", account_id);
        engine
            .payments
            .create_deposit(account_id, to_currency(top_up), &reference)?;
        engine
            .payments
            .reconcile_deposit(&reference, top_up, account_id)?;
    } else if balance < account.diamond_balance {
        let tx = engine.payments.create_withdrawal(
            account_id,
            account.diamond_balance - balance,
            None,
        )?;
        engine
            .payments
            .reconcile_withdrawal_decision(tx.id, Decision::Approve)?;
    }
    Ok(())
}

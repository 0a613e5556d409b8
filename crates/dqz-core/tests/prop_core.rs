// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — dqz-core
//
// Invariants of the pure economy rules for ALL inputs: wallet bounds,
// conversion, and the all-or-nothing reward rule.
//
// Run: cargo test --release -p dqz-core --test prop_core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dqz_core::converter::{to_currency, to_diamonds};
use dqz_core::reward::{compute_payout, progression_total, scale_progression};
use dqz_core::{
    apply_delta, AnswerOutcome, CoreError, RewardStep, TerminationReason,
    CURRENCY_UNITS_PER_DIAMOND, MAX_BALANCE,
};
use proptest::prelude::*;

fn arb_progression() -> impl Strategy<Value = Vec<RewardStep>> {
    prop::collection::vec(0u64..=500, 1..=15).prop_map(|rewards| {
        rewards
            .into_iter()
            .enumerate()
            .map(|(i, correct_reward)| RewardStep {
                question_index: i as u32,
                correct_reward,
            })
            .collect()
    })
}

fn arb_outcome() -> impl Strategy<Value = AnswerOutcome> {
    prop_oneof![Just(AnswerOutcome::Correct), Just(AnswerOutcome::Incorrect)]
}

// ─────────────────────────────────────────────────────────────────
// WALLET BOUNDS
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: any sequence of deltas keeps 0 <= balance <= MAX_BALANCE
    #[test]
    fn prop_balance_stays_in_bounds(
        start in 0u64..=MAX_BALANCE,
        deltas in prop::collection::vec(-3_000i64..=3_000, 0..50),
    ) {
        let mut balance = start;
        for delta in deltas {
            match apply_delta(balance, delta) {
                Ok(change) => balance = change.new_balance,
                Err(CoreError::InsufficientFunds { .. }) => {
                    prop_assert!(delta < 0 && delta.unsigned_abs() > balance);
                }
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
            prop_assert!(balance <= MAX_BALANCE);
        }
    }

    /// PROPERTY: the applied credit is exactly what the balance moved by
    #[test]
    fn prop_applied_matches_movement(start in 0u64..=MAX_BALANCE, delta in 0i64..=5_000) {
        let change = apply_delta(start, delta).unwrap();
        prop_assert_eq!(change.new_balance - start, change.applied as u64);
        prop_assert!(change.applied <= delta);
    }

    /// PROPERTY: debits are never silently floored
    #[test]
    fn prop_debit_is_exact(start in 0u64..=MAX_BALANCE, debit in 1u64..=MAX_BALANCE) {
        match apply_delta(start, -(debit as i64)) {
            Ok(change) => prop_assert_eq!(change.new_balance, start - debit),
            Err(_) => prop_assert!(debit > start),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// CONVERSION
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: diamonds → currency → diamonds is the identity
    #[test]
    fn prop_diamond_roundtrip(diamonds in 0u64..=u64::MAX / CURRENCY_UNITS_PER_DIAMOND) {
        prop_assert_eq!(to_diamonds(to_currency(diamonds)), diamonds);
    }

    /// PROPERTY: converting currency never creates value
    #[test]
    fn prop_conversion_floors(currency in any::<u64>()) {
        prop_assert!(to_currency(to_diamonds(currency)) <= currency);
    }
}

// ─────────────────────────────────────────────────────────────────
// REWARD ALL-OR-NOTHING
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: completed_all with at least one miss pays 0
    #[test]
    fn prop_any_miss_pays_zero(
        table in arb_progression(),
        seed in prop::collection::vec(arb_outcome(), 15),
        miss_at in any::<prop::sample::Index>(),
        penalty in 0u64..=100,
    ) {
        let mut outcomes: Vec<AnswerOutcome> = seed.into_iter().take(table.len()).collect();
        let idx = miss_at.index(outcomes.len());
        outcomes[idx] = AnswerOutcome::Incorrect;

        let b = compute_payout(&table, penalty, &outcomes, TerminationReason::CompletedAll).unwrap();
        prop_assert_eq!(b.payout, 0);
    }

    /// PROPERTY: a perfect completed run pays exactly the table total
    #[test]
    fn prop_perfect_run_pays_total(table in arb_progression(), penalty in 0u64..=100) {
        let outcomes = vec![AnswerOutcome::Correct; table.len()];
        let b = compute_payout(&table, penalty, &outcomes, TerminationReason::CompletedAll).unwrap();
        prop_assert_eq!(b.payout, progression_total(&table));
    }

    /// PROPERTY: only completed_all ever pays
    #[test]
    fn prop_other_reasons_pay_zero(table in arb_progression()) {
        let outcomes = vec![AnswerOutcome::Correct; table.len()];
        for reason in [
            TerminationReason::EarlyFailThreshold,
            TerminationReason::UserQuit,
            TerminationReason::TimeExpired,
        ] {
            let b = compute_payout(&table, 0, &outcomes, reason).unwrap();
            prop_assert_eq!(b.payout, 0);
        }
    }

    /// PROPERTY: more outcomes than questions is always rejected
    #[test]
    fn prop_overlong_outcomes_rejected(table in arb_progression(), extra in 1usize..=5) {
        let outcomes = vec![AnswerOutcome::Correct; table.len() + extra];
        let err = compute_payout(&table, 0, &outcomes, TerminationReason::CompletedAll).unwrap_err();
        prop_assert!(matches!(err, CoreError::MalformedOutcome(_)), "got {}", err);
    }

    /// PROPERTY: rescaling hits the requested total exactly
    #[test]
    fn prop_scale_hits_target(table in arb_progression(), target in 0u64..=4_000) {
        let scaled = scale_progression(&table, target);
        prop_assert_eq!(scaled.len(), table.len());
        prop_assert_eq!(progression_total(&scaled), target);
    }
}

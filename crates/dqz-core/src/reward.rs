// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - REWARD ENGINE
//
// Pure payout rules. A run pays the full reward progression only when every
// question was answered correctly through to the end; anything else pays 0.
// The running tally (rewards minus penalties) is for display only and never
// reaches the ledger.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{AnswerOutcome, CoreError, CoreResult, RewardStep, TerminationReason};

/// Result of scoring a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    /// Authoritative amount to credit.
    pub payout: u64,
    /// Presentational running number: rewards earned minus penalties.
    pub display_tally: i64,
    pub correct: usize,
    pub incorrect: usize,
}

impl PayoutBreakdown {
    pub fn is_perfect(&self) -> bool {
        self.incorrect == 0 && self.correct > 0
    }
}

/// Sum of every correct-answer reward in the table.
pub fn progression_total(progression: &[RewardStep]) -> u64 {
    progression
        .iter()
        .fold(0u64, |acc, step| acc.saturating_add(step.correct_reward))
}

/// A voluntary quit is only offered once half the questions are answered.
pub fn can_quit(answered: usize, total_questions: usize) -> bool {
    total_questions > 0 && answered.saturating_mul(2) >= total_questions
}

/// Rewards for correct answers so far minus `penalty_per_wrong` per miss.
pub fn running_tally(
    progression: &[RewardStep],
    penalty_per_wrong: u64,
    outcomes: &[AnswerOutcome],
) -> i64 {
    outcomes
        .iter()
        .zip(progression.iter())
        .fold(0i64, |acc, (outcome, step)| match outcome {
            AnswerOutcome::Correct => acc.saturating_add(step.correct_reward as i64),
            AnswerOutcome::Incorrect => acc.saturating_sub(penalty_per_wrong as i64),
        })
}

/// Score a finished run.
///
/// Errors with `MalformedOutcome` when the caller reports more answers than
/// questions, claims `completed_all` without answering every question, or
/// quits before the midpoint.
pub fn compute_payout(
    progression: &[RewardStep],
    penalty_per_wrong: u64,
    outcomes: &[AnswerOutcome],
    reason: TerminationReason,
) -> CoreResult<PayoutBreakdown> {
    if outcomes.len() > progression.len() {
        return Err(CoreError::MalformedOutcome(format!(
            "{} outcomes for {} questions",
            outcomes.len(),
            progression.len()
        )));
    }

    let correct = outcomes.iter().filter(|o| o.is_correct()).count();
    let mut breakdown = PayoutBreakdown {
        payout: 0,
        display_tally: running_tally(progression, penalty_per_wrong, outcomes),
        correct,
        incorrect: outcomes.len() - correct,
    };

    if reason == TerminationReason::UserQuit && !can_quit(outcomes.len(), progression.len()) {
        return Err(CoreError::MalformedOutcome(format!(
            "quit after {} of {} questions, before the midpoint",
            outcomes.len(),
            progression.len()
        )));
    }
    if outcomes.is_empty() {
        return Ok(breakdown);
    }

    match reason {
        TerminationReason::CompletedAll => {
            if outcomes.len() < progression.len() {
                return Err(CoreError::MalformedOutcome(format!(
                    "completed_all with {} of {} questions answered",
                    outcomes.len(),
                    progression.len()
                )));
            }
            if breakdown.incorrect == 0 {
                breakdown.payout = progression_total(progression);
            }
        }
        TerminationReason::UserQuit
        | TerminationReason::EarlyFailThreshold
        | TerminationReason::TimeExpired => {}
    }

    Ok(breakdown)
}

/// Rescale a progression so its total equals `target_total`, keeping the
/// relative weights. Rounding remainder goes to the final question.
pub fn scale_progression(progression: &[RewardStep], target_total: u64) -> Vec<RewardStep> {
    let Some(last) = progression.len().checked_sub(1) else {
        return Vec::new();
    };
    let total = progression_total(progression);
    let count = progression.len() as u128;

    let mut scaled: Vec<RewardStep> = progression
        .iter()
        .map(|step| {
            let reward = if total == 0 {
                target_total as u128 / count
            } else {
                step.correct_reward as u128 * target_total as u128 / total as u128
            };
            RewardStep {
                question_index: step.question_index,
                correct_reward: reward as u64,
            }
        })
        .collect();

    let assigned = progression_total(&scaled);
    scaled[last].correct_reward += target_total.saturating_sub(assigned);
    scaled
}

/// Content-side sanity check for a published table: non-empty, question
/// indices strictly increasing.
pub fn validate_progression(progression: &[RewardStep]) -> CoreResult<()> {
    if progression.is_empty() {
        return Err(CoreError::MalformedOutcome(
            "reward progression is empty".to_string(),
        ));
    }
    for pair in progression.windows(2) {
        if pair[1].question_index <= pair[0].question_index {
            return Err(CoreError::MalformedOutcome(format!(
                "question index {} follows {}",
                pair[1].question_index, pair[0].question_index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnswerOutcome::{Correct, Incorrect};

    fn table(rewards: &[u64]) -> Vec<RewardStep> {
        rewards
            .iter()
            .enumerate()
            .map(|(i, r)| RewardStep {
                question_index: i as u32,
                correct_reward: *r,
            })
            .collect()
    }

    #[test]
    fn test_perfect_run_pays_full_table() {
        let t = table(&[10, 20, 30, 40]);
        let b = compute_payout(&t, 5, &[Correct; 4], TerminationReason::CompletedAll).unwrap();
        assert_eq!(b.payout, 100);
        assert!(b.is_perfect());
        assert_eq!(b.display_tally, 100);
    }

    #[test]
    fn test_single_miss_pays_nothing() {
        let t = table(&[10, 20, 30, 40]);
        let b = compute_payout(
            &t,
            5,
            &[Correct, Correct, Incorrect, Correct],
            TerminationReason::CompletedAll,
        )
        .unwrap();
        assert_eq!(b.payout, 0);
        assert_eq!(b.display_tally, 10 + 20 - 5 + 40);
    }

    #[test]
    fn test_quit_after_midpoint_pays_zero() {
        let t = table(&[10, 20, 30, 40]);
        let b = compute_payout(&t, 0, &[Correct, Correct], TerminationReason::UserQuit).unwrap();
        assert_eq!(b.payout, 0);
        assert_eq!(b.display_tally, 30);
    }

    #[test]
    fn test_quit_before_midpoint_rejected() {
        let t = table(&[10, 20, 30, 40]);
        let err = compute_payout(&t, 0, &[Correct], TerminationReason::UserQuit).unwrap_err();
        assert!(matches!(err, CoreError::MalformedOutcome(_)));
    }

    #[test]
    fn test_empty_outcomes_pay_zero() {
        let t = table(&[10, 20]);
        for reason in [
            TerminationReason::CompletedAll,
            TerminationReason::EarlyFailThreshold,
            TerminationReason::TimeExpired,
        ] {
            assert_eq!(compute_payout(&t, 0, &[], reason).unwrap().payout, 0);
        }
    }

    #[test]
    fn test_quit_without_answers_rejected() {
        let t = table(&[10, 20, 30, 40]);
        let err = compute_payout(&t, 0, &[], TerminationReason::UserQuit).unwrap_err();
        assert!(matches!(err, CoreError::MalformedOutcome(_)));
    }

    #[test]
    fn test_too_many_outcomes_is_malformed() {
        let t = table(&[10]);
        let err = compute_payout(&t, 0, &[Correct, Correct], TerminationReason::CompletedAll)
            .unwrap_err();
        assert!(matches!(err, CoreError::MalformedOutcome(_)));
    }

    #[test]
    fn test_completed_all_must_cover_table() {
        let t = table(&[10, 20, 30]);
        let err =
            compute_payout(&t, 0, &[Correct, Correct], TerminationReason::CompletedAll).unwrap_err();
        assert!(matches!(err, CoreError::MalformedOutcome(_)));
    }

    #[test]
    fn test_early_fail_and_timeout_pay_zero() {
        let t = table(&[10, 20, 30]);
        for reason in [
            TerminationReason::EarlyFailThreshold,
            TerminationReason::TimeExpired,
        ] {
            let b = compute_payout(&t, 0, &[Correct, Correct], reason).unwrap();
            assert_eq!(b.payout, 0);
        }
    }

    #[test]
    fn test_scale_progression_hits_target() {
        let t = table(&[10, 20, 30, 40]);
        let scaled = scale_progression(&t, 77);
        assert_eq!(progression_total(&scaled), 77);
        assert_eq!(scaled.len(), 4);
        assert!(scaled[0].correct_reward <= scaled[3].correct_reward);

        let zeros = scale_progression(&table(&[0, 0, 0]), 10);
        assert_eq!(progression_total(&zeros), 10);
        assert!(scale_progression(&[], 10).is_empty());
    }

    #[test]
    fn test_validate_progression() {
        assert!(validate_progression(&table(&[1, 2])).is_ok());
        assert!(validate_progression(&[]).is_err());
        let mut bad = table(&[1, 2]);
        bad[1].question_index = 0;
        assert!(validate_progression(&bad).is_err());
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - QUIZ ATTEMPT CONTROLLER
//
// start_attempt: eligibility checks, slot reservation, fee debit, fee entry
// and session row in ONE atomic unit. Any failure leaves the slot open and
// the balance untouched.
//
// finish_attempt: payout, reward entry, stats and the attempt record in ONE
// atomic unit. A second finish is rejected, never paid twice.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::db::{abort, TxError};
use crate::locks::safe_lock;
use crate::txlog::{signed_amount, NewTransaction, TransactionLog};
use crate::wallet::WalletLedger;
use crate::Context;
use dqz_core::reward::{self, PayoutBreakdown};
use dqz_core::{
    vip, AnswerOutcome, AttemptSession, CoreError, CoreResult, QuizAttempt, QuizInstance,
    QuizStatus, SessionState, SlotState, TerminationReason, TxKind, TxStatus,
    VIP_PRIZE_MULTIPLIER,
};
use log::{debug, info, warn};
use std::cell::Cell;

/// What a finished attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub attempt: QuizAttempt,
    pub breakdown: PayoutBreakdown,
    /// Authoritative balance after the payout landed.
    pub new_balance: u64,
}

#[derive(Clone)]
pub struct QuizAttemptController {
    ctx: Context,
    wallet: WalletLedger,
    log: TransactionLog,
}

impl QuizAttemptController {
    pub fn new(ctx: Context, wallet: WalletLedger, log: TransactionLog) -> Self {
        Self { ctx, wallet, log }
    }

    // ─────────────────────────────────────────────────────────────────
    // Content
    // ─────────────────────────────────────────────────────────────────

    /// Store a new quiz instance as supplied by content authoring.
    pub fn publish_quiz(&self, quiz: QuizInstance) -> CoreResult<QuizInstance> {
        if quiz.id.is_empty() || quiz.id.chars().any(char::is_control) {
            return Err(CoreError::InvalidQuizId(quiz.id));
        }
        if quiz.entry_fee == 0 {
            return Err(CoreError::InvalidEntryFee(0));
        }
        reward::validate_progression(&quiz.reward_progression)?;
        if !quiz.questions.is_empty() && quiz.questions.len() != quiz.reward_progression.len() {
            return Err(CoreError::MalformedOutcome(format!(
                "{} questions for {} reward steps",
                quiz.questions.len(),
                quiz.reward_progression.len()
            )));
        }
        if quiz.end_time <= quiz.start_time {
            return Err(CoreError::QuizUnavailable(format!(
                "{}: window closes before it opens",
                quiz.id
            )));
        }

        let lock = self.ctx.locks.quiz(&quiz.id);
        let _guard = safe_lock(&lock);
        self.ctx.db.atomic("publish_quiz", |txn| {
            if txn.quiz_exists(&quiz.id)? {
                return Err(abort(CoreError::QuizExists(quiz.id.clone())));
            }
            txn.put_quiz(&quiz)
        })?;
        info!(
            "published quiz {} (fee {}, prize {}, vip {})",
            quiz.id, quiz.entry_fee, quiz.prize_pool, quiz.is_vip
        );
        Ok(quiz)
    }

    /// Content lifecycle: upcoming → live → completed.
    pub fn set_status(&self, quiz_id: &str, status: QuizStatus) -> CoreResult<QuizInstance> {
        let lock = self.ctx.locks.quiz(quiz_id);
        let _guard = safe_lock(&lock);
        self.ctx.db.atomic("set_quiz_status", |txn| {
            let mut quiz = txn.quiz(quiz_id)?;
            quiz.status = status;
            txn.put_quiz(&quiz)?;
            Ok(quiz)
        })
    }

    pub fn quiz(&self, quiz_id: &str) -> CoreResult<QuizInstance> {
        self.ctx
            .db
            .get_quiz(quiz_id)?
            .ok_or_else(|| CoreError::UnknownQuiz(quiz_id.to_string()))
    }

    pub fn quizzes(&self) -> CoreResult<Vec<QuizInstance>> {
        self.ctx.db.all_quizzes()
    }

    pub fn session(&self, account_id: &str, quiz_id: &str) -> CoreResult<Option<AttemptSession>> {
        self.ctx.db.get_session(account_id, quiz_id)
    }

    pub fn attempt(&self, account_id: &str, quiz_id: &str) -> CoreResult<Option<QuizAttempt>> {
        self.ctx.db.get_attempt(account_id, quiz_id)
    }

    // ─────────────────────────────────────────────────────────────────
    // Attempts
    // ─────────────────────────────────────────────────────────────────

    /// Reserve the quiz slot for `account_id` and charge the entry fee.
    ///
    /// `custom_fee` only matters on a VIP quiz played by an active VIP; it
    /// defaults to the quiz's entry fee and doubles into the prize pool.
    pub fn start_attempt(
        &self,
        account_id: &str,
        quiz_id: &str,
        custom_fee: Option<u64>,
    ) -> CoreResult<AttemptSession> {
        let fee_tx_id = self.ctx.db.next_id()?;
        let now = self.ctx.now();

        let quiz_lock = self.ctx.locks.quiz(quiz_id);
        let _quiz_guard = safe_lock(&quiz_lock);
        let account_lock = self.ctx.locks.account(account_id);
        let _account_guard = safe_lock(&account_lock);

        let slot_lost = Cell::new(false);
        let result = self.ctx.db.atomic("start_attempt", |txn| {
            slot_lost.set(false);
            if txn.attempt(account_id, quiz_id)?.is_some()
                || txn.session(account_id, quiz_id)?.is_some()
            {
                return Err(abort(CoreError::AlreadyAttempted {
                    account: account_id.to_string(),
                    quiz: quiz_id.to_string(),
                }));
            }

            let mut quiz = txn.quiz(quiz_id)?;
            let account = txn.account(account_id)?;

            if quiz.slot_state != SlotState::Open {
                slot_lost.set(true);
                return Err(unavailable(quiz_id, "slot already reserved"));
            }
            if quiz.status == QuizStatus::Completed {
                return Err(unavailable(quiz_id, "quiz is completed"));
            }
            if !quiz.is_open_at(now) {
                return Err(unavailable(quiz_id, "outside the quiz window"));
            }
            if quiz.is_vip && !vip::is_active(&account, now) {
                return Err(unavailable(quiz_id, "VIP entitlement required"));
            }

            let (fee, prize_pool, progression) = if quiz.is_vip {
                let fee = custom_fee.unwrap_or(quiz.entry_fee);
                if fee == 0 {
                    return Err(abort(CoreError::InvalidEntryFee(fee)));
                }
                let prize = fee.saturating_mul(VIP_PRIZE_MULTIPLIER);
                (
                    fee,
                    prize,
                    reward::scale_progression(&quiz.reward_progression, prize),
                )
            } else {
                (
                    quiz.entry_fee,
                    quiz.prize_pool,
                    quiz.reward_progression.clone(),
                )
            };

            if account.diamond_balance < fee {
                return Err(abort(CoreError::InsufficientFunds {
                    balance: account.diamond_balance,
                    required: fee,
                }));
            }

            quiz.slot_state = SlotState::Reserved;
            txn.put_quiz(&quiz)?;

            let amount = signed_amount(TxKind::QuizFee, fee).map_err(abort)?;
            let change = self.wallet.apply(txn, account_id, amount)?;
            let new = NewTransaction::new(account_id, TxKind::QuizFee, change.applied);
            let mut fee_tx = self
                .log
                .create_in(txn, fee_tx_id, &new, TxStatus::Completed, now)?;
            self.log.post_in(txn, &mut fee_tx)?;

            let session = AttemptSession {
                account_id: account_id.to_string(),
                quiz_instance_id: quiz_id.to_string(),
                effective_fee: fee,
                effective_prize_pool: prize_pool,
                reward_progression: progression,
                penalty_per_wrong: quiz.penalty_per_wrong,
                questions: quiz.questions.clone(),
                state: SessionState::InProgress,
                fee_transaction_id: fee_tx.id,
                started_at: now,
            };
            txn.put_session(&session)?;
            Ok((session, fee_tx))
        });

        match result {
            Ok((session, fee_tx)) => {
                self.ctx.metrics.attempts_started_total.inc();
                self.ctx.metrics.record_posted(&fee_tx);
                info!(
                    "{} started quiz {} (fee {}, prize {})",
                    account_id, quiz_id, session.effective_fee, session.effective_prize_pool
                );
                Ok(session)
            }
            Err(e) => {
                if slot_lost.get() {
                    self.ctx.metrics.slot_conflicts_total.inc();
                    warn!("{} lost the slot race on quiz {}", account_id, quiz_id);
                } else {
                    debug!("{} could not start quiz {}: {}", account_id, quiz_id, e);
                }
                Err(e)
            }
        }
    }

    /// Close the session, pay out and record the attempt.
    pub fn finish_attempt(
        &self,
        account_id: &str,
        quiz_id: &str,
        outcomes: &[AnswerOutcome],
        reason: TerminationReason,
    ) -> CoreResult<AttemptResult> {
        let reward_tx_id = self.ctx.db.next_id()?;
        let attempt_id = self.ctx.db.next_id()?;
        let now = self.ctx.now();

        let lock = self.ctx.locks.account(account_id);
        let _guard = safe_lock(&lock);

        let (result, reward_tx) = self.ctx.db.atomic("finish_attempt", |txn| {
            let mut session = txn.session(account_id, quiz_id)?.ok_or_else(|| {
                abort(CoreError::UnknownSession {
                    account: account_id.to_string(),
                    quiz: quiz_id.to_string(),
                })
            })?;
            if session.state.is_terminal() || txn.attempt(account_id, quiz_id)?.is_some() {
                return Err(abort(CoreError::AttemptAlreadyFinished(quiz_id.to_string())));
            }

            let breakdown = reward::compute_payout(
                &session.reward_progression,
                session.penalty_per_wrong,
                outcomes,
                reason,
            )
            .map_err(abort)?;

            let mut credited = 0u64;
            let mut reward_tx = None;
            if breakdown.payout > 0 {
                let amount =
                    signed_amount(TxKind::QuizReward, breakdown.payout).map_err(abort)?;
                let change = self.wallet.apply(txn, account_id, amount)?;
                let new = NewTransaction::new(account_id, TxKind::QuizReward, amount);
                let mut tx = self
                    .log
                    .create_in(txn, reward_tx_id, &new, TxStatus::Completed, now)?;
                tx.amount = change.applied;
                self.log.post_in(txn, &mut tx)?;
                credited = change.applied.unsigned_abs();
                reward_tx = Some(tx);
            }

            let mut account = txn.account(account_id)?;
            account.total_earnings = account.total_earnings.saturating_add(credited);
            account.quizzes_played += 1;
            if breakdown.payout > 0
                && reason == TerminationReason::CompletedAll
                && breakdown.is_perfect()
            {
                account.quizzes_won += 1;
            }
            txn.put_account(&account)?;

            session.state = reason.final_state();
            txn.put_session(&session)?;

            let attempt = QuizAttempt {
                id: attempt_id,
                account_id: account_id.to_string(),
                quiz_instance_id: quiz_id.to_string(),
                outcomes: outcomes.to_vec(),
                termination_reason: reason,
                payout: breakdown.payout,
                entry_fee: session.effective_fee,
                reward_transaction_id: reward_tx.as_ref().map(|tx| tx.id),
                created_at: now,
            };
            txn.put_attempt(&attempt)?;

            Ok((
                AttemptResult {
                    attempt,
                    breakdown,
                    new_balance: account.diamond_balance,
                },
                reward_tx,
            ))
        })?;

        self.ctx
            .metrics
            .attempts_finished_total
            .with_label_values(&[reason_label(reason)])
            .inc();
        if let Some(tx) = &reward_tx {
            self.ctx.metrics.record_posted(tx);
        }
        info!(
            "{} finished quiz {} ({}): payout {}, balance {}",
            account_id,
            quiz_id,
            reason_label(reason),
            result.attempt.payout,
            result.new_balance
        );
        Ok(result)
    }
}

fn unavailable(quiz_id: &str, why: &str) -> TxError {
    abort(CoreError::QuizUnavailable(format!("{}: {}", quiz_id, why)))
}

fn reason_label(reason: TerminationReason) -> &'static str {
    match reason {
        TerminationReason::CompletedAll => "completed_all",
        TerminationReason::EarlyFailThreshold => "early_fail_threshold",
        TerminationReason::UserQuit => "user_quit",
        TerminationReason::TimeExpired => "time_expired",
    }
}

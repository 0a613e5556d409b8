// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - CORE MODULE
//
// Economy primitives: Account, Transaction, QuizInstance, QuizAttempt and the
// attempt session. All balances are whole diamonds (u64, no floating-point).
// Signed ledger amounts are i64: credits positive, debits negative.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod converter;
pub mod error;
pub mod reward;
pub mod vip;

pub use error::{CoreError, CoreResult};

/// Hard capacity of a single wallet, in diamonds.
/// Credits clamp at this bound; nothing may ever push a balance above it.
pub const MAX_BALANCE: u64 = 2_000;

/// Real-currency minor units per diamond (fixed exchange rate).
pub const CURRENCY_UNITS_PER_DIAMOND: u64 = 10;

/// Diamonds granted at registration unless the config overrides it.
pub const DEFAULT_WELCOME_BALANCE: u64 = 100;

/// VIP custom-fee quizzes pay out this multiple of the chosen fee.
pub const VIP_PRIZE_MULTIPLIER: u64 = 2;

// ─────────────────────────────────────────────────────────────────
// ACCOUNT
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub diamond_balance: u64,
    /// Balance at registration; the audit replays history on top of it.
    pub opening_balance: u64,
    pub total_earnings: u64,
    pub quizzes_played: u64,
    pub quizzes_won: u64,
    #[serde(default)]
    pub vip_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Number of balance-affecting ledger entries written for this account.
    /// The next entry takes `ledger_seq + 1`.
    #[serde(default)]
    pub ledger_seq: u64,
}

impl Account {
    /// New account holding the welcome balance, capped at `MAX_BALANCE`.
    pub fn new(id: impl Into<String>, welcome_balance: u64, now: DateTime<Utc>) -> Self {
        let opening = welcome_balance.min(MAX_BALANCE);
        Self {
            id: id.into(),
            diamond_balance: opening,
            opening_balance: opening,
            total_earnings: 0,
            quizzes_played: 0,
            quizzes_won: 0,
            vip_expires_at: None,
            created_at: now,
            ledger_seq: 0,
        }
    }

    pub fn is_vip(&self, now: DateTime<Utc>) -> bool {
        vip::is_active(self, now)
    }
}

// ─────────────────────────────────────────────────────────────────
// TRANSACTIONS
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
    QuizFee,
    QuizReward,
    /// Credit reversing a rejected withdrawal. Points at the withdrawal
    /// through `related_transaction`.
    Refund,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
            TxKind::QuizFee => "quiz_fee",
            TxKind::QuizReward => "quiz_reward",
            TxKind::Refund => "refund",
        }
    }

    /// True if entries of this kind move diamonds out of the wallet.
    pub fn is_debit(&self) -> bool {
        matches!(self, TxKind::Withdrawal | TxKind::QuizFee)
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    PendingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::PendingApproval => "pending_approval",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
            TxStatus::Cancelled => "cancelled",
        }
    }

    /// The only status moves the transaction log accepts.
    pub fn can_transition_to(&self, to: TxStatus) -> bool {
        matches!(
            (self, to),
            (TxStatus::Pending, TxStatus::Completed)
                | (TxStatus::Pending, TxStatus::Failed)
                | (TxStatus::Pending, TxStatus::Cancelled)
                | (TxStatus::Pending, TxStatus::PendingApproval)
                | (TxStatus::PendingApproval, TxStatus::Completed)
                | (TxStatus::PendingApproval, TxStatus::Failed)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TxStatus::Pending | TxStatus::PendingApproval)
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: u64,
    pub account_id: String,
    pub kind: TxKind,
    /// Signed diamonds. For a clamped deposit this is the applied amount.
    pub amount: i64,
    /// Diamonds requested before any clamping.
    pub nominal_amount: i64,
    /// Real-currency minor units, for deposits and withdrawals.
    #[serde(default)]
    pub currency_amount: Option<u64>,
    pub status: TxStatus,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub related_transaction: Option<u64>,
    /// Position in the account's history; set once the entry moved the balance.
    #[serde(default)]
    pub ledger_seq: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a single wallet mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub new_balance: u64,
    /// Delta that actually landed. Smaller than the requested credit when
    /// the balance hit `MAX_BALANCE`.
    pub applied: i64,
}

/// Compute the result of applying `delta` to `balance`.
///
/// Debits never floor: a debit larger than the balance is `InsufficientFunds`.
/// Credits clamp at `MAX_BALANCE`.
pub fn apply_delta(balance: u64, delta: i64) -> CoreResult<BalanceChange> {
    if delta < 0 {
        let debit = delta.unsigned_abs();
        if debit > balance {
            return Err(CoreError::InsufficientFunds {
                balance,
                required: debit,
            });
        }
        Ok(BalanceChange {
            new_balance: balance - debit,
            applied: delta,
        })
    } else {
        let new_balance = balance.saturating_add(delta as u64).min(MAX_BALANCE);
        Ok(BalanceChange {
            new_balance,
            applied: (new_balance - balance.min(new_balance)) as i64,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// QUIZ CONTENT
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Open,
    Reserved,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Upcoming,
    Live,
    Completed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardStep {
    pub question_index: u32,
    pub correct_reward: u64,
}

/// Opaque question content. The core carries it to the session handle and
/// never grades it; correctness arrives as outcomes from the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuizInstance {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub entry_fee: u64,
    pub prize_pool: u64,
    pub reward_progression: Vec<RewardStep>,
    #[serde(default)]
    pub penalty_per_wrong: u64,
    pub slot_state: SlotState,
    pub status: QuizStatus,
    #[serde(default)]
    pub is_vip: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuizInstance {
    /// Window check only; slot and status are checked by the controller.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time && now < self.end_time
    }
}

// ─────────────────────────────────────────────────────────────────
// ATTEMPTS
// ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
}

impl AnswerOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, AnswerOutcome::Correct)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    CompletedAll,
    EarlyFailThreshold,
    UserQuit,
    TimeExpired,
}

impl TerminationReason {
    /// Session state a finished attempt lands in.
    pub fn final_state(&self) -> SessionState {
        match self {
            TerminationReason::CompletedAll | TerminationReason::EarlyFailThreshold => {
                SessionState::Completed
            }
            TerminationReason::UserQuit => SessionState::Quit,
            TerminationReason::TimeExpired => SessionState::Expired,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Completed,
    Quit,
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::InProgress)
    }
}

/// Handle returned by `start_attempt`. Effective fee and prize live here,
/// never on the shared quiz record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttemptSession {
    pub account_id: String,
    pub quiz_instance_id: String,
    pub effective_fee: u64,
    pub effective_prize_pool: u64,
    pub reward_progression: Vec<RewardStep>,
    pub penalty_per_wrong: u64,
    pub questions: Vec<Question>,
    pub state: SessionState,
    pub fee_transaction_id: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    pub id: u64,
    pub account_id: String,
    pub quiz_instance_id: String,
    pub outcomes: Vec<AnswerOutcome>,
    pub termination_reason: TerminationReason,
    pub payout: u64,
    pub entry_fee: u64,
    #[serde(default)]
    pub reward_transaction_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_never_floors() {
        let err = apply_delta(40, -50).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                balance: 40,
                required: 50
            }
        ));
        assert_eq!(apply_delta(50, -50).unwrap().new_balance, 0);
    }

    #[test]
    fn test_credit_clamps_at_capacity() {
        let change = apply_delta(1_900, 200).unwrap();
        assert_eq!(change.new_balance, MAX_BALANCE);
        assert_eq!(change.applied, 100);

        let full = apply_delta(MAX_BALANCE, 5).unwrap();
        assert_eq!(full.new_balance, MAX_BALANCE);
        assert_eq!(full.applied, 0);
    }

    #[test]
    fn test_allowed_transitions() {
        use TxStatus::*;
        let all = [Pending, PendingApproval, Completed, Failed, Cancelled];
        let allowed = [
            (Pending, Completed),
            (Pending, Failed),
            (Pending, Cancelled),
            (Pending, PendingApproval),
            (PendingApproval, Completed),
            (PendingApproval, Failed),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_welcome_balance_capped() {
        let acct = Account::new("alice", 5_000, Utc::now());
        assert_eq!(acct.diamond_balance, MAX_BALANCE);
        assert_eq!(acct.opening_balance, MAX_BALANCE);
    }

    #[test]
    fn test_termination_final_state() {
        assert_eq!(
            TerminationReason::UserQuit.final_state(),
            SessionState::Quit
        );
        assert_eq!(
            TerminationReason::TimeExpired.final_state(),
            SessionState::Expired
        );
        assert!(TerminationReason::EarlyFailThreshold
            .final_state()
            .is_terminal());
    }
}

use crate::TxStatus;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Every expected failure of the economy engine. None of these crash the
/// process; they are returned to the caller as-is.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("external reference {0} is already in use")]
    DuplicateReference(String),

    #[error("transaction {id}: cannot move {found} -> {to} (expected {expected})")]
    InvalidTransition {
        id: u64,
        expected: TxStatus,
        found: TxStatus,
        to: TxStatus,
    },

    #[error("account {account} already attempted quiz {quiz}")]
    AlreadyAttempted { account: String, quiz: String },

    #[error("quiz {0} is not available")]
    QuizUnavailable(String),

    #[error("attempt on quiz {0} is already finished")]
    AttemptAlreadyFinished(String),

    #[error("malformed outcome: {0}")]
    MalformedOutcome(String),

    #[error("amount mismatch for {reference}: stated {stated}, recorded {recorded}")]
    AmountMismatch {
        reference: String,
        stated: u64,
        recorded: u64,
    },

    #[error("unknown external reference {0}")]
    UnknownReference(String),

    #[error("unknown account {0}")]
    UnknownAccount(String),

    #[error("invalid account id {0:?}")]
    InvalidAccountId(String),

    #[error("account {0} already exists")]
    AccountExists(String),

    #[error("unknown quiz {0}")]
    UnknownQuiz(String),

    #[error("quiz {0} is already published")]
    QuizExists(String),

    #[error("invalid quiz id {0:?}")]
    InvalidQuizId(String),

    #[error("no attempt session for account {account} on quiz {quiz}")]
    UnknownSession { account: String, quiz: String },

    #[error("unknown transaction {0}")]
    UnknownTransaction(u64),

    #[error("invalid entry fee {0}")]
    InvalidEntryFee(u64),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    /// Ordinary declines: shown to the user, never retried.
    pub fn is_decline(&self) -> bool {
        matches!(
            self,
            CoreError::InsufficientFunds { .. } | CoreError::QuizUnavailable(_)
        )
    }

    /// Errors that mean "this event was already processed".
    pub fn is_already_handled(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateReference(_) | CoreError::AttemptAlreadyFinished(_)
        )
    }

    /// Storage failures are the only class the core retries itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CoreError::QuizUnavailable("q1".into()).is_decline());
        assert!(CoreError::InsufficientFunds {
            balance: 1,
            required: 2
        }
        .is_decline());
        assert!(CoreError::DuplicateReference("R1".into()).is_already_handled());
        assert!(CoreError::Storage("io".into()).is_retryable());
        assert!(!CoreError::UnknownReference("R1".into()).is_retryable());
    }

    #[test]
    fn test_display_names_statuses() {
        let e = CoreError::InvalidTransition {
            id: 7,
            expected: TxStatus::Pending,
            found: TxStatus::Completed,
            to: TxStatus::Failed,
        };
        assert_eq!(
            e.to_string(),
            "transaction 7: cannot move completed -> failed (expected pending)"
        );
    }
}

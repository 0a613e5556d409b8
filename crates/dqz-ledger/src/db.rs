// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - DATABASE MODULE
//
// sled embedded database for wallet state. Every balance change and its
// ledger entry commit together in one cross-tree transaction; a crash can
// never leave one without the other.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::metrics::LedgerMetrics;
use dqz_core::config::StoragePolicy;
use dqz_core::{
    Account, AttemptSession, CoreError, CoreResult, QuizAttempt, QuizInstance, Transaction,
};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TREE_ACCOUNTS: &str = "accounts";
const TREE_TRANSACTIONS: &str = "transactions";
/// Unique index: external reference → transaction id.
const TREE_REFERENCES: &str = "tx_references";
/// Per-account history: account \0 ledger_seq(BE) → transaction id.
const TREE_HISTORY: &str = "account_history";
const TREE_QUIZZES: &str = "quizzes";
const TREE_SESSIONS: &str = "attempt_sessions";
/// Unique index on (account, quiz).
const TREE_ATTEMPTS: &str = "attempts";

/// Error type flowing out of a transaction closure.
pub type TxError = ConflictableTransactionError<CoreError>;
pub type TxResult<T> = Result<T, TxError>;

/// Abort the surrounding atomic unit with `e`.
pub fn abort(e: CoreError) -> TxError {
    ConflictableTransactionError::Abort(e)
}

pub fn encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| abort(CoreError::Codec(e.to_string())))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(bytes).map_err(CoreError::from)
}

fn decode_tx<T: DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    decode(bytes).map_err(abort)
}

fn storage(context: &str, e: sled::Error) -> CoreError {
    CoreError::Storage(format!("{}: {}", context, e))
}

/// Key for anything unique per (account, quiz).
pub fn pair_key(account_id: &str, quiz_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(account_id.len() + quiz_id.len() + 1);
    key.extend_from_slice(account_id.as_bytes());
    key.push(0);
    key.extend_from_slice(quiz_id.as_bytes());
    key
}

fn history_prefix(account_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(account_id.len() + 9);
    key.extend_from_slice(account_id.as_bytes());
    key.push(0);
    key
}

fn history_key(account_id: &str, seq: u64) -> Vec<u8> {
    let mut key = history_prefix(account_id);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn id_from_bytes(bytes: &[u8]) -> CoreResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::Codec(format!("bad id length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Run `unit` until it commits or aborts. Storage failures are retried up
/// to `policy.retry_attempts` runs in total, doubling the delay each time.
fn retry_storage<R>(
    policy: &StoragePolicy,
    metrics: &LedgerMetrics,
    op: &str,
    mut unit: impl FnMut() -> Result<R, TransactionError<CoreError>>,
) -> CoreResult<R> {
    let mut delay_ms = policy.retry_base_delay_ms;
    let mut attempt = 1;
    loop {
        match unit() {
            Ok(value) => return Ok(value),
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => {
                if attempt >= policy.retry_attempts {
                    return Err(storage(op, e));
                }
                metrics.storage_retries_total.inc();
                warn!(
                    "{}: storage failure ({}), retry {}/{} in {}ms",
                    op, e, attempt, policy.retry_attempts, delay_ms
                );
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = delay_ms.saturating_mul(2);
                attempt += 1;
            }
        }
    }
}

/// View over every tree inside one atomic unit.
pub struct LedgerTxn<'a> {
    accounts: &'a TransactionalTree,
    transactions: &'a TransactionalTree,
    references: &'a TransactionalTree,
    history: &'a TransactionalTree,
    quizzes: &'a TransactionalTree,
    sessions: &'a TransactionalTree,
    attempts: &'a TransactionalTree,
}

impl LedgerTxn<'_> {
    pub fn account_opt(&self, id: &str) -> TxResult<Option<Account>> {
        match self.accounts.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_tx(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn account(&self, id: &str) -> TxResult<Account> {
        self.account_opt(id)?
            .ok_or_else(|| abort(CoreError::UnknownAccount(id.to_string())))
    }

    pub fn put_account(&self, account: &Account) -> TxResult<()> {
        self.accounts.insert(account.id.as_bytes(), encode(account)?)?;
        Ok(())
    }

    pub fn transaction(&self, id: u64) -> TxResult<Transaction> {
        match self.transactions.get(id.to_be_bytes())? {
            Some(bytes) => decode_tx(&bytes),
            None => Err(abort(CoreError::UnknownTransaction(id))),
        }
    }

    pub fn put_transaction(&self, tx: &Transaction) -> TxResult<()> {
        self.transactions
            .insert(tx.id.to_be_bytes().to_vec(), encode(tx)?)?;
        Ok(())
    }

    pub fn reference_owner(&self, reference: &str) -> TxResult<Option<u64>> {
        match self.references.get(reference.as_bytes())? {
            Some(bytes) => Ok(Some(id_from_bytes(&bytes).map_err(abort)?)),
            None => Ok(None),
        }
    }

    pub fn index_reference(&self, reference: &str, id: u64) -> TxResult<()> {
        self.references
            .insert(reference.as_bytes(), id.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn index_history(&self, account_id: &str, seq: u64, tx_id: u64) -> TxResult<()> {
        self.history
            .insert(history_key(account_id, seq), tx_id.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn quiz(&self, id: &str) -> TxResult<QuizInstance> {
        match self.quizzes.get(id.as_bytes())? {
            Some(bytes) => decode_tx(&bytes),
            None => Err(abort(CoreError::UnknownQuiz(id.to_string()))),
        }
    }

    pub fn quiz_exists(&self, id: &str) -> TxResult<bool> {
        Ok(self.quizzes.get(id.as_bytes())?.is_some())
    }

    pub fn put_quiz(&self, quiz: &QuizInstance) -> TxResult<()> {
        self.quizzes.insert(quiz.id.as_bytes(), encode(quiz)?)?;
        Ok(())
    }

    pub fn session(&self, account_id: &str, quiz_id: &str) -> TxResult<Option<AttemptSession>> {
        match self.sessions.get(pair_key(account_id, quiz_id))? {
            Some(bytes) => Ok(Some(decode_tx(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_session(&self, session: &AttemptSession) -> TxResult<()> {
        self.sessions.insert(
            pair_key(&session.account_id, &session.quiz_instance_id),
            encode(session)?,
        )?;
        Ok(())
    }

    pub fn attempt(&self, account_id: &str, quiz_id: &str) -> TxResult<Option<QuizAttempt>> {
        match self.attempts.get(pair_key(account_id, quiz_id))? {
            Some(bytes) => Ok(Some(decode_tx(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_attempt(&self, attempt: &QuizAttempt) -> TxResult<()> {
        self.attempts.insert(
            pair_key(&attempt.account_id, &attempt.quiz_instance_id),
            encode(attempt)?,
        )?;
        Ok(())
    }
}

/// Database wrapper with cross-tree atomic units
pub struct LedgerDatabase {
    db: Db,
    accounts: Tree,
    transactions: Tree,
    references: Tree,
    history: Tree,
    quizzes: Tree,
    sessions: Tree,
    attempts: Tree,
    policy: StoragePolicy,
    metrics: Arc<LedgerMetrics>,
}

impl LedgerDatabase {
    /// Open or create the database at `path`.
    ///
    /// Lock errors (another process still holding the sled flock) are
    /// retried with exponential backoff; anything else fails immediately.
    pub fn open<P: AsRef<Path>>(
        path: P,
        policy: StoragePolicy,
        metrics: Arc<LedgerMetrics>,
    ) -> CoreResult<Self> {
        let path_ref = path.as_ref();
        let mut delay_ms = policy.retry_base_delay_ms;
        let mut attempt = 1;
        let db = loop {
            match sled::open(path_ref) {
                Ok(db) => break db,
                Err(e) if Self::is_lock_error(&e) && attempt < policy.retry_attempts => {
                    warn!(
                        "database lock held at {}, retry {}/{} in {}ms",
                        path_ref.display(),
                        attempt,
                        policy.retry_attempts,
                        delay_ms
                    );
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    delay_ms = delay_ms.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(storage("failed to open database", e)),
            }
        };
        Self::from_db(db, policy, metrics)
    }

    /// Throwaway in-memory database, removed on drop.
    pub fn open_temporary(policy: StoragePolicy, metrics: Arc<LedgerMetrics>) -> CoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage("failed to open temporary database", e))?;
        Self::from_db(db, policy, metrics)
    }

    fn from_db(db: Db, policy: StoragePolicy, metrics: Arc<LedgerMetrics>) -> CoreResult<Self> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| storage(&format!("failed to open {} tree", name), e))
        };
        Ok(Self {
            accounts: open(TREE_ACCOUNTS)?,
            transactions: open(TREE_TRANSACTIONS)?,
            references: open(TREE_REFERENCES)?,
            history: open(TREE_HISTORY)?,
            quizzes: open(TREE_QUIZZES)?,
            sessions: open(TREE_SESSIONS)?,
            attempts: open(TREE_ATTEMPTS)?,
            db,
            policy,
            metrics,
        })
    }

    fn is_lock_error(e: &sled::Error) -> bool {
        let msg = e.to_string();
        msg.contains("Resource temporarily unavailable")
            || msg.contains("WouldBlock")
            || msg.contains("Would block")
            || msg.contains("lock")
    }

    /// Monotonic id for new transactions and attempts (starts at 1).
    pub fn next_id(&self) -> CoreResult<u64> {
        self.db
            .generate_id()
            .map(|id| id + 1)
            .map_err(|e| storage("failed to generate id", e))
    }

    /// Run `f` as one all-or-nothing unit across every tree.
    ///
    /// Aborts surface as the `CoreError` they carry. Storage failures are
    /// retried per the storage policy; `f` re-reads all state on each run,
    /// so idempotency checks inside it see whatever a failed run committed.
    pub fn atomic<F, R>(&self, op: &str, f: F) -> CoreResult<R>
    where
        F: Fn(&LedgerTxn<'_>) -> TxResult<R>,
    {
        let trees = (
            &self.accounts,
            &self.transactions,
            &self.references,
            &self.history,
            &self.quizzes,
            &self.sessions,
            &self.attempts,
        );
        retry_storage(&self.policy, &self.metrics, op, || {
            trees.transaction(
                |(accounts, transactions, references, history, quizzes, sessions, attempts)| {
                    f(&LedgerTxn {
                        accounts,
                        transactions,
                        references,
                        history,
                        quizzes,
                        sessions,
                        attempts,
                    })
                },
            )
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> CoreResult<()> {
        self.db
            .flush()
            .map_err(|e| storage("failed to flush database", e))?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, tree: &Tree, key: &[u8], what: &str) -> CoreResult<Option<T>> {
        match tree
            .get(key)
            .map_err(|e| storage(&format!("failed to read {}", what), e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_account(&self, id: &str) -> CoreResult<Option<Account>> {
        self.read(&self.accounts, id.as_bytes(), "account")
    }

    pub fn get_transaction(&self, id: u64) -> CoreResult<Option<Transaction>> {
        self.read(&self.transactions, &id.to_be_bytes(), "transaction")
    }

    pub fn get_quiz(&self, id: &str) -> CoreResult<Option<QuizInstance>> {
        self.read(&self.quizzes, id.as_bytes(), "quiz")
    }

    pub fn get_session(&self, account_id: &str, quiz_id: &str) -> CoreResult<Option<AttemptSession>> {
        self.read(&self.sessions, &pair_key(account_id, quiz_id), "session")
    }

    pub fn get_attempt(&self, account_id: &str, quiz_id: &str) -> CoreResult<Option<QuizAttempt>> {
        self.read(&self.attempts, &pair_key(account_id, quiz_id), "attempt")
    }

    pub fn find_by_reference(&self, reference: &str) -> CoreResult<Option<Transaction>> {
        match self
            .references
            .get(reference.as_bytes())
            .map_err(|e| storage("failed to read reference index", e))?
        {
            Some(bytes) => self.get_transaction(id_from_bytes(&bytes)?),
            None => Ok(None),
        }
    }

    /// Ledger entries for one account, in the order they hit the balance.
    pub fn history(&self, account_id: &str) -> CoreResult<Vec<Transaction>> {
        let mut entries = Vec::new();
        for item in self.history.scan_prefix(history_prefix(account_id)) {
            let (_, value) = item.map_err(|e| storage("failed to read history", e))?;
            let id = id_from_bytes(&value)?;
            let tx = self
                .get_transaction(id)?
                .ok_or(CoreError::UnknownTransaction(id))?;
            entries.push(tx);
        }
        Ok(entries)
    }

    pub fn all_transactions(&self) -> CoreResult<Vec<Transaction>> {
        self.transactions
            .iter()
            .values()
            .map(|item| {
                let bytes = item.map_err(|e| storage("failed to read transaction", e))?;
                decode(&bytes)
            })
            .collect()
    }

    pub fn all_accounts(&self) -> CoreResult<Vec<Account>> {
        self.accounts
            .iter()
            .values()
            .map(|item| {
                let bytes = item.map_err(|e| storage("failed to read account", e))?;
                decode(&bytes)
            })
            .collect()
    }

    pub fn all_quizzes(&self) -> CoreResult<Vec<QuizInstance>> {
        self.quizzes
            .iter()
            .values()
            .map(|item| {
                let bytes = item.map_err(|e| storage("failed to read quiz", e))?;
                decode(&bytes)
            })
            .collect()
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            accounts_count: self.accounts.len(),
            transactions_count: self.transactions.len(),
            quizzes_count: self.quizzes.len(),
            attempts_count: self.attempts.len(),
            size_on_disk: self.db.size_on_disk().unwrap_or(0),
        }
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub accounts_count: usize,
    pub transactions_count: usize,
    pub quizzes_count: usize,
    pub attempts_count: usize,
    pub size_on_disk: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ CLI - Wallets, Payments, Quizzes & Admin Queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dqz_core::{QuizStatus, TerminationReason, TxKind};
use dqz_ledger::Decision;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dqz")]
#[command(about = "Diamond Quiz - wallet ledger & quiz economy", long_about = None)]
#[command(version)]
struct Cli {
    /// Config directory (default: ~/.dqz). `config.toml` is read from here.
    #[arg(short, long, env = "DQZ_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Database directory; overrides the config file
    #[arg(short, long, env = "DQZ_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account management
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Deposits and payment events
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },

    /// Withdrawals
    Withdrawal {
        #[command(subcommand)]
        action: WithdrawalCommands,
    },

    /// Quiz content and attempts
    Quiz {
        #[command(subcommand)]
        action: QuizCommands,
    },

    /// VIP entitlements
    Vip {
        #[command(subcommand)]
        action: VipCommands,
    },

    /// Open transactions awaiting a provider or an admin
    Pending {
        /// Only this kind
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Replay ledgers against balances
    Audit {
        /// Single account (default: every account)
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Prometheus counters for this process
    Metrics,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Register an account with the welcome balance
    Register {
        /// Account id
        id: String,
    },

    /// Show balance and stats
    Show {
        /// Account id
        id: String,
    },

    /// Posted ledger entries, oldest first
    History {
        /// Account id
        id: String,
    },
}

#[derive(Subcommand)]
enum DepositCommands {
    /// Open a pending deposit
    Create {
        #[arg(short, long)]
        account: String,

        /// Amount in currency minor units
        #[arg(long)]
        amount: u64,

        /// Payment provider reference
        #[arg(short, long)]
        reference: String,
    },

    /// Reconcile a deposit against a stated diamond amount
    Reconcile {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        reference: String,

        /// Stated amount in diamonds
        #[arg(long)]
        amount: u64,
    },

    /// Apply a payment provider webhook payload (JSON file)
    Webhook {
        /// Path to the event JSON
        file: PathBuf,
    },

    /// Cancel a pending deposit
    Cancel {
        #[arg(short, long)]
        account: String,

        /// Transaction id
        id: u64,
    },

    /// Send a manual deposit to admin review
    Submit {
        /// Transaction id
        id: u64,
    },

    /// Admin decision on a deposit
    Decide {
        /// Transaction id
        id: u64,

        #[arg(short, long, value_enum)]
        decision: DecisionArg,
    },
}

#[derive(Subcommand)]
enum WithdrawalCommands {
    /// Debit diamonds and open a withdrawal
    Create {
        #[arg(short, long)]
        account: String,

        /// Diamonds to withdraw
        #[arg(long)]
        amount: u64,

        /// Optional payout reference
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Send a pending withdrawal to admin review
    Escalate {
        /// Transaction id
        id: u64,
    },

    /// Admin decision on a withdrawal
    Decide {
        /// Transaction id
        id: u64,

        #[arg(short, long, value_enum)]
        decision: DecisionArg,
    },
}

#[derive(Subcommand)]
enum QuizCommands {
    /// Publish a quiz instance from a JSON file
    Publish {
        /// Path to the quiz JSON
        file: PathBuf,
    },

    /// List quizzes
    List,

    /// Show one quiz
    Show {
        /// Quiz id
        id: String,
    },

    /// Move a quiz through its lifecycle
    Status {
        /// Quiz id
        id: String,

        #[arg(value_enum)]
        status: QuizStatusArg,
    },

    /// Start an attempt (reserves the slot, charges the fee)
    Start {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        quiz: String,

        /// Custom fee for a VIP quiz
        #[arg(long)]
        fee: Option<u64>,
    },

    /// Finish an attempt
    Finish {
        #[arg(short, long)]
        account: String,

        #[arg(short, long)]
        quiz: String,

        /// Outcomes in order, one letter each: c = correct, x = incorrect
        #[arg(short, long, default_value = "")]
        outcomes: String,

        #[arg(short, long, value_enum)]
        reason: ReasonArg,
    },
}

#[derive(Subcommand)]
enum VipCommands {
    /// Buy VIP (defaults to the configured plan)
    Grant {
        #[arg(short, long)]
        account: String,

        #[arg(long)]
        days: Option<u32>,

        #[arg(long)]
        cost: Option<u64>,
    },

    /// Show VIP status
    Status {
        /// Account id
        account: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DecisionArg {
    Approve,
    Reject,
}

impl From<DecisionArg> for Decision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Approve => Decision::Approve,
            DecisionArg::Reject => Decision::Reject,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReasonArg {
    CompletedAll,
    EarlyFailThreshold,
    UserQuit,
    TimeExpired,
}

impl From<ReasonArg> for TerminationReason {
    fn from(arg: ReasonArg) -> Self {
        match arg {
            ReasonArg::CompletedAll => TerminationReason::CompletedAll,
            ReasonArg::EarlyFailThreshold => TerminationReason::EarlyFailThreshold,
            ReasonArg::UserQuit => TerminationReason::UserQuit,
            ReasonArg::TimeExpired => TerminationReason::TimeExpired,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum QuizStatusArg {
    Upcoming,
    Live,
    Completed,
}

impl From<QuizStatusArg> for QuizStatus {
    fn from(arg: QuizStatusArg) -> Self {
        match arg {
            QuizStatusArg::Upcoming => QuizStatus::Upcoming,
            QuizStatusArg::Live => QuizStatus::Live,
            QuizStatusArg::Completed => QuizStatus::Completed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Deposit,
    Withdrawal,
    QuizFee,
    QuizReward,
    Refund,
}

impl From<KindArg> for TxKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Deposit => TxKind::Deposit,
            KindArg::Withdrawal => TxKind::Withdrawal,
            KindArg::QuizFee => TxKind::QuizFee,
            KindArg::QuizReward => TxKind::QuizReward,
            KindArg::Refund => TxKind::Refund,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = cli.config_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dqz")
    });
    std::fs::create_dir_all(&config_dir)?;

    let config = commands::common::load_config(&config_dir, cli.data_dir.as_deref())?;
    let engine = dqz_ledger::DqzEngine::open(config)?;
    let out = commands::common::Output::new(cli.json);

    match cli.command {
        Commands::Account { action } => commands::account::handle(action, &engine, &out)?,
        Commands::Deposit { action } => commands::payments::handle_deposit(action, &engine, &out)?,
        Commands::Withdrawal { action } => {
            commands::payments::handle_withdrawal(action, &engine, &out)?
        }
        Commands::Quiz { action } => commands::quiz::handle(action, &engine, &out)?,
        Commands::Vip { action } => commands::vip::handle(action, &engine, &out)?,
        Commands::Pending { kind } => {
            commands::admin::pending(kind.map(TxKind::from), &engine, &out)?
        }
        Commands::Audit { account } => commands::admin::audit(account.as_deref(), &engine, &out)?,
        Commands::Metrics => print!("{}", engine.export_metrics()?),
    }

    engine.flush()?;
    Ok(())
}

/// Diagnostics go to stderr so `--json` output stays clean.
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("DQZ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        );
    let _ = subscriber.try_init();
}

fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

// ─────────────────────────────────────────────────────────────────
// UNIT TESTS
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_account_register() {
        let cli = Cli::try_parse_from(["dqz", "account", "register", "alice"]).unwrap();
        match cli.command {
            Commands::Account {
                action: AccountCommands::Register { id },
            } => assert_eq!(id, "alice"),
            _ => panic!("Expected Account::Register"),
        }
    }

    #[test]
    fn test_cli_deposit_reconcile() {
        let cli = Cli::try_parse_from([
            "dqz",
            "deposit",
            "reconcile",
            "--account",
            "alice",
            "--reference",
            "R1",
            "--amount",
            "300",
        ])
        .unwrap();
        match cli.command {
            Commands::Deposit {
                action:
                    DepositCommands::Reconcile {
                        account,
                        reference,
                        amount,
                    },
            } => {
                assert_eq!(account, "alice");
                assert_eq!(reference, "R1");
                assert_eq!(amount, 300);
            }
            _ => panic!("Expected Deposit::Reconcile"),
        }
    }

    #[test]
    fn test_cli_withdrawal_decide() {
        let cli =
            Cli::try_parse_from(["dqz", "withdrawal", "decide", "7", "--decision", "reject"])
                .unwrap();
        match cli.command {
            Commands::Withdrawal {
                action: WithdrawalCommands::Decide { id, decision },
            } => {
                assert_eq!(id, 7);
                assert_eq!(Decision::from(decision), Decision::Reject);
            }
            _ => panic!("Expected Withdrawal::Decide"),
        }
    }

    #[test]
    fn test_cli_quiz_finish() {
        let cli = Cli::try_parse_from([
            "dqz",
            "quiz",
            "finish",
            "-a",
            "alice",
            "-q",
            "q1",
            "-o",
            "ccx",
            "-r",
            "early-fail-threshold",
        ])
        .unwrap();
        match cli.command {
            Commands::Quiz {
                action:
                    QuizCommands::Finish {
                        outcomes, reason, ..
                    },
            } => {
                assert_eq!(outcomes, "ccx");
                assert_eq!(
                    TerminationReason::from(reason),
                    TerminationReason::EarlyFailThreshold
                );
            }
            _ => panic!("Expected Quiz::Finish"),
        }
    }

    #[test]
    fn test_cli_pending_kind() {
        let cli = Cli::try_parse_from(["dqz", "pending", "--kind", "withdrawal"]).unwrap();
        match cli.command {
            Commands::Pending { kind } => {
                assert_eq!(kind.map(TxKind::from), Some(TxKind::Withdrawal))
            }
            _ => panic!("Expected Pending"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_decision() {
        assert!(
            Cli::try_parse_from(["dqz", "deposit", "decide", "1", "--decision", "maybe"]).is_err()
        );
    }
}

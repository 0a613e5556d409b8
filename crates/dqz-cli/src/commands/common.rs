use colored::*;
use dqz_core::config::DqzConfig;
use dqz_core::{AnswerOutcome, CoreError, CoreResult, Transaction, TxStatus};
use serde::Serialize;
use std::path::Path;

const CONFIG_FILE: &str = "config.toml";

/// Load `config_dir/config.toml` (written with defaults on first run), overlay
/// `DQZ_*` env vars, then the `--data-dir` flag. A relative data dir is
/// resolved against `config_dir`.
pub fn load_config(config_dir: &Path, data_dir: Option<&Path>) -> CoreResult<DqzConfig> {
    let path = config_dir.join(CONFIG_FILE);
    let config = if path.exists() {
        DqzConfig::load_from_file(&path)?
    } else {
        let config = DqzConfig::default();
        config.save_to_file(&path)?;
        config
    };
    let mut config = config.apply_env()?;

    if let Some(dir) = data_dir {
        config.data_dir = dir.to_string_lossy().into_owned();
    }
    if Path::new(&config.data_dir).is_relative() {
        config.data_dir = config_dir
            .join(&config.data_dir)
            .to_string_lossy()
            .into_owned();
    }
    Ok(config)
}

/// Parse `ccx`-style outcome strings. Commas and spaces are ignored.
pub fn parse_outcomes(raw: &str) -> CoreResult<Vec<AnswerOutcome>> {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| match c.to_ascii_lowercase() {
            'c' => Ok(AnswerOutcome::Correct),
            'x' => Ok(AnswerOutcome::Incorrect),
            other => Err(CoreError::MalformedOutcome(format!(
                "unknown outcome {:?} (use c or x)",
                other
            ))),
        })
        .collect()
}

/// Text or JSON printer chosen by `--json`.
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or run `text` for the human rendering.
    pub fn emit<T: Serialize>(
        &self,
        value: &T,
        text: impl FnOnce(),
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

pub fn status_label(status: TxStatus) -> ColoredString {
    match status {
        TxStatus::Completed => status.as_str().green(),
        TxStatus::Pending | TxStatus::PendingApproval => status.as_str().yellow(),
        TxStatus::Failed | TxStatus::Cancelled => status.as_str().red(),
    }
}

pub fn print_transaction(tx: &Transaction) {
    let amount = if tx.amount >= 0 {
        format!("+{}", tx.amount).green()
    } else {
        tx.amount.to_string().red()
    };
    print!(
        "  #{:<6} {:<12} {:>8} {:<17}",
        tx.id,
        tx.kind.as_str(),
        amount,
        status_label(tx.status)
    );
    if tx.nominal_amount != tx.amount {
        print!(" {}", format!("(requested {})", tx.nominal_amount).dimmed());
    }
    if let Some(reference) = &tx.external_reference {
        print!(" {}", reference.cyan());
    }
    if let Some(related) = tx.related_transaction {
        print!(" {}", format!("→ #{}", related).dimmed());
    }
    println!();
}

use super::common::{parse_outcomes, Output};
use crate::{print_info, print_success, QuizCommands};
use colored::*;
use dqz_core::{QuizInstance, SlotState};
use dqz_ledger::DqzEngine;

pub fn handle(
    action: QuizCommands,
    engine: &DqzEngine,
    out: &Output,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QuizCommands::Publish { file } => {
            let quiz: QuizInstance = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let quiz = engine.quizzes.publish_quiz(quiz)?;
            out.emit(&quiz, || {
                print_success(&format!("Quiz '{}' published", quiz.id));
            })?;
        }
        QuizCommands::List => {
            let quizzes = engine.quizzes.quizzes()?;
            out.emit(&quizzes, || {
                if quizzes.is_empty() {
                    print_info("No quizzes published.");
                    return;
                }
                for quiz in &quizzes {
                    print_quiz_line(quiz);
                }
            })?;
        }
        QuizCommands::Show { id } => {
            let quiz = engine.quizzes.quiz(&id)?;
            out.emit(&quiz, || {
                print_quiz_line(&quiz);
                println!(
                    "  {} {} → {}",
                    "Window:".bold(),
                    quiz.start_time.to_rfc3339(),
                    quiz.end_time.to_rfc3339()
                );
                for step in &quiz.reward_progression {
                    println!(
                        "    Q{:<3} {}",
                        step.question_index + 1,
                        format!("+{}", step.correct_reward).green()
                    );
                }
            })?;
        }
        QuizCommands::Status { id, status } => {
            let quiz = engine.quizzes.set_status(&id, status.into())?;
            out.emit(&quiz, || print_success(&format!("Quiz '{}' updated", quiz.id)))?;
        }
        QuizCommands::Start { account, quiz, fee } => {
            let session = engine.quizzes.start_attempt(&account, &quiz, fee)?;
            let balance = engine.wallet.balance(&account)?;
            out.emit(&session, || {
                print_success(&format!(
                    "'{}' started '{}': fee {}, prize pool {}",
                    account, quiz, session.effective_fee, session.effective_prize_pool
                ));
                println!(
                    "{} {} questions",
                    "Session:".bold(),
                    session.reward_progression.len()
                );
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    balance.to_string().cyan().bold()
                );
            })?;
        }
        QuizCommands::Finish {
            account,
            quiz,
            outcomes,
            reason,
        } => {
            let outcomes = parse_outcomes(&outcomes)?;
            let result = engine
                .quizzes
                .finish_attempt(&account, &quiz, &outcomes, reason.into())?;
            let value = serde_json::json!({
                "attempt": result.attempt,
                "display_tally": result.breakdown.display_tally,
                "new_balance": result.new_balance,
            });
            out.emit(&value, || {
                let payout = result.attempt.payout;
                if payout > 0 {
                    print_success(&format!("Perfect run! Paid {} diamonds", payout));
                } else {
                    print_info(&format!(
                        "No payout ({} correct, {} wrong, tally {})",
                        result.breakdown.correct,
                        result.breakdown.incorrect,
                        result.breakdown.display_tally
                    ));
                }
                println!(
                    "{} {} diamonds",
                    "Balance:".bold(),
                    result.new_balance.to_string().cyan().bold()
                );
            })?;
        }
    }
    Ok(())
}

fn print_quiz_line(quiz: &QuizInstance) {
    let slot = match quiz.slot_state {
        SlotState::Open => "open".green(),
        SlotState::Reserved => "reserved".red(),
    };
    let vip = if quiz.is_vip { "VIP".yellow().bold() } else { "".normal() };
    println!(
        "  {} {:<24} fee {:<5} prize {:<6} {:<9} {:?} {}",
        "•".cyan(),
        quiz.id.bold(),
        quiz.entry_fee,
        quiz.prize_pool,
        slot,
        quiz.status,
        vip
    );
}

use crate::agent::{Agent, TurnStatus};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

fn is_exit_command(input: &str) -> bool {
    EXIT_COMMANDS
        .iter()
        .any(|cmd| input.eq_ignore_ascii_case(cmd))
}

/// Blocking read-process-print loop: one question is fully resolved,
/// retries included, before the next is read. A fatal turn is reported but
/// does not end the session; only an exit command (or EOF) does.
pub async fn run(agent: &mut Agent) -> Result<(), std::io::Error> {
    println!("SQL Agent Ready");
    println!("Type 'exit' to quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("Question: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let Some(line) = line else {
            // EOF: treat like an exit command
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        if is_exit_command(question) {
            break;
        }

        // Dropping the in-flight turn on interrupt cancels the underlying
        // model or tool server call
        let outcome = tokio::select! {
            outcome = agent.run_turn(question) => outcome,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        info!(
            "Turn finished: {:?} after {} attempt(s)",
            outcome.status, outcome.attempts
        );

        match outcome.status {
            TurnStatus::Succeeded => println!("\n{}\n", outcome.text),
            TurnStatus::ExhaustedRetries | TurnStatus::Fatal => {
                println!("\nError: {}\n", outcome.text)
            }
        }
    }

    println!("\nGoodbye\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("Quit"));
        assert!(is_exit_command("bye"));
    }

    #[test]
    fn questions_are_not_exit_commands() {
        assert!(!is_exit_command("list all students"));
        assert!(!is_exit_command("exit the program for me"));
        assert!(!is_exit_command(""));
    }
}

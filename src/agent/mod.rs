use crate::config::AgentConfig;
use crate::format;
use crate::llm::{Completion, LlmError};
use crate::mcp::{ExecError, QueryExecutor};
use crate::prompt::{PromptContext, TurnFeedback};
use crate::sql::{self, StatementKind};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Terminal state of one turn's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Succeeded,
    ExhaustedRetries,
    Fatal,
}

/// Everything the session loop needs to report one answered question.
#[derive(Debug)]
pub struct TurnOutcome {
    pub text: String,
    pub attempts: u32,
    pub status: TurnStatus,
}

/// Drives one question through drafting, validation, execution and retry.
/// Owns no state across turns beyond the immutable schema text.
pub struct Agent {
    llm: Box<dyn Completion>,
    executor: Box<dyn QueryExecutor>,
    schema_text: String,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        llm: Box<dyn Completion>,
        executor: Box<dyn QueryExecutor>,
        schema_text: String,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm,
            executor,
            schema_text,
            config,
        }
    }

    /// Resolve one question. Retryable failures (rejected statements, SQL
    /// errors) are fed back to the model up to `max_attempts` drafting
    /// rounds; infrastructure failures end the turn immediately.
    pub async fn run_turn(&mut self, question: &str) -> TurnOutcome {
        let started = Instant::now();
        let mut prior_error: Option<TurnFeedback> = None;
        let mut attempt: u32 = 1;

        loop {
            let context = PromptContext::new(
                &self.schema_text,
                question,
                prior_error.clone(),
                attempt,
                self.config.row_limit_hint,
            );
            let prompt = context.render();
            debug!("Prompt for attempt {}: {}", context.attempt, prompt);
            self.echo(&format!(
                "--- prompt (attempt {}) ---\n{}",
                context.attempt, prompt
            ));

            let raw = match self.llm.complete(&prompt).await {
                Ok(raw) => raw,
                Err(LlmError::ConnectionError(msg)) => {
                    return self.finish(
                        TurnOutcome {
                            text: format!("The language model is unreachable: {}", msg),
                            attempts: attempt,
                            status: TurnStatus::Fatal,
                        },
                        started,
                    );
                }
                Err(e) => {
                    return self.finish(
                        TurnOutcome {
                            text: format!("The language model failed: {}", e),
                            attempts: attempt,
                            status: TurnStatus::Fatal,
                        },
                        started,
                    );
                }
            };

            self.echo(&format!("--- raw model output ---\n{}", raw));

            let candidate = sql::extract(&raw);
            debug!("Extracted candidate ({:?}): {}", candidate.kind, candidate.sql);

            let feedback = match candidate.kind {
                StatementKind::Select => {
                    self.echo(&format!("Executing: {}", candidate.sql));
                    match self.executor.run_query(&candidate.sql).await {
                        Ok(result) => {
                            info!(
                                "Query succeeded on attempt {} with {} rows",
                                attempt,
                                result.rows.len()
                            );
                            return self.finish(
                                TurnOutcome {
                                    text: format::render(&result, self.config.display_threshold),
                                    attempts: attempt,
                                    status: TurnStatus::Succeeded,
                                },
                                started,
                            );
                        }
                        Err(ExecError::Sql(message)) => {
                            warn!("Statement rejected by database: {}", message);
                            TurnFeedback::new(Some(candidate.sql), message)
                        }
                        Err(ExecError::Protocol(message)) => {
                            return self.finish(
                                TurnOutcome {
                                    text: format!("The tool server failed: {}", message),
                                    attempts: attempt,
                                    status: TurnStatus::Fatal,
                                },
                                started,
                            );
                        }
                    }
                }
                // Never reaches the tool server; the rejection is fed back
                // to the model like any other error.
                StatementKind::Disallowed => {
                    warn!("Disallowed statement blocked: {}", candidate.sql);
                    TurnFeedback::new(
                        Some(candidate.sql),
                        "Only a single read-only SELECT (or WITH) statement is allowed.",
                    )
                }
                StatementKind::Unparseable => {
                    warn!("Model response contained no recognizable SQL");
                    TurnFeedback::new(
                        None,
                        "The response did not contain a SQL statement. Return exactly one SELECT query and nothing else.",
                    )
                }
            };

            if attempt >= self.config.max_attempts {
                return self.finish(
                    TurnOutcome {
                        text: format!(
                            "I couldn't answer that after {} attempts. Last error: {}",
                            attempt, feedback.message
                        ),
                        attempts: attempt,
                        status: TurnStatus::ExhaustedRetries,
                    },
                    started,
                );
            }

            prior_error = Some(feedback);
            attempt += 1;
        }
    }

    fn finish(&self, outcome: TurnOutcome, started: Instant) -> TurnOutcome {
        self.echo(&format!(
            "Processed in {:.2}s over {} attempt(s)",
            started.elapsed().as_secs_f64(),
            outcome.attempts
        ));
        outcome
    }

    fn echo(&self, text: &str) {
        if self.config.verbose {
            println!("{}", text);
        }
    }
}

use std::fmt::Write;

/// Error feedback carried into the next drafting round: the statement that
/// failed (when one was extracted) and the error text.
#[derive(Debug, Clone)]
pub struct TurnFeedback {
    pub statement: Option<String>,
    pub message: String,
}

impl TurnFeedback {
    pub fn new(statement: Option<String>, message: impl Into<String>) -> Self {
        Self {
            statement,
            message: message.into(),
        }
    }
}

/// Everything the model needs for one drafting attempt. Built fresh per
/// attempt and never mutated; a retry produces a new context.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub schema: String,
    pub question: String,
    pub prior_error: Option<TurnFeedback>,
    pub attempt: u32,
    pub row_limit_hint: usize,
}

impl PromptContext {
    pub fn new(
        schema: &str,
        question: &str,
        prior_error: Option<TurnFeedback>,
        attempt: u32,
        row_limit_hint: usize,
    ) -> Self {
        Self {
            schema: schema.to_string(),
            question: question.to_string(),
            prior_error,
            attempt,
            row_limit_hint,
        }
    }

    /// Render the full prompt text. Deterministic given the context.
    pub fn render(&self) -> String {
        let mut prompt = String::new();

        let _ = writeln!(prompt, "{}", self.schema);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "User Question: {}", self.question);
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "Task: Generate a valid PostgreSQL SELECT query to answer this question."
        );
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Rules:");
        let _ = writeln!(
            prompt,
            "- Only SELECT statements (no INSERT, UPDATE, DELETE, DROP)"
        );
        let _ = writeln!(prompt, "- Return exactly one statement, no comments");
        let _ = writeln!(prompt, "- Use proper PostgreSQL syntax");
        let _ = writeln!(prompt, "- Join tables when needed");
        let _ = writeln!(prompt, "- Limit to {} rows max", self.row_limit_hint);
        let _ = writeln!(prompt, "- Return ONLY the SQL query, no explanation");

        if let Some(feedback) = &self.prior_error {
            let _ = writeln!(prompt);
            let _ = writeln!(prompt, "Your previous attempt was rejected.");
            if let Some(statement) = &feedback.statement {
                let _ = writeln!(prompt, "Failed statement: {}", statement);
            }
            let _ = writeln!(prompt, "Error: {}", feedback.message);
            let _ = writeln!(
                prompt,
                "Fix the problem and return only the corrected SQL query."
            );
        }

        let _ = writeln!(prompt);
        let _ = write!(prompt, "SQL Query:");

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_schema_and_question() {
        let context = PromptContext::new("Database Schema: students", "list all students", None, 1, 20);
        let prompt = context.render();
        assert!(prompt.contains("Database Schema: students"));
        assert!(prompt.contains("User Question: list all students"));
        assert!(prompt.contains("Only SELECT statements"));
        assert!(prompt.contains("Limit to 20 rows max"));
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn render_includes_corrective_block_on_retry() {
        let feedback = TurnFeedback::new(
            Some("SELECT nam FROM students".to_string()),
            "column \"nam\" does not exist",
        );
        let context = PromptContext::new("schema", "who is enrolled?", Some(feedback), 2, 20);
        let prompt = context.render();
        assert!(prompt.contains("Your previous attempt was rejected."));
        assert!(prompt.contains("Failed statement: SELECT nam FROM students"));
        assert!(prompt.contains("column \"nam\" does not exist"));
    }

    #[test]
    fn render_is_deterministic() {
        let a = PromptContext::new("s", "q", None, 1, 20).render();
        let b = PromptContext::new("s", "q", None, 1, 20).render();
        assert_eq!(a, b);
    }
}

use regex::Regex;

/// Statement shape tags. Only `Select` may be handed to the execution
/// client; the other two are bounced back into the drafting loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Disallowed,
    Unparseable,
}

/// SQL text pulled out of a model response, not yet confirmed executable.
#[derive(Debug, Clone)]
pub struct CandidateStatement {
    pub sql: String,
    pub kind: StatementKind,
}

impl CandidateStatement {
    fn tagged(sql: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            kind,
        }
    }
}

const SQL_KEYWORDS: [&str; 10] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE",
    "GRANT",
];

/// Pull the first SQL statement out of a raw model response and classify
/// its shape. This is a conservative allow-list check, not a SQL parser:
/// syntax errors inside a SELECT are left for the database to report.
pub fn extract(raw: &str) -> CandidateStatement {
    // Prefer the fenced block when one is present; fall back to scanning
    // the whole response when the fence yields nothing usable.
    let statement = fenced_block(raw)
        .and_then(|block| first_statement(&strip_prose_prefix(&block)))
        .or_else(|| first_statement(&strip_prose_prefix(raw)));

    let Some(statement) = statement else {
        return CandidateStatement::tagged("", StatementKind::Unparseable);
    };

    // Reject stacked statements: anything after the first top-level ';'
    // means the model tried to slip in a second statement.
    let (statement, rest) = split_at_separator(&statement);
    if !rest.trim().is_empty() {
        return CandidateStatement::tagged(statement, StatementKind::Disallowed);
    }

    let leading = statement
        .split_whitespace()
        .next()
        .map(|w| w.to_uppercase())
        .unwrap_or_default();

    let kind = match leading.as_str() {
        "SELECT" | "WITH" => StatementKind::Select,
        _ => StatementKind::Disallowed,
    };

    CandidateStatement::tagged(statement, kind)
}

/// Pull out the body of a markdown code fence, with or without a language
/// tag. An unterminated "```sql" fence still counts (the model ran out of
/// tokens); a lone "```" does not.
fn fenced_block(content: &str) -> Option<String> {
    if let Some(start) = content.find("```sql") {
        let after = &content[start + 6..];
        let body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        return Some(body.trim().to_string());
    }

    if let Some(start) = content.find("```") {
        let after = &content[start + 3..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }

    None
}

/// Drop "SQL Query:" style labels the model sometimes prepends.
fn strip_prose_prefix(content: &str) -> String {
    let re = Regex::new(r"(?i)^\s*(sql query:|query:|answer:|sql:)\s*").unwrap();
    re.replace(content, "").to_string()
}

/// Locate the first line opening with a SQL keyword and collect the
/// statement from there, normalizing whitespace. Collection stops at a
/// closing fence or once a line ends the statement with ';'.
fn first_statement(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let upper = line.trim().to_uppercase();
        if !SQL_KEYWORDS.iter().any(|kw| {
            upper.starts_with(kw)
                && upper[kw.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric() && c != '_')
        }) {
            continue;
        }

        let mut statement = line.trim().to_string();
        if !statement.contains(';') {
            for next_line in &lines[i + 1..] {
                let next = next_line.trim();
                if next.starts_with("```") {
                    break;
                }
                statement.push(' ');
                statement.push_str(next);
                if next.contains(';') {
                    break;
                }
            }
        }
        return Some(statement.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    None
}

/// Split at the first ';' that sits outside any quoted run, returning the
/// statement (without the separator) and whatever follows it.
fn split_at_separator(statement: &str) -> (String, String) {
    let mut in_single = false;
    let mut in_double = false;

    for (idx, ch) in statement.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                return (
                    statement[..idx].trim().to_string(),
                    statement[idx + 1..].to_string(),
                );
            }
            _ => {}
        }
    }

    (statement.trim().to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_select() {
        let candidate = extract("SELECT * FROM students;");
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT * FROM students");
    }

    #[test]
    fn extracts_from_sql_fence() {
        let raw = "Here is the query:\n```sql\nSELECT first_name, last_name\nFROM students;\n```";
        let candidate = extract(raw);
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT first_name, last_name FROM students");
    }

    #[test]
    fn extracts_from_bare_fence() {
        let raw = "```\nSELECT count(*) FROM courses;\n```";
        let candidate = extract(raw);
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT count(*) FROM courses");
    }

    #[test]
    fn strips_query_label() {
        let candidate = extract("SQL Query: SELECT id FROM students");
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT id FROM students");
    }

    #[test]
    fn allows_with_clause() {
        let raw = "WITH top AS (SELECT * FROM enrollments) SELECT * FROM top;";
        let candidate = extract(raw);
        assert_eq!(candidate.kind, StatementKind::Select);
    }

    #[test]
    fn rejects_drop() {
        let candidate = extract("DROP TABLE students;");
        assert_eq!(candidate.kind, StatementKind::Disallowed);
    }

    #[test]
    fn rejects_update_inside_fence() {
        let candidate = extract("```sql\nUPDATE students SET grade = 'A';\n```");
        assert_eq!(candidate.kind, StatementKind::Disallowed);
    }

    #[test]
    fn rejects_stacked_statements() {
        let candidate = extract("SELECT * FROM students; DROP TABLE students;");
        assert_eq!(candidate.kind, StatementKind::Disallowed);
    }

    #[test]
    fn semicolon_inside_literal_is_not_a_separator() {
        let candidate = extract("SELECT * FROM courses WHERE title = 'a;b';");
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT * FROM courses WHERE title = 'a;b'");
    }

    #[test]
    fn unterminated_sql_fence_still_extracts() {
        let candidate = extract("```sql\nSELECT id FROM students");
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT id FROM students");
    }

    #[test]
    fn trailing_bare_fence_does_not_swallow_statement() {
        let candidate = extract("SELECT id FROM students;\n```");
        assert_eq!(candidate.kind, StatementKind::Select);
        assert_eq!(candidate.sql, "SELECT id FROM students");
    }

    #[test]
    fn prose_without_sql_is_unparseable() {
        let candidate = extract("I am not sure how to answer that question.");
        assert_eq!(candidate.kind, StatementKind::Unparseable);
    }

    #[test]
    fn keyword_prefix_of_identifier_does_not_match() {
        // "WITHDRAWALS" starts with "WITH" but is not a WITH clause
        let candidate = extract("WITHDRAWALS are not supported");
        assert_eq!(candidate.kind, StatementKind::Unparseable);
    }

    #[test]
    fn multiline_statement_joins_with_normalized_whitespace() {
        let raw = "SELECT s.first_name\nFROM students s\nJOIN enrollments e ON s.id = e.student_id;";
        let candidate = extract(raw);
        assert_eq!(
            candidate.sql,
            "SELECT s.first_name FROM students s JOIN enrollments e ON s.id = e.student_id"
        );
    }
}

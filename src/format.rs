use crate::mcp::QueryResult;
use serde_json::Value;

/// How many rows of a large result set are shown as a sample.
const SAMPLE_ROWS: usize = 5;
/// Single-column result sets up to this size are read out as prose.
const PROSE_LIMIT: usize = 10;

/// Render a result set as compact, voice-friendly text. Small sets get a
/// column-aligned table, single values and short single-column sets get
/// prose, and anything past `display_threshold` rows is summarized.
pub fn render(result: &QueryResult, display_threshold: usize) -> String {
    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let count = result.rows.len();

    // Single value, e.g. a COUNT(*)
    if count == 1 && result.columns.len() == 1 {
        return format!("Result: {}", render_value(&result.rows[0][0]));
    }

    // Short single-column sets read better as a list than a table
    if result.columns.len() == 1 && count <= PROSE_LIMIT {
        let values: Vec<String> = result
            .rows
            .iter()
            .map(|row| render_value(&row[0]))
            .collect();
        return format!("Found {} results: {}", count, values.join(", "));
    }

    if count <= display_threshold {
        let mut out = format!("Found {} rows:\n", count);
        out.push_str(&aligned_table(&result.columns, &result.rows));
        return out;
    }

    let mut out = format!(
        "Found {} rows, showing the first {}:\n",
        count, SAMPLE_ROWS
    );
    out.push_str(&aligned_table(&result.columns, &result.rows[..SAMPLE_ROWS]));
    out.push_str(&format!("... and {} more rows", count - SAMPLE_ROWS));
    out
}

/// Pad every column to its widest cell so the table lines up.
fn aligned_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(render_value).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut lines = Vec::new();
    lines.push(format_row(columns, &widths));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rendered {
        lines.push(format_row(row, &widths));
    }

    let mut table = lines.join("\n");
    table.push('\n');
    table
}

fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let cell = cell.as_ref();
            let width = widths.get(i).copied().unwrap_or(cell.chars().count());
            format!("{:<width$}", cell)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Scalars without JSON quoting; nulls come out empty.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn empty_result_says_no_results() {
        let rendered = render(&result(&["id"], vec![]), 50);
        assert_eq!(rendered, "No results found.");
    }

    #[test]
    fn single_value_is_rendered_directly() {
        let rendered = render(&result(&["count"], vec![vec![json!(12)]]), 50);
        assert_eq!(rendered, "Result: 12");
    }

    #[test]
    fn short_single_column_set_is_prose() {
        let rendered = render(
            &result(
                &["code"],
                vec![vec![json!("CS201")], vec![json!("MATH101")]],
            ),
            50,
        );
        assert_eq!(rendered, "Found 2 results: CS201, MATH101");
    }

    #[test]
    fn small_sets_are_aligned_tables() {
        let rendered = render(
            &result(
                &["first_name", "last_name"],
                vec![
                    vec![json!("Ada"), json!("Lovelace")],
                    vec![json!("Alan"), json!("Turing")],
                ],
            ),
            50,
        );
        assert!(rendered.starts_with("Found 2 rows:\n"));
        assert!(rendered.contains("first_name | last_name"));
        assert!(rendered.contains("Ada        | Lovelace"));
        assert!(rendered.contains("Alan       | Turing"));
    }

    #[test]
    fn large_sets_are_summarized_with_a_sample() {
        let rows: Vec<Vec<Value>> = (0..60)
            .map(|i| vec![json!(i), json!(format!("student{}", i))])
            .collect();
        let rendered = render(&result(&["id", "name"], rows), 50);
        assert!(rendered.starts_with("Found 60 rows, showing the first 5:\n"));
        assert!(rendered.contains("student0"));
        assert!(!rendered.contains("student7"));
        assert!(rendered.ends_with("... and 55 more rows"));
    }

    #[test]
    fn nulls_render_empty_and_strings_unquoted() {
        let rendered = render(
            &result(
                &["grade", "email"],
                vec![vec![Value::Null, json!("ada@example.edu")]],
            ),
            50,
        );
        assert!(rendered.contains("ada@example.edu"));
        assert!(!rendered.contains("\"ada@example.edu\""));
        assert!(!rendered.contains("null"));
    }
}

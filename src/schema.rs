use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use tracing::info;

#[derive(Debug)]
pub enum SchemaError {
    LoadError(String),
    EmptySchema,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::LoadError(msg) => write!(f, "Schema load error: {}", msg),
            SchemaError::EmptySchema => write!(f, "Schema descriptor contains no tables"),
        }
    }
}

impl Error for SchemaError {}

#[derive(Debug, Deserialize, Clone)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Foreign key target in "table.column" form
    #[serde(default)]
    pub references: Option<String>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Static description of the database, built once at startup and injected
/// into every model prompt. Never refreshed during a session.
#[derive(Debug, Deserialize, Clone)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableInfo>,
    /// Free-form guidance lines (join rules, example queries) appended to
    /// the rendered schema
    #[serde(default)]
    pub notes: Vec<String>,
}

impl SchemaDescriptor {
    /// Load the descriptor from a TOML file, or fall back to the built-in
    /// student database schema when no file is configured.
    pub fn load(schema_file: Option<&str>) -> Result<Self, SchemaError> {
        let descriptor = match schema_file {
            Some(path) => {
                info!("Loading schema descriptor from {}", path);
                let config = Config::builder()
                    .add_source(File::new(path, FileFormat::Toml))
                    .build()
                    .map_err(|e| SchemaError::LoadError(e.to_string()))?;
                config
                    .try_deserialize::<SchemaDescriptor>()
                    .map_err(|e| SchemaError::LoadError(e.to_string()))?
            }
            None => {
                info!("No schema file configured, using built-in student database schema");
                Self::student_db()
            }
        };

        if descriptor.tables.is_empty() {
            return Err(SchemaError::EmptySchema);
        }

        Ok(descriptor)
    }

    /// The explicit schema for the seeded student database.
    pub fn student_db() -> Self {
        let column = |name: &str, data_type: &str| ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            primary_key: false,
            references: None,
        };
        let pk = |name: &str, data_type: &str| ColumnInfo {
            primary_key: true,
            nullable: false,
            ..column(name, data_type)
        };
        let fk = |name: &str, data_type: &str, target: &str| ColumnInfo {
            references: Some(target.to_string()),
            ..column(name, data_type)
        };

        Self {
            tables: vec![
                TableInfo {
                    name: "students".to_string(),
                    columns: vec![
                        pk("id", "INTEGER"),
                        column("first_name", "TEXT"),
                        column("last_name", "TEXT"),
                        column("dob", "DATE"),
                        column("email", "TEXT"),
                    ],
                },
                TableInfo {
                    name: "courses".to_string(),
                    columns: vec![
                        pk("id", "INTEGER"),
                        column("code", "TEXT"),
                        column("title", "TEXT"),
                        column("credits", "INTEGER"),
                    ],
                },
                TableInfo {
                    name: "enrollments".to_string(),
                    columns: vec![
                        pk("id", "INTEGER"),
                        fk("student_id", "INTEGER", "students.id"),
                        fk("course_id", "INTEGER", "courses.id"),
                        column("enrolled_on", "DATE"),
                        column("grade", "TEXT"),
                    ],
                },
            ],
            notes: vec![
                "To join students and enrollments: students.id = enrollments.student_id"
                    .to_string(),
                "To join enrollments and courses: enrollments.course_id = courses.id".to_string(),
                "Students have 'first_name' and 'last_name' (NOT 'name')".to_string(),
                "Courses have 'code' (e.g. CS201) and 'title' (e.g. Algorithms); use WHERE \
                 courses.code = 'CS201' for course codes"
                    .to_string(),
                "Grades are in 'enrollments.grade'".to_string(),
            ],
        }
    }

    /// Render the descriptor as the text block included in every prompt.
    pub fn render(&self) -> String {
        let mut lines = vec!["Database Schema:".to_string()];

        for table in &self.tables {
            lines.push(String::new());
            lines.push(format!("Table: {}", table.name));
            lines.push("  Columns:".to_string());
            for col in &table.columns {
                let mut attrs = Vec::new();
                if col.primary_key {
                    attrs.push("PRIMARY KEY".to_string());
                }
                if !col.nullable && !col.primary_key {
                    attrs.push("NOT NULL".to_string());
                }
                if let Some(target) = &col.references {
                    attrs.push(format!("FOREIGN KEY -> {}", target));
                }
                let suffix = if attrs.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", attrs.join(", "))
                };
                lines.push(format!("    - {}: {}{}", col.name, col.data_type, suffix));
            }
        }

        if !self.notes.is_empty() {
            lines.push(String::new());
            lines.push("Rules:".to_string());
            for note in &self.notes {
                lines.push(format!("- {}", note));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_db_has_three_tables() {
        let schema = SchemaDescriptor::student_db();
        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["students", "courses", "enrollments"]);
    }

    #[test]
    fn render_lists_tables_columns_and_keys() {
        let rendered = SchemaDescriptor::student_db().render();
        assert!(rendered.contains("Table: students"));
        assert!(rendered.contains("- first_name: TEXT"));
        assert!(rendered.contains("- id: INTEGER (PRIMARY KEY)"));
        assert!(rendered.contains("FOREIGN KEY -> students.id"));
        assert!(rendered.contains("students.id = enrollments.student_id"));
    }

    #[test]
    fn load_without_file_uses_fallback() {
        let schema = SchemaDescriptor::load(None).unwrap();
        assert_eq!(schema.tables.len(), 3);
    }

    #[test]
    fn load_rejects_missing_file() {
        let result = SchemaDescriptor::load(Some("/nonexistent/schema.toml"));
        assert!(matches!(result, Err(SchemaError::LoadError(_))));
    }
}

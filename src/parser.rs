//! Lightweight SQL summaries for diagnostic output.
//!
//! This is not a SQL parser: it looks at the leading keyword and the first
//! table reference, which is enough to label a statement in a log line.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading keyword of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlVerb {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Begin,
    Commit,
    Rollback,
    Other,
}

impl SqlVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlVerb::Select => "SELECT",
            SqlVerb::Insert => "INSERT",
            SqlVerb::Update => "UPDATE",
            SqlVerb::Delete => "DELETE",
            SqlVerb::Create => "CREATE",
            SqlVerb::Drop => "DROP",
            SqlVerb::Alter => "ALTER",
            SqlVerb::Truncate => "TRUNCATE",
            SqlVerb::Begin => "BEGIN",
            SqlVerb::Commit => "COMMIT",
            SqlVerb::Rollback => "ROLLBACK",
            SqlVerb::Other => "QUERY",
        }
    }

    fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "VALUES" => SqlVerb::Select,
            "INSERT" | "REPLACE" | "UPSERT" => SqlVerb::Insert,
            "UPDATE" => SqlVerb::Update,
            "DELETE" => SqlVerb::Delete,
            "CREATE" => SqlVerb::Create,
            "DROP" => SqlVerb::Drop,
            "ALTER" => SqlVerb::Alter,
            "TRUNCATE" => SqlVerb::Truncate,
            "BEGIN" | "START" => SqlVerb::Begin,
            "COMMIT" | "END" => SqlVerb::Commit,
            "ROLLBACK" => SqlVerb::Rollback,
            _ => SqlVerb::Other,
        }
    }

    /// Whether statements of this kind name a table worth extracting.
    fn touches_table(&self) -> bool {
        !matches!(
            self,
            SqlVerb::Begin | SqlVerb::Commit | SqlVerb::Rollback | SqlVerb::Other
        )
    }
}

impl fmt::Display for SqlVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// First table reference, optionally quoted with `"`, backticks or brackets.
static TABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?ix)
        \b(?:
            FROM
          | INTO
          | UPDATE
          | TRUNCATE(?:\s+TABLE)?
          | TABLE(?:\s+IF\s+(?:NOT\s+)?EXISTS)?
        )
        \s+[`"\[]?(\w+)[`"\]]?"#,
    )
    .expect("table reference pattern is valid")
});

/// Verb and primary table of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSummary {
    pub verb: SqlVerb,
    pub table: Option<String>,
}

impl SqlSummary {
    pub fn parse(sql: &str) -> Self {
        let verb = sql
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|word| !word.is_empty())
            .map_or(SqlVerb::Other, SqlVerb::from_keyword);

        let table = if verb.touches_table() {
            TABLE_REFERENCE
                .captures(sql)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_lowercase())
        } else {
            None
        };

        Self { verb, table }
    }

    /// `"SELECT users"`, or just the verb when no table was found.
    pub fn label(&self) -> String {
        match &self.table {
            Some(table) => format!("{} {}", self.verb, table),
            None => self.verb.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs() {
        assert_eq!(SqlSummary::parse("SELECT * FROM users").verb, SqlVerb::Select);
        assert_eq!(
            SqlSummary::parse("  with cte AS (SELECT 1) SELECT * FROM cte").verb,
            SqlVerb::Select
        );
        assert_eq!(
            SqlSummary::parse("INSERT INTO users(name, age) VALUES(?, ?)").verb,
            SqlVerb::Insert
        );
        assert_eq!(SqlSummary::parse("START TRANSACTION").verb, SqlVerb::Begin);
        assert_eq!(SqlSummary::parse("PRAGMA foreign_keys").verb, SqlVerb::Other);
        assert_eq!(SqlSummary::parse("").verb, SqlVerb::Other);
    }

    #[test]
    fn test_tables() {
        let table = |sql: &str| SqlSummary::parse(sql).table;
        assert_eq!(table("SELECT id FROM users WHERE id = 1"), Some("users".into()));
        assert_eq!(table(r#"select * from "Users""#), Some("users".into()));
        assert_eq!(table("INSERT INTO users(name) VALUES(?)"), Some("users".into()));
        assert_eq!(table("UPDATE students SET name = $1"), Some("students".into()));
        assert_eq!(table("DELETE FROM `orders` WHERE id = 1"), Some("orders".into()));
        assert_eq!(table("TRUNCATE TABLE sessions"), Some("sessions".into()));
        assert_eq!(
            table("CREATE TABLE IF NOT EXISTS users (id INTEGER)"),
            Some("users".into())
        );
        assert_eq!(table("COMMIT"), None);
    }

    #[test]
    fn test_label() {
        assert_eq!(SqlSummary::parse("SELECT * FROM users").label(), "SELECT users");
        assert_eq!(SqlSummary::parse("ROLLBACK").label(), "ROLLBACK");
    }
}

//! Read-only SQL validation
//!
//! The NL→SQL translator is untrusted input. Whatever it returns passes
//! a strict allow-list gate before execution: one statement, SELECT or
//! WITH only, no write/DDL keywords, no comments, no stacked statements.
//! A row limit is appended when the statement carries none.

use querybridge_common::errors::{AppError, Result};

/// Keywords that mark a statement as writing or administrative
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke",
    "merge", "replace", "exec", "execute", "call", "copy", "vacuum", "reindex", "set", "do",
    "commit", "rollback", "lock",
];

/// Validate that a translated statement is a single read-only query.
/// Returns the cleaned statement (trailing semicolon removed).
pub fn validate_read_only(sql: &str) -> Result<String> {
    let cleaned = sql.trim().trim_end_matches(';').trim().to_string();

    if cleaned.is_empty() {
        return Err(reject("empty statement"));
    }
    if cleaned.contains(';') {
        return Err(reject("multiple statements are not allowed"));
    }
    if cleaned.contains("--") || cleaned.contains("/*") {
        return Err(reject("comments are not allowed"));
    }

    let tokens = tokenize(&cleaned);
    let Some(first) = tokens.first() else {
        return Err(reject("no statement keyword found"));
    };
    if first != "select" && first != "with" {
        return Err(reject(&format!("only SELECT statements are allowed, got {}", first)));
    }

    if let Some(forbidden) = tokens.iter().find(|t| FORBIDDEN_KEYWORDS.contains(&t.as_str())) {
        return Err(reject(&format!("forbidden keyword: {}", forbidden)));
    }

    Ok(cleaned)
}

/// Append a LIMIT clause when the statement has none, bounding the
/// result set
pub fn enforce_row_limit(sql: &str, max_rows: usize) -> String {
    let has_limit = tokenize(sql).iter().any(|t| t == "limit");
    if has_limit {
        sql.to_string()
    } else {
        format!("{} LIMIT {}", sql, max_rows)
    }
}

fn reject(message: &str) -> AppError {
    AppError::Validation {
        message: format!("rejected SQL statement: {}", message),
        field: None,
    }
}

/// Lowercase word tokens; underscores keep identifiers like
/// `created_at` whole so they never collide with keywords
fn tokenize(sql: &str) -> Vec<String> {
    sql.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_accepted() {
        let sql = "SELECT name, AVG(salary) FROM employees GROUP BY name";
        assert_eq!(validate_read_only(sql).unwrap(), sql);
    }

    #[test]
    fn test_with_cte_accepted() {
        let sql = "WITH totals AS (SELECT department_id, SUM(salary) s FROM employees GROUP BY department_id) SELECT * FROM totals";
        assert!(validate_read_only(sql).is_ok());
    }

    #[test]
    fn test_trailing_semicolon_stripped() {
        let cleaned = validate_read_only("SELECT 1;").unwrap();
        assert_eq!(cleaned, "SELECT 1");
    }

    #[test]
    fn test_dml_rejected() {
        assert!(validate_read_only("UPDATE employees SET salary = 0").is_err());
        assert!(validate_read_only("DELETE FROM employees").is_err());
        assert!(validate_read_only("INSERT INTO employees VALUES (1)").is_err());
    }

    #[test]
    fn test_ddl_rejected() {
        assert!(validate_read_only("DROP TABLE employees").is_err());
        assert!(validate_read_only("CREATE TABLE x (id int)").is_err());
        assert!(validate_read_only("ALTER TABLE employees ADD c int").is_err());
    }

    #[test]
    fn test_stacked_statements_rejected() {
        assert!(validate_read_only("SELECT 1; DROP TABLE employees").is_err());
    }

    #[test]
    fn test_embedded_write_keyword_rejected() {
        assert!(validate_read_only("SELECT * FROM employees WHERE id IN (DELETE FROM x)").is_err());
    }

    #[test]
    fn test_comments_rejected() {
        assert!(validate_read_only("SELECT 1 -- sneaky").is_err());
        assert!(validate_read_only("SELECT /* hidden */ 1").is_err());
    }

    #[test]
    fn test_identifier_containing_keyword_accepted() {
        // created_at must not trip the "create" keyword check
        let sql = "SELECT created_at, updated_at FROM employees";
        assert!(validate_read_only(sql).is_ok());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(validate_read_only("").is_err());
        assert!(validate_read_only("   ;  ").is_err());
    }

    #[test]
    fn test_limit_appended_when_missing() {
        assert_eq!(
            enforce_row_limit("SELECT * FROM employees", 100),
            "SELECT * FROM employees LIMIT 100"
        );
    }

    #[test]
    fn test_existing_limit_untouched() {
        let sql = "SELECT * FROM employees LIMIT 5";
        assert_eq!(enforce_row_limit(sql, 100), sql);
    }
}

//! Identifier quoting and literal escaping.
//!
//! All SQL text sent to the storage engine or rendered into DDL goes
//! through these helpers. Nothing else in the crate concatenates raw
//! identifiers into SQL.

use crate::error::{ExportError, Result};

/// Reject identifiers that could not have come from a catalog query.
///
/// Catalog names are trusted in principle, but a corrupted or hostile
/// catalog row should fail loudly rather than be spliced into SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ExportError::Config("empty identifier".into()));
    }
    if name.len() > 256 {
        let head: String = name.chars().take(32).collect();
        return Err(ExportError::Config(format!(
            "identifier too long ({} bytes): {}...",
            name.len(),
            head
        )));
    }
    if name.contains('\0') || name.contains('\n') || name.contains('\r') {
        return Err(ExportError::Config(format!(
            "identifier contains control characters: {:?}",
            name
        )));
    }
    Ok(())
}

/// Quote an identifier for SQL Server: `[name]`, `]` doubled.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote an identifier for PostgreSQL: `"name"`, `"` doubled.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier for Oracle. Same rules as PostgreSQL.
pub fn quote_oracle(name: &str) -> String {
    quote_pg(name)
}

/// Escape a string for use inside a single-quoted SQL literal.
///
/// Every embedded string that reaches the storage engine (DDL text,
/// view definitions, ledger messages) must pass through here.
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mssql() {
        assert_eq!(quote_mssql("orders"), "[orders]");
        assert_eq!(quote_mssql("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("orders"), "\"orders\"");
        assert_eq!(quote_pg("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("a''b"), "a''''b");
    }

    #[test]
    fn test_escape_literal_no_unescaped_quote_remains() {
        let inputs = ["'", "''", "x'y'z", "'''", "it's a 'test'"];
        for input in inputs {
            let escaped = escape_literal(input);
            // Every quote in the output must be part of a doubled pair.
            let mut chars = escaped.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\'' {
                    assert_eq!(chars.next(), Some('\''), "lone quote in {:?}", escaped);
                }
            }
        }
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("Order Details").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\nname").is_err());
        assert!(validate_identifier(&"x".repeat(300)).is_err());
    }
}

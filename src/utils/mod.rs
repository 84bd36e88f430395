pub mod setting;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use which::which;

/// Finds the sqlcmd executable, preferring an explicitly configured path.
pub fn find_sqlcmd_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Configured sqlcmd path does not exist: {}", path.display());
    }
    which("sqlcmd").context("sqlcmd executable not found in PATH. Please ensure the SQL Server command-line tools are installed and in your PATH.")
}

/// Quotes a T-SQL identifier with brackets, doubling any closing bracket.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quotes a T-SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Orders"), "[Orders]");
        assert_eq!(quote_identifier("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("/var/restore/Orders.mdf"), "'/var/restore/Orders.mdf'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_missing_configured_sqlcmd_is_error() {
        let result = find_sqlcmd_executable(Some(Path::new("/no/such/sqlcmd")));
        assert!(result.is_err());
    }
}

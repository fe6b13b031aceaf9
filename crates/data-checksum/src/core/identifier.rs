//! Identifier validation and quoting for dynamically built MySQL statements.
//!
//! Database, table and column names cannot be bound as statement parameters, so
//! every name that reaches SQL text goes through [`quote_mysql`].

use crate::error::{ChecksumError, Result};

/// Maximum identifier length accepted (MySQL allows 64; leave headroom for aliases).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and identifiers
/// exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChecksumError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(ChecksumError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ChecksumError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Strip one level of surrounding double quotes or backticks.
fn unquote(name: &str) -> &str {
    for quote in ['"', '`'] {
        if name.len() >= 2 && name.starts_with(quote) && name.ends_with(quote) {
            return &name[1..name.len() - 1];
        }
    }
    name
}

/// Quote a MySQL identifier using backticks.
///
/// Names already wrapped in quotes are unwrapped first; embedded backticks are doubled.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("\"users\"")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    let name = unquote(name);
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}

/// Quote every name of a list, in order.
pub fn quote_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>> {
    names.iter().map(|n| quote_mysql(n.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mysql() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn test_quote_mysql_strips_existing_quotes() {
        assert_eq!(quote_mysql("\"orders\"").unwrap(), "`orders`");
        assert_eq!(quote_mysql("`orders`").unwrap(), "`orders`");
    }

    #[test]
    fn test_qualify_mysql() {
        assert_eq!(qualify_mysql("shop", "orders").unwrap(), "`shop`.`orders`");
    }

    #[test]
    fn test_rejects_invalid_identifiers() {
        assert!(quote_mysql("").is_err());
        assert!(quote_mysql("bad\0name").is_err());
        assert!(quote_mysql(&"x".repeat(129)).is_err());
        assert!(quote_mysql("``").is_err());
    }
}

//! Parsed table identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClickLinkError, Result};

/// A table identifier, optionally qualified with a database name.
///
/// Parsed from `table` or `database.table`; anything with more than one
/// `.` separator or an empty part is rejected. An unqualified name resolves
/// to the `default` database for schema lookups, while DDL and inserts keep
/// it unqualified so the store applies its own session default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    database: Option<String>,
    table: String,
}

impl TableRef {
    /// Parse an identifier.
    pub fn parse(identifier: &str) -> Result<Self> {
        let mut parts = identifier.split('.');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(ClickLinkError::InvalidIdentifier(identifier.to_string()));
        }
        let (database, table) = match second {
            Some(table) => (Some(first), table),
            None => (None, first),
        };
        if table.is_empty() || database.is_some_and(str::is_empty) {
            return Err(ClickLinkError::InvalidIdentifier(identifier.to_string()));
        }
        Ok(Self {
            database: database.map(str::to_string),
            table: table.to_string(),
        })
    }

    /// The database part, falling back to `default` when unqualified.
    pub fn database_or_default(&self) -> &str {
        self.database.as_deref().unwrap_or("default")
    }

    /// The bare table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}.{}", database, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

impl FromStr for TableRef {
    type Err = ClickLinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unqualified() {
        let t = TableRef::parse("events").unwrap();
        assert_eq!(t.database_or_default(), "default");
        assert_eq!(t.table(), "events");
        assert_eq!(t.to_string(), "events");
    }

    #[test]
    fn test_qualified() {
        let t = TableRef::parse("analytics.events").unwrap();
        assert_eq!(t.database_or_default(), "analytics");
        assert_eq!(t.table(), "events");
        assert_eq!(t.to_string(), "analytics.events");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(TableRef::parse("a.b.c").is_err());
        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse(".events").is_err());
        assert!(TableRef::parse("db.").is_err());
    }
}

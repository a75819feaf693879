//! SQL dialect of the target database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// URL schemes accepted for each backend.
const SCHEMES: &[(&str, DatabaseType)] = &[
    ("mysql", DatabaseType::MySQL),
    ("mariadb", DatabaseType::MySQL),
    ("postgres", DatabaseType::PostgreSQL),
    ("postgresql", DatabaseType::PostgreSQL),
    ("sqlite", DatabaseType::SQLite),
];

/// Backend family, used for pool selection, identifier quoting, SQL parsing
/// and the dialect named in prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Backend for a connection URL, judged by its scheme alone.
    pub fn from_connection_string(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        SCHEMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(scheme))
            .map(|&(_, db)| db)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    fn quote_char(&self) -> char {
        if *self == Self::MySQL { '`' } else { '"' }
    }

    /// Wrap `ident` in the backend's identifier quotes, doubling any embedded
    /// quote character.
    pub fn quote_identifier(&self, ident: &str) -> String {
        let q = self.quote_char();
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(q);
        for ch in ident.chars() {
            if ch == q {
                quoted.push(q);
            }
            quoted.push(ch);
        }
        quoted.push(q);
        quoted
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

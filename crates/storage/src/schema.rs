//! Table layouts and the SQL dialects they are rendered for.

use std::str::FromStr;

use crawlq_core::ConfigError;

/// Which relational engine a connection string points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            _ => Err(ConfigError::UnsupportedDatabase(url.to_string())),
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
        }
    }

    fn integer(self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER",
            Dialect::Postgres => "BIGINT",
        }
    }
}

/// Payload layout of a table. Every layout also carries `id`,
/// `create_time`, `update_time` and the `deleted` tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSchema {
    /// One row per fingerprint check.
    DupeFilter,
    /// Raw seed rows written by an external producer.
    StartUrl,
    /// Encoded requests plus an ordering score.
    Queue,
}

impl TableSchema {
    pub fn has_score(self) -> bool {
        matches!(self, TableSchema::Queue)
    }

    pub fn name(self) -> &'static str {
        match self {
            TableSchema::DupeFilter => "dupefilter",
            TableSchema::StartUrl => "start_url",
            TableSchema::Queue => "queue",
        }
    }

    /// DDL statements creating the table and its indexes, executed in order.
    pub fn create_statements(self, dialect: Dialect, table: &str) -> Vec<String> {
        let mut columns = vec![
            dialect.id_column().to_string(),
            "create_time TEXT NOT NULL".to_string(),
            "update_time TEXT NOT NULL".to_string(),
            "deleted BOOLEAN NOT NULL DEFAULT FALSE".to_string(),
            "\"key\" TEXT NOT NULL".to_string(),
        ];
        if self.has_score() {
            columns.push(format!("score {} NOT NULL DEFAULT 0", dialect.integer()));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(table),
            columns.join(", ")
        )];
        match self {
            TableSchema::Queue => statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (score)",
                quote(&format!("{table}_score_idx")),
                quote(table)
            )),
            TableSchema::DupeFilter => statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (\"key\")",
                quote(&format!("{table}_key_idx")),
                quote(table)
            )),
            TableSchema::StartUrl => {}
        }
        statements
    }
}

impl FromStr for TableSchema {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dupefilter" => Ok(TableSchema::DupeFilter),
            "start_url" => Ok(TableSchema::StartUrl),
            "queue" => Ok(TableSchema::Queue),
            other => Err(ConfigError::UnknownSchema(other.to_string())),
        }
    }
}

/// Double-quote an identifier. Names are validated before they get here.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_url() {
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("sqlite://crawl.db?mode=rwc").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("postgres://u:p@h/db").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_url("postgresql://h/db").unwrap(), Dialect::Postgres);
        assert!(Dialect::from_url("mysql://h/db").is_err());
    }

    #[test]
    fn schema_keys() {
        assert_eq!("queue".parse::<TableSchema>().unwrap(), TableSchema::Queue);
        assert_eq!("dupefilter".parse::<TableSchema>().unwrap(), TableSchema::DupeFilter);
        assert_eq!(
            "test".parse::<TableSchema>(),
            Err(ConfigError::UnknownSchema("test".into()))
        );
    }

    #[test]
    fn queue_ddl_has_score_and_index() {
        let ddl = TableSchema::Queue.create_statements(Dialect::Postgres, "demo_requests");
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("BIGSERIAL"));
        assert!(ddl[0].contains("score BIGINT"));
        assert!(ddl[1].contains("\"demo_requests_score_idx\""));
    }

    #[test]
    fn start_url_ddl_has_no_score() {
        let ddl = TableSchema::StartUrl.create_statements(Dialect::Sqlite, "demo_start_urls");
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("AUTOINCREMENT"));
        assert!(!ddl[0].contains("score"));
    }
}

//! Schema of the queryable dataset.
//!
//! The relational store is provisioned externally; this module only
//! describes it to the query generator (and creates it in tests).

/// Table the query tool reads from
pub const UNICORNS_TABLE_NAME: &str = "unicorns";

/// DDL of the provisioned table. Valuations are in billions of dollars.
pub const UNICORNS_CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS unicorns (
    id INTEGER PRIMARY KEY,
    company TEXT NOT NULL UNIQUE,
    valuation REAL NOT NULL,
    date_joined TEXT,
    country TEXT NOT NULL,
    city TEXT NOT NULL,
    industry TEXT NOT NULL,
    select_investors TEXT NOT NULL
)
"#;

/// Industry values present in the `industry` column.
pub const UNICORN_INDUSTRIES: &[&str] = &[
    "healthcare & life sciences",
    "consumer & retail",
    "financial services",
    "enterprise tech",
    "insurance",
    "media & entertainment",
    "industrials",
    "health",
];

/// Schema block embedded in the query-generation prompt.
pub fn unicorns_schema_description() -> String {
    format!(
        "{} (\n  id INTEGER PRIMARY KEY,\n  company TEXT NOT NULL UNIQUE,\n  valuation REAL NOT NULL,\n  date_joined TEXT, -- ISO date, YYYY-MM-DD\n  country TEXT NOT NULL,\n  city TEXT NOT NULL,\n  industry TEXT NOT NULL,\n  select_investors TEXT NOT NULL\n);",
        UNICORNS_TABLE_NAME
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_names_every_column() {
        let description = unicorns_schema_description();
        for column in [
            "company",
            "valuation",
            "date_joined",
            "country",
            "city",
            "industry",
            "select_investors",
        ] {
            assert!(description.contains(column), "missing {}", column);
        }
        assert!(description.starts_with(UNICORNS_TABLE_NAME));
    }

    #[test]
    fn create_statement_is_valid_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute(UNICORNS_CREATE_TABLE, []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM unicorns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

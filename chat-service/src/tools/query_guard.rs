//! Read-only gate for model-generated SQL.
//!
//! A candidate passes only if, trimmed and lowercased, it starts with
//! `select` and contains none of [`DENYLIST`] anywhere in its text. The check
//! is a substring match: a column named `update_count` is rejected too.
//! Nothing that fails here is ever sent to the data store.

use thiserror::Error;

use crate::error::ToolError;

/// Keywords that reject a candidate query wherever they appear.
pub const DENYLIST: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "truncate", "create", "grant", "revoke",
];

const READ_KEYWORD: &str = "select";

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueryRejection {
    #[error("only SELECT queries are allowed")]
    NotReadOnly,
    #[error("query contains forbidden keyword `{0}`")]
    ForbiddenKeyword(&'static str),
}

impl From<QueryRejection> for ToolError {
    fn from(rejection: QueryRejection) -> Self {
        ToolError::Validation(rejection.to_string())
    }
}

pub fn validate_read_only_query(candidate: &str) -> Result<(), QueryRejection> {
    let normalized = candidate.trim().to_lowercase();

    if !normalized.starts_with(READ_KEYWORD) {
        return Err(QueryRejection::NotReadOnly);
    }

    match DENYLIST
        .iter()
        .copied()
        .find(|keyword| normalized.contains(keyword))
    {
        Some(keyword) => Err(QueryRejection::ForbiddenKeyword(keyword)),
        None => Ok(()),
    }
}

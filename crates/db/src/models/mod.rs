//! Row models.
//!
//! Each submodule contains a `FromRow` struct matching the table row, the
//! insert DTO where one is needed, and a `TryFrom` conversion into the
//! domain type from `taskfeed_core`. Enum columns are stored as TEXT and
//! parsed during conversion.

pub mod department_task;
pub mod form_link;
pub mod post;
pub mod rule_dispatch;
pub mod template;

use std::str::FromStr;

use taskfeed_core::error::CoreError;

/// Parse a TEXT enum column, reporting corrupt values as internal errors.
pub(crate) fn parse_column<T>(value: &str, column: &'static str) -> Result<T, CoreError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| CoreError::Internal(format!("Invalid {column} column: {e}")))
}

/// Decode a JSONB column into a typed value.
pub(crate) fn decode_json<T>(value: serde_json::Value, column: &'static str) -> Result<T, CoreError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value)
        .map_err(|e| CoreError::Internal(format!("Invalid {column} column: {e}")))
}

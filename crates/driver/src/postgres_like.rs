// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Reference driver exercising PostgreSQL-family rendering rules:
//! double-quoted identifiers, `LIMIT count OFFSET offset`, `ILIKE` for
//! case-insensitive patterns, and unlogged temp tables via
//! `CREATE TEMP TABLE ... AS`.

use async_trait::async_trait;
use unified_fetch_value_expr::Literal;

use crate::driver::{Driver, LikeWildcard};
use crate::error::{DriverError, DriverResult};
use crate::transaction::Transaction;
use crate::value::SqlValue;

#[derive(Debug, Default)]
pub struct PostgresLikeDriver;

struct NoopTransaction;

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> DriverResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DriverResult<()> {
        Ok(())
    }
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "''")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn wrap_literal_wildcard(escaped: &str, wildcard: LikeWildcard) -> String {
    match wildcard {
        LikeWildcard::None => escaped.to_string(),
        LikeWildcard::Contains => format!("%{escaped}%"),
        LikeWildcard::Prefix => format!("{escaped}%"),
        LikeWildcard::Suffix => format!("%{escaped}"),
    }
}

fn wrap_expr_wildcard(escaped: &str, wildcard: LikeWildcard) -> String {
    match wildcard {
        LikeWildcard::None => escaped.to_string(),
        LikeWildcard::Contains => format!("CONCAT('%', {escaped}, '%')"),
        LikeWildcard::Prefix => format!("CONCAT({escaped}, '%')"),
        LikeWildcard::Suffix => format!("CONCAT('%', {escaped})"),
    }
}

#[async_trait]
impl Driver for PostgresLikeDriver {
    fn sql_literal(&self, v: &Literal) -> Option<String> {
        Some(match v {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(b) => self.boolean_literal(*b),
            Literal::Number(n) => n.to_string(),
            Literal::Str(s) => self.string_literal(s),
            Literal::DateTime(s) => format!("{}::timestamptz", self.string_literal(s)),
        })
    }

    fn boolean_literal(&self, b: bool) -> String {
        if b { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", escape_single_quotes(s))
    }

    fn safe_label(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn safe_like_pattern_from_string(&self, s: &str, wildcard: LikeWildcard) -> String {
        self.string_literal(&wrap_literal_wildcard(&escape_like(s), wildcard))
    }

    fn safe_like_pattern_from_expr(&self, e: &str, wildcard: LikeWildcard) -> String {
        let escaped = format!("REPLACE(REPLACE(REPLACE({e}, '\\', '\\\\'), '%', '\\%'), '_', '\\_')");
        wrap_expr_wildcard(&escaped, wildcard)
    }

    fn pattern_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
        let op = match (invert, case_sensitive) {
            (false, true) => "LIKE",
            (false, false) => "ILIKE",
            (true, true) => "NOT LIKE",
            (true, false) => "NOT ILIKE",
        };
        format!("{expr} {op} {pattern}")
    }

    fn regexp_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
        let op = match (invert, case_sensitive) {
            (false, true) => "~",
            (false, false) => "~*",
            (true, true) => "!~",
            (true, false) => "!~*",
        };
        format!("{expr} {op} {pattern}")
    }

    fn string_length(&self, e: &str) -> String {
        format!("CHAR_LENGTH({e})")
    }

    fn string_lowercase(&self, e: &str) -> String {
        format!("LOWER({e})")
    }

    fn string_uppercase(&self, e: &str) -> String {
        format!("UPPER({e})")
    }

    fn string_left_pad(&self, e: &str, len: u32, pad: &str) -> String {
        format!("LPAD({e}, {len}, {})", self.string_literal(pad))
    }

    fn string_substring(&self, e: &str, from: u32, len: Option<u32>) -> String {
        match len {
            Some(len) => format!("SUBSTRING({e} FROM {from} FOR {len})"),
            None => format!("SUBSTRING({e} FROM {from})"),
        }
    }

    fn nullable_concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn cast_to_string(&self, e: &str) -> String {
        format!("CAST({e} AS TEXT)")
    }

    fn boolean_to_null(&self, e: &str) -> String {
        format!("NULLIF({e}, FALSE)")
    }

    fn coalesce(&self, parts: &[&str]) -> String {
        format!("COALESCE({})", parts.join(", "))
    }

    fn make_ranged_select(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql} LIMIT {limit} OFFSET {offset}")
    }

    fn make_select_into_temp_table(&self, sql: &str, temp_name: &str) -> (String, String) {
        (
            format!("CREATE TEMP TABLE {temp_name} ON COMMIT DROP AS {sql}"),
            format!("DROP TABLE IF EXISTS {temp_name}"),
        )
    }

    async fn start_transaction(&self) -> DriverResult<Box<dyn Transaction>> {
        tracing::debug!("postgres-like driver: starting transaction");
        Ok(Box::new(NoopTransaction))
    }

    async fn execute_query(
        &self,
        _tx: &mut dyn Transaction,
        sql: &str,
        on_header: &mut dyn FnMut(&[String]),
        _on_row: &mut dyn FnMut(&[SqlValue]),
    ) -> DriverResult<()> {
        tracing::debug!(sql, "postgres-like driver: executing query");
        on_header(&[]);
        Ok(())
    }

    async fn execute_update(&self, _tx: &mut dyn Transaction, sql: &str) -> DriverResult<u64> {
        tracing::debug!(sql, "postgres-like driver: executing update");
        Err(DriverError::NotSupported(
            "reference driver does not execute updates".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_double_quoted_labels() {
        let driver = PostgresLikeDriver;
        assert_eq!(driver.safe_label("order"), "\"order\"");
    }

    #[test]
    fn renders_limit_offset_syntax() {
        let driver = PostgresLikeDriver;
        assert_eq!(
            driver.make_ranged_select("SELECT 1", 10, 20),
            "SELECT 1 LIMIT 20 OFFSET 10"
        );
    }

    #[test]
    fn contains_pattern_wraps_escaped_text_in_percent_signs() {
        let driver = PostgresLikeDriver;
        assert_eq!(
            driver.safe_like_pattern_from_string("50%_off", LikeWildcard::Contains),
            "'%50\\%\\_off%'"
        );
    }

    #[test]
    fn suffix_pattern_from_expr_concatenates_leading_wildcard() {
        let driver = PostgresLikeDriver;
        assert_eq!(
            driver.safe_like_pattern_from_expr("name", LikeWildcard::Suffix),
            "CONCAT('%', REPLACE(REPLACE(REPLACE(name, '\\', '\\\\'), '%', '\\%'), '_', '\\_'))"
        );
    }

    #[test]
    fn case_insensitive_pattern_uses_ilike() {
        let driver = PostgresLikeDriver;
        assert_eq!(
            driver.pattern_match("name", "'%a%'", false, false),
            "name ILIKE '%a%'"
        );
    }

    #[tokio::test]
    async fn execute_update_is_unsupported_without_a_backend() {
        let driver = PostgresLikeDriver;
        let mut tx = driver.start_transaction().await.unwrap();
        let err = driver
            .execute_update(tx.as_mut(), "UPDATE t SET x = 1")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotSupported(_)));
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Reference driver exercising MySQL-family rendering rules:
//! backtick identifiers, `LIMIT offset, count`, and `SELECT ... INTO`
//! style temp tables via `CREATE TEMPORARY TABLE ... AS SELECT`.
//!
//! This is not a network driver — it renders SQL and, lacking a
//! connection, executes against an empty in-memory result set. Real
//! deployments supply their own `Driver` backed by an actual pool.

use async_trait::async_trait;
use unified_fetch_value_expr::Literal;

use crate::driver::{Driver, LikeWildcard};
use crate::error::{DriverError, DriverResult};
use crate::transaction::Transaction;
use crate::value::SqlValue;

#[derive(Debug, Default)]
pub struct MySqlLikeDriver;

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
impl Driver for MySqlLikeDriver {
    fn sql_literal(&self, v: &Literal) -> Option<String> {
        Some(match v {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(b) => self.boolean_literal(*b),
            Literal::Number(n) => n.to_string(),
            Literal::Str(s) => self.string_literal(s),
            Literal::DateTime(s) => self.string_literal(s),
        })
    }

    fn boolean_literal(&self, b: bool) -> String {
        if b { "1".to_string() } else { "0".to_string() }
    }

    fn string_literal(&self, s: &str) -> String {
        format!("'{}'", escape_single_quotes(s))
    }

    fn safe_label(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn safe_like_pattern_from_string(&self, s: &str, wildcard: LikeWildcard) -> String {
        self.string_literal(&wrap_literal_wildcard(&escape_like(s), wildcard))
    }

    fn safe_like_pattern_from_expr(&self, e: &str, wildcard: LikeWildcard) -> String {
        let escaped =
            format!("REPLACE(REPLACE(REPLACE({e}, '\\\\', '\\\\\\\\'), '%', '\\\\%'), '_', '\\\\_')");
        wrap_expr_wildcard(&escaped, wildcard)
    }

    fn pattern_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
        let op = match (invert, case_sensitive) {
            (false, true) => "LIKE BINARY",
            (false, false) => "LIKE",
            (true, true) => "NOT LIKE BINARY",
            (true, false) => "NOT LIKE",
        };
        format!("{expr} {op} {pattern}")
    }

    fn regexp_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
        let op = match (invert, case_sensitive) {
            (false, true) => "REGEXP BINARY",
            (false, false) => "REGEXP",
            (true, true) => "NOT REGEXP BINARY",
            (true, false) => "NOT REGEXP",
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
            Some(len) => format!("SUBSTRING({e}, {from}, {len})"),
            None => format!("SUBSTRING({e}, {from})"),
        }
    }

    fn nullable_concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn cast_to_string(&self, e: &str) -> String {
        format!("CAST({e} AS CHAR)")
    }

    fn boolean_to_null(&self, e: &str) -> String {
        format!("NULLIF({e}, 0)")
    }

    fn coalesce(&self, parts: &[&str]) -> String {
        format!("COALESCE({})", parts.join(", "))
    }

    fn make_ranged_select(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql} LIMIT {offset}, {limit}")
    }

    fn make_select_into_temp_table(&self, sql: &str, temp_name: &str) -> (String, String) {
        (
            format!("CREATE TEMPORARY TABLE {temp_name} AS {sql}"),
            format!("DROP TEMPORARY TABLE IF EXISTS {temp_name}"),
        )
    }

    async fn start_transaction(&self) -> DriverResult<Box<dyn Transaction>> {
        tracing::debug!("mysql-like driver: starting transaction");
        Ok(Box::new(NoopTransaction))
    }

    async fn execute_query(
        &self,
        _tx: &mut dyn Transaction,
        sql: &str,
        on_header: &mut dyn FnMut(&[String]),
        _on_row: &mut dyn FnMut(&[SqlValue]),
    ) -> DriverResult<()> {
        tracing::debug!(sql, "mysql-like driver: executing query");
        on_header(&[]);
        Ok(())
    }

    async fn execute_update(&self, _tx: &mut dyn Transaction, sql: &str) -> DriverResult<u64> {
        tracing::debug!(sql, "mysql-like driver: executing update");
        Err(DriverError::NotSupported(
            "reference driver does not execute updates".to_string(),
        ))
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Driver trait
//!
//! This module defines the async `Driver` trait the query compiler and
//! executor render SQL and run statements against. It abstracts every
//! dialect-sensitive fragment a fetch needs to emit — literal encoding,
//! pattern/regex matching, string functions, range and temp-table
//! syntax — plus the four execution verbs a fetch needs to run.
//!
//! Implementations can wrap a live connection pool, a query log for
//! tests, or (as with the two reference drivers in this crate) nothing
//! at all beyond enough logic to exercise the rendering paths.

use async_trait::async_trait;
use unified_fetch_value_expr::Literal;

use crate::error::DriverResult;
use crate::transaction::Transaction;
use crate::value::SqlValue;

/// Where a LIKE pattern's structural `%` wildcards go around an escaped
/// fragment. Escaping and wildcard placement have to happen together:
/// the escaping pass must run before the wildcards are added, or a
/// literal `%`/`_` in the source text would be mistaken for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeWildcard {
    /// No structural wildcard -- an exact (escaped) match.
    None,
    /// `%text%`, for `contains`.
    Contains,
    /// `text%`, for `starts`.
    Prefix,
    /// `%text`, for `ends`.
    Suffix,
}

/// Database driver port.
///
/// Implementations must be `Send + Sync` since a single driver instance
/// is shared across concurrently running fetches.
#[async_trait]
pub trait Driver: Send + Sync {
    // -- literal encoders --------------------------------------------------

    /// Renders a compile-time literal as SQL text, or `None` if the
    /// literal kind has no direct encoding and must go through a bound
    /// parameter instead.
    fn sql_literal(&self, v: &Literal) -> Option<String>;
    fn boolean_literal(&self, b: bool) -> String;
    fn string_literal(&self, s: &str) -> String;
    /// Quotes `s` for use as a column alias / markup label.
    fn safe_label(&self, s: &str) -> String;

    // -- pattern encoders -----------------------------------------------

    /// Escapes `s`'s LIKE metacharacters, places `wildcard`'s structural
    /// `%`s around the escaped text, and wraps the result as a literal
    /// (e.g. for a `contains`/`starts` predicate).
    fn safe_like_pattern_from_string(&self, s: &str, wildcard: LikeWildcard) -> String;
    /// Escapes an already-rendered SQL expression's LIKE metacharacters
    /// at runtime (used when the pattern itself is a column reference)
    /// and places `wildcard`'s structural `%`s around it.
    fn safe_like_pattern_from_expr(&self, e: &str, wildcard: LikeWildcard) -> String;
    fn pattern_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String;
    fn regexp_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String;

    // -- string functions -------------------------------------------------

    fn string_length(&self, e: &str) -> String;
    fn string_lowercase(&self, e: &str) -> String;
    fn string_uppercase(&self, e: &str) -> String;
    fn string_left_pad(&self, e: &str, len: u32, pad: &str) -> String;
    fn string_substring(&self, e: &str, from: u32, len: Option<u32>) -> String;
    fn nullable_concat(&self, parts: &[&str]) -> String;
    fn cast_to_string(&self, e: &str) -> String;
    fn boolean_to_null(&self, e: &str) -> String;
    fn coalesce(&self, parts: &[&str]) -> String;

    // -- range / temp tables ------------------------------------------------

    fn make_ranged_select(&self, sql: &str, offset: u64, limit: u64) -> String;
    /// Returns `(create_statement, drop_statement)` for materializing
    /// `sql` into a temp table named `temp_name`.
    fn make_select_into_temp_table(&self, sql: &str, temp_name: &str) -> (String, String);

    /// DELETE/UPDATE join construction is out of scope for this fetch
    /// compiler; the tag is reserved so a future write-path DBO crate
    /// can add it without an interface break.
    fn delete_update_join_builder(&self) -> DriverResult<()> {
        Err(crate::error::DriverError::NotSupported(
            "DELETE/UPDATE join construction".to_string(),
        ))
    }

    // -- execution verbs ----------------------------------------------------

    async fn start_transaction(&self) -> DriverResult<Box<dyn Transaction>>;

    async fn execute_query(
        &self,
        tx: &mut dyn Transaction,
        sql: &str,
        on_header: &mut dyn FnMut(&[String]),
        on_row: &mut dyn FnMut(&[SqlValue]),
    ) -> DriverResult<()>;

    async fn execute_update(&self, tx: &mut dyn Transaction, sql: &str) -> DriverResult<u64>;
}

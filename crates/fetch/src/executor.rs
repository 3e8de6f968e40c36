// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The fetch executor (C9): runs a [`CompiledFetch`]'s statements
//! against a [`Driver`] in the order §4.9 fixes -- super queries, then
//! the anchor pre-statement, then every main branch, then the anchor
//! post-statement -- and folds the result sets back into the
//! `{recordTypeName, records?, referredRecords?, …super-properties?}`
//! shape the query specification surface returns.
//!
//! **Transaction ownership.** [`Driver::execute_query`]/[`execute_update`]
//! both take a `&mut dyn Transaction` unconditionally, so some
//! transaction handle is needed to run anything at all, regardless of
//! whether the fetch "wraps" one. The executor starts one itself only
//! when the caller didn't supply one; [`CompiledFetch::wraps_transaction`]
//! reports the `total_statements > 1` predicate the caller-visible
//! wrap decision is keyed on, but in this port that predicate does not
//! gate a second code path -- a self-started transaction is always
//! committed (or rolled back) when the fetch owns it, whether it ran
//! one statement or several, because the trait gives no other way to
//! close a transaction it opened. This divergence from the literal
//! prose is recorded in `DESIGN.md`.
//!
//! **Error handling.** Post-statements (anchor table cleanup) always
//! run, on both the success and the error path, best-effort: a
//! post-statement failure is logged and never replaces the first error
//! observed. A self-owned transaction rolls back on error and commits
//! on success; a caller-supplied transaction is never committed or
//! rolled back here -- that stays the caller's responsibility.

use serde_json::{Map, Value as Json};
use unified_fetch_driver::{Driver, Transaction};
use unified_fetch_record_schema::Schema;
use unified_fetch_translate::ParamsHandler;

use crate::compiler::{CompiledFetch, CompiledSuper, FetchCompiler};
use crate::error::{FetchError, FetchResult};
use crate::result_parser::{merge_branches, ResultSetParser, TreeResultParser};
use crate::spec::QuerySpec;

impl CompiledFetch {
    /// The caller-visible "did this fetch wrap a transaction" predicate
    /// (Testable property 7): true iff the executor is about to run
    /// more than one statement. Exposed for callers/tests that want to
    /// assert the wrap decision directly; the executor itself starts a
    /// transaction whenever the caller didn't supply one, regardless of
    /// this value, since every execution verb requires one.
    pub fn wraps_transaction(&self) -> bool {
        self.total_statements() > 1
    }
}

/// The assembled outcome of a fetch, ready to render as
/// `{recordTypeName, records?, referredRecords?, …super-properties?}`.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub record_type_name: String,
    pub records: Option<Vec<Json>>,
    pub referred_records: Option<Vec<Json>>,
    pub super_properties: Map<String, Json>,
}

impl FetchOutcome {
    /// Renders the flat top-level object the query specification
    /// surface promises: `recordTypeName` first, then `records`/
    /// `referredRecords` when present, then every super-property as its
    /// own sibling key (never nested under a `superProperties` wrapper).
    pub fn into_json(self) -> Json {
        let mut obj = Map::new();
        obj.insert("recordTypeName".to_string(), Json::String(self.record_type_name));
        if let Some(records) = self.records {
            obj.insert("records".to_string(), Json::Array(records));
        }
        if let Some(referred) = self.referred_records {
            obj.insert("referredRecords".to_string(), Json::Array(referred));
        }
        obj.extend(self.super_properties);
        Json::Object(obj)
    }
}

pub struct FetchExecutor;

impl FetchExecutor {
    /// Runs every statement `compiled` carries and reassembles its
    /// result sets, per the ordering and error-handling rules in this
    /// module's doc comment.
    pub async fn execute(
        driver: &dyn Driver,
        tx: Option<&mut dyn Transaction>,
        compiled: &CompiledFetch,
    ) -> FetchResult<FetchOutcome> {
        match tx {
            Some(tx) => Self::run_all(driver, tx, compiled).await,
            None => {
                let mut owned = driver.start_transaction().await?;
                let result = Self::run_all(driver, owned.as_mut(), compiled).await;
                match result {
                    Ok(outcome) => {
                        owned.commit().await?;
                        Ok(outcome)
                    }
                    Err(err) => {
                        if let Err(rollback_err) = owned.rollback().await {
                            tracing::warn!(error = %rollback_err, "rollback failed after a fetch error");
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// Runs super queries, the anchor pre-statement, every main branch,
    /// then the anchor post-statement -- always attempting the last
    /// step even if an earlier one failed, per §4.9's best-effort
    /// cleanup rule. Returns the first error observed, if any.
    async fn run_all(
        driver: &dyn Driver,
        tx: &mut dyn Transaction,
        compiled: &CompiledFetch,
    ) -> FetchResult<FetchOutcome> {
        let body = async {
            let mut super_properties = Map::new();
            let mut referred_records: Option<Vec<Json>> = None;
            for super_query in &compiled.super_queries {
                let rows = Self::run_select(driver, tx, &super_query.statement, &super_query.schema).await?;
                Self::fold_super_result(super_query, rows, &mut super_properties, &mut referred_records)?;
            }

            for pre in &compiled.pre_statements {
                Self::run_update(driver, tx, pre).await?;
            }

            let records = if compiled.super_only {
                None
            } else {
                let mut branch_results = Vec::with_capacity(compiled.main_queries.len());
                for branch in &compiled.main_queries {
                    branch_results.push(Self::run_select(driver, tx, &branch.statement, &branch.schema).await?);
                }
                Some(merge_branches(&compiled.id_field, branch_results)?)
            };

            Ok((records, referred_records, super_properties))
        };

        let outcome = body.await;

        for post in &compiled.post_statements {
            if let Err(err) = Self::run_update(driver, tx, post).await {
                tracing::warn!(error = %err, "post-statement cleanup failed");
            }
        }

        let (records, referred_records, super_properties) = outcome?;
        Ok(FetchOutcome {
            record_type_name: compiled.record_type_name.clone(),
            records,
            referred_records,
            super_properties,
        })
    }

    async fn run_select(
        driver: &dyn Driver,
        tx: &mut dyn Transaction,
        statement: &unified_fetch_sql_ir::Statement,
        schema: &crate::schema_plan::NodeSchema,
    ) -> FetchResult<Vec<Json>> {
        let sql = statement.render(driver);
        tracing::debug!(sql, "fetch executor: running select");

        let parser = std::cell::RefCell::new(TreeResultParser::new(schema.clone()));
        let mut on_header = |header: &[String]| parser.borrow_mut().on_header(header);
        let mut on_row = |row: &[unified_fetch_driver::SqlValue]| parser.borrow_mut().on_row(row);
        driver.execute_query(tx, &sql, &mut on_header, &mut on_row).await.map_err(FetchError::from)?;
        Box::new(parser.into_inner()).into_records()
    }

    async fn run_update(
        driver: &dyn Driver,
        tx: &mut dyn Transaction,
        statement: &unified_fetch_sql_ir::Statement,
    ) -> FetchResult<()> {
        let sql = statement.render(driver);
        tracing::debug!(sql, "fetch executor: running statement");
        driver.execute_update(tx, &sql).await.map_err(FetchError::from)?;
        Ok(())
    }

    /// Folds one super query's reconstructed rows into the running
    /// `super_properties`/`referred_records` accumulators. A `records`-
    /// axis branch (see [`CompiledSuper::is_records`]) yields exactly
    /// one wrapper object whose own `records` field is the actual
    /// array of references; every other branch yields exactly one
    /// object whose fields are merged directly as named super-properties.
    fn fold_super_result(
        super_query: &CompiledSuper,
        rows: Vec<Json>,
        super_properties: &mut Map<String, Json>,
        referred_records: &mut Option<Vec<Json>>,
    ) -> FetchResult<()> {
        let Json::Object(mut fields) = rows.into_iter().next().unwrap_or(Json::Object(Map::new())) else {
            return Err(FetchError::Internal("super query produced a non-object row".to_string()));
        };

        if super_query.is_records {
            let records = fields
                .remove("records")
                .and_then(|v| if let Json::Array(items) = v { Some(items) } else { None })
                .unwrap_or_default();
            referred_records.get_or_insert_with(Vec::new).extend(records);
        } else {
            super_properties.extend(fields);
        }

        Ok(())
    }
}

/// Compiles and runs a fetch in one call -- the engine's outward entry
/// point, matching the query specification surface's
/// `fetch(schema, recordTypeName, spec, params)` signature.
pub async fn fetch(
    schema: &Schema,
    record_type_name: &str,
    spec: QuerySpec,
    params: &dyn ParamsHandler,
    driver: &dyn Driver,
    tx: Option<&mut dyn Transaction>,
) -> FetchResult<FetchOutcome> {
    let compiled = FetchCompiler::compile(schema, driver, record_type_name, &spec, params)?;
    FetchExecutor::execute(driver, tx, &compiled).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use unified_fetch_driver::{DriverError, PostgresLikeDriver, SqlValue};
    use unified_fetch_record_schema::{Cardinality, PropertyDesc, SchemaBuilder, StorageHint, ValueKind};
    use unified_fetch_translate::MapParamsHandler;

    use super::*;

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Customer",
                "customers",
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("name".into())),
                ],
            )
            .unwrap();
        builder.finalize().unwrap()
    }

    /// A scripted transaction: each `execute_query` call hands back the
    /// next queued `(header, rows)` pair regardless of the SQL text,
    /// in call order -- enough to drive the executor's folding logic
    /// without a real connection.
    struct ScriptedTransaction;

    #[async_trait]
    impl Transaction for ScriptedTransaction {
        async fn commit(self: Box<Self>) -> unified_fetch_driver::DriverResult<()> {
            Ok(())
        }
        async fn rollback(self: Box<Self>) -> unified_fetch_driver::DriverResult<()> {
            Ok(())
        }
    }

    struct ScriptedDriver {
        inner: PostgresLikeDriver,
        rows: Mutex<Vec<(Vec<String>, Vec<Vec<SqlValue>>)>>,
        fail_next: Mutex<bool>,
        update_calls: Mutex<u32>,
    }

    #[async_trait]
    impl Driver for ScriptedDriver {
        fn sql_literal(&self, v: &unified_fetch_value_expr::Literal) -> Option<String> {
            self.inner.sql_literal(v)
        }
        fn boolean_literal(&self, b: bool) -> String {
            self.inner.boolean_literal(b)
        }
        fn string_literal(&self, s: &str) -> String {
            self.inner.string_literal(s)
        }
        fn safe_label(&self, s: &str) -> String {
            self.inner.safe_label(s)
        }
        fn safe_like_pattern_from_string(&self, s: &str, w: unified_fetch_driver::driver::LikeWildcard) -> String {
            self.inner.safe_like_pattern_from_string(s, w)
        }
        fn safe_like_pattern_from_expr(&self, e: &str, w: unified_fetch_driver::driver::LikeWildcard) -> String {
            self.inner.safe_like_pattern_from_expr(e, w)
        }
        fn pattern_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
            self.inner.pattern_match(expr, pattern, invert, case_sensitive)
        }
        fn regexp_match(&self, expr: &str, pattern: &str, invert: bool, case_sensitive: bool) -> String {
            self.inner.regexp_match(expr, pattern, invert, case_sensitive)
        }
        fn string_length(&self, e: &str) -> String {
            self.inner.string_length(e)
        }
        fn string_lowercase(&self, e: &str) -> String {
            self.inner.string_lowercase(e)
        }
        fn string_uppercase(&self, e: &str) -> String {
            self.inner.string_uppercase(e)
        }
        fn string_left_pad(&self, e: &str, len: u32, pad: &str) -> String {
            self.inner.string_left_pad(e, len, pad)
        }
        fn string_substring(&self, e: &str, from: u32, len: Option<u32>) -> String {
            self.inner.string_substring(e, from, len)
        }
        fn nullable_concat(&self, parts: &[&str]) -> String {
            self.inner.nullable_concat(parts)
        }
        fn cast_to_string(&self, e: &str) -> String {
            self.inner.cast_to_string(e)
        }
        fn boolean_to_null(&self, e: &str) -> String {
            self.inner.boolean_to_null(e)
        }
        fn coalesce(&self, parts: &[&str]) -> String {
            self.inner.coalesce(parts)
        }
        fn make_ranged_select(&self, sql: &str, offset: u64, limit: u64) -> String {
            self.inner.make_ranged_select(sql, offset, limit)
        }
        fn make_select_into_temp_table(&self, sql: &str, temp_name: &str) -> (String, String) {
            self.inner.make_select_into_temp_table(sql, temp_name)
        }

        async fn start_transaction(&self) -> unified_fetch_driver::DriverResult<Box<dyn Transaction>> {
            Ok(Box::new(ScriptedTransaction))
        }

        async fn execute_query(
            &self,
            _tx: &mut dyn Transaction,
            _sql: &str,
            on_header: &mut dyn FnMut(&[String]),
            on_row: &mut dyn FnMut(&[SqlValue]),
        ) -> unified_fetch_driver::DriverResult<()> {
            if *self.fail_next.lock().unwrap() {
                return Err(DriverError::QueryFailed("scripted failure".to_string()));
            }
            let (header, rows) = self.rows.lock().unwrap().remove(0);
            on_header(&header);
            for row in &rows {
                on_row(row);
            }
            Ok(())
        }

        async fn execute_update(&self, _tx: &mut dyn Transaction, _sql: &str) -> unified_fetch_driver::DriverResult<u64> {
            *self.update_calls.lock().unwrap() += 1;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn fetches_simple_scalar_records() {
        let schema = schema();
        let driver = ScriptedDriver {
            inner: PostgresLikeDriver,
            rows: Mutex::new(vec![(
                vec!["id".to_string(), "a$name".to_string()],
                vec![
                    vec![SqlValue::Int(1), SqlValue::Str("Al".into())],
                    vec![SqlValue::Int(2), SqlValue::Str("Bo".into())],
                ],
            )]),
            fail_next: Mutex::new(false),
            update_calls: Mutex::new(0),
        };
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new();

        let outcome = fetch(&schema, "Customer", spec, &params, &driver, None).await.unwrap();
        assert_eq!(outcome.record_type_name, "Customer");
        let records = outcome.records.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], Json::String("Al".to_string()));
    }

    #[tokio::test]
    async fn wraps_transaction_only_for_multi_statement_fetches() {
        let schema = schema();
        let driver = ScriptedDriver {
            inner: PostgresLikeDriver,
            rows: Mutex::new(vec![(
                vec!["id".to_string(), "a$name".to_string()],
                vec![vec![SqlValue::Int(1), SqlValue::Str("Al".into())]],
            )]),
            fail_next: Mutex::new(false),
            update_calls: Mutex::new(0),
        };
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new();

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.total_statements(), 1);
        assert!(!compiled.wraps_transaction());
    }

    fn schema_with_tags() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Customer",
                "customers",
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("name".into())),
                    PropertyDesc::new("tags", ValueKind::String, Cardinality::Array).with_storage(
                        StorageHint::Table {
                            table: "customer_tags".into(),
                            parent_id_column: "customer_id".into(),
                            key_column: Some("value".into()),
                            index_column: None,
                        },
                    ),
                ],
            )
            .unwrap();
        builder.finalize().unwrap()
    }

    /// A query over multiple debranched axes with a range compiles to
    /// an anchor pre-statement, one SELECT per axis, and an anchor
    /// post-statement. When the first axis's SELECT fails, the post-
    /// statement (temp-table cleanup) must still run.
    #[tokio::test]
    async fn driver_error_still_runs_post_statements() {
        let schema = schema_with_tags();
        let driver = ScriptedDriver {
            inner: PostgresLikeDriver,
            rows: Mutex::new(vec![(vec!["id".to_string()], vec![vec![SqlValue::Int(1)]])]),
            fail_next: Mutex::new(true),
            update_calls: Mutex::new(0),
        };
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new().with_props(vec!["*".to_string(), "tags".to_string()]).with_range(0, 5);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.pre_statements.len(), 1);
        assert_eq!(compiled.post_statements.len(), 1);
        assert!(compiled.wraps_transaction());

        let result = fetch(&schema, "Customer", spec, &params, &driver, None).await;
        assert!(result.is_err());
        // one update for the anchor CREATE, one for the anchor DROP, even
        // though the main SELECT that ran in between failed.
        assert_eq!(*driver.update_calls.lock().unwrap(), 2);
    }
}

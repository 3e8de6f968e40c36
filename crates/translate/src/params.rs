// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Resolving `param("name")` references against the caller's bound
//! values, formatted through the active driver's literal encoders.
//!
//! `null`/`NaN`/missing values are a usage error rather than silently
//! rendering as SQL `NULL` or `0` -- the caller asked for a value that
//! was never bound, and guessing at its meaning would hide the bug.

use std::collections::HashMap;

use unified_fetch_driver::{Driver, SqlValue};

use crate::error::{TranslateError, TranslateResult};

/// Resolves a bound parameter name to its rendered SQL text.
pub trait ParamsHandler {
    fn resolve(&self, name: &str, driver: &dyn Driver) -> TranslateResult<String>;
}

/// The reference [`ParamsHandler`]: a flat `name -> value` map, as handed
/// in by a fetch call's `params` argument.
#[derive(Debug, Clone, Default)]
pub struct MapParamsHandler {
    values: HashMap<String, SqlValue>,
}

impl MapParamsHandler {
    pub fn new(values: HashMap<String, SqlValue>) -> Self {
        Self { values }
    }
}

impl ParamsHandler for MapParamsHandler {
    fn resolve(&self, name: &str, driver: &dyn Driver) -> TranslateResult<String> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| TranslateError::MissingParam(name.to_string()))?;
        render_sql_value(name, value, driver)
    }
}

/// Renders a bound value as SQL text. Arrays expand into a
/// comma-separated literal list, per the `param("name")` binding rules --
/// the caller (an `IN (...)` predicate, typically) supplies the
/// surrounding parens itself.
fn render_sql_value(name: &str, value: &SqlValue, driver: &dyn Driver) -> TranslateResult<String> {
    match value {
        SqlValue::Null => Err(TranslateError::NullParam(name.to_string())),
        SqlValue::Bool(b) => Ok(driver.boolean_literal(*b)),
        SqlValue::Int(i) => Ok(i.to_string()),
        SqlValue::Float(f) => {
            if f.is_nan() {
                Err(TranslateError::NanParam(name.to_string()))
            } else {
                Ok(f.to_string())
            }
        }
        SqlValue::Str(s) => Ok(driver.string_literal(s)),
        SqlValue::DateTime(s) => Ok(driver.string_literal(s)),
        SqlValue::Array(items) => {
            let rendered: TranslateResult<Vec<String>> =
                items.iter().map(|item| render_sql_value(name, item, driver)).collect();
            Ok(rendered?.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use unified_fetch_driver::PostgresLikeDriver;

    use super::*;

    #[test]
    fn resolves_string_and_int_params() {
        let mut values = HashMap::new();
        values.insert("name".to_string(), SqlValue::Str("Al".to_string()));
        values.insert("age".to_string(), SqlValue::Int(5));
        let handler = MapParamsHandler::new(values);
        let driver = PostgresLikeDriver;
        assert_eq!(handler.resolve("name", &driver).unwrap(), "'Al'");
        assert_eq!(handler.resolve("age", &driver).unwrap(), "5");
    }

    #[test]
    fn missing_param_is_an_error() {
        let handler = MapParamsHandler::new(HashMap::new());
        let driver = PostgresLikeDriver;
        assert!(matches!(
            handler.resolve("nope", &driver).unwrap_err(),
            TranslateError::MissingParam(name) if name == "nope"
        ));
    }

    #[test]
    fn null_param_is_an_error() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), SqlValue::Null);
        let handler = MapParamsHandler::new(values);
        let driver = PostgresLikeDriver;
        assert!(matches!(handler.resolve("x", &driver).unwrap_err(), TranslateError::NullParam(_)));
    }

    #[test]
    fn nan_param_is_an_error() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), SqlValue::Float(f64::NAN));
        let handler = MapParamsHandler::new(values);
        let driver = PostgresLikeDriver;
        assert!(matches!(handler.resolve("x", &driver).unwrap_err(), TranslateError::NanParam(_)));
    }

    #[test]
    fn array_param_expands_to_comma_separated_list() {
        let mut values = HashMap::new();
        values.insert(
            "ids".to_string(),
            SqlValue::Array(vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]),
        );
        let handler = MapParamsHandler::new(values);
        let driver = PostgresLikeDriver;
        assert_eq!(handler.resolve("ids", &driver).unwrap(), "1, 2, 3");
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The `fetch(schema, recordTypeName, { props, filter, order, range }, params)`
//! call surface: parses the JSON-ish query specification into the
//! typed pieces [`crate::compiler::FetchCompiler`] compiles from.

use serde_json::Value as Json;

use crate::error::{FetchError, FetchResult, SpecSyntaxError};

/// A parsed query specification, ready to compile against a schema.
///
/// `props` defaults to `["*"]` when omitted, per §6 of the query
/// specification surface. A pattern beginning with `.` names a
/// super-type property rather than a record property; a `props` list
/// made up entirely of such patterns skips record fetching and returns
/// only the requested super-properties.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub props: Vec<String>,
    pub filter: Option<Json>,
    pub order: Vec<String>,
    pub range: Option<(u64, u64)>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self { props: vec!["*".to_string()], filter: None, order: Vec::new(), range: None }
    }

    pub fn with_props(mut self, props: Vec<String>) -> Self {
        self.props = props;
        self
    }

    pub fn with_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn with_range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some((offset, limit));
        self
    }

    /// Parses a `{props?, filter?, order?, range?}` JSON object in the
    /// shape a fetch caller sends over the wire.
    pub fn from_json(raw: &Json) -> FetchResult<QuerySpec> {
        let obj = raw.as_object().ok_or_else(|| {
            FetchError::Syntax(SpecSyntaxError::InvalidPattern("query spec must be a JSON object".to_string()))
        })?;

        let props = match obj.get("props") {
            None => vec!["*".to_string()],
            Some(Json::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        FetchError::Syntax(SpecSyntaxError::InvalidPattern("'props' entries must be strings".to_string()))
                    })
                })
                .collect::<FetchResult<Vec<_>>>()?,
            Some(_) => {
                return Err(FetchError::Syntax(SpecSyntaxError::InvalidPattern(
                    "'props' must be an array of strings".to_string(),
                )));
            }
        };

        let filter = obj.get("filter").cloned();

        let order = match obj.get("order") {
            None => Vec::new(),
            Some(Json::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        FetchError::Syntax(SpecSyntaxError::InvalidPattern("'order' entries must be strings".to_string()))
                    })
                })
                .collect::<FetchResult<Vec<_>>>()?,
            Some(_) => {
                return Err(FetchError::Syntax(SpecSyntaxError::InvalidPattern(
                    "'order' must be an array of strings".to_string(),
                )));
            }
        };

        let range = match obj.get("range") {
            None => None,
            Some(Json::Array(items)) if items.len() == 2 => {
                let offset = items[0].as_u64().ok_or_else(|| {
                    FetchError::Syntax(SpecSyntaxError::InvalidRange("range offset must be a non-negative integer".to_string()))
                })?;
                let limit = items[1].as_u64().ok_or_else(|| {
                    FetchError::Syntax(SpecSyntaxError::InvalidRange("range limit must be a non-negative integer".to_string()))
                })?;
                Some((offset, limit))
            }
            Some(_) => {
                return Err(FetchError::Syntax(SpecSyntaxError::InvalidRange(
                    "'range' must be a two-element [offset, limit] array".to_string(),
                )));
            }
        };

        Ok(QuerySpec { props, filter, order, range })
    }

    /// Splits `props` into record-level property patterns and
    /// super-type property names (the `.`-prefixed entries, with the
    /// prefix stripped).
    pub fn split_props(&self) -> (Vec<String>, Vec<String>) {
        let mut record_props = Vec::new();
        let mut super_props = Vec::new();
        for p in &self.props {
            match p.strip_prefix('.') {
                Some(rest) => super_props.push(rest.to_string()),
                None => record_props.push(p.clone()),
            }
        }
        (record_props, super_props)
    }

    /// True if every requested prop is a super-property reference, so
    /// record fetching can be skipped entirely.
    pub fn is_super_only(&self) -> bool {
        !self.props.is_empty() && self.props.iter().all(|p| p.starts_with('.'))
    }
}

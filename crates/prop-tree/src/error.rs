// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while expanding a pattern list against a schema into a
//! property tree.

use thiserror::Error;
use unified_fetch_query_filter::FilterError;
use unified_fetch_record_schema::SchemaError;
use unified_fetch_value_expr::ExprError;

pub type PropTreeResult<T> = Result<T, PropTreeError>;

#[derive(Debug, Error)]
pub enum PropTreeError {
    #[error("'{path}' does not resolve to a property reachable from this record type")]
    InvalidPath { path: String },

    #[error("'{path}' names a container; wildcards may not be used here")]
    WildcardNotAllowed { path: String },

    #[error("'{path}' is calculated and may not be requested under this clause")]
    CalculatedNotAllowed { path: String },

    #[error("'{path}' is an aggregate and may not be requested under this clause")]
    AggregateNotAllowed { path: String },

    #[error("'{path}' carries a scoped filter, which is not allowed under scopePath")]
    ScopedFilterNotAllowed { path: String },

    #[error("'{path}' names a leaf object property with no further path to select")]
    LeafObjectNotAllowed { path: String },

    #[error("'{path}' lies on a different collection axis than the scope path '{scope_path}'")]
    AxisViolation { path: String, scope_path: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while parsing or validating filter/order/range specs.

use thiserror::Error;
use unified_fetch_value_expr::ExprError;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid predicate '{text}': {reason}")]
    InvalidPredicate { text: String, reason: String },

    #[error(
        "'|' is no longer accepted as the predicate separator in '{text}'; use '=>' instead"
    )]
    LegacySeparator { text: String },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{op}' expects {expected}, got {got} argument(s)")]
    ArityMismatch {
        op: String,
        expected: String,
        got: usize,
    },

    #[error("range limit must be greater than zero")]
    InvalidRange,

    #[error(transparent)]
    Expr(#[from] ExprError),
}

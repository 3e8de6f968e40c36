// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The umbrella error type a fetch call can fail with, plus the two
//! spec-facing classifications (`SpecSyntaxError`, `UsageError`) that
//! the lower crates' errors get sorted into.
//!
//! Schema/syntax/usage errors all abort compilation before any
//! statement runs; only [`FetchError::Driver`] can happen mid-execution,
//! which is what the executor's post-statement/rollback handling keys
//! off of.

use thiserror::Error;
use unified_fetch_driver::DriverError;
use unified_fetch_prop_tree::PropTreeError;
use unified_fetch_query_filter::FilterError;
use unified_fetch_query_tree::QueryTreeError;
use unified_fetch_record_schema::SchemaError;
use unified_fetch_value_expr::ExprError;

pub type FetchResult<T> = Result<T, FetchError>;

/// A malformed spec string: a pattern, predicate, or order element that
/// does not parse, independent of whether it would resolve against any
/// particular schema.
#[derive(Debug, Error)]
pub enum SpecSyntaxError {
    #[error("malformed property pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("{0}")]
    LegacySeparator(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("operator arity mismatch: {0}")]
    ArityMismatch(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),
}

/// A request that parses fine but is semantically invalid against the
/// schema it is run against: an unknown record type or property, a
/// forbidden wildcard/calculated/aggregate reference, a scope
/// violation, or a missing/null/NaN bound parameter.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("unknown record type '{0}'")]
    UnknownRecordType(String),

    #[error("wildcard not allowed here: {0}")]
    WildcardNotAllowed(String),

    #[error("calculated property not allowed here: {0}")]
    CalculatedNotAllowed(String),

    #[error("aggregate property not allowed here: {0}")]
    AggregateNotAllowed(String),

    #[error("scoped filter not allowed here: {0}")]
    ScopedFilterNotAllowed(String),

    #[error("leaf object property not allowed here: {0}")]
    LeafObjectNotAllowed(String),

    #[error("collection axis violation: {0}")]
    AxisViolation(String),

    #[error("parameter '{0}' was not supplied")]
    MissingParam(String),

    #[error("parameter '{0}' is null, which is not a valid bound value")]
    NullParam(String),

    #[error("parameter '{0}' is NaN, which is not a valid bound value")]
    NanParam(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Syntax(#[from] SpecSyntaxError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl From<ExprError> for FetchError {
    fn from(e: ExprError) -> Self {
        match e {
            ExprError::InvalidReference { .. } => FetchError::Usage(UsageError::InvalidReference(e.to_string())),
            ExprError::NotAContainer(_) => FetchError::Syntax(SpecSyntaxError::InvalidPattern(e.to_string())),
        }
    }
}

impl From<FilterError> for FetchError {
    fn from(e: FilterError) -> Self {
        match e {
            FilterError::InvalidPredicate { .. } => FetchError::Syntax(SpecSyntaxError::InvalidPredicate(e.to_string())),
            FilterError::LegacySeparator { .. } => FetchError::Syntax(SpecSyntaxError::LegacySeparator(e.to_string())),
            FilterError::UnknownOperator(_) => FetchError::Syntax(SpecSyntaxError::UnknownOperator(e.to_string())),
            FilterError::ArityMismatch { .. } => FetchError::Syntax(SpecSyntaxError::ArityMismatch(e.to_string())),
            FilterError::InvalidRange => FetchError::Syntax(SpecSyntaxError::InvalidRange(e.to_string())),
            FilterError::Expr(inner) => inner.into(),
        }
    }
}

impl From<PropTreeError> for FetchError {
    fn from(e: PropTreeError) -> Self {
        match e {
            PropTreeError::InvalidPath { .. } => FetchError::Usage(UsageError::UnknownRecordType(e.to_string())),
            PropTreeError::WildcardNotAllowed { .. } => FetchError::Usage(UsageError::WildcardNotAllowed(e.to_string())),
            PropTreeError::CalculatedNotAllowed { .. } => {
                FetchError::Usage(UsageError::CalculatedNotAllowed(e.to_string()))
            }
            PropTreeError::AggregateNotAllowed { .. } => {
                FetchError::Usage(UsageError::AggregateNotAllowed(e.to_string()))
            }
            PropTreeError::ScopedFilterNotAllowed { .. } => {
                FetchError::Usage(UsageError::ScopedFilterNotAllowed(e.to_string()))
            }
            PropTreeError::LeafObjectNotAllowed { .. } => {
                FetchError::Usage(UsageError::LeafObjectNotAllowed(e.to_string()))
            }
            PropTreeError::AxisViolation { .. } => FetchError::Usage(UsageError::AxisViolation(e.to_string())),
            PropTreeError::Schema(inner) => FetchError::Schema(inner),
            PropTreeError::Expr(inner) => inner.into(),
            PropTreeError::Filter(inner) => inner.into(),
        }
    }
}

impl From<QueryTreeError> for FetchError {
    fn from(e: QueryTreeError) -> Self {
        FetchError::Internal(e.to_string())
    }
}

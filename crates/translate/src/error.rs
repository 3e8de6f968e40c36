// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while resolving bound parameters or rendering a
//! collection existence test against a query tree.

use thiserror::Error;
use unified_fetch_prop_tree::PropTreeError;
use unified_fetch_query_tree::QueryTreeError;

pub type TranslateResult<T> = Result<T, TranslateError>;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("parameter '{0}' was not supplied")]
    MissingParam(String),

    #[error("parameter '{0}' is null, which is not a valid bound value")]
    NullParam(String),

    #[error("parameter '{0}' is NaN, which is not a valid bound value")]
    NanParam(String),

    #[error("path '{0}' has no column binding in this query tree")]
    UnboundPath(String),

    #[error(transparent)]
    PropTree(#[from] PropTreeError),

    #[error(transparent)]
    QueryTree(#[from] QueryTreeError),
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while turning a debranched property tree into a query tree.

use thiserror::Error;

/// Result type alias for query-tree construction.
pub type QueryTreeResult<T> = Result<T, QueryTreeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryTreeError {
    /// A property's cardinality/kind/storage combination has no mapping
    /// in the jump table -- a schema invariant was supposed to rule this
    /// out before it got here.
    #[error("no query-tree mapping for property '{0}': {1}")]
    UnsupportedShape(String, String),

    /// A reverse-reference property's target property could not be
    /// resolved on the target record type, even though schema
    /// finalization is supposed to guarantee it exists.
    #[error("reverse reference '{0}' has no matching property on its target type")]
    DanglingReverseReference(String),

    /// Debranching, alias assignment, or tree-combining invariant
    /// violation. Never expected to escape; indicates a bug upstream.
    #[error("internal error building query tree: {0}")]
    Internal(String),
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Translation Context
//!
//! The seam between a compiled [`unified_fetch_query_tree::QueryTree`]
//! and the filter/order/value-expression trees that render against it:
//! [`context::QueryContext`] resolves property paths through the tree's
//! `path -> SQL` map, bound parameters through a [`params::ParamsHandler`],
//! and collection existence tests by re-entering the property-tree and
//! query-tree builders for a fresh `EXISTS` subquery scoped to that one
//! collection axis.

pub mod context;
pub mod error;
pub mod params;

pub use context::QueryContext;
pub use error::{TranslateError, TranslateResult};
pub use params::{MapParamsHandler, ParamsHandler};

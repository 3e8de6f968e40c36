// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Filter, Order & Range
//!
//! The declarative predicate-array grammar from the fetch query
//! specification compiles here into a [`filter::Filter`] tree — a
//! tagged enum of `Junction | ValueTest | CollectionTest` — alongside
//! [`order::Order`] and [`range::Range`]. Every leaf expression is a
//! [`unified_fetch_value_expr::ValueExpression`], so this crate only
//! adds predicate structure on top of that crate's path resolution.
//!
//! Schema-awareness needed to tell a scalar path from a collection one
//! (for the bare `"<collection> => empty"` existence-test shorthand)
//! is injected through [`filter::CollectionResolver`], the same
//! dependency-injection seam `value-expr` uses for container checks.
//!
//! [`render::FilterTranslationCtx`] extends `value-expr`'s
//! `TranslationCtx` with the one further seam rendering needs: turning
//! a `CollectionTest` into an `EXISTS` subquery, which this crate has
//! no way to build on its own.

pub mod error;
pub mod filter;
pub mod op;
pub mod order;
pub mod param;
pub mod range;
pub mod render;

pub use error::{FilterError, FilterResult};
pub use filter::{needs_paren, parse_filter, CollectionResolver, Filter, JunctionKind, NoCollections};
pub use op::{Arity, Op};
pub use order::{parse_order, parse_order_element, Order, OrderElement};
pub use param::Param;
pub use range::Range;
pub use render::FilterTranslationCtx;

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Value Expressions
//!
//! Path-based scalar expressions and the contexts used to resolve them.
//!
//! A [`context::ExprContext`] pairs a base path with the chain of
//! containers walked from the schema root to reach it, so a reference
//! like `^.^.name` can be normalized into an absolute property path
//! without the caller tracking ancestry itself. [`expr::compile`] parses
//! an expression's text form against such a context, producing an
//! [`expr::ValueExpression`] whose every leaf is already an absolute
//! path; [`expr::TranslationCtx`] is the seam downstream crates use to
//! turn that tree into SQL.
//!
//! This crate knows nothing about any concrete schema representation —
//! schema-awareness is injected through [`context::ContainerResolver`],
//! so it can be reused unchanged by both the property-tree builder and
//! the filter grammar.

pub mod context;
pub mod error;
pub mod expr;

pub use context::{ContainerResolver, ExprContext, PermissiveResolver};
pub use error::{ExprError, ExprResult};
pub use expr::{compile, Expr, Literal, TranslationCtx, ValueExpression};

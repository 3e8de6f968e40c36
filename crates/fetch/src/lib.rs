// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Fetch Compiler and Executor
//!
//! The outward entry point of the record-fetch query compiler: parses
//! a `{props, filter?, order?, range?}` query specification
//! ([`spec::QuerySpec`]), compiles it against a schema into an ordered
//! statement list ([`compiler::FetchCompiler`]), and runs that list
//! against a [`unified_fetch_driver::Driver`]
//! ([`executor::FetchExecutor`]), folding the result sets back into
//! the `{recordTypeName, records?, referredRecords?, …super-properties?}`
//! shape callers expect.
//!
//! [`fetch()`] wires the two halves together for the common case of
//! "compile and run in one call"; callers that want to compile once
//! and run several times (e.g. against different transactions) can
//! call [`compiler::FetchCompiler::compile`] and
//! [`executor::FetchExecutor::execute`] directly.

pub mod compiler;
pub mod error;
pub mod executor;
pub mod result_parser;
pub mod schema_plan;
pub mod spec;

pub use compiler::{CompiledBranch, CompiledFetch, CompiledSuper, FetchCompiler};
pub use error::{FetchError, FetchResult, SpecSyntaxError, UsageError};
pub use executor::{fetch, FetchExecutor, FetchOutcome};
pub use result_parser::{merge_branches, ResultSetParser, TreeResultParser};
pub use schema_plan::NodeSchema;
pub use spec::QuerySpec;

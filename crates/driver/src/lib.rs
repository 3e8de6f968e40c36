// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Database Driver Port
//!
//! This crate defines the [`Driver`] trait the query compiler and
//! executor render SQL and run statements against, plus two reference
//! implementations (MySQL-family and PostgreSQL-family) that exercise
//! the rendering paths without owning a real connection.
//!
//! A `Driver` abstracts every dialect-sensitive fragment a fetch needs:
//! literal and pattern encoding, string functions, `LIMIT`/`OFFSET`
//! syntax, temp-table syntax, and the four verbs (`start_transaction`,
//! `execute_query`, `execute_update`) needed to actually run a
//! compiled fetch. Real deployments implement it against a live
//! connection pool; this crate never does network I/O itself.

pub mod driver;
pub mod error;
pub mod mysql_like;
pub mod postgres_like;
pub mod transaction;
pub mod value;

pub use driver::{Driver, LikeWildcard};
pub use error::{DriverError, DriverResult};
pub use mysql_like::MySqlLikeDriver;
pub use postgres_like::PostgresLikeDriver;
pub use transaction::Transaction;
pub use value::SqlValue;

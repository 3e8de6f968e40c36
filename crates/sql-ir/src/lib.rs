// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — SQL Statement IR
//!
//! A dialect-agnostic SELECT-statement representation: the query tree
//! builder assembles [`statement::SelectStatement`]s (and, for anchored
//! fetches, the [`statement::Statement::CreateTempTableAs`]/
//! [`statement::Statement::DropTempTable`] pair) from already-translated
//! expression text, and [`statement::Statement::render`] turns the
//! result into SQL through a [`unified_fetch_driver::Driver`].
//!
//! There is no `INSERT`/`UPDATE`/`DELETE` statement here — those belong
//! to a sibling write-path system this crate never builds.

pub mod statement;

pub use statement::{
    Join, JoinType, OrderBy, SelectItem, SelectStatement, SortDirection, Statement, TableRef,
};

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! A transaction handle returned by [`crate::Driver::start_transaction`].

use crate::error::DriverResult;

/// An open transaction. Statements are submitted against it through
/// [`crate::Driver::execute_query`]/[`crate::Driver::execute_update`];
/// the handle itself only knows how to end.
#[async_trait::async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> DriverResult<()>;
    async fn rollback(self: Box<Self>) -> DriverResult<()>;
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while executing statements through a [`crate::Driver`].

use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("failed to start transaction: {0}")]
    TransactionStartFailed(String),

    #[error("failed to commit transaction: {0}")]
    CommitFailed(String),

    #[error("failed to roll back transaction: {0}")]
    RollbackFailed(String),

    #[error("query execution failed: {0}")]
    QueryFailed(String),

    #[error("update execution failed: {0}")]
    UpdateFailed(String),

    #[error("feature not supported by this driver: {0}")]
    NotSupported(String),
}

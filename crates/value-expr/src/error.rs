// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while resolving or compiling value expressions.

use thiserror::Error;

pub type ExprResult<T> = Result<T, ExprError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("cannot resolve '{0}': no intervening segment is a container")]
    NotAContainer(String),
}

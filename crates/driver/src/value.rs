// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The wire-level value type rows are decoded into, and the parameter
//! value type callers bind `param("name")` placeholders to.

use std::fmt;

/// A single column value as handed back from [`crate::Driver::execute_query`]
/// or bound as a fetch parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(String),
    /// Bound as a parameter for `IN (...)`-shaped predicates; never
    /// produced by `execute_query`, which always yields scalar rows.
    Array(Vec<SqlValue>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(n) => write!(f, "{n}"),
            SqlValue::Str(s) => write!(f, "{s}"),
            SqlValue::DateTime(s) => write!(f, "{s}"),
            SqlValue::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

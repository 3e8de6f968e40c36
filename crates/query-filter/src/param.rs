// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Filter-predicate argument values.

use unified_fetch_value_expr::{Literal, ValueExpression};

/// An argument to a `ValueTest`: a compile-time literal, a
/// `param("name")` placeholder resolved at execution time, or an
/// `expr("...")` sub-expression compiled alongside the predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Literal(Literal),
    Ref(String),
    Expr(ValueExpression),
}

impl Param {
    pub fn from_json(value: &serde_json::Value) -> Option<Param> {
        match value {
            serde_json::Value::Null => Some(Param::Literal(Literal::Null)),
            serde_json::Value::Bool(b) => Some(Param::Literal(Literal::Bool(*b))),
            serde_json::Value::Number(n) => n.as_f64().map(|n| Param::Literal(Literal::Number(n))),
            serde_json::Value::String(s) => Some(Param::Literal(Literal::Str(s.clone()))),
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(name)) = map.get("param") {
                    return Some(Param::Ref(name.clone()));
                }
                None
            }
            serde_json::Value::Array(_) => None,
        }
    }

    pub fn rebase(&self, base_path: &str) -> Param {
        match self {
            Param::Expr(expr) => Param::Expr(expr.rebase(base_path)),
            other => other.clone(),
        }
    }
}

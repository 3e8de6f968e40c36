// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Value-test operators and their textual aliases.

use crate::error::{FilterError, FilterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Between,
    Contains,
    ContainsI,
    Starts,
    StartsI,
    Matches,
    MatchesI,
    Empty,
}

impl Op {
    /// How many parameters this operator's rendering needs.
    pub fn arity(self) -> Arity {
        match self {
            Op::Empty => Arity::Exact(0),
            Op::In => Arity::AtLeast(1),
            Op::Between => Arity::Exact(2),
            _ => Arity::Exact(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }

    pub fn describe(self) -> String {
        match self {
            Arity::Exact(k) => format!("exactly {k}"),
            Arity::AtLeast(k) => format!("at least {k}"),
        }
    }
}

/// Resolves an operator token (possibly alias-spelled, possibly
/// `!`-prefixed) to a canonical `(Op, invert)` pair. `!in`/`!oneof`
/// and `present` are alias spellings that already carry an implied
/// inversion; a literal leading `!` on any other alias toggles it
/// again.
pub fn resolve_op_alias(op_text: &str) -> FilterResult<(Op, bool)> {
    let (stripped, prefix_invert) = match op_text.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (op_text, false),
    };
    let (op, alias_invert) = match stripped {
        "eq" | "is" => (Op::Eq, false),
        "ne" => (Op::Ne, false),
        "lt" => (Op::Lt, false),
        "le" => (Op::Le, false),
        "gt" => (Op::Gt, false),
        "ge" | "min" => (Op::Ge, false),
        "in" | "oneof" => (Op::In, false),
        "between" => (Op::Between, false),
        "contains" => (Op::Contains, false),
        "containsi" | "substring" => (Op::ContainsI, false),
        "starts" => (Op::Starts, false),
        "startsi" => (Op::StartsI, false),
        "matches" => (Op::Matches, false),
        "matchesi" | "re" => (Op::MatchesI, false),
        "empty" => (Op::Empty, false),
        "present" => (Op::Empty, true),
        other => return Err(FilterError::UnknownOperator(other.to_string())),
    };
    Ok((op, prefix_invert ^ alias_invert))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_aliases_to_eq() {
        assert_eq!(resolve_op_alias("is").unwrap(), (Op::Eq, false));
    }

    #[test]
    fn min_aliases_to_ge() {
        assert_eq!(resolve_op_alias("min").unwrap(), (Op::Ge, false));
    }

    #[test]
    fn bang_in_and_oneof_are_equivalent() {
        assert_eq!(resolve_op_alias("!in").unwrap(), (Op::In, true));
        assert_eq!(resolve_op_alias("!oneof").unwrap(), (Op::In, true));
    }

    #[test]
    fn present_is_inverted_empty() {
        assert_eq!(resolve_op_alias("present").unwrap(), (Op::Empty, true));
    }

    #[test]
    fn substring_aliases_to_containsi() {
        assert_eq!(resolve_op_alias("substring").unwrap(), (Op::ContainsI, false));
    }

    #[test]
    fn re_aliases_to_matchesi() {
        assert_eq!(resolve_op_alias("re").unwrap(), (Op::MatchesI, false));
    }

    #[test]
    fn unknown_operator_is_an_error() {
        assert!(resolve_op_alias("bogus").is_err());
    }

    #[test]
    fn arity_checks() {
        assert!(Op::Empty.arity().accepts(0));
        assert!(!Op::Empty.arity().accepts(1));
        assert!(Op::Between.arity().accepts(2));
        assert!(!Op::Between.arity().accepts(1));
        assert!(Op::In.arity().accepts(1));
        assert!(Op::In.arity().accepts(5));
    }
}

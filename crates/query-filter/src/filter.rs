// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Filter tree
//!
//! A [`Filter`] is a tagged-enum predicate tree — `Junction | ValueTest
//! | CollectionTest` — built either directly or by parsing the
//! declarative predicate-array grammar (`parse_filter`) used by the
//! fetch query specification.

use serde_json::Value as Json;
use unified_fetch_value_expr::{compile, ExprContext};

use crate::error::{FilterError, FilterResult};
use crate::op::{resolve_op_alias, Op};
use crate::param::Param;

/// Tells the filter grammar whether a bare property path is a
/// collection — needed to distinguish the `"<collection> => empty"`
/// existence-test shorthand from an ordinary scalar null-check. Kept
/// as a seam (like `value_expr::ContainerResolver`) so this crate
/// never depends on a concrete schema representation.
pub trait CollectionResolver {
    fn is_collection(&self, absolute_path: &str) -> bool;
}

/// A resolver that treats no path as a collection; useful in tests and
/// contexts with no array/map-valued properties.
pub struct NoCollections;

impl CollectionResolver for NoCollections {
    fn is_collection(&self, _absolute_path: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Junction {
        kind: JunctionKind,
        invert: bool,
        elements: Vec<Filter>,
    },
    ValueTest {
        expr: unified_fetch_value_expr::ValueExpression,
        op: Op,
        invert: bool,
        params: Vec<Param>,
    },
    CollectionTest {
        collection_base_path: String,
        invert: bool,
        nested: Option<Box<Filter>>,
    },
}

impl Filter {
    /// Prefixes every path this filter touches with `base_path`. Used
    /// when lifting a filter declared against a record type onto a
    /// super-type's `records` sub-path, or when rebasing a scoped
    /// filter onto its collection axis.
    pub fn rebase(&self, base_path: &str) -> Filter {
        match self {
            Filter::Junction { kind, invert, elements } => Filter::Junction {
                kind: *kind,
                invert: *invert,
                elements: elements.iter().map(|f| f.rebase(base_path)).collect(),
            },
            Filter::ValueTest { expr, op, invert, params } => Filter::ValueTest {
                expr: expr.rebase(base_path),
                op: *op,
                invert: *invert,
                params: params.iter().map(|p| p.rebase(base_path)).collect(),
            },
            Filter::CollectionTest { collection_base_path, invert, nested } => Filter::CollectionTest {
                collection_base_path: format!("{base_path}.{collection_base_path}"),
                invert: *invert,
                nested: nested.as_ref().map(|n| Box::new(n.rebase(base_path))),
            },
        }
    }
}

/// Returns whether `child`, rendered inside a junction of type
/// `enclosing`, needs surrounding parens to preserve its meaning.
///
/// A leaf (`ValueTest`/`CollectionTest`) never needs parens. A
/// single-element junction defers to its sole child's own rule. A
/// multi-element junction needs parens iff it is not inverted (an
/// inverted junction is already delimited by its `NOT (...)` wrapper)
/// and its kind differs from the enclosing junction's.
pub fn needs_paren(child: &Filter, enclosing: JunctionKind) -> bool {
    match child {
        Filter::Junction { kind, invert, elements } => {
            if elements.len() == 1 {
                return needs_paren(&elements[0], enclosing);
            }
            !*invert && *kind != enclosing
        }
        _ => false,
    }
}

fn junction_marker(text: &str) -> Option<(JunctionKind, bool)> {
    let (stripped, prefix_invert) = match text.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    match stripped {
        ":and" | ":all" => Some((JunctionKind::And, prefix_invert)),
        ":or" | ":any" => Some((JunctionKind::Or, prefix_invert)),
        ":none" => Some((JunctionKind::Or, !prefix_invert)),
        _ => None,
    }
}

/// Parses one entry of the predicate-array grammar into a `Filter`.
/// `ctx` resolves property references; `collections` distinguishes a
/// bare collection path from a scalar one for the `empty`/`!empty`
/// existence-test shorthand.
pub fn parse_filter(
    ctx: &ExprContext,
    collections: &dyn CollectionResolver,
    raw: &Json,
) -> FilterResult<Filter> {
    let entry = raw.as_array().ok_or_else(|| FilterError::InvalidPredicate {
        text: raw.to_string(),
        reason: "expected a predicate array".to_string(),
    })?;
    let head = entry.first().and_then(Json::as_str).ok_or_else(|| FilterError::InvalidPredicate {
        text: raw.to_string(),
        reason: "expected the first element to be a string".to_string(),
    })?;

    if let Some((kind, invert)) = junction_marker(head) {
        let elements_json = entry.get(1).and_then(Json::as_array).ok_or_else(|| {
            FilterError::InvalidPredicate {
                text: raw.to_string(),
                reason: "junction marker must be followed by an array of sub-filters".to_string(),
            }
        })?;
        let elements = elements_json
            .iter()
            .map(|e| parse_filter(ctx, collections, e))
            .collect::<FilterResult<Vec<_>>>()?;
        return Ok(Filter::Junction { kind, invert, elements });
    }

    parse_predicate(ctx, collections, head, &entry[1..])
}

fn parse_predicate(
    ctx: &ExprContext,
    collections: &dyn CollectionResolver,
    head: &str,
    raw_params: &[Json],
) -> FilterResult<Filter> {
    let (expr_text, op_text) = match head.find("=>") {
        Some(idx) => (head[..idx].trim(), Some(head[idx + 2..].trim())),
        None => {
            if head.contains('|') {
                return Err(FilterError::LegacySeparator { text: head.to_string() });
            }
            (head.trim(), None)
        }
    };

    let expr = compile(ctx, expr_text)?;

    let (op, alias_invert) = match op_text {
        Some(op_text) => resolve_op_alias(op_text)?,
        None => match raw_params.len() {
            0 => (Op::Empty, true), // "present" shorthand
            1 => (Op::Eq, false),   // "is" shorthand
            _ => {
                return Err(FilterError::InvalidPredicate {
                    text: expr_text.to_string(),
                    reason: "multiple arguments require an explicit operator".to_string(),
                })
            }
        },
    };

    if op == Op::Empty && expr.used_paths.len() == 1 {
        let path = expr.used_paths.iter().next().unwrap();
        if collections.is_collection(path) && raw_params.is_empty() {
            return Ok(Filter::CollectionTest {
                collection_base_path: path.clone(),
                invert: alias_invert,
                nested: None,
            });
        }
    }

    let params = expand_params(ctx, op, raw_params)?;
    if !op.arity().accepts(params.len()) {
        return Err(FilterError::ArityMismatch {
            op: op_text.unwrap_or("").to_string(),
            expected: op.arity().describe(),
            got: params.len(),
        });
    }

    Ok(Filter::ValueTest {
        expr,
        op,
        invert: alias_invert,
        params,
    })
}

fn expand_params(ctx: &ExprContext, op: Op, raw_params: &[Json]) -> FilterResult<Vec<Param>> {
    let flat: Vec<&Json> = if raw_params.len() == 1 {
        if let Some(list) = raw_params[0].as_array() {
            if matches!(op, Op::In | Op::Between) {
                return list.iter().map(|v| parse_param(ctx, v)).collect();
            }
        }
        raw_params.iter().collect()
    } else {
        raw_params.iter().collect()
    };
    flat.into_iter().map(|v| parse_param(ctx, v)).collect()
}

fn parse_param(ctx: &ExprContext, value: &Json) -> FilterResult<Param> {
    if let Json::Object(map) = value {
        if let Some(Json::String(text)) = map.get("expr") {
            return Ok(Param::Expr(compile(ctx, text)?));
        }
    }
    Param::from_json(value).ok_or_else(|| FilterError::InvalidPredicate {
        text: value.to_string(),
        reason: "unsupported parameter shape".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use unified_fetch_value_expr::PermissiveResolver;

    fn root_ctx() -> ExprContext<'static> {
        static RESOLVER: PermissiveResolver = PermissiveResolver;
        ExprContext::root(&RESOLVER)
    }

    #[test]
    fn parses_value_test_with_explicit_op() {
        let ctx = root_ctx();
        let raw = json!(["name => startsi", "Al"]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        match filter {
            Filter::ValueTest { op, invert, params, .. } => {
                assert_eq!(op, Op::StartsI);
                assert!(!invert);
                assert_eq!(params.len(), 1);
            }
            _ => panic!("expected a value test"),
        }
    }

    #[test]
    fn parses_default_is_with_single_implicit_param() {
        let ctx = root_ctx();
        let raw = json!(["name", "Al"]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        assert!(matches!(filter, Filter::ValueTest { op: Op::Eq, invert: false, .. }));
    }

    #[test]
    fn parses_default_present_with_no_params() {
        let ctx = root_ctx();
        let raw = json!(["name"]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        assert!(matches!(filter, Filter::ValueTest { op: Op::Empty, invert: true, .. }));
    }

    #[test]
    fn rejects_legacy_pipe_separator() {
        let ctx = root_ctx();
        let raw = json!(["name | startsi", "Al"]);
        let err = parse_filter(&ctx, &NoCollections, &raw).unwrap_err();
        assert!(matches!(err, FilterError::LegacySeparator { .. }));
    }

    #[test]
    fn parses_and_junction() {
        let ctx = root_ctx();
        let raw = json!([":and", [["name => startsi", "Al"], ["age => gt", 5]]]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        match filter {
            Filter::Junction { kind, invert, elements } => {
                assert_eq!(kind, JunctionKind::And);
                assert!(!invert);
                assert_eq!(elements.len(), 2);
            }
            _ => panic!("expected a junction"),
        }
    }

    #[test]
    fn none_junction_is_inverted_or() {
        let ctx = root_ctx();
        let raw = json!([":none", [["name => startsi", "Al"]]]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        assert!(matches!(
            filter,
            Filter::Junction { kind: JunctionKind::Or, invert: true, .. }
        ));
    }

    struct TagsIsCollection;
    impl CollectionResolver for TagsIsCollection {
        fn is_collection(&self, path: &str) -> bool {
            path == "tags"
        }
    }

    #[test]
    fn bare_collection_empty_is_a_collection_test() {
        let ctx = root_ctx();
        let raw = json!(["tags => !empty"]);
        let filter = parse_filter(&ctx, &TagsIsCollection, &raw).unwrap();
        match filter {
            Filter::CollectionTest { collection_base_path, invert, .. } => {
                assert_eq!(collection_base_path, "tags");
                assert!(invert);
            }
            _ => panic!("expected a collection test"),
        }
    }

    #[test]
    fn needs_paren_differs_by_enclosing_kind() {
        let or_child = Filter::Junction {
            kind: JunctionKind::Or,
            invert: false,
            elements: vec![
                Filter::ValueTest {
                    expr: compile(&root_ctx(), "a").unwrap(),
                    op: Op::Eq,
                    invert: false,
                    params: vec![],
                },
                Filter::ValueTest {
                    expr: compile(&root_ctx(), "b").unwrap(),
                    op: Op::Eq,
                    invert: false,
                    params: vec![],
                },
            ],
        };
        assert!(needs_paren(&or_child, JunctionKind::And));
        assert!(!needs_paren(&or_child, JunctionKind::Or));
    }

    #[test]
    fn inverted_junction_never_needs_parens() {
        let inverted = Filter::Junction {
            kind: JunctionKind::Or,
            invert: true,
            elements: vec![
                Filter::ValueTest {
                    expr: compile(&root_ctx(), "a").unwrap(),
                    op: Op::Eq,
                    invert: false,
                    params: vec![],
                },
                Filter::ValueTest {
                    expr: compile(&root_ctx(), "b").unwrap(),
                    op: Op::Eq,
                    invert: false,
                    params: vec![],
                },
            ],
        };
        assert!(!needs_paren(&inverted, JunctionKind::And));
    }

    #[test]
    fn rebase_prefixes_value_test_paths() {
        let ctx = root_ctx();
        let raw = json!(["name => startsi", "Al"]);
        let filter = parse_filter(&ctx, &NoCollections, &raw).unwrap();
        let rebased = filter.rebase("records");
        match rebased {
            Filter::ValueTest { expr, .. } => {
                assert!(expr.used_paths.contains("records.name"));
            }
            _ => panic!("expected a value test"),
        }
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Rendering a [`Filter`]/[`Order`] tree to SQL text.
//!
//! A plain [`unified_fetch_value_expr::TranslationCtx`] is enough to
//! render every leaf except [`Filter::CollectionTest`], which needs to
//! build and render an `EXISTS` subquery over a whole other property
//! tree -- something this crate has no way to do without depending on
//! the query-tree/schema layers it sits below. [`FilterTranslationCtx`]
//! adds exactly that one extra seam, the same way `CollectionResolver`
//! lets this crate ask "is this a collection?" without knowing what a
//! schema is.

use unified_fetch_driver::{Driver, LikeWildcard};
use unified_fetch_value_expr::TranslationCtx;

use crate::error::FilterResult;
use crate::filter::{needs_paren, Filter, JunctionKind};
use crate::op::Op;
use crate::order::Order;
use crate::param::Param;

/// Extends [`TranslationCtx`] with the one capability [`Filter::render`]
/// needs beyond plain expression translation: turning a
/// [`Filter::CollectionTest`] into a boolean SQL expression (ordinarily
/// `EXISTS (...)` / `NOT EXISTS (...)`) over the collection at
/// `collection_base_path`, with `nested` -- already rebased onto that
/// collection's own axis by the caller -- rendered inside the
/// subquery's own translation context.
pub trait FilterTranslationCtx: TranslationCtx {
    fn render_collection_test(
        &self,
        collection_base_path: &str,
        invert: bool,
        nested: Option<&Filter>,
        driver: &dyn Driver,
    ) -> FilterResult<String>;
}

fn render_param(param: &Param, ctx: &dyn FilterTranslationCtx) -> FilterResult<String> {
    match param {
        Param::Literal(lit) => Ok(ctx.render_literal(lit)),
        Param::Ref(name) => Ok(ctx.resolve_param(name)?),
        Param::Expr(expr) => Ok(expr.translate(ctx)?),
    }
}

/// Renders `param` as a LIKE/ILIKE pattern under `wildcard`'s structural
/// placement. A plain string literal is escaped and wrapped entirely at
/// compile time; anything else (a bound parameter or a sub-expression)
/// is rendered to SQL text first and wrapped with a runtime-escaping
/// expression instead, since its value isn't known until execution.
fn render_like_pattern(
    param: &Param,
    wildcard: LikeWildcard,
    ctx: &dyn FilterTranslationCtx,
    driver: &dyn Driver,
) -> FilterResult<String> {
    if let Param::Literal(unified_fetch_value_expr::Literal::Str(s)) = param {
        return Ok(driver.safe_like_pattern_from_string(s, wildcard));
    }
    let rendered = render_param(param, ctx)?;
    Ok(driver.safe_like_pattern_from_expr(&rendered, wildcard))
}

/// `!lt`/`!gt`/etc are valid alias spellings (see `op::resolve_op_alias`),
/// so inversion has to flip to the opposite comparison rather than wrap
/// in `NOT (...)`.
fn comparison_op_text(op: Op, invert: bool) -> &'static str {
    match (op, invert) {
        (Op::Eq, false) => "=",
        (Op::Eq, true) => "<>",
        (Op::Ne, false) => "<>",
        (Op::Ne, true) => "=",
        (Op::Lt, false) => "<",
        (Op::Lt, true) => ">=",
        (Op::Le, false) => "<=",
        (Op::Le, true) => ">",
        (Op::Gt, false) => ">",
        (Op::Gt, true) => "<=",
        (Op::Ge, false) => ">=",
        (Op::Ge, true) => "<",
        _ => unreachable!("comparison_op_text called with a non-comparison operator"),
    }
}

fn render_value_test(
    expr: &unified_fetch_value_expr::ValueExpression,
    op: Op,
    invert: bool,
    params: &[Param],
    ctx: &dyn FilterTranslationCtx,
    driver: &dyn Driver,
) -> FilterResult<String> {
    let lhs = expr.translate(ctx)?;

    Ok(match op {
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let text = comparison_op_text(op, invert);
            format!("{lhs} {text} {}", render_param(&params[0], ctx)?)
        }
        Op::In => {
            let rendered: FilterResult<Vec<String>> = params.iter().map(|p| render_param(p, ctx)).collect();
            let list = rendered?.join(", ");
            let op_text = if invert { "NOT IN" } else { "IN" };
            format!("{lhs} {op_text} ({list})")
        }
        Op::Between => {
            let low = render_param(&params[0], ctx)?;
            let high = render_param(&params[1], ctx)?;
            let op_text = if invert { "NOT BETWEEN" } else { "BETWEEN" };
            format!("{lhs} {op_text} {low} AND {high}")
        }
        Op::Contains => {
            let pattern = render_like_pattern(&params[0], LikeWildcard::Contains, ctx, driver)?;
            driver.pattern_match(&lhs, &pattern, invert, true)
        }
        Op::ContainsI => {
            let pattern = render_like_pattern(&params[0], LikeWildcard::Contains, ctx, driver)?;
            driver.pattern_match(&lhs, &pattern, invert, false)
        }
        Op::Starts => {
            let pattern = render_like_pattern(&params[0], LikeWildcard::Prefix, ctx, driver)?;
            driver.pattern_match(&lhs, &pattern, invert, true)
        }
        Op::StartsI => {
            let pattern = render_like_pattern(&params[0], LikeWildcard::Prefix, ctx, driver)?;
            driver.pattern_match(&lhs, &pattern, invert, false)
        }
        Op::Matches => {
            let pattern = render_param(&params[0], ctx)?;
            driver.regexp_match(&lhs, &pattern, invert, true)
        }
        Op::MatchesI => {
            let pattern = render_param(&params[0], ctx)?;
            driver.regexp_match(&lhs, &pattern, invert, false)
        }
        Op::Empty => {
            if invert {
                format!("{lhs} IS NOT NULL")
            } else {
                format!("{lhs} IS NULL")
            }
        }
    })
}

impl Filter {
    /// Renders this filter to a SQL boolean expression.
    pub fn render(&self, ctx: &dyn FilterTranslationCtx, driver: &dyn Driver) -> FilterResult<String> {
        match self {
            Filter::Junction { kind, invert, elements } => {
                let joiner = match kind {
                    JunctionKind::And => " AND ",
                    JunctionKind::Or => " OR ",
                };
                let rendered: FilterResult<Vec<String>> = elements
                    .iter()
                    .map(|child| {
                        let text = child.render(ctx, driver)?;
                        Ok(if needs_paren(child, *kind) { format!("({text})") } else { text })
                    })
                    .collect();
                let body = rendered?.join(joiner);
                Ok(if *invert { format!("NOT ({body})") } else { body })
            }
            Filter::ValueTest { expr, op, invert, params } => {
                render_value_test(expr, *op, *invert, params, ctx, driver)
            }
            Filter::CollectionTest { collection_base_path, invert, nested } => {
                ctx.render_collection_test(collection_base_path, *invert, nested.as_deref(), driver)
            }
        }
    }
}

impl Order {
    /// Renders this order spec as a comma-joined `ORDER BY` entry list
    /// (without the `ORDER BY` keyword itself).
    pub fn render(&self, ctx: &dyn TranslationCtx) -> FilterResult<String> {
        let rendered: FilterResult<Vec<String>> = self
            .elements
            .iter()
            .map(|element| {
                let text = element.expr.translate(ctx)?;
                Ok(if element.descending { format!("{text} DESC") } else { format!("{text} ASC") })
            })
            .collect();
        Ok(rendered?.join(", "))
    }
}

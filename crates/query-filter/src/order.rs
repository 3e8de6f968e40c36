// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Order specification: an ordered list of value expressions with a
//! sort direction each.

use unified_fetch_value_expr::{compile, ExprContext, ValueExpression};

use crate::error::{FilterError, FilterResult};

#[derive(Debug, Clone, PartialEq)]
pub struct OrderElement {
    pub expr: ValueExpression,
    pub descending: bool,
}

impl OrderElement {
    pub fn rebase(&self, base_path: &str) -> OrderElement {
        OrderElement {
            expr: self.expr.rebase(base_path),
            descending: self.descending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub elements: Vec<OrderElement>,
}

impl Order {
    pub fn rebase(&self, base_path: &str) -> Order {
        Order {
            elements: self.elements.iter().map(|e| e.rebase(base_path)).collect(),
        }
    }
}

/// Parses one order-spec string, `"<expr> [=> asc|desc]"`.
pub fn parse_order_element(ctx: &ExprContext, text: &str) -> FilterResult<OrderElement> {
    let (expr_text, dir_text) = match text.find("=>") {
        Some(idx) => (text[..idx].trim(), Some(text[idx + 2..].trim())),
        None => (text.trim(), None),
    };
    let descending = match dir_text {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => {
            return Err(FilterError::InvalidPredicate {
                text: text.to_string(),
                reason: format!("unknown sort direction '{other}'"),
            })
        }
    };
    let expr = compile(ctx, expr_text)?;
    Ok(OrderElement { expr, descending })
}

pub fn parse_order(ctx: &ExprContext, specs: &[String]) -> FilterResult<Order> {
    let elements = specs
        .iter()
        .map(|text| parse_order_element(ctx, text))
        .collect::<FilterResult<Vec<_>>>()?;
    Ok(Order { elements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use unified_fetch_value_expr::PermissiveResolver;

    fn root_ctx() -> ExprContext<'static> {
        static RESOLVER: PermissiveResolver = PermissiveResolver;
        ExprContext::root(&RESOLVER)
    }

    #[test]
    fn parses_ascending_by_default() {
        let ctx = root_ctx();
        let element = parse_order_element(&ctx, "name").unwrap();
        assert!(!element.descending);
    }

    #[test]
    fn parses_explicit_descending() {
        let ctx = root_ctx();
        let element = parse_order_element(&ctx, "name => desc").unwrap();
        assert!(element.descending);
    }

    #[test]
    fn rejects_unknown_direction() {
        let ctx = root_ctx();
        assert!(parse_order_element(&ctx, "name => sideways").is_err());
    }

    #[test]
    fn rebase_prefixes_every_element() {
        let ctx = root_ctx();
        let order = parse_order(&ctx, &["name => asc".to_string(), "age => desc".to_string()]).unwrap();
        let rebased = order.rebase("records");
        assert!(rebased.elements[0].expr.used_paths.contains("records.name"));
        assert!(rebased.elements[1].expr.used_paths.contains("records.age"));
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Value expressions: compiled scalar expressions whose leaves are
//! resolved property references.
//!
//! The expression layer is intentionally minimal (per the compiler this
//! is modeled on): a leaf is either a literal or a property reference,
//! and the only composite form is a function call, which exists as an
//! extension point rather than a requirement. Translation to SQL is
//! deferred to a [`TranslationCtx`] supplied at render time, because some
//! column expressions (EXISTS-subquery rebasing) depend on where in the
//! query tree the expression currently sits.

use std::collections::BTreeSet;

use crate::context::ExprContext;
use crate::error::{ExprError, ExprResult};

/// A literal scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    DateTime(String),
}

/// The seam between a [`ValueExpression`] and the query tree it is
/// rendered against. Implemented downstream (`unified-fetch-translate`)
/// once a query tree's path-to-SQL map exists; kept here so `Expr::translate`
/// doesn't need to depend on the query-tree crate.
pub trait TranslationCtx {
    /// Resolves an absolute property path to its SQL column/expression text.
    fn translate_prop_path(&self, path: &str) -> String;
    /// Renders a literal using the active driver's encoders.
    fn render_literal(&self, literal: &Literal) -> String;
    /// Resolves a `param("name")` placeholder to its bound SQL text.
    fn resolve_param(&self, name: &str) -> ExprResult<String>;
}

/// A compiled scalar expression. Leaves are absolute property paths —
/// resolution against the context happens once, at [`compile`] time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    PropRef(String),
    Literal(Literal),
    /// Extension point for richer function calls; not required for
    /// compliance with the core compiler.
    Call { func: String, args: Vec<Expr> },
}

impl Expr {
    fn collect_used_paths(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::PropRef(path) => {
                out.insert(path.clone());
            }
            Expr::Literal(_) => {}
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_used_paths(out);
                }
            }
        }
    }

    fn rebase_paths(&self, base: &str) -> Expr {
        match self {
            Expr::PropRef(path) => Expr::PropRef(format!("{base}.{path}")),
            Expr::Literal(lit) => Expr::Literal(lit.clone()),
            Expr::Call { func, args } => Expr::Call {
                func: func.clone(),
                args: args.iter().map(|a| a.rebase_paths(base)).collect(),
            },
        }
    }

    pub fn translate(&self, ctx: &dyn TranslationCtx) -> ExprResult<String> {
        Ok(match self {
            Expr::PropRef(path) => ctx.translate_prop_path(path),
            Expr::Literal(lit) => ctx.render_literal(lit),
            Expr::Call { func, args } => {
                let rendered: ExprResult<Vec<String>> =
                    args.iter().map(|a| a.translate(ctx)).collect();
                format!("{func}({})", rendered?.join(", "))
            }
        })
    }
}

/// A compiled expression plus the set of absolute property paths it uses
/// — reported so the property tree builder can attach the right
/// select/where clauses, and so debranching can check axis membership.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueExpression {
    pub expr: Expr,
    pub used_paths: BTreeSet<String>,
}

impl ValueExpression {
    pub fn translate(&self, ctx: &dyn TranslationCtx) -> ExprResult<String> {
        self.expr.translate(ctx)
    }

    /// Returns a new expression whose used paths are all prefixed with
    /// `base_path`. Used when lifting an expression declared against a
    /// record type onto a super-type's `records` sub-path (and for
    /// EXISTS-subquery rebasing).
    pub fn rebase(&self, base_path: &str) -> ValueExpression {
        if base_path.is_empty() {
            return self.clone();
        }
        let expr = self.expr.rebase_paths(base_path);
        let mut used_paths = BTreeSet::new();
        expr.collect_used_paths(&mut used_paths);
        ValueExpression { expr, used_paths }
    }
}

/// Compiles `text` against `ctx`, validating every property reference it
/// contains resolves to an absolute path.
pub fn compile(ctx: &ExprContext, text: &str) -> ExprResult<ValueExpression> {
    let mut parser = Parser {
        src: text.trim(),
        pos: 0,
        ctx,
    };
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(ExprError::InvalidReference {
            reference: text.to_string(),
            reason: format!("unexpected trailing input at byte {}", parser.pos),
        });
    }
    let mut used_paths = BTreeSet::new();
    expr.collect_used_paths(&mut used_paths);
    Ok(ValueExpression { expr, used_paths })
}

struct Parser<'a, 'b> {
    src: &'a str,
    pos: usize,
    ctx: &'a ExprContext<'b>,
}

impl<'a, 'b> Parser<'a, 'b> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src.as_bytes()[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn parse_expr(&mut self) -> ExprResult<Expr> {
        self.skip_ws();
        if self.rest().starts_with('\'') {
            return self.parse_string_literal();
        }
        if let Some(first) = self.rest().as_bytes().first() {
            if first.is_ascii_digit() || (*first == b'-' && self.rest().len() > 1) {
                if let Some(e) = self.try_parse_number() {
                    return Ok(e);
                }
            }
        }
        let ident = self.parse_ident_chain()?;
        self.skip_ws();
        if self.rest().starts_with('(') {
            return self.parse_call(ident);
        }
        match ident.as_str() {
            "true" => Ok(Expr::Literal(Literal::Bool(true))),
            "false" => Ok(Expr::Literal(Literal::Bool(false))),
            "null" => Ok(Expr::Literal(Literal::Null)),
            _ => {
                let absolute = self.ctx.normalize(&ident)?;
                Ok(Expr::PropRef(absolute))
            }
        }
    }

    fn parse_string_literal(&mut self) -> ExprResult<Expr> {
        debug_assert!(self.rest().starts_with('\''));
        self.pos += 1;
        let start = self.pos;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos] != b'\'' {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Err(ExprError::InvalidReference {
                reference: self.src.to_string(),
                reason: "unterminated string literal".to_string(),
            });
        }
        let value = self.src[start..self.pos].to_string();
        self.pos += 1; // closing quote
        Ok(Expr::Literal(Literal::Str(value)))
    }

    fn try_parse_number(&mut self) -> Option<Expr> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut i = self.pos;
        if i < bytes.len() && bytes[i] == b'-' {
            i += 1;
        }
        let mut saw_digit = false;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
                saw_digit = true;
            }
        }
        if !saw_digit {
            return None;
        }
        let text = &self.src[start..i];
        let value: f64 = text.parse().ok()?;
        self.pos = i;
        Some(Expr::Literal(Literal::Number(value)))
    }

    fn parse_ident_chain(&mut self) -> ExprResult<String> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut i = self.pos;
        while i < bytes.len() && (bytes[i] == b'^' || bytes[i] == b'.') {
            i += 1;
        }
        while i < bytes.len()
            && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.' || bytes[i] == b'^')
        {
            i += 1;
        }
        if i == start {
            return Err(ExprError::InvalidReference {
                reference: self.src[self.pos..].to_string(),
                reason: "expected a property reference or literal".to_string(),
            });
        }
        self.pos = i;
        Ok(self.src[start..i].to_string())
    }

    fn parse_call(&mut self, func: String) -> ExprResult<Expr> {
        debug_assert!(self.rest().starts_with('('));
        self.pos += 1;
        let mut args = Vec::new();
        self.skip_ws();
        if !self.rest().starts_with(')') {
            loop {
                args.push(self.parse_expr()?);
                self.skip_ws();
                if self.rest().starts_with(',') {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        self.skip_ws();
        if !self.rest().starts_with(')') {
            return Err(ExprError::InvalidReference {
                reference: self.src.to_string(),
                reason: "expected closing ')' in function call".to_string(),
            });
        }
        self.pos += 1;
        Ok(Expr::Call { func, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PermissiveResolver;

    fn root_ctx() -> ExprContext<'static> {
        static RESOLVER: PermissiveResolver = PermissiveResolver;
        ExprContext::root(&RESOLVER)
    }

    #[test]
    fn compiles_plain_prop_ref() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "name").unwrap();
        assert_eq!(expr.expr, Expr::PropRef("name".to_string()));
        assert!(expr.used_paths.contains("name"));
    }

    #[test]
    fn compiles_nested_prop_ref() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "address.city").unwrap();
        assert_eq!(expr.expr, Expr::PropRef("address.city".to_string()));
    }

    #[test]
    fn compiles_string_literal() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "'hello'").unwrap();
        assert_eq!(expr.expr, Expr::Literal(Literal::Str("hello".to_string())));
        assert!(expr.used_paths.is_empty());
    }

    #[test]
    fn compiles_number_literal() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "-12.5").unwrap();
        assert_eq!(expr.expr, Expr::Literal(Literal::Number(-12.5)));
    }

    #[test]
    fn compiles_function_call_with_prop_args() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "concat(firstName, lastName)").unwrap();
        assert!(expr.used_paths.contains("firstName"));
        assert!(expr.used_paths.contains("lastName"));
        assert!(matches!(expr.expr, Expr::Call { ref func, .. } if func == "concat"));
    }

    #[test]
    fn rebase_prefixes_every_used_path() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "concat(firstName, lastName)").unwrap();
        let rebased = expr.rebase("records");
        assert!(rebased.used_paths.contains("records.firstName"));
        assert!(rebased.used_paths.contains("records.lastName"));
    }

    #[test]
    fn unresolvable_reference_is_an_error() {
        let ctx = root_ctx();
        assert!(compile(&ctx, "^.^.name").is_err());
    }

    struct RecordingCtx;
    impl TranslationCtx for RecordingCtx {
        fn translate_prop_path(&self, path: &str) -> String {
            format!("z.{path}")
        }
        fn render_literal(&self, literal: &Literal) -> String {
            match literal {
                Literal::Str(s) => format!("'{s}'"),
                Literal::Number(n) => n.to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Null => "NULL".to_string(),
                Literal::DateTime(s) => format!("'{s}'"),
            }
        }
        fn resolve_param(&self, name: &str) -> ExprResult<String> {
            Ok(format!("?{{{name}}}"))
        }
    }

    #[test]
    fn translate_renders_prop_refs_and_calls() {
        let ctx = root_ctx();
        let expr = compile(&ctx, "concat(firstName, lastName)").unwrap();
        let sql = expr.translate(&RecordingCtx).unwrap();
        assert_eq!(sql, "concat(z.firstName, z.lastName)");
    }
}

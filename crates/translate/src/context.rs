// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The translation context: binds `value-expr`'s and `query-filter`'s
//! rendering seams to a concrete [`QueryTree`] and its `path -> SQL`
//! map, resolving bound parameters through a [`ParamsHandler`] and
//! collection existence tests through a freshly built `EXISTS`
//! subquery.
//!
//! `translate_prop_path`/`render_literal`/`resolve_param` are infallible
//! or schema-internal by contract (every path a filter/order/expr can
//! reference was already validated against the schema when the property
//! tree was built) -- a missing binding here means a tree-building
//! invariant broke upstream, not a caller mistake, so this context
//! panics on it rather than threading another error type through
//! `value_expr::TranslationCtx`'s infallible signature.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use unified_fetch_driver::Driver;
use unified_fetch_prop_tree::{Clause, PropTreeNode, PropTreeResult};
use unified_fetch_query_filter::{Filter, FilterResult, FilterTranslationCtx};
use unified_fetch_query_tree::{build_exists_subquery, LetterCounter, QueryTree, QueryTreeNode};
use unified_fetch_record_schema::Schema;
use unified_fetch_sql_ir::{SelectItem, SelectStatement};
use unified_fetch_value_expr::{ExprError, ExprResult, Literal, TranslationCtx};

use crate::params::ParamsHandler;

fn find_query_node<'n>(node: &'n QueryTreeNode, path: &str) -> Option<&'n QueryTreeNode> {
    if node.path == path {
        return Some(node);
    }
    node.all_children().find_map(|child| find_query_node(child, path))
}

fn find_prop_node<'n>(node: &'n PropTreeNode, path: &str) -> Option<&'n PropTreeNode> {
    if node.path == path {
        return Some(node);
    }
    node.children.values().find_map(|child| find_prop_node(child, path))
}

fn collect_filter_paths(filter: &Filter, out: &mut BTreeSet<String>) {
    match filter {
        Filter::Junction { elements, .. } => {
            for element in elements {
                collect_filter_paths(element, out);
            }
        }
        Filter::ValueTest { expr, .. } => out.extend(expr.used_paths.iter().cloned()),
        Filter::CollectionTest { collection_base_path, nested, .. } => {
            out.insert(collection_base_path.clone());
            if let Some(nested) = nested {
                collect_filter_paths(nested, out);
            }
        }
    }
}

/// Binds a [`QueryTree`]'s path map to the rendering seams
/// `value-expr`/`query-filter` need, scoped to one record type and one
/// base path within that tree.
pub struct QueryContext<'a> {
    schema: &'a Schema,
    driver: &'a dyn Driver,
    params: &'a dyn ParamsHandler,
    record_type_name: String,
    tree: Rc<QueryTree>,
    base_path: String,
    exists_letters: RefCell<LetterCounter>,
}

impl<'a> QueryContext<'a> {
    /// A context rooted at `tree`'s own root (empty base path).
    pub fn new(
        schema: &'a Schema,
        driver: &'a dyn Driver,
        params: &'a dyn ParamsHandler,
        record_type_name: impl Into<String>,
        tree: Rc<QueryTree>,
    ) -> Self {
        Self {
            schema,
            driver,
            params,
            record_type_name: record_type_name.into(),
            tree,
            base_path: String::new(),
            exists_letters: RefCell::new(LetterCounter::new()),
        }
    }

    /// A sibling context over the same tree, scoped to `base`. Paths
    /// resolved through it are looked up as `{base}.{path}`.
    pub fn rebase(&self, base: &str) -> QueryContext<'a> {
        let base_path = if base.is_empty() {
            String::new()
        } else if self.base_path.is_empty() {
            base.to_string()
        } else {
            format!("{}.{base}", self.base_path)
        };
        QueryContext {
            schema: self.schema,
            driver: self.driver,
            params: self.params,
            record_type_name: self.record_type_name.clone(),
            tree: Rc::clone(&self.tree),
            base_path,
            exists_letters: RefCell::new(LetterCounter::new()),
        }
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver
    }

    pub fn params_handler(&self) -> &dyn ParamsHandler {
        self.params
    }

    /// Re-enters the property-tree builder constrained to the single
    /// axis at `col_path`, restricted to the paths an `EXISTS` subquery
    /// (or its nested filter) actually needs.
    pub fn build_subquery_props_tree(
        &self,
        col_path: &str,
        used_paths: &BTreeSet<String>,
        clause: Clause,
    ) -> PropTreeResult<PropTreeNode> {
        let patterns: Vec<String> = used_paths.iter().cloned().collect();
        let root = unified_fetch_prop_tree::build_simple_props_tree(
            self.schema,
            &self.record_type_name,
            clause,
            &patterns,
        )?;
        Ok(find_prop_node(&root, col_path)
            .cloned()
            .unwrap_or_else(|| panic!("'{col_path}' missing from its own requested subquery tree")))
    }

    fn absolute(&self, path: &str) -> String {
        if self.base_path.is_empty() {
            path.to_string()
        } else {
            format!("{}.{path}", self.base_path)
        }
    }
}

impl<'a> TranslationCtx for QueryContext<'a> {
    fn translate_prop_path(&self, path: &str) -> String {
        let absolute = self.absolute(path);
        let binding = self
            .tree
            .path_map
            .get(&absolute)
            .unwrap_or_else(|| panic!("path '{absolute}' has no column binding in this query tree"));
        binding.resolve(self)
    }

    fn render_literal(&self, literal: &Literal) -> String {
        self.driver
            .sql_literal(literal)
            .expect("reference drivers encode every value-expr literal kind directly")
    }

    fn resolve_param(&self, name: &str) -> ExprResult<String> {
        self.params.resolve(name, self.driver).map_err(|e| ExprError::InvalidReference {
            reference: format!("param(\"{name}\")"),
            reason: e.to_string(),
        })
    }
}

impl<'a> FilterTranslationCtx for QueryContext<'a> {
    fn render_collection_test(
        &self,
        collection_base_path: &str,
        invert: bool,
        nested: Option<&Filter>,
        driver: &dyn Driver,
    ) -> FilterResult<String> {
        use unified_fetch_query_filter::FilterError;

        let mut used_paths = BTreeSet::new();
        used_paths.insert(collection_base_path.to_string());
        if let Some(nested) = nested {
            collect_filter_paths(nested, &mut used_paths);
        }

        let collection_node = self
            .build_subquery_props_tree(collection_base_path, &used_paths, Clause::Filter)
            .map_err(|e| FilterError::InvalidPredicate {
                text: collection_base_path.to_string(),
                reason: e.to_string(),
            })?;

        let outer_node = find_query_node(&self.tree.root, &self.base_path)
            .unwrap_or_else(|| panic!("base path '{}' has no node in this query tree", self.base_path));

        let letter = self.exists_letters.borrow_mut().next_letter();
        tracing::debug!(
            collection_base_path,
            outer_alias = %outer_node.alias,
            subquery_letter = %letter,
            "translate: assigned alias for collection-test subquery"
        );
        let exists = build_exists_subquery(
            self.schema,
            driver,
            &collection_node,
            &outer_node.alias,
            &outer_node.key_column,
            &letter,
        )
        .map_err(|e| FilterError::InvalidPredicate {
            text: collection_base_path.to_string(),
            reason: e.to_string(),
        })?;

        let subquery_tree = Rc::new(exists.query_tree);
        let subquery_ctx = QueryContext {
            schema: self.schema,
            driver: self.driver,
            params: self.params,
            record_type_name: self.record_type_name.clone(),
            tree: Rc::clone(&subquery_tree),
            base_path: String::new(),
            exists_letters: RefCell::new(LetterCounter::new()),
        };

        let mut where_clause = exists.equi_join_condition.clone();
        if let Some(nested) = nested {
            let nested_sql = nested.render(&subquery_ctx, driver)?;
            where_clause = format!("{where_clause} AND {nested_sql}");
        }

        let group_by = subquery_tree.group_by_columns();
        let select = SelectStatement::new(subquery_tree.to_table_ref())
            .with_projection(vec![SelectItem::Expr { expr: "1".to_string(), alias: "present".to_string() }])
            .with_where(where_clause)
            .with_group_by(group_by);

        let verb = if invert { "NOT EXISTS" } else { "EXISTS" };
        Ok(format!("{verb} ({})", select.render(driver)))
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The query tree: a join tree of table nodes carrying select/order
//! lists and a `path -> column-SQL` map, assembled from a debranched
//! property tree.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use unified_fetch_sql_ir::{Join, JoinType, SelectItem, TableRef};
use unified_fetch_value_expr::TranslationCtx;

/// A column-SQL value that may need the enclosing translation context
/// to finish rendering -- a calculated property's value expression may
/// reference a path anywhere else in the tree, so it cannot be
/// rendered to its final SQL text until the whole tree's path map is
/// assembled. See §9 Design Notes: "lazy thunks in the path-to-SQL
/// map". Presence tests and aggregate filters, by contrast, only ever
/// reference columns in their own row and so are rendered eagerly to
/// `Static` text at build time.
#[derive(Clone)]
pub enum SqlBinding {
    Static(String),
    Thunk(Rc<dyn Fn(&dyn TranslationCtx) -> String>),
}

impl SqlBinding {
    pub fn resolve(&self, ctx: &dyn TranslationCtx) -> String {
        match self {
            SqlBinding::Static(s) => s.clone(),
            SqlBinding::Thunk(f) => f(ctx),
        }
    }
}

impl fmt::Debug for SqlBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlBinding::Static(s) => f.debug_tuple("Static").field(s).finish(),
            SqlBinding::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

/// One markup-labeled entry in a node's select list.
#[derive(Debug, Clone)]
pub struct SelectEntry {
    pub label: String,
    pub binding: SqlBinding,
}

/// One joined table in the query tree. The root node has no join
/// condition and sits directly in the `FROM` clause; every other node
/// is reached through `join_type`/`join_condition`.
#[derive(Debug, Clone)]
pub struct QueryTreeNode {
    /// Dotted property path this node corresponds to (empty at the root).
    pub path: String,
    pub table: String,
    pub alias: String,
    /// This node's own identifying column (its id, or the synthetic
    /// own-id for an object collection), used both to extend a GROUP BY
    /// chain and as the join key children hang off of.
    pub key_column: String,
    pub join_type: JoinType,
    /// `None` at the root; the rendered `ON` condition otherwise.
    pub join_condition: Option<String>,
    /// True once this or any ancestor join is outer (`forceOuter`
    /// propagation) -- kept so descendants know without re-walking up.
    pub virtual_: bool,
    /// True if reaching this node can multiply the parent's row count
    /// (a to-many edge that is not purely an aggregate source).
    pub many: bool,
    pub select_list: Vec<SelectEntry>,
    /// Other joined children that stay single-row relative to this node.
    pub single_row_children: Vec<QueryTreeNode>,
    /// The zero-or-one child that carries the single expanding axis
    /// this (debranched) tree follows.
    pub expanding_child: Option<Box<QueryTreeNode>>,
    /// Marks that this node's own SELECT must emit a GROUP BY over the
    /// key-column chain from the root down to (and including) this
    /// node, because an aggregate below it folds multiple rows.
    pub aggregated_below: bool,
}

impl QueryTreeNode {
    /// All joined children, single-row ones first, expanding child last.
    pub fn all_children(&self) -> impl Iterator<Item = &QueryTreeNode> {
        self.single_row_children
            .iter()
            .chain(self.expanding_child.as_deref())
    }

    fn to_table_ref(&self) -> TableRef {
        let mut joins = Vec::new();
        for child in self.all_children() {
            let condition = child
                .join_condition
                .clone()
                .unwrap_or_else(|| "1=1".to_string());
            joins.push(Join {
                join_type: child.join_type,
                table: child.to_table_ref(),
                condition,
            });
        }
        TableRef {
            table: self.table.clone(),
            alias: self.alias.clone(),
            joins,
        }
    }

    fn collect_select_items(&self, ctx: &dyn TranslationCtx, out: &mut Vec<SelectItem>) {
        for entry in &self.select_list {
            out.push(SelectItem::Expr {
                expr: entry.binding.resolve(ctx),
                alias: entry.label.clone(),
            });
        }
        for child in self.all_children() {
            child.collect_select_items(ctx, out);
        }
    }

    /// The `{alias}.{key_column}` chain from the root down to (and
    /// including) `self`, used to assemble a GROUP BY clause.
    fn key_chain(&self) -> String {
        format!("{}.{}", self.alias, self.key_column)
    }

    fn collect_group_by(&self, chain: &mut Vec<String>, out: &mut Vec<String>) {
        chain.push(self.key_chain());
        if self.aggregated_below {
            out.extend(chain.iter().cloned());
        }
        for child in self.all_children() {
            child.collect_group_by(chain, out);
        }
        chain.pop();
    }
}

/// A complete query tree: the join structure plus the path-to-SQL map
/// every downstream translation context resolves property paths
/// against.
#[derive(Debug, Clone)]
pub struct QueryTree {
    pub root: QueryTreeNode,
    pub path_map: BTreeMap<String, SqlBinding>,
    /// Rendered `{alias}.{column}` SQL of every map aggregate's grouping
    /// key anywhere in the tree, added to [`Self::group_by_columns`]
    /// alongside the ancestor key-column chain.
    pub extra_group_by: Vec<String>,
}

impl QueryTree {
    pub fn to_table_ref(&self) -> TableRef {
        self.root.to_table_ref()
    }

    pub fn to_select_items(&self, ctx: &dyn TranslationCtx) -> Vec<SelectItem> {
        let mut out = Vec::new();
        self.root.collect_select_items(ctx, &mut out);
        out
    }

    /// Every `{alias}.{key-column}` chain entry required by a node
    /// marked `aggregatedBelow`, in root-to-leaf order, deduplicated.
    pub fn group_by_columns(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut out = Vec::new();
        self.root.collect_group_by(&mut chain, &mut out);
        out.extend(self.extra_group_by.iter().cloned());
        out.sort();
        out.dedup();
        out
    }

    pub fn has_aggregation(&self) -> bool {
        !self.group_by_columns().is_empty()
    }
}

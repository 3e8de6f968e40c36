// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Turns a debranched property tree into a [`QueryTree`]: assembling
//! joins, deterministic aliases/markup, and the `path -> SQL` map the
//! translate/fetch crates render against.
//!
//! Four entry points, named after the query shape they build:
//!
//! - [`for_direct_query`] -- a plain per-record fetch.
//! - [`for_ids_only_query`] -- the same join tree, projected down to
//!   just the root id, for the id-gathering half of a range-safe fetch.
//! - [`for_anchored_query`] -- joins the record type against a
//!   pre-populated anchor (ids + ordinal) table instead of applying the
//!   filter/range itself.
//! - [`for_super_props_query`] -- a record type's synthetic super-type
//!   projection, where the `records`/`count` properties map onto the
//!   record type's own rows rather than a joined table.
//!
//! Aggregates declared anywhere in the tree are resolved relative to
//! the node that owns them: if the aggregate's absolute collection path
//! is a descendant of (or equal to) that node's own path, the join
//! chain is rooted there; otherwise (a rare cross-branch aggregate) it
//! is rooted at the overall query root. This keeps the common case --
//! aggregates declared at the record type's top level, or at a
//! super-type's root -- exactly right without needing a global alias
//! index shared across the whole tree.

use std::collections::BTreeMap;
use std::rc::Rc;

use unified_fetch_driver::Driver;
use unified_fetch_prop_tree::{Clause, PropTreeNode};
use unified_fetch_query_filter::{Filter, FilterTranslationCtx};
use unified_fetch_record_schema::{ContainerId, PropertyDesc, Schema, StorageHint, ValueKind};
use unified_fetch_sql_ir::JoinType;
use unified_fetch_value_expr::{Literal, TranslationCtx};

use crate::alias::{anchor_label, child_alias, child_prefix, leaf_label, LetterCounter, ANCHOR_ALIAS, ROOT_ALIAS};
use crate::error::{QueryTreeError, QueryTreeResult};
use crate::node::{QueryTree, QueryTreeNode, SelectEntry, SqlBinding};
use crate::shape::{
    classify, resolve_reverse_collection_shape, resolve_reverse_target_shape, CollectionTable,
    LinkTable, PropertyShape,
};

fn internal(msg: impl Into<String>) -> QueryTreeError {
    QueryTreeError::Internal(msg.into())
}

/// Strips a map aggregate's absolute grouping-key path down to the name
/// relative to its collection, the form [`FlatColumnCtx::lookup`] expects.
fn relative_key_name<'a>(agg: &unified_fetch_prop_tree::ResolvedAggregate, key_path: &'a str) -> &'a str {
    key_path
        .strip_prefix(&format!("{}.", agg.collection_path))
        .unwrap_or(key_path)
}

/// A flat translation context over a single table's simple columns,
/// used to eagerly render presence tests and aggregate filters/exprs --
/// both of which only ever reference columns on their own row, so they
/// never need the deferred `SqlBinding::Thunk` path.
struct FlatColumnCtx<'a> {
    alias: &'a str,
    columns: BTreeMap<String, String>,
}

impl<'a> FlatColumnCtx<'a> {
    fn lookup(&self, path: &str) -> String {
        match self.columns.get(path) {
            Some(column) => format!("{}.{}", self.alias, column),
            None => format!("{}.{}", self.alias, path),
        }
    }
}

impl<'a> TranslationCtx for FlatColumnCtx<'a> {
    fn translate_prop_path(&self, path: &str) -> String {
        self.lookup(path)
    }

    fn render_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => n.to_string(),
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::DateTime(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn resolve_param(&self, name: &str) -> unified_fetch_value_expr::ExprResult<String> {
        Err(unified_fetch_value_expr::ExprError::InvalidReference {
            reference: format!("param(\"{name}\")"),
            reason: "params are not resolvable inside a presence test or aggregate filter".to_string(),
        })
    }
}

impl<'a> FilterTranslationCtx for FlatColumnCtx<'a> {
    fn render_collection_test(
        &self,
        collection_base_path: &str,
        _invert: bool,
        _nested: Option<&Filter>,
        _driver: &dyn Driver,
    ) -> unified_fetch_query_filter::FilterResult<String> {
        Err(unified_fetch_query_filter::FilterError::InvalidPredicate {
            text: collection_base_path.to_string(),
            reason: "collection tests are not reachable from a presence test or aggregate filter"
                .to_string(),
        })
    }
}

/// Flattens a container's own simple-column properties into a lookup
/// table keyed by property name, for [`FlatColumnCtx`].
fn simple_columns(schema: &Schema, container: ContainerId) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, &prop_id) in &schema.arena().container(container).properties {
        let prop = schema.arena().property(prop_id);
        if let Some(StorageHint::Column(column)) = &prop.storage {
            out.insert(name.clone(), column.clone());
        }
    }
    out
}

fn join_type_for(is_outer: bool) -> JoinType {
    if is_outer {
        JoinType::Left
    } else {
        JoinType::Inner
    }
}

struct Populated {
    select_list: Vec<SelectEntry>,
    single_row_children: Vec<QueryTreeNode>,
    expanding_child: Option<Box<QueryTreeNode>>,
    aggregated_below: bool,
    /// Rendered `{alias}.{column}` SQL of every map aggregate's grouping
    /// key found anywhere below this node -- added to the tree's overall
    /// `GROUP BY` alongside the ancestor key-column chain.
    map_group_by: Vec<String>,
}

impl Populated {
    fn empty() -> Self {
        Populated {
            select_list: Vec::new(),
            single_row_children: Vec::new(),
            expanding_child: None,
            aggregated_below: false,
            map_group_by: Vec::new(),
        }
    }

    fn merge(&mut self, other: Populated) -> QueryTreeResult<()> {
        self.select_list.extend(other.select_list);
        self.single_row_children.extend(other.single_row_children);
        if other.expanding_child.is_some() {
            if self.expanding_child.is_some() {
                return Err(internal("two expanding children converged onto one node"));
            }
            self.expanding_child = other.expanding_child;
        }
        self.aggregated_below = self.aggregated_below || other.aggregated_below;
        self.map_group_by.extend(other.map_group_by);
        Ok(())
    }
}

struct Builder<'a> {
    schema: &'a Schema,
    driver: &'a dyn Driver,
}

impl<'a> Builder<'a> {
    fn populate(
        &self,
        node: &PropTreeNode,
        alias: &str,
        key_column: &str,
        prefix: &str,
        force_outer: bool,
        path_map: &mut BTreeMap<String, SqlBinding>,
    ) -> QueryTreeResult<Populated> {
        let mut out = Populated::empty();
        let mut letters = LetterCounter::new();

        for (name, child) in &node.children {
            let child_path = child.path.clone();
            let select_clause = child.clauses.contains(&Clause::Select);

            if let Some(vexpr) = &child.value_expr {
                let binding = SqlBinding::Thunk({
                    let vexpr = vexpr.clone();
                    Rc::new(move |ctx: &dyn TranslationCtx| vexpr.translate(ctx).unwrap_or_default())
                });
                path_map.insert(child_path.clone(), binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, false),
                        binding,
                    });
                }
                continue;
            }

            if let Some(agg) = &child.aggregate {
                let letter = letters.next_letter();
                let (binding, join_chain, key_sql) =
                    self.build_aggregate(node, agg, alias, key_column, &letter, force_outer)?;
                if let Some(join_chain) = join_chain {
                    out.single_row_children.push(join_chain);
                }
                path_map.insert(child_path.clone(), binding.clone());
                out.aggregated_below = true;
                if let Some(key_sql) = key_sql {
                    out.map_group_by.push(key_sql.clone());
                    if select_clause {
                        out.select_list.push(SelectEntry {
                            label: format!("{}$key", leaf_label(prefix, name, false)),
                            binding: SqlBinding::Static(key_sql),
                        });
                    }
                }
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, false),
                        binding,
                    });
                }
                continue;
            }

            let property_id = child
                .property
                .ok_or_else(|| internal(format!("non-root node '{child_path}' has no schema property")))?;
            let prop = self.schema.arena().property(property_id).clone();
            let shape = resolve_shape(self.schema, &child_path, &prop)?;
            let letter = letters.next_letter();

            self.build_shape(
                child,
                &prop,
                &shape,
                name,
                &child_path,
                alias,
                key_column,
                prefix,
                force_outer,
                &letter,
                path_map,
                &mut out,
            )?;
        }

        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_shape(
        &self,
        child: &PropTreeNode,
        prop: &PropertyDesc,
        shape: &PropertyShape,
        name: &str,
        child_path: &str,
        alias: &str,
        key_column: &str,
        prefix: &str,
        force_outer: bool,
        letter: &str,
        path_map: &mut BTreeMap<String, SqlBinding>,
        out: &mut Populated,
    ) -> QueryTreeResult<()> {
        let select_clause = child.clauses.contains(&Clause::Select);
        let is_outer_scalar = prop.optional || force_outer;

        match shape {
            PropertyShape::ScalarSimpleColumn { column } => {
                let binding = SqlBinding::Static(format!("{alias}.{column}"));
                path_map.insert(child_path.to_string(), binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, false),
                        binding,
                    });
                }
            }

            PropertyShape::ScalarSimpleOwnTable { table } => {
                let child_alias_str = child_alias(alias, letter);
                let value_col = table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: table.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: table.parent_id_column.clone(),
                    join_type: join_type_for(is_outer_scalar),
                    join_condition: Some(format!(
                        "{child_alias_str}.{} = {alias}.{key_column}",
                        table.parent_id_column
                    )),
                    virtual_: is_outer_scalar,
                    many: false,
                    select_list: Vec::new(),
                    single_row_children: Vec::new(),
                    expanding_child: None,
                    aggregated_below: false,
                };
                let binding = SqlBinding::Static(format!("{child_alias_str}.{value_col}"));
                path_map.insert(child_path.to_string(), binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, false),
                        binding,
                    });
                }
                out.single_row_children.push(node);
            }

            PropertyShape::ScalarObjectOwnTable { table } => {
                let child_alias_str = child_alias(alias, letter);
                let child_key = table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                let child_prefix_str = child_prefix(prefix, letter);
                let mut child_path_map = BTreeMap::new();
                let populated = self.populate(
                    child,
                    &child_alias_str,
                    &child_key,
                    &child_prefix_str,
                    is_outer_scalar,
                    &mut child_path_map,
                )?;
                path_map.extend(child_path_map);

                let anchor_binding = SqlBinding::Static(format!("{child_alias_str}.{child_key}"));
                path_map.insert(child_path.to_string(), anchor_binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: anchor_label(prefix, name),
                        binding: anchor_binding,
                    });
                }

                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: table.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: child_key,
                    join_type: join_type_for(is_outer_scalar),
                    join_condition: Some(format!(
                        "{child_alias_str}.{} = {alias}.{key_column}",
                        table.parent_id_column
                    )),
                    virtual_: is_outer_scalar,
                    many: false,
                    select_list: populated.select_list,
                    single_row_children: populated.single_row_children,
                    expanding_child: populated.expanding_child,
                    aggregated_below: populated.aggregated_below,
                };
                out.single_row_children.push(node);
            }

            PropertyShape::ScalarObjectSameTable { .. } => {
                let child_prefix_str = child_prefix(prefix, letter);
                // The schema-level presence-test text classified this shape,
                // but the property tree has already resolved it against the
                // right relative context -- use that instead of re-parsing.
                let anchor_binding = if let Some(filter) = &child.presence_test {
                    let container = child
                        .container
                        .ok_or_else(|| internal(format!("object node '{child_path}' has no container")))?;
                    let columns = simple_columns(self.schema, container);
                    let ctx = FlatColumnCtx { alias, columns };
                    let sql = filter
                        .render(&ctx, self.driver)
                        .map_err(|e| internal(format!("rendering presence test for '{child_path}': {e}")))?;
                    SqlBinding::Static(sql)
                } else {
                    SqlBinding::Static(self.driver.boolean_literal(true))
                };
                path_map.insert(child_path.to_string(), anchor_binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: anchor_label(prefix, name),
                        binding: anchor_binding,
                    });
                }

                // Every query-tree machinery for a same-table nested object
                // stays on the same alias/table and key column; only the
                // markup prefix nests one level deeper.
                let populated = self.populate(child, alias, key_column, &child_prefix_str, force_outer, path_map)?;
                out.merge(populated)?;
            }

            PropertyShape::ScalarRefDirect { column } => {
                let fetched = !child.children.is_empty();
                let fk_binding = SqlBinding::Static(format!("{alias}.{column}"));
                path_map.insert(child_path.to_string(), fk_binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, fetched),
                        binding: fk_binding,
                    });
                }
                if fetched {
                    let target_id = reference_target(prop)?;
                    let target_rt = self.schema.arena().record_type(target_id);
                    let target_id_col = id_column_of(self.schema, target_id)?;
                    let child_alias_str = child_alias(alias, letter);
                    let child_prefix_str = child_prefix(prefix, letter);
                    let mut child_path_map = BTreeMap::new();
                    let populated = self.populate(
                        child,
                        &child_alias_str,
                        &target_id_col,
                        &child_prefix_str,
                        is_outer_scalar,
                        &mut child_path_map,
                    )?;
                    path_map.extend(child_path_map);
                    let node = QueryTreeNode {
                        path: child_path.to_string(),
                        table: target_rt.table.clone(),
                        alias: child_alias_str.clone(),
                        key_column: target_id_col.clone(),
                        join_type: join_type_for(is_outer_scalar),
                        join_condition: Some(format!("{child_alias_str}.{target_id_col} = {alias}.{column}")),
                        virtual_: is_outer_scalar,
                        many: false,
                        select_list: populated.select_list,
                        single_row_children: populated.single_row_children,
                        expanding_child: populated.expanding_child,
                        aggregated_below: populated.aggregated_below,
                    };
                    out.single_row_children.push(node);
                }
            }

            PropertyShape::ScalarRefLink { link } => {
                self.build_scalar_link(child, prop, link, name, child_path, alias, key_column, prefix, is_outer_scalar, letter, path_map, out)?;
            }

            PropertyShape::ScalarRefReverseDirect { target_column } => {
                let target_id = reference_target(prop)?;
                let target_rt = self.schema.arena().record_type(target_id);
                let target_id_col = id_column_of(self.schema, target_id)?;
                let child_alias_str = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let mut child_path_map = BTreeMap::new();
                let populated = self.populate(
                    child,
                    &child_alias_str,
                    &target_id_col,
                    &child_prefix_str,
                    true,
                    &mut child_path_map,
                )?;
                path_map.extend(child_path_map);
                let anchor_binding = SqlBinding::Static(format!("{child_alias_str}.{target_id_col}"));
                path_map.insert(child_path.to_string(), anchor_binding.clone());
                if select_clause {
                    out.select_list.push(SelectEntry {
                        label: anchor_label(prefix, name),
                        binding: anchor_binding,
                    });
                }
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: target_rt.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: target_id_col.clone(),
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{child_alias_str}.{target_column} = {alias}.{key_column}")),
                    virtual_: true,
                    many: false,
                    select_list: populated.select_list,
                    single_row_children: populated.single_row_children,
                    expanding_child: populated.expanding_child,
                    aggregated_below: populated.aggregated_below,
                };
                out.single_row_children.push(node);
            }

            PropertyShape::ScalarRefReverseLink { link } => {
                // Reverse link: `other_id_column` points back at us,
                // `this_id_column` points at the target (roles swapped
                // relative to the forward declaration's perspective).
                let swapped = LinkTable {
                    table: link.table.clone(),
                    this_id_column: link.other_id_column.clone(),
                    other_id_column: link.this_id_column.clone(),
                };
                self.build_scalar_link(child, prop, &swapped, name, child_path, alias, key_column, prefix, true, letter, path_map, out)?;
            }

            PropertyShape::CollectionSimple { table } => {
                let child_alias_str = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let identity_col = table
                    .key_column
                    .clone()
                    .or_else(|| table.index_column.clone())
                    .unwrap_or_else(|| table.parent_id_column.clone());
                let value_col = "value".to_string();
                let key_col = table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                let mut select_list = Vec::new();
                if select_clause {
                    select_list.push(SelectEntry {
                        label: leaf_label(&child_prefix_str, "$key", false),
                        binding: SqlBinding::Static(format!("{child_alias_str}.{identity_col}")),
                    });
                    select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, false),
                        binding: SqlBinding::Static(format!("{child_alias_str}.{value_col}")),
                    });
                }
                path_map.insert(
                    child_path.to_string(),
                    SqlBinding::Static(format!("{child_alias_str}.{value_col}")),
                );
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: table.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: key_col,
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{child_alias_str}.{} = {alias}.{key_column}", table.parent_id_column)),
                    virtual_: true,
                    many: true,
                    select_list,
                    single_row_children: Vec::new(),
                    expanding_child: None,
                    aggregated_below: false,
                };
                set_expanding(out, node)?;
            }

            PropertyShape::CollectionObject { table } => {
                let child_alias_str = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let child_key = table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                let mut child_path_map = BTreeMap::new();
                let populated = self.populate(child, &child_alias_str, &child_key, &child_prefix_str, true, &mut child_path_map)?;
                path_map.extend(child_path_map);
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: table.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: child_key,
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{child_alias_str}.{} = {alias}.{key_column}", table.parent_id_column)),
                    virtual_: true,
                    many: true,
                    select_list: populated.select_list,
                    single_row_children: populated.single_row_children,
                    expanding_child: populated.expanding_child,
                    aggregated_below: populated.aggregated_below,
                };
                set_expanding(out, node)?;
            }

            PropertyShape::CollectionRefDirect { table } => {
                let child_alias_str = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let identity_col = table.index_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                let fk_col = table.key_column.clone().unwrap_or_else(|| "ref_id".to_string());
                let fetched = !child.children.is_empty();
                let mut select_list = Vec::new();
                if select_clause {
                    select_list.push(SelectEntry {
                        label: leaf_label(&child_prefix_str, "$key", false),
                        binding: SqlBinding::Static(format!("{child_alias_str}.{identity_col}")),
                    });
                    select_list.push(SelectEntry {
                        label: leaf_label(prefix, name, fetched),
                        binding: SqlBinding::Static(format!("{child_alias_str}.{fk_col}")),
                    });
                }
                let mut single_row_children = Vec::new();
                if fetched {
                    let target_id = reference_target(prop)?;
                    let target_rt = self.schema.arena().record_type(target_id);
                    let target_id_col = id_column_of(self.schema, target_id)?;
                    let target_alias = format!("{child_alias_str}t");
                    let mut nested_path_map = BTreeMap::new();
                    let populated = self.populate(child, &target_alias, &target_id_col, &child_prefix_str, true, &mut nested_path_map)?;
                    path_map.extend(nested_path_map);
                    single_row_children.push(QueryTreeNode {
                        path: child_path.to_string(),
                        table: target_rt.table.clone(),
                        alias: target_alias.clone(),
                        key_column: target_id_col.clone(),
                        join_type: JoinType::Left,
                        join_condition: Some(format!("{target_alias}.{target_id_col} = {child_alias_str}.{fk_col}")),
                        virtual_: true,
                        many: false,
                        select_list: populated.select_list,
                        single_row_children: populated.single_row_children,
                        expanding_child: populated.expanding_child,
                        aggregated_below: populated.aggregated_below,
                    });
                }
                path_map.insert(child_path.to_string(), SqlBinding::Static(format!("{child_alias_str}.{fk_col}")));
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: table.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: table.parent_id_column.clone(),
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{child_alias_str}.{} = {alias}.{key_column}", table.parent_id_column)),
                    virtual_: true,
                    many: true,
                    select_list,
                    single_row_children,
                    expanding_child: None,
                    aggregated_below: false,
                };
                set_expanding(out, node)?;
            }

            PropertyShape::CollectionRefReverse { target_column } => {
                let target_id = reference_target(prop)?;
                let target_rt = self.schema.arena().record_type(target_id);
                let target_id_col = id_column_of(self.schema, target_id)?;
                let child_alias_str = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let mut child_path_map = BTreeMap::new();
                let populated = self.populate(child, &child_alias_str, &target_id_col, &child_prefix_str, true, &mut child_path_map)?;
                path_map.extend(child_path_map);
                let node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: target_rt.table.clone(),
                    alias: child_alias_str.clone(),
                    key_column: target_id_col,
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{child_alias_str}.{target_column} = {alias}.{key_column}")),
                    virtual_: true,
                    many: true,
                    select_list: populated.select_list,
                    single_row_children: populated.single_row_children,
                    expanding_child: populated.expanding_child,
                    aggregated_below: populated.aggregated_below,
                };
                set_expanding(out, node)?;
            }

            PropertyShape::CollectionRefLink { link } => {
                let link_alias = child_alias(alias, letter);
                let child_prefix_str = child_prefix(prefix, letter);
                let target_id = reference_target(prop)?;
                let target_rt = self.schema.arena().record_type(target_id);
                let target_id_col = id_column_of(self.schema, target_id)?;
                let target_alias = format!("{link_alias}t");
                let mut child_path_map = BTreeMap::new();
                let populated = self.populate(child, &target_alias, &target_id_col, &child_prefix_str, true, &mut child_path_map)?;
                path_map.extend(child_path_map);
                let target_node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: target_rt.table.clone(),
                    alias: target_alias.clone(),
                    key_column: target_id_col.clone(),
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{target_alias}.{target_id_col} = {link_alias}.{}", link.other_id_column)),
                    virtual_: true,
                    many: false,
                    select_list: populated.select_list,
                    single_row_children: populated.single_row_children,
                    expanding_child: populated.expanding_child,
                    aggregated_below: populated.aggregated_below,
                };
                let link_node = QueryTreeNode {
                    path: child_path.to_string(),
                    table: link.table.clone(),
                    alias: link_alias.clone(),
                    key_column: link.this_id_column.clone(),
                    join_type: JoinType::Left,
                    join_condition: Some(format!("{link_alias}.{} = {alias}.{key_column}", link.this_id_column)),
                    virtual_: true,
                    many: true,
                    select_list: Vec::new(),
                    single_row_children: vec![target_node],
                    expanding_child: None,
                    aggregated_below: false,
                };
                set_expanding(out, link_node)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_scalar_link(
        &self,
        child: &PropTreeNode,
        prop: &PropertyDesc,
        link: &LinkTable,
        name: &str,
        child_path: &str,
        alias: &str,
        key_column: &str,
        prefix: &str,
        is_outer: bool,
        letter: &str,
        path_map: &mut BTreeMap<String, SqlBinding>,
        out: &mut Populated,
    ) -> QueryTreeResult<()> {
        let select_clause = child.clauses.contains(&Clause::Select);
        let fetched = !child.children.is_empty();
        let link_alias = child_alias(alias, letter);
        let child_prefix_str = child_prefix(prefix, letter);

        let mut single_row_children = Vec::new();
        if fetched {
            let target_id = reference_target(prop)?;
            let target_rt = self.schema.arena().record_type(target_id);
            let target_id_col = id_column_of(self.schema, target_id)?;
            let target_alias = format!("{link_alias}t");
            let mut nested_path_map = BTreeMap::new();
            let populated = self.populate(child, &target_alias, &target_id_col, &child_prefix_str, is_outer, &mut nested_path_map)?;
            path_map.extend(nested_path_map);
            single_row_children.push(QueryTreeNode {
                path: child_path.to_string(),
                table: target_rt.table.clone(),
                alias: target_alias.clone(),
                key_column: target_id_col.clone(),
                join_type: join_type_for(is_outer),
                join_condition: Some(format!("{target_alias}.{target_id_col} = {link_alias}.{}", link.other_id_column)),
                virtual_: is_outer,
                many: false,
                select_list: populated.select_list,
                single_row_children: populated.single_row_children,
                expanding_child: populated.expanding_child,
                aggregated_below: populated.aggregated_below,
            });
        }

        let anchor_binding = SqlBinding::Static(format!("{link_alias}.{}", link.other_id_column));
        path_map.insert(child_path.to_string(), anchor_binding.clone());
        if select_clause {
            out.select_list.push(SelectEntry {
                label: leaf_label(prefix, name, fetched),
                binding: anchor_binding,
            });
        }

        out.single_row_children.push(QueryTreeNode {
            path: child_path.to_string(),
            table: link.table.clone(),
            alias: link_alias.clone(),
            key_column: link.this_id_column.clone(),
            join_type: join_type_for(is_outer),
            join_condition: Some(format!("{link_alias}.{} = {alias}.{key_column}", link.this_id_column)),
            virtual_: is_outer,
            many: false,
            select_list: Vec::new(),
            single_row_children,
            expanding_child: None,
            aggregated_below: false,
        });
        Ok(())
    }

    /// Builds the join chain (if any) and the rendered function-call
    /// SQL text for an aggregate attached to `owner`'s child named by
    /// `agg`. `owner_alias`/`owner_key_column` identify the node whose
    /// `populate` call we are inside (and which becomes `aggregatedBelow`).
    /// Resolves an aggregate's binding plus, if it needed its own join
    /// chain (anything but a same-row aggregate), the root node of that
    /// chain for the caller to attach under its own node.
    fn build_aggregate(
        &self,
        owner: &PropTreeNode,
        agg: &unified_fetch_prop_tree::ResolvedAggregate,
        owner_alias: &str,
        owner_key_column: &str,
        letter: &str,
        force_outer: bool,
    ) -> QueryTreeResult<(SqlBinding, Option<QueryTreeNode>, Option<String>)> {
        let owner_container = owner
            .container
            .ok_or_else(|| internal("aggregate owner node has no container"))?;

        let relative = if agg.collection_path == owner.path {
            String::new()
        } else if owner.path.is_empty() {
            agg.collection_path.clone()
        } else if let Some(stripped) = agg.collection_path.strip_prefix(&format!("{}.", owner.path)) {
            stripped.to_string()
        } else {
            agg.collection_path.clone()
        };

        if relative.is_empty() {
            // The aggregate reaches over the owner's own current rows
            // (used for a record type's synthetic super-type `count`,
            // where `records` denotes the base table's rows directly).
            let columns = simple_columns(self.schema, owner_container);
            let ctx = FlatColumnCtx { alias: owner_alias, columns };
            let binding = self.render_aggregate(agg, &ctx, owner_alias, owner_key_column)?;
            let key_sql = agg.key.as_ref().map(|key_path| ctx.lookup(relative_key_name(agg, key_path)));
            return Ok((binding, None, key_sql));
        }

        let (join_chain, final_alias, final_container, final_key_column) =
            self.build_aggregate_join_chain(owner_container, owner_alias, owner_key_column, &relative, force_outer, letter)?;
        let columns = simple_columns(self.schema, final_container);
        let ctx = FlatColumnCtx { alias: &final_alias, columns };
        let binding = self.render_aggregate(agg, &ctx, &final_alias, &final_key_column)?;
        let key_sql = agg.key.as_ref().map(|key_path| ctx.lookup(relative_key_name(agg, key_path)));
        Ok((binding, Some(join_chain), key_sql))
    }

    fn render_aggregate(
        &self,
        agg: &unified_fetch_prop_tree::ResolvedAggregate,
        ctx: &FlatColumnCtx<'_>,
        final_alias: &str,
        final_key_column: &str,
    ) -> QueryTreeResult<SqlBinding> {
        use unified_fetch_record_schema::AggregateFunction;

        let fn_name = match agg.function {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        };

        let inner = if matches!(agg.function, AggregateFunction::Count) {
            format!("{final_alias}.{final_key_column}")
        } else {
            agg.expr
                .translate(ctx)
                .map_err(|e| internal(format!("rendering aggregate expression: {e}")))?
        };
        let mut sql = format!("{fn_name}({inner})");

        if let Some(filter) = &agg.filter {
            let cond = filter
                .render(ctx, self.driver)
                .map_err(|e| internal(format!("rendering aggregate filter: {e}")))?;
            // Folded into a CASE so the filter scopes the aggregate
            // without excluding the whole joined row (which would drop
            // zero-match groups the LEFT JOIN is there to keep).
            sql = match agg.function {
                AggregateFunction::Count => format!("{fn_name}(CASE WHEN {cond} THEN {inner} END)"),
                _ => format!("{fn_name}(CASE WHEN {cond} THEN {inner} END)"),
            };
        }

        Ok(SqlBinding::Static(sql))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_aggregate_join_chain(
        &self,
        start_container: ContainerId,
        start_alias: &str,
        start_key_column: &str,
        relative_path: &str,
        force_outer: bool,
        letter_seed: &str,
    ) -> QueryTreeResult<(QueryTreeNode, String, ContainerId, String)> {
        let segments: Vec<&str> = relative_path.split('.').collect();
        let mut container = start_container;
        let mut alias = start_alias.to_string();
        let mut key_column = start_key_column.to_string();
        let mut root_node: Option<QueryTreeNode> = None;
        let mut attach_point: Vec<usize> = Vec::new();

        for (i, seg) in segments.iter().enumerate() {
            let prop_id = self
                .schema
                .arena()
                .find_property(container, seg)
                .ok_or_else(|| internal(format!("aggregate path segment '{seg}' not found")))?;
            let prop = self.schema.arena().property(prop_id).clone();
            let letter = format!("{letter_seed}{i}");
            let shape = resolve_shape(self.schema, seg, &prop)?;
            let (node, next_container, next_key) = match shape {
                PropertyShape::CollectionSimple { table } | PropertyShape::CollectionObject { table } => {
                    let child_alias_str = format!("{alias}_{letter}");
                    let key = table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone());
                    let next_container = prop.nested_container.unwrap_or(container);
                    (
                        QueryTreeNode {
                            path: String::new(),
                            table: table.table.clone(),
                            alias: child_alias_str.clone(),
                            key_column: key.clone(),
                            join_type: JoinType::Left,
                            join_condition: Some(format!("{child_alias_str}.{} = {alias}.{key_column}", table.parent_id_column)),
                            virtual_: true,
                            many: true,
                            select_list: Vec::new(),
                            single_row_children: Vec::new(),
                            expanding_child: None,
                            aggregated_below: false,
                        },
                        next_container,
                        key,
                    )
                }
                PropertyShape::CollectionRefReverse { target_column } => {
                    let target_id = reference_target(&prop)?;
                    let target_rt = self.schema.arena().record_type(target_id);
                    let target_id_col = id_column_of(self.schema, target_id)?;
                    let child_alias_str = format!("{alias}_{letter}");
                    (
                        QueryTreeNode {
                            path: String::new(),
                            table: target_rt.table.clone(),
                            alias: child_alias_str.clone(),
                            key_column: target_id_col.clone(),
                            join_type: JoinType::Left,
                            join_condition: Some(format!("{child_alias_str}.{target_column} = {alias}.{key_column}")),
                            virtual_: true,
                            many: true,
                            select_list: Vec::new(),
                            single_row_children: Vec::new(),
                            expanding_child: None,
                            aggregated_below: false,
                        },
                        target_rt.container,
                        target_id_col,
                    )
                }
                _ => {
                    return Err(QueryTreeError::UnsupportedShape(
                        relative_path.to_string(),
                        "aggregate join chains only support simple/object/reverse collections".to_string(),
                    ))
                }
            };
            alias = node.alias.clone();
            key_column = next_key.clone();
            container = next_container;

            if root_node.is_none() {
                root_node = Some(node);
                attach_point.clear();
            } else {
                attach(&mut root_node, &attach_point, node);
                attach_point.push(0);
            }
            let _ = force_outer;
        }

        let root = root_node.ok_or_else(|| internal("empty aggregate collection path"))?;
        Ok((root, alias, container, key_column))
    }
}

/// Descends `attach_point` (a path of `single_row_children[0]` hops)
/// and appends `node` as the deepest single-row child found there.
fn attach(root: &mut Option<QueryTreeNode>, attach_point: &[usize], node: QueryTreeNode) {
    let Some(root) = root.as_mut() else { return };
    let mut cursor = root;
    for _ in attach_point {
        if cursor.single_row_children.is_empty() {
            cursor.single_row_children.push(node);
            return;
        }
        let idx = cursor.single_row_children.len() - 1;
        cursor = &mut cursor.single_row_children[idx];
    }
    cursor.single_row_children.push(node);
}

fn set_expanding(out: &mut Populated, node: QueryTreeNode) -> QueryTreeResult<()> {
    if out.expanding_child.is_some() {
        return Err(internal(format!(
            "node '{}' would add a second expanding axis onto one branch",
            node.path
        )));
    }
    out.expanding_child = Some(Box::new(node));
    Ok(())
}

fn resolve_shape(schema: &Schema, path: &str, prop: &PropertyDesc) -> QueryTreeResult<PropertyShape> {
    if prop.is_reverse_reference() {
        let target_id = reference_target(prop)?;
        let target_container = schema.arena().record_type(target_id).container;
        let reverse_name = prop
            .reverse_ref_property
            .as_ref()
            .expect("is_reverse_reference implies reverse_ref_property");
        if prop.cardinality.is_collection() {
            resolve_reverse_collection_shape(schema.arena(), path, target_container, reverse_name)
        } else {
            resolve_reverse_target_shape(schema.arena(), path, target_container, reverse_name)
        }
    } else {
        classify(path, prop)
    }
}

fn reference_target(prop: &PropertyDesc) -> QueryTreeResult<unified_fetch_record_schema::RecordTypeId> {
    match &prop.value_kind {
        ValueKind::Reference(id) => Ok(*id),
        _ => Err(internal("expected a reference-kind property")),
    }
}

fn id_column_of(schema: &Schema, record_type_id: unified_fetch_record_schema::RecordTypeId) -> QueryTreeResult<String> {
    let record_type = schema.arena().record_type(record_type_id);
    let id_prop = schema.arena().property(record_type.id_property);
    match &id_prop.storage {
        Some(StorageHint::Column(c)) => Ok(c.clone()),
        _ => Err(internal(format!(
            "record type '{}' id property has no column storage",
            record_type.name
        ))),
    }
}

fn root_id_column(schema: &Schema, record_type: &unified_fetch_record_schema::RecordTypeDesc) -> QueryTreeResult<(String, String)> {
    let id_prop = schema.arena().property(record_type.id_property);
    let column = match &id_prop.storage {
        Some(StorageHint::Column(c)) => c.clone(),
        _ => {
            return Err(internal(format!(
                "record type '{}' id property has no column storage",
                record_type.name
            )))
        }
    };
    Ok((id_prop.name.clone(), column))
}

/// Builds the join tree + path map for a plain per-record fetch.
pub fn for_direct_query(schema: &Schema, driver: &dyn Driver, record_type_name: &str, prop_root: &PropTreeNode) -> QueryTreeResult<QueryTree> {
    let record_type = schema
        .get_record_type_desc(record_type_name)
        .map_err(|e| internal(e.to_string()))?;
    let (id_name, id_col) = root_id_column(schema, record_type)?;

    let mut path_map = BTreeMap::new();
    let id_binding = SqlBinding::Static(format!("{ROOT_ALIAS}.{id_col}"));
    path_map.insert("id".to_string(), id_binding.clone());
    path_map.insert(id_name.clone(), id_binding.clone());

    let builder = Builder { schema, driver };
    let populated = builder.populate(prop_root, ROOT_ALIAS, &id_col, "", false, &mut path_map)?;

    let mut select_list = vec![SelectEntry {
        label: id_name,
        binding: id_binding,
    }];
    select_list.extend(populated.select_list);

    let root = QueryTreeNode {
        path: String::new(),
        table: record_type.table.clone(),
        alias: ROOT_ALIAS.to_string(),
        key_column: id_col,
        join_type: JoinType::Inner,
        join_condition: None,
        virtual_: false,
        many: false,
        select_list,
        single_row_children: populated.single_row_children,
        expanding_child: populated.expanding_child,
        aggregated_below: populated.aggregated_below,
    };

    tracing::debug!(
        record_type_name,
        root_alias = ROOT_ALIAS,
        single_row_joins = root.single_row_children.len(),
        "query-tree: assigned aliases for direct query"
    );
    Ok(QueryTree { root, path_map, extra_group_by: populated.map_group_by })
}

/// The same join tree as [`for_direct_query`], with the projection
/// stripped down to just the root id -- used for the id-gathering half
/// of a range-safe multi-branch fetch.
pub fn for_ids_only_query(schema: &Schema, driver: &dyn Driver, record_type_name: &str, prop_root: &PropTreeNode) -> QueryTreeResult<QueryTree> {
    let mut tree = for_direct_query(schema, driver, record_type_name, prop_root)?;
    let id_binding = tree
        .path_map
        .get("id")
        .cloned()
        .ok_or_else(|| internal("direct query tree has no 'id' binding"))?;
    tree.root.select_list = vec![SelectEntry {
        label: "id".to_string(),
        binding: id_binding,
    }];
    Ok(tree)
}

/// Joins the record type against a pre-populated anchor table
/// (`id`, `ord`) instead of applying the filter/range directly --
/// `ord` drives final row ordering, and the join itself is `INNER`
/// (a row not in the anchor table should not appear at all).
pub fn for_anchored_query(schema: &Schema, driver: &dyn Driver, record_type_name: &str, prop_root: &PropTreeNode, anchor_table: &str) -> QueryTreeResult<QueryTree> {
    let record_type = schema
        .get_record_type_desc(record_type_name)
        .map_err(|e| internal(e.to_string()))?;
    let (id_name, id_col) = root_id_column(schema, record_type)?;

    let mut path_map = BTreeMap::new();
    let id_binding = SqlBinding::Static(format!("{ROOT_ALIAS}.{id_col}"));
    path_map.insert("id".to_string(), id_binding.clone());
    path_map.insert(id_name.clone(), id_binding.clone());

    let builder = Builder { schema, driver };
    let populated = builder.populate(prop_root, ROOT_ALIAS, &id_col, "", false, &mut path_map)?;

    let mut select_list = vec![SelectEntry {
        label: id_name,
        binding: id_binding,
    }];
    select_list.extend(populated.select_list);

    let mut single_row_children = populated.single_row_children;
    single_row_children.push(QueryTreeNode {
        path: String::new(),
        table: anchor_table.to_string(),
        alias: ANCHOR_ALIAS.to_string(),
        key_column: "id".to_string(),
        join_type: JoinType::Inner,
        join_condition: Some(format!("{ANCHOR_ALIAS}.id = {ROOT_ALIAS}.{id_col}")),
        virtual_: false,
        many: false,
        select_list: Vec::new(),
        single_row_children: Vec::new(),
        expanding_child: None,
        aggregated_below: false,
    });

    let root = QueryTreeNode {
        path: String::new(),
        table: record_type.table.clone(),
        alias: ROOT_ALIAS.to_string(),
        key_column: id_col,
        join_type: JoinType::Inner,
        join_condition: None,
        virtual_: false,
        many: false,
        select_list,
        single_row_children,
        expanding_child: populated.expanding_child,
        aggregated_below: populated.aggregated_below,
    };

    Ok(QueryTree { root, path_map, extra_group_by: populated.map_group_by })
}

/// Builds a record type's synthetic super-type projection: `records`
/// denotes the base table's own rows directly (no join), so any
/// aggregate rooted there (`count`, or a user-declared super aggregate)
/// resolves through `build_aggregate`'s `relative.is_empty()` case.
pub fn for_super_props_query(schema: &Schema, driver: &dyn Driver, record_type_name: &str, super_prop_root: &PropTreeNode) -> QueryTreeResult<QueryTree> {
    let record_type = schema
        .get_record_type_desc(record_type_name)
        .map_err(|e| internal(e.to_string()))?;
    let (_id_name, id_col) = root_id_column(schema, record_type)?;

    let mut path_map = BTreeMap::new();
    let builder = Builder { schema, driver };
    let populated = builder.populate(super_prop_root, ROOT_ALIAS, &id_col, "", false, &mut path_map)?;

    let root = QueryTreeNode {
        path: String::new(),
        table: record_type.table.clone(),
        alias: ROOT_ALIAS.to_string(),
        key_column: id_col,
        join_type: JoinType::Inner,
        join_condition: None,
        virtual_: false,
        many: false,
        select_list: populated.select_list,
        single_row_children: populated.single_row_children,
        expanding_child: populated.expanding_child,
        aggregated_below: populated.aggregated_below,
    };

    Ok(QueryTree { root, path_map, extra_group_by: populated.map_group_by })
}

/// The join tree plus the equi-join condition an `EXISTS`/`NOT EXISTS`
/// subquery needs against the outer row it is scoped under.
pub struct ExistsSubquery {
    pub query_tree: QueryTree,
    pub equi_join_condition: String,
}

/// Clones a single collection's ancestor chain into a standalone query
/// tree rooted at its own table, for rendering as an `EXISTS (SELECT
/// TRUE FROM ... WHERE ...)` subquery. `collection_node` is the
/// property-tree node for the collection property itself (already
/// built, e.g. via `prop_tree::build_simple_props_tree` scoped to it);
/// `letter` disambiguates this subquery's alias from sibling ones under
/// the same outer node.
pub fn build_exists_subquery(
    schema: &Schema,
    driver: &dyn Driver,
    collection_node: &PropTreeNode,
    outer_alias: &str,
    outer_key_column: &str,
    letter: &str,
) -> QueryTreeResult<ExistsSubquery> {
    let property_id = collection_node
        .property
        .ok_or_else(|| internal("exists-subquery node has no schema property"))?;
    let prop = schema.arena().property(property_id).clone();
    let shape = resolve_shape(schema, &collection_node.path, &prop)?;
    let root_alias = format!("{outer_alias}_{letter}");

    let builder = Builder { schema, driver };
    let (table, key_column, parent_id_column, equi_join) = match &shape {
        PropertyShape::CollectionSimple { table } | PropertyShape::CollectionObject { table } => (
            table.table.clone(),
            table.key_column.clone().unwrap_or_else(|| table.parent_id_column.clone()),
            table.parent_id_column.clone(),
            format!("{root_alias}.{} = {outer_alias}.{outer_key_column}", table.parent_id_column),
        ),
        PropertyShape::CollectionRefDirect { table } => (
            table.table.clone(),
            table.parent_id_column.clone(),
            table.parent_id_column.clone(),
            format!("{root_alias}.{} = {outer_alias}.{outer_key_column}", table.parent_id_column),
        ),
        PropertyShape::CollectionRefReverse { target_column } => {
            let target_id = reference_target(&prop)?;
            let target_rt = schema.arena().record_type(target_id);
            let target_id_col = id_column_of(schema, target_id)?;
            (
                target_rt.table.clone(),
                target_id_col,
                target_column.clone(),
                format!("{root_alias}.{target_column} = {outer_alias}.{outer_key_column}"),
            )
        }
        PropertyShape::CollectionRefLink { link } => (
            link.table.clone(),
            link.this_id_column.clone(),
            link.this_id_column.clone(),
            format!("{root_alias}.{} = {outer_alias}.{outer_key_column}", link.this_id_column),
        ),
        _ => {
            return Err(QueryTreeError::UnsupportedShape(
                collection_node.path.clone(),
                "only collection shapes can anchor an EXISTS subquery".to_string(),
            ))
        }
    };
    let _ = parent_id_column;

    let mut path_map = BTreeMap::new();
    let populated = builder.populate(collection_node, &root_alias, &key_column, "", false, &mut path_map)?;

    let root = QueryTreeNode {
        path: collection_node.path.clone(),
        table,
        alias: root_alias,
        key_column,
        join_type: JoinType::Inner,
        join_condition: None,
        virtual_: false,
        many: false,
        select_list: populated.select_list,
        single_row_children: populated.single_row_children,
        expanding_child: populated.expanding_child,
        aggregated_below: populated.aggregated_below,
    };

    Ok(ExistsSubquery {
        query_tree: QueryTree { root, path_map, extra_group_by: populated.map_group_by },
        equi_join_condition: equi_join,
    })
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use unified_fetch_driver::PostgresLikeDriver;
    use unified_fetch_prop_tree::{Clause, PropTreeNode, ResolvedAggregate};
    use unified_fetch_query_filter::{Filter, Op};
    use unified_fetch_record_schema::{
        AggregateFunction, AggregateSpec, Cardinality, ContainerId, PropertyId, RecordTypeId, SchemaBuilder,
    };
    use unified_fetch_sql_ir::SelectItem;
    use unified_fetch_value_expr::{compile, ExprContext, ExprResult, PermissiveResolver};

    use super::*;

    fn root_ctx() -> ExprContext<'static> {
        static RESOLVER: PermissiveResolver = PermissiveResolver;
        ExprContext::root(&RESOLVER)
    }

    /// A context that should never actually be consulted -- every
    /// binding in these fixtures is `Static`, so reaching a translation
    /// call here means a test built something other than what it meant to.
    struct NoopCtx;
    impl TranslationCtx for NoopCtx {
        fn translate_prop_path(&self, path: &str) -> String {
            panic!("unexpected prop path translation: {path}")
        }
        fn render_literal(&self, _literal: &Literal) -> String {
            panic!("unexpected literal render")
        }
        fn resolve_param(&self, name: &str) -> ExprResult<String> {
            panic!("unexpected param resolution: {name}")
        }
    }

    /// `Customer(id, name, billingAddress{street}, primaryOrder: Order,
    /// tags[], orders[]: Order, orderCount)` / `Order(id, customer, amount)`.
    fn sample_schema() -> (Schema, ContainerId, ContainerId) {
        let mut builder = SchemaBuilder::new();
        let customer_id = builder.reserve_record_type("Customer", "customers").unwrap();
        let order_id = builder.reserve_record_type("Order", "orders").unwrap();

        let billing_container = builder.add_nested_container(
            customer_id,
            vec![PropertyDesc::new("street", ValueKind::String, Cardinality::Scalar)
                .with_storage(StorageHint::Column("billing_street".into()))],
        );

        builder
            .define_record_type(
                order_id,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("customer", ValueKind::Reference(customer_id), Cardinality::Scalar)
                        .with_storage(StorageHint::Column("customer_id".into())),
                    PropertyDesc::new("amount", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("amount".into())),
                    PropertyDesc::new("status", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("status".into())),
                ],
            )
            .unwrap();

        builder
            .define_record_type(
                customer_id,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("name".into())),
                    PropertyDesc::new("billingAddress", ValueKind::Object, Cardinality::Scalar)
                        .optional()
                        .with_presence_test("billingAddress.street")
                        .with_nested_container(billing_container),
                    PropertyDesc::new("primaryOrder", ValueKind::Reference(order_id), Cardinality::Scalar)
                        .with_storage(StorageHint::Column("primary_order_id".into())),
                    PropertyDesc::new("tags", ValueKind::String, Cardinality::Array).with_storage(
                        StorageHint::Table {
                            table: "customer_tags".into(),
                            parent_id_column: "customer_id".into(),
                            key_column: None,
                            index_column: Some("pos".into()),
                        },
                    ),
                    PropertyDesc::new("orders", ValueKind::Reference(order_id), Cardinality::Array)
                        .with_reverse_ref("customer")
                        // Own storage is never consulted for a reverse collection's
                        // shape, but schema finalization still requires something here.
                        .with_storage(StorageHint::Table {
                            table: "_unused".into(),
                            parent_id_column: "_unused".into(),
                            key_column: None,
                            index_column: None,
                        }),
                    PropertyDesc::new("orderCount", ValueKind::Number, Cardinality::Scalar).with_aggregate(
                        AggregateSpec {
                            collection_path: "orders".into(),
                            function: AggregateFunction::Count,
                            expr: "id".into(),
                            filter: None,
                            key: None,
                        },
                    ),
                ],
            )
            .unwrap();

        let schema = builder.finalize().unwrap();
        let customer_container = schema.get_record_type_desc("Customer").unwrap().container;
        let order_container = schema.get_record_type_desc("Order").unwrap().container;
        (schema, customer_container, order_container)
    }

    fn prop_id(schema: &Schema, container: ContainerId, name: &str) -> PropertyId {
        schema.arena().find_property(container, name).unwrap()
    }

    fn root_node(container: ContainerId) -> PropTreeNode {
        PropTreeNode::root(container, ValueKind::Reference(RecordTypeId(0)))
    }

    fn leaf(schema: &Schema, owner: ContainerId, name: &str, path: &str) -> PropTreeNode {
        let property_id = prop_id(schema, owner, name);
        let property = schema.arena().property(property_id);
        PropTreeNode {
            path: path.to_string(),
            name: name.to_string(),
            property: Some(property_id),
            value_kind: property.value_kind.clone(),
            cardinality: property.cardinality,
            container: None,
            clauses: BTreeSet::from([Clause::Select]),
            children: Default::default(),
            value_expr: None,
            aggregate: None,
            presence_test: None,
            filter: None,
            order: None,
        }
    }

    fn branch(
        schema: &Schema,
        owner: ContainerId,
        name: &str,
        path: &str,
        nested_container: ContainerId,
        children: Vec<(&str, PropTreeNode)>,
    ) -> PropTreeNode {
        let property_id = prop_id(schema, owner, name);
        let property = schema.arena().property(property_id);
        PropTreeNode {
            path: path.to_string(),
            name: name.to_string(),
            property: Some(property_id),
            value_kind: property.value_kind.clone(),
            cardinality: property.cardinality,
            container: Some(nested_container),
            clauses: BTreeSet::from([Clause::Select]),
            children: children.into_iter().map(|(n, c)| (n.to_string(), c)).collect(),
            value_expr: None,
            aggregate: None,
            presence_test: None,
            filter: None,
            order: None,
        }
    }

    #[test]
    fn direct_query_selects_scalar_column() {
        let (schema, customer, _order) = sample_schema();
        let mut root = root_node(customer);
        root.children.insert("name".to_string(), leaf(&schema, customer, "name", "name"));

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        let items = tree.to_select_items(&NoopCtx);
        assert_eq!(
            items,
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "z.name".to_string(), alias: "name".to_string() },
            ]
        );
        assert!(!tree.has_aggregation());
        let table_ref = tree.to_table_ref();
        assert_eq!(table_ref.table, "customers");
        assert_eq!(table_ref.alias, "z");
        assert!(table_ref.joins.is_empty());
    }

    #[test]
    fn fetched_reference_joins_target_table() {
        let (schema, customer, order) = sample_schema();
        let mut root = root_node(customer);
        root.children.insert(
            "primaryOrder".to_string(),
            branch(
                &schema,
                customer,
                "primaryOrder",
                "primaryOrder",
                order,
                vec![("amount", leaf(&schema, order, "amount", "primaryOrder.amount"))],
            ),
        );

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "z.primary_order_id".to_string(), alias: "primaryOrder:".to_string() },
                SelectItem::Expr { expr: "za.amount".to_string(), alias: "a$amount".to_string() },
            ]
        );
        assert_eq!(
            tree.path_map.get("primaryOrder.amount").unwrap().resolve(&NoopCtx),
            "za.amount"
        );

        let table_ref = tree.to_table_ref();
        assert_eq!(table_ref.joins.len(), 1);
        let join = &table_ref.joins[0];
        assert_eq!(join.join_type, JoinType::Inner);
        assert_eq!(join.table.table, "orders");
        assert_eq!(join.table.alias, "za");
        assert_eq!(join.condition, "za.id = z.primary_order_id");
    }

    #[test]
    fn optional_same_table_object_renders_presence_test() {
        let (schema, customer, _order) = sample_schema();
        let billing_container = schema
            .arena()
            .property(prop_id(&schema, customer, "billingAddress"))
            .nested_container
            .unwrap();

        let mut node = branch(
            &schema,
            customer,
            "billingAddress",
            "billingAddress",
            billing_container,
            vec![("street", leaf(&schema, billing_container, "street", "billingAddress.street"))],
        );
        node.presence_test = Some(Filter::ValueTest {
            expr: compile(&root_ctx(), "street").unwrap(),
            op: Op::Empty,
            invert: true,
            params: Vec::new(),
        });

        let mut root = root_node(customer);
        root.children.insert("billingAddress".to_string(), node);

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr {
                    expr: "z.billing_street IS NOT NULL".to_string(),
                    alias: "billingAddress".to_string(),
                },
                SelectItem::Expr { expr: "z.billing_street".to_string(), alias: "a$street".to_string() },
            ]
        );
        assert!(tree.to_table_ref().joins.is_empty());
    }

    #[test]
    fn simple_collection_becomes_expanding_child() {
        let (schema, customer, _order) = sample_schema();
        let mut root = root_node(customer);
        root.children.insert("tags".to_string(), leaf(&schema, customer, "tags", "tags"));

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "za.pos".to_string(), alias: "a$$key".to_string() },
                SelectItem::Expr { expr: "za.value".to_string(), alias: "tags".to_string() },
            ]
        );
        let table_ref = tree.to_table_ref();
        let join = &table_ref.joins[0];
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.table.table, "customer_tags");
        assert_eq!(join.condition, "za.customer_id = z.id");
    }

    #[test]
    fn reverse_collection_joins_target_table_directly() {
        let (schema, customer, order) = sample_schema();
        let mut root = root_node(customer);
        root.children.insert(
            "orders".to_string(),
            branch(
                &schema,
                customer,
                "orders",
                "orders",
                order,
                vec![("amount", leaf(&schema, order, "amount", "orders.amount"))],
            ),
        );

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "za.amount".to_string(), alias: "a$amount".to_string() },
            ]
        );
        let table_ref = tree.to_table_ref();
        let join = &table_ref.joins[0];
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.table.table, "orders");
        assert_eq!(join.table.alias, "za");
        assert_eq!(join.condition, "za.customer_id = z.id");
    }

    #[test]
    fn aggregate_count_builds_its_own_join_chain_and_group_by() {
        let (schema, customer, _order) = sample_schema();
        let mut root = root_node(customer);
        let property_id = prop_id(&schema, customer, "orderCount");
        let property = schema.arena().property(property_id);
        root.children.insert(
            "orderCount".to_string(),
            PropTreeNode {
                path: "orderCount".to_string(),
                name: "orderCount".to_string(),
                property: Some(property_id),
                value_kind: property.value_kind.clone(),
                cardinality: property.cardinality,
                container: None,
                clauses: BTreeSet::from([Clause::Select]),
                children: Default::default(),
                value_expr: None,
                aggregate: Some(ResolvedAggregate {
                    function: AggregateFunction::Count,
                    collection_path: "orders".to_string(),
                    expr: compile(&root_ctx(), "id").unwrap(),
                    filter: None,
                    key: None,
                }),
                presence_test: None,
                filter: None,
                order: None,
            },
        );

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "COUNT(z_a0.id)".to_string(), alias: "orderCount".to_string() },
            ]
        );
        assert!(tree.has_aggregation());
        assert_eq!(tree.group_by_columns(), vec!["z.id".to_string()]);

        let table_ref = tree.to_table_ref();
        assert_eq!(table_ref.joins.len(), 1);
        let join = &table_ref.joins[0];
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.table.table, "orders");
        assert_eq!(join.table.alias, "z_a0");
        assert_eq!(join.condition, "z_a0.customer_id = z.id");
    }

    #[test]
    fn map_aggregate_groups_by_its_key_column_alongside_the_root_id() {
        let (schema, customer, _order) = sample_schema();
        let mut root = root_node(customer);
        let property_id = prop_id(&schema, customer, "orderCount");
        let property = schema.arena().property(property_id);
        root.children.insert(
            "itemsByStatus".to_string(),
            PropTreeNode {
                path: "itemsByStatus".to_string(),
                name: "itemsByStatus".to_string(),
                property: Some(property_id),
                value_kind: property.value_kind.clone(),
                cardinality: property.cardinality,
                container: None,
                clauses: BTreeSet::from([Clause::Select]),
                children: Default::default(),
                value_expr: None,
                aggregate: Some(ResolvedAggregate {
                    function: AggregateFunction::Count,
                    collection_path: "orders".to_string(),
                    expr: compile(&root_ctx(), "id").unwrap(),
                    filter: None,
                    key: Some("orders.status".to_string()),
                }),
                presence_test: None,
                filter: None,
                order: None,
            },
        );

        let tree = for_direct_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![
                SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() },
                SelectItem::Expr { expr: "z_a0.status".to_string(), alias: "itemsByStatus$key".to_string() },
                SelectItem::Expr { expr: "COUNT(z_a0.id)".to_string(), alias: "itemsByStatus".to_string() },
            ]
        );
        let mut group_by = tree.group_by_columns();
        group_by.sort();
        assert_eq!(group_by, vec!["z.id".to_string(), "z_a0.status".to_string()]);
    }

    #[test]
    fn ids_only_query_strips_select_list_to_root_id() {
        let (schema, customer, _order) = sample_schema();
        let mut root = root_node(customer);
        root.children.insert("name".to_string(), leaf(&schema, customer, "name", "name"));

        let tree = for_ids_only_query(&schema, &PostgresLikeDriver, "Customer", &root).unwrap();
        assert_eq!(
            tree.to_select_items(&NoopCtx),
            vec![SelectItem::Expr { expr: "z.id".to_string(), alias: "id".to_string() }]
        );
    }

    #[test]
    fn anchored_query_inner_joins_the_anchor_table() {
        let (schema, customer, _order) = sample_schema();
        let root = root_node(customer);
        let tree = for_anchored_query(&schema, &PostgresLikeDriver, "Customer", &root, "fetch_anchor").unwrap();
        let table_ref = tree.to_table_ref();
        let join = table_ref
            .joins
            .iter()
            .find(|j| j.table.table == "fetch_anchor")
            .expect("anchor join present");
        assert_eq!(join.join_type, JoinType::Inner);
        assert_eq!(join.table.alias, ANCHOR_ALIAS);
        assert_eq!(join.condition, format!("{ANCHOR_ALIAS}.id = z.id"));
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The fetch compiler: turns a [`QuerySpec`] plus a schema into the
//! ordered statement list §4.8's decision tree describes -- super
//! queries, an optional anchor pre/post pair, and one SELECT per
//! debranched property axis.
//!
//! Grounding notes on two points the property/query-tree builders leave
//! open (recorded in full in `DESIGN.md`):
//!
//! - A super-type's own id property is a calculated literal with no
//!   column storage, so [`for_super_props_query`] is always called with
//!   the *underlying* record type's name (whose id is column-backed),
//!   not the super-type's own name -- the two share the same `table`,
//!   so the join tree this produces is identical either way.
//! - A super query's `count`/aggregate properties mark the tree root
//!   `aggregated_below`, which would add a `GROUP BY` over the root id
//!   -- correct for an aggregate nested under a joined parent, wrong
//!   for a standalone super query, which must produce exactly one row.
//!   The compiler never applies `group_by_columns()` to a super query
//!   for this reason.

use std::collections::BTreeSet;
use std::rc::Rc;

use unified_fetch_driver::Driver;
use unified_fetch_prop_tree::{
    build_props_tree_branches, build_simple_props_tree, build_super_props_tree_branches, Clause, FetchOptions,
    PropTreeNode, SchemaCollectionResolver, SchemaContainerResolver,
};
use unified_fetch_query_filter::{parse_filter, parse_order, Filter, Order, Range};
use unified_fetch_query_tree::{
    for_anchored_query, for_direct_query, for_ids_only_query, for_super_props_query, QueryTree, QueryTreeNode,
    ANCHOR_ALIAS, ROOT_ALIAS,
};
use unified_fetch_record_schema::{Schema, SUPER_TYPE_RECORDS_PROPERTY};
use unified_fetch_sql_ir::{OrderBy, SelectItem, SelectStatement, SortDirection, Statement};
use unified_fetch_translate::{ParamsHandler, QueryContext};
use unified_fetch_value_expr::{ExprContext, TranslationCtx};

use crate::error::FetchResult;
use crate::schema_plan::NodeSchema;
use crate::spec::QuerySpec;

/// One debranched main-tree SELECT, plus the layout its result rows
/// reconstruct against.
pub struct CompiledBranch {
    pub statement: Statement,
    pub schema: NodeSchema,
}

/// One debranched super-tree SELECT.
pub struct CompiledSuper {
    pub statement: Statement,
    pub super_type_name: String,
    pub schema: NodeSchema,
    /// True when this branch's own axis is the synthetic `records`
    /// collection (selected bare or with nested sub-paths), rather than
    /// a scalar super-property like `count`. The executor folds a
    /// `records`-axis branch's rows into the top-level `referredRecords`
    /// array instead of merging them as a named super-property, since
    /// `records` on a super-type is itself a collection of references
    /// back to the underlying record type, not a scalar value.
    pub is_records: bool,
}

/// A fully compiled fetch: every statement the executor must run, in
/// the order it must run them, plus enough layout information to fold
/// each branch's rows back into JSON.
pub struct CompiledFetch {
    pub record_type_name: String,
    pub id_field: String,
    /// True when every requested prop is a super-property, so the
    /// executor must skip record fetching entirely.
    pub super_only: bool,
    pub super_queries: Vec<CompiledSuper>,
    pub pre_statements: Vec<Statement>,
    pub main_queries: Vec<CompiledBranch>,
    pub post_statements: Vec<Statement>,
}

impl CompiledFetch {
    pub fn total_statements(&self) -> usize {
        self.super_queries.len() + self.pre_statements.len() + self.main_queries.len() + self.post_statements.len()
    }
}

pub struct FetchCompiler;

impl FetchCompiler {
    pub fn compile(
        schema: &Schema,
        driver: &dyn Driver,
        record_type_name: &str,
        spec: &QuerySpec,
        params: &dyn ParamsHandler,
    ) -> FetchResult<CompiledFetch> {
        let record_type = schema.get_record_type_desc(record_type_name)?;
        let id_field = schema.arena().property(record_type.id_property).name.clone();

        let (record_props, super_prop_names) = spec.split_props();
        let (filter, order) = parse_filter_and_order(schema, record_type_name, spec.filter.as_ref(), &spec.order)?;
        let range = spec.range.map(|(offset, limit)| Range::new(offset, limit)).transpose()?;

        let mut super_queries = Vec::new();
        for branch in super_tree_branches(schema, record_type_name, &super_prop_names)? {
            super_queries.push(compile_super_query(
                schema,
                driver,
                record_type_name,
                params,
                &branch,
                filter.as_ref(),
            )?);
        }

        let mut pre_statements = Vec::new();
        let mut main_queries = Vec::new();
        let mut post_statements = Vec::new();

        if !spec.is_super_only() {
            let needed_patterns = needed_select_patterns(&record_props, filter.as_ref(), &order);
            let branches = build_props_tree_branches(
                schema,
                record_type_name,
                Clause::Select,
                &needed_patterns,
                &FetchOptions::default(),
                None,
            )?;

            if branches.len() == 1 {
                let probe = for_direct_query(schema, driver, record_type_name, &branches[0])?;
                let has_expanding_child = tree_has_expanding_child(&probe.root);
                if range.is_some() && has_expanding_child {
                    let (pre, mut compiled, post) = compile_anchored(
                        schema,
                        driver,
                        record_type_name,
                        params,
                        &branches,
                        filter.as_ref(),
                        &order,
                        range,
                    )?;
                    pre_statements.push(pre);
                    main_queries.append(&mut compiled);
                    post_statements.push(post);
                } else {
                    main_queries.push(compile_direct_branch(
                        schema,
                        driver,
                        record_type_name,
                        params,
                        &branches[0],
                        filter.as_ref(),
                        &order,
                        range,
                    )?);
                }
            } else if branches.len() > 1 {
                let (pre, mut compiled, post) = compile_anchored(
                    schema,
                    driver,
                    record_type_name,
                    params,
                    &branches,
                    filter.as_ref(),
                    &order,
                    range,
                )?;
                pre_statements.push(pre);
                main_queries.append(&mut compiled);
                post_statements.push(post);
            }
        }

        Ok(CompiledFetch {
            record_type_name: record_type_name.to_string(),
            id_field,
            super_only: spec.is_super_only(),
            super_queries,
            pre_statements,
            main_queries,
            post_statements,
        })
    }
}

/// True if any node in the subtree rooted at `node` (including `node`
/// itself) can multiply its parent's row count -- a direct `LIMIT` over
/// such a tree is unsound, since one logical record can span several
/// joined rows.
fn tree_has_expanding_child(node: &QueryTreeNode) -> bool {
    node.all_children().any(|c| c.many || tree_has_expanding_child(c))
}

fn parse_filter_and_order(
    schema: &Schema,
    record_type_name: &str,
    filter_json: Option<&serde_json::Value>,
    order_specs: &[String],
) -> FetchResult<(Option<Filter>, Order)> {
    let record_type = schema.get_record_type_desc(record_type_name)?;
    let containers = SchemaContainerResolver { schema, root_container: record_type.container };
    let collections = SchemaCollectionResolver { schema, root_container: record_type.container };
    let ctx = ExprContext::root(&containers);

    let filter = filter_json.map(|raw| parse_filter(&ctx, &collections, raw)).transpose()?;
    let order = parse_order(&ctx, order_specs)?;
    Ok((filter, order))
}

/// Every path a filter needs resolved *in the tree it renders against*.
/// A `CollectionTest` renders as its own, wholly separate `EXISTS`
/// subquery (see [`unified_fetch_translate::context::QueryContext::render_collection_test`]):
/// it re-enters the property/query-tree builders for just that
/// collection axis and never looks the base path or any nested
/// predicate up in the outer tree's path map, so neither belongs in
/// the outer tree's own pattern list.
fn collect_filter_paths(filter: &Filter, out: &mut BTreeSet<String>) {
    match filter {
        Filter::Junction { elements, .. } => {
            for element in elements {
                collect_filter_paths(element, out);
            }
        }
        Filter::ValueTest { expr, .. } => out.extend(expr.used_paths.iter().cloned()),
        Filter::CollectionTest { .. } => {}
    }
}

/// Every path the main SELECT must cover: the requested props plus
/// whatever the filter/order reference, even when not themselves
/// selected. Paths pulled in only for filter/order end up projected
/// (and so visible in the result) too -- `prop-tree`'s tree builder
/// takes one pattern list per call, with no way to mark a subset
/// "selection scaffolding only", so this is a documented limitation
/// rather than a hidden one.
fn needed_select_patterns(record_props: &[String], filter: Option<&Filter>, order: &Order) -> Vec<String> {
    let mut needed: BTreeSet<String> = record_props.iter().cloned().collect();
    if let Some(filter) = filter {
        collect_filter_paths(filter, &mut needed);
    }
    for element in &order.elements {
        needed.extend(element.expr.used_paths.iter().cloned());
    }
    needed.into_iter().collect()
}

fn order_by_items(order: &Order, ctx: &dyn TranslationCtx) -> FetchResult<Vec<OrderBy>> {
    order
        .elements
        .iter()
        .map(|element| {
            let expr = element.expr.translate(ctx)?;
            let direction = if element.descending { SortDirection::Desc } else { SortDirection::Asc };
            Ok(OrderBy { expr, direction })
        })
        .collect::<Result<Vec<_>, unified_fetch_value_expr::ExprError>>()
        .map_err(Into::into)
}

fn super_tree_branches(
    schema: &Schema,
    record_type_name: &str,
    super_prop_names: &[String],
) -> FetchResult<Vec<PropTreeNode>> {
    if super_prop_names.is_empty() {
        return Ok(Vec::new());
    }
    Ok(build_super_props_tree_branches(schema, record_type_name, super_prop_names)?)
}

fn compile_super_query(
    schema: &Schema,
    driver: &dyn Driver,
    record_type_name: &str,
    params: &dyn ParamsHandler,
    branch: &PropTreeNode,
    filter: Option<&Filter>,
) -> FetchResult<CompiledSuper> {
    let super_tree = Rc::new(for_super_props_query(schema, driver, record_type_name, branch)?);

    let (ctx_tree, where_clause) = match filter {
        None => (Rc::clone(&super_tree), None),
        Some(filter) => {
            let mut paths = BTreeSet::new();
            collect_filter_paths(filter, &mut paths);
            let patterns: Vec<String> = paths.into_iter().collect();
            let filter_root = build_simple_props_tree(schema, record_type_name, Clause::Filter, &patterns)?;
            let filter_tree = for_direct_query(schema, driver, record_type_name, &filter_root)?;

            let mut merged_path_map = super_tree.path_map.clone();
            merged_path_map.extend(filter_tree.path_map);
            let merged = Rc::new(QueryTree {
                root: super_tree.root.clone(),
                path_map: merged_path_map,
                extra_group_by: super_tree.extra_group_by.clone(),
            });

            let ctx = QueryContext::new(schema, driver, params, record_type_name, Rc::clone(&merged));
            let where_clause = filter.render(&ctx, driver)?;
            (merged, Some(where_clause))
        }
    };

    let ctx = QueryContext::new(schema, driver, params, record_type_name, Rc::clone(&ctx_tree));
    let mut statement = SelectStatement::new(ctx_tree.to_table_ref()).with_projection(ctx_tree.to_select_items(&ctx));
    if let Some(where_clause) = where_clause {
        statement = statement.with_where(where_clause);
    }

    let schema_plan = NodeSchema::for_tree_root(&super_tree.root);
    let super_type_name = schema
        .get_record_type_desc(record_type_name)?
        .super_type
        .map(|id| schema.arena().record_type(id).name.clone())
        .unwrap_or_else(|| format!("{record_type_name}$Super"));
    let is_records = branch.children.contains_key(SUPER_TYPE_RECORDS_PROPERTY);

    Ok(CompiledSuper { statement: Statement::Select(statement), super_type_name, schema: schema_plan, is_records })
}

fn compile_direct_branch(
    schema: &Schema,
    driver: &dyn Driver,
    record_type_name: &str,
    params: &dyn ParamsHandler,
    branch: &PropTreeNode,
    filter: Option<&Filter>,
    order: &Order,
    range: Option<Range>,
) -> FetchResult<CompiledBranch> {
    let tree = Rc::new(for_direct_query(schema, driver, record_type_name, branch)?);
    let ctx = QueryContext::new(schema, driver, params, record_type_name, Rc::clone(&tree));

    let mut statement = SelectStatement::new(tree.to_table_ref()).with_projection(tree.to_select_items(&ctx));
    if let Some(filter) = filter {
        statement = statement.with_where(filter.render(&ctx, driver)?);
    }
    let group_by = tree.group_by_columns();
    if !group_by.is_empty() {
        statement = statement.with_group_by(group_by);
    }
    if !order.elements.is_empty() {
        statement = statement.with_order_by(order_by_items(order, &ctx)?);
    }
    if let Some(range) = range {
        statement = statement.with_range(range.offset, range.limit);
    }

    let schema_plan = NodeSchema::for_tree_root(&tree.root);
    Ok(CompiledBranch { statement: Statement::Select(statement), schema: schema_plan })
}

/// Builds the anchor pre/post pair plus one anchored SELECT per branch,
/// all joined against the same anchor table. Used both for a single
/// branch that needs range-safety (an expanding child makes a direct
/// `LIMIT` unsound) and for every multi-branch fetch, where every
/// branch must agree on which `(id, ord)` rows and what relative order
/// they share rather than each repeating the filter/range on its own.
///
/// The id-gathering query is built from a prop tree covering only the
/// filter's and order's own paths, never any select branch's shape: a
/// select branch's expanding child is exactly what makes `LIMIT`
/// unsafe on it directly, so reusing one to gather ids would just move
/// the same row-multiplication problem one step sideways. Filter/order
/// paths are always single-row reachable -- a `CollectionTest` renders
/// as its own correlated `EXISTS` subquery rather than a join here (see
/// [`collect_filter_paths`]), and an `Order` element sorts by a scalar.
fn compile_anchored(
    schema: &Schema,
    driver: &dyn Driver,
    record_type_name: &str,
    params: &dyn ParamsHandler,
    branches: &[PropTreeNode],
    filter: Option<&Filter>,
    order: &Order,
    range: Option<Range>,
) -> FetchResult<(Statement, Vec<CompiledBranch>, Statement)> {
    let record_type = schema.get_record_type_desc(record_type_name)?;
    let anchor_name = format!("q_{}", record_type.table);

    let mut id_patterns = BTreeSet::new();
    if let Some(filter) = filter {
        collect_filter_paths(filter, &mut id_patterns);
    }
    for element in &order.elements {
        id_patterns.extend(element.expr.used_paths.iter().cloned());
    }
    let id_patterns: Vec<String> = id_patterns.into_iter().collect();
    let id_root = build_simple_props_tree(schema, record_type_name, Clause::Filter, &id_patterns)?;
    let id_tree = Rc::new(for_ids_only_query(schema, driver, record_type_name, &id_root)?);
    let id_ctx = QueryContext::new(schema, driver, params, record_type_name, Rc::clone(&id_tree));

    let order_text = if order.elements.is_empty() {
        format!("{ROOT_ALIAS}.{}", id_tree.root.key_column)
    } else {
        order_by_items(order, &id_ctx)?
            .into_iter()
            .map(|o| match o.direction {
                SortDirection::Asc => format!("{} ASC", o.expr),
                SortDirection::Desc => format!("{} DESC", o.expr),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut id_projection = id_tree.to_select_items(&id_ctx);
    id_projection.push(SelectItem::Expr {
        expr: format!("ROW_NUMBER() OVER (ORDER BY {order_text})"),
        alias: "ord".to_string(),
    });

    let mut id_select = SelectStatement::new(id_tree.to_table_ref()).with_projection(id_projection);
    if let Some(filter) = filter {
        id_select = id_select.with_where(filter.render(&id_ctx, driver)?);
    }
    let group_by = id_tree.group_by_columns();
    if !group_by.is_empty() {
        id_select = id_select.with_group_by(group_by);
    }
    if !order.elements.is_empty() {
        id_select = id_select.with_order_by(order_by_items(order, &id_ctx)?);
    }
    if let Some(range) = range {
        id_select = id_select.with_range(range.offset, range.limit);
    }

    let pre = Statement::CreateTempTableAs { name: anchor_name.clone(), query: Box::new(id_select) };
    let post = Statement::DropTempTable { name: anchor_name.clone() };

    let mut compiled = Vec::with_capacity(branches.len());
    for branch in branches {
        let tree = Rc::new(for_anchored_query(schema, driver, record_type_name, branch, &anchor_name)?);
        let ctx = QueryContext::new(schema, driver, params, record_type_name, Rc::clone(&tree));
        let mut statement = SelectStatement::new(tree.to_table_ref()).with_projection(tree.to_select_items(&ctx));
        let group_by = tree.group_by_columns();
        if !group_by.is_empty() {
            statement = statement.with_group_by(group_by);
        }
        statement = statement
            .with_order_by(vec![OrderBy { expr: format!("{ANCHOR_ALIAS}.ord"), direction: SortDirection::Asc }]);

        let schema_plan = NodeSchema::for_tree_root(&tree.root);
        compiled.push(CompiledBranch { statement: Statement::Select(statement), schema: schema_plan });
    }

    Ok((pre, compiled, post))
}

#[cfg(test)]
mod tests {
    use unified_fetch_driver::PostgresLikeDriver;
    use unified_fetch_record_schema::{Cardinality, PropertyDesc, SchemaBuilder, StorageHint, ValueKind};
    use unified_fetch_translate::MapParamsHandler;

    use super::*;

    fn schema_with_tags() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Customer",
                "customers",
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("name".into())),
                    PropertyDesc::new("tags", ValueKind::String, Cardinality::Array).with_storage(
                        StorageHint::Table {
                            table: "customer_tags".into(),
                            parent_id_column: "customer_id".into(),
                            key_column: Some("value".into()),
                            index_column: None,
                        },
                    ),
                ],
            )
            .unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn scalar_only_fetch_is_a_single_direct_statement() {
        let schema = schema_with_tags();
        let driver = PostgresLikeDriver;
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new().with_props(vec!["name".to_string()]);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.total_statements(), 1);
        assert!(compiled.pre_statements.is_empty());
        assert!(compiled.post_statements.is_empty());
        assert!(compiled.super_queries.is_empty());
        assert!(!compiled.super_only);
    }

    #[test]
    fn filter_and_order_do_not_force_an_anchor_without_an_expanding_child() {
        let schema = schema_with_tags();
        let driver = PostgresLikeDriver;
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new()
            .with_props(vec!["name".to_string()])
            .with_filter(serde_json::json!(["name", "Al"]))
            .with_order(vec!["name".to_string()])
            .with_range(0, 10);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.total_statements(), 1);
        let sql = compiled.main_queries[0].statement.render(&driver);
        assert!(sql.contains("WHERE"));
        assert!(sql.contains("ORDER BY"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn a_collection_with_a_range_compiles_to_an_anchored_statement_pipeline() {
        let schema = schema_with_tags();
        let driver = PostgresLikeDriver;
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new().with_props(vec!["name".to_string(), "tags".to_string()]).with_range(0, 5);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.pre_statements.len(), 1);
        assert_eq!(compiled.post_statements.len(), 1);
        assert_eq!(compiled.main_queries.len(), 2, "name and tags lie on different axes");
        assert!(compiled.wraps_transaction());

        let pre_sql = compiled.pre_statements[0].render(&driver);
        assert!(pre_sql.contains("q_customers"));
        assert!(pre_sql.contains("ROW_NUMBER()"));

        for branch in &compiled.main_queries {
            let sql = branch.statement.render(&driver);
            assert!(sql.contains("q_customers"), "every branch joins the shared anchor table");
        }
    }

    #[test]
    fn a_scalar_super_property_compiles_to_a_non_records_super_query() {
        let schema = schema_with_tags();
        let driver = PostgresLikeDriver;
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new().with_props(vec![".count".to_string()]);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert!(compiled.super_only);
        assert!(compiled.main_queries.is_empty());
        assert_eq!(compiled.super_queries.len(), 1);
        assert!(!compiled.super_queries[0].is_records);
    }

    #[test]
    fn the_records_super_property_compiles_to_a_records_axis_super_query() {
        let schema = schema_with_tags();
        let driver = PostgresLikeDriver;
        let params = MapParamsHandler::default();
        let spec = QuerySpec::new().with_props(vec![".records".to_string()]);

        let compiled = FetchCompiler::compile(&schema, &driver, "Customer", &spec, &params).unwrap();
        assert_eq!(compiled.super_queries.len(), 1);
        assert!(compiled.super_queries[0].is_records);
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Pattern-list insertion: walks each requested `name(.name)*` pattern
//! into the tree, expanding `*` wildcards to a fixed point and honoring
//! `-<path>` exclusions along the way.

use std::collections::{BTreeSet, VecDeque};

use serde_json::Value as Json;
use unified_fetch_query_filter::{parse_filter, parse_order, CollectionResolver, Filter};
use unified_fetch_record_schema::{ContainerId, PropertyDesc, PropertyId, Schema};
use unified_fetch_value_expr::{compile, ContainerResolver, ExprContext};

use crate::error::{PropTreeError, PropTreeResult};
use crate::node::{PropTreeNode, ResolvedAggregate};
use crate::options::{Clause, FetchOptions};
use crate::resolver::{container_for, SchemaCollectionResolver, SchemaContainerResolver};

fn parse_predicate_string(
    ctx: &ExprContext,
    collections: &dyn CollectionResolver,
    text: &str,
) -> PropTreeResult<Filter> {
    let json: Json = serde_json::from_str(text).map_err(|_| {
        unified_fetch_query_filter::FilterError::InvalidPredicate {
            text: text.to_string(),
            reason: "not valid JSON predicate syntax".to_string(),
        }
    })?;
    Ok(parse_filter(ctx, collections, &json)?)
}

struct Walker<'a> {
    schema: &'a Schema,
    resolver: SchemaContainerResolver<'a>,
    collection_resolver: SchemaCollectionResolver<'a>,
    options: &'a FetchOptions,
    scope_path: Option<&'a str>,
    excluded: &'a BTreeSet<String>,
    queue: &'a mut VecDeque<String>,
}

impl<'a> Walker<'a> {
    fn root_ctx(&self) -> ExprContext<'_> {
        ExprContext::root(&self.resolver)
    }

    fn build_node(
        &self,
        owner_path_prefix: &str,
        full_path: &str,
        name: &str,
        property_id: PropertyId,
        property: &PropertyDesc,
    ) -> PropTreeResult<PropTreeNode> {
        let root_ctx = self.root_ctx();
        let owner_ctx = if owner_path_prefix.is_empty() {
            root_ctx
        } else {
            root_ctx.relative(owner_path_prefix)?
        };

        let value_expr = match &property.calc {
            Some(text) => Some(compile(&owner_ctx, text)?),
            None => None,
        };

        let aggregate = match &property.aggregate {
            Some(spec) => {
                let collection_abs = owner_ctx.normalize(&spec.collection_path)?;
                let item_ctx = owner_ctx.relative(&spec.collection_path)?;
                let expr = compile(&item_ctx, &spec.expr)?;
                let filter = match &spec.filter {
                    Some(text) => Some(parse_predicate_string(&item_ctx, &self.collection_resolver, text)?),
                    None => None,
                };
                let key = match &spec.key {
                    Some(key_path) => Some(item_ctx.normalize(key_path)?),
                    None => None,
                };
                Some(ResolvedAggregate {
                    function: spec.function,
                    collection_path: collection_abs,
                    expr,
                    filter,
                    key,
                })
            }
            None => None,
        };

        let presence_test = match &property.presence_test {
            Some(text) => Some(parse_predicate_string(&owner_ctx, &self.collection_resolver, text)?),
            None => None,
        };

        let filter = match &property.filter {
            Some(text) => Some(parse_predicate_string(&owner_ctx, &self.collection_resolver, text)?),
            None => None,
        };

        let order = match &property.order {
            Some(specs) => Some(parse_order(&owner_ctx, specs)?),
            None => None,
        };

        Ok(PropTreeNode {
            path: full_path.to_string(),
            name: name.to_string(),
            property: Some(property_id),
            value_kind: property.value_kind.clone(),
            cardinality: property.cardinality,
            container: container_for(self.schema, property),
            clauses: BTreeSet::new(),
            children: Default::default(),
            value_expr,
            aggregate,
            presence_test,
            filter,
            order,
        })
    }

    fn insert_segments(
        &mut self,
        node: &mut PropTreeNode,
        container: ContainerId,
        segments: &[&str],
        owner_path_prefix: &str,
        clause: Clause,
    ) -> PropTreeResult<()> {
        node.clauses.insert(clause);
        if segments.is_empty() {
            return Ok(());
        }
        let seg = segments[0];
        let full_path = if owner_path_prefix.is_empty() {
            seg.to_string()
        } else {
            format!("{owner_path_prefix}.{seg}")
        };

        let property_id = self
            .schema
            .arena()
            .container(container)
            .properties
            .get(seg)
            .copied()
            .ok_or_else(|| PropTreeError::InvalidPath { path: full_path.clone() })?;
        let property = self.schema.arena().property(property_id).clone();

        if property.aggregate.is_some() {
            if self.options.no_aggregates {
                return Err(PropTreeError::AggregateNotAllowed { path: full_path });
            }
        } else if property.calc.is_some() && self.options.no_calculated {
            return Err(PropTreeError::CalculatedNotAllowed { path: full_path });
        }

        if property.cardinality.is_collection() {
            if let Some(sp) = self.scope_path {
                if !(sp.starts_with(full_path.as_str()) || full_path.starts_with(sp)) {
                    return Err(PropTreeError::AxisViolation {
                        path: full_path,
                        scope_path: sp.to_string(),
                    });
                }
            }
        }
        if self.scope_path.is_some() && property.filter.is_some() {
            return Err(PropTreeError::ScopedFilterNotAllowed { path: full_path });
        }

        let is_leaf_request = segments.len() == 1;
        if is_leaf_request && clause == Clause::Select && property.value_kind.is_container() {
            return Err(PropTreeError::LeafObjectNotAllowed { path: full_path });
        }

        if !node.children.contains_key(seg) {
            let built = self.build_node(owner_path_prefix, &full_path, seg, property_id, &property)?;
            node.children.insert(seg.to_string(), built);
        }
        let child = node.children.get_mut(seg).expect("just inserted");

        if is_leaf_request {
            child.clauses.insert(clause);
            return Ok(());
        }

        let next_container = container_for(self.schema, &property)
            .ok_or_else(|| PropTreeError::InvalidPath { path: full_path.clone() })?;
        self.insert_segments(child, next_container, &segments[1..], &full_path, clause)
    }

    fn expand_wildcard(&mut self, prefix: &str, container: ContainerId) -> PropTreeResult<()> {
        if self.options.no_wildcards {
            return Err(PropTreeError::WildcardNotAllowed { path: prefix.to_string() });
        }
        let names: Vec<String> = self
            .schema
            .arena()
            .container(container)
            .property_names_in_order()
            .map(str::to_string)
            .collect();
        for name in names {
            let prop_id = self.schema.arena().container(container).properties[&name];
            let prop = self.schema.arena().property(prop_id);
            if !prop.fetched_by_default {
                continue;
            }
            let full_path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
            if self.excluded.contains(&full_path) {
                continue;
            }
            self.queue.push_back(full_path);
        }
        Ok(())
    }
}

/// Inserts every pattern in `patterns` into `root`, expanding wildcards to
/// a fixed point and honoring `-<path>` exclusions, under `clause`.
pub fn insert_patterns(
    schema: &Schema,
    root: &mut PropTreeNode,
    root_container: ContainerId,
    clause: Clause,
    patterns: &[String],
    options: &FetchOptions,
    scope_path: Option<&str>,
) -> PropTreeResult<()> {
    let mut excluded = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    for p in patterns {
        if let Some(rest) = p.strip_prefix('-') {
            excluded.insert(rest.to_string());
        } else {
            queue.push_back(p.clone());
        }
    }

    let mut walker = Walker {
        schema,
        resolver: SchemaContainerResolver { schema, root_container },
        collection_resolver: SchemaCollectionResolver { schema, root_container },
        options,
        scope_path,
        excluded: &excluded,
        queue: &mut queue,
    };

    while let Some(pattern) = {
        let next = walker.queue.pop_front();
        next
    } {
        if pattern == "*" {
            walker.expand_wildcard("", root_container)?;
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            // Walk down to the container named by `prefix` (creating
            // intermediate nodes under the same clause) before expanding.
            let segments: Vec<&str> = prefix.split('.').collect();
            walker.insert_segments(root, root_container, &segments, "", clause)?;
            let container = segments
                .iter()
                .try_fold(root_container, |container, seg| {
                    let prop_id = schema.arena().container(container).properties.get(*seg).copied()?;
                    let prop = schema.arena().property(prop_id);
                    container_for(schema, prop)
                })
                .ok_or_else(|| PropTreeError::InvalidPath { path: prefix.to_string() })?;
            walker.expand_wildcard(prefix, container)?;
        } else {
            if excluded.contains(&pattern) {
                continue;
            }
            let segments: Vec<&str> = pattern.split('.').collect();
            walker.insert_segments(root, root_container, &segments, "", clause)?;
        }
    }

    Ok(())
}

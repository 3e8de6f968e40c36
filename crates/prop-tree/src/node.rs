// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The property tree node shape every downstream stage (query-tree,
//! translate, fetch) consumes.

use std::collections::{BTreeMap, BTreeSet};

use unified_fetch_query_filter::{Filter, Order};
use unified_fetch_record_schema::{Cardinality, ContainerId, PropertyId, ValueKind};
use unified_fetch_value_expr::ValueExpression;

use crate::options::Clause;

/// A resolved `aggregate(...)` attached to a node: the collection it reaches
/// over, the per-item expression being aggregated, and an optional filter
/// scoped to that collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAggregate {
    pub function: unified_fetch_record_schema::AggregateFunction,
    /// Absolute path of the collection being aggregated over.
    pub collection_path: String,
    pub expr: ValueExpression,
    pub filter: Option<Filter>,
    /// Absolute path of a scalar property on the collection to group by
    /// instead of collapsing the whole collection to one row -- present
    /// only for map aggregates.
    pub key: Option<String>,
}

impl ResolvedAggregate {
    /// The compatibility key two aggregates must share to be folded into
    /// the same debranched group: same underlying collection, same filter
    /// text (after normalization to absolute paths the `Filter` itself
    /// already carries), same function-over-scalar-ness distinction, and
    /// same grouping key (two map aggregates keyed on different columns
    /// need separate `GROUP BY` chains, so they cannot share a statement
    /// either).
    pub fn cluster_key(&self) -> (String, bool, Option<String>, Option<String>) {
        (
            self.collection_path.clone(),
            matches!(self.function, unified_fetch_record_schema::AggregateFunction::Count),
            self.filter.as_ref().map(|f| format!("{f:?}")),
            self.key.clone(),
        )
    }
}

/// One node of a property tree: a property reachable from the record type
/// the tree is rooted at, plus whichever of its children were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct PropTreeNode {
    /// Dotted path from the tree root; empty at the root itself.
    pub path: String,
    pub name: String,
    /// `None` only at the synthetic root node.
    pub property: Option<PropertyId>,
    pub value_kind: ValueKind,
    pub cardinality: Cardinality,
    /// Container whose properties this node's children are drawn from --
    /// `None` for scalar leaves with no further path.
    pub container: Option<ContainerId>,
    pub clauses: BTreeSet<Clause>,
    pub children: BTreeMap<String, PropTreeNode>,

    pub value_expr: Option<ValueExpression>,
    pub aggregate: Option<ResolvedAggregate>,
    pub presence_test: Option<Filter>,
    pub filter: Option<Filter>,
    pub order: Option<Order>,
}

impl PropTreeNode {
    pub fn root(container: ContainerId, value_kind: ValueKind) -> PropTreeNode {
        PropTreeNode {
            path: String::new(),
            name: String::new(),
            property: None,
            value_kind,
            cardinality: Cardinality::Scalar,
            container: Some(container),
            clauses: BTreeSet::new(),
            children: BTreeMap::new(),
            value_expr: None,
            aggregate: None,
            presence_test: None,
            filter: None,
            order: None,
        }
    }

    pub fn is_calculated(&self) -> bool {
        self.value_expr.is_some() || self.aggregate.is_some()
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality.is_collection()
    }

    /// Whether this node has a further-traversable container of its own
    /// (object or reference), as opposed to a scalar leaf.
    pub fn is_container(&self) -> bool {
        self.value_kind.is_container()
    }

    /// True once this node has at least one expanding (non-aggregate
    /// collection) descendant somewhere below it -- used by query-tree to
    /// decide whether a branch needs GROUP BY stripped for row duplication.
    pub fn has_expanding_descendant(&self) -> bool {
        self.children.values().any(|c| {
            (c.is_collection() && c.aggregate.is_none()) || c.has_expanding_descendant()
        })
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Debranching: splits a single requested tree, which may reach more than
//! one independent collection axis, into one tree per axis -- the shape
//! the query-tree builder needs, since one SQL statement can only walk a
//! single collection axis without duplicating unrelated rows.
//!
//! Two properties lie on the same axis iff one's path is a prefix of the
//! other's, so a nested `items.variants` collection under `items` stays
//! in the same branch as `items` itself; two *siblings* that are each
//! collections (e.g. `items` and `tags`) force a split. Aggregate
//! properties never force a split on their own account: aggregates that
//! share the same underlying collection, function-over-scalar shape and
//! filter are folded into one compatible cluster and travel together in
//! whichever branch their shared axis belongs to.

use std::collections::{BTreeMap, BTreeSet};

use crate::node::PropTreeNode;

type ClusterKey = (String, bool, Option<String>, Option<String>);

/// A child is "expanding" if fetching it can multiply the parent's row
/// count -- an array/map property that is not merely an aggregate source.
fn is_expanding(child: &PropTreeNode) -> bool {
    child.cardinality.is_collection() && child.aggregate.is_none()
}

/// Recursively splits `node` into one or more single-axis trees. A leaf
/// with no collection children returns exactly one tree (itself).
///
/// Aggregates never force a split *on their own account* when they share
/// a [`crate::node::ResolvedAggregate::cluster_key`] with a sibling, or
/// when their collection path matches one of this node's own expanding
/// children -- both cases travel together in one branch, since they
/// resolve against the same joined collection. Aggregates whose
/// collection path matches *no* expanding axis here, and that disagree
/// with each other on that key, reach for unrelated collections and so
/// must land in separate branches of their own -- folding them into one
/// statement would join every one of those collections at once and
/// corrupt every aggregate's count with the others' row fan-out.
pub fn debranch(node: PropTreeNode) -> Vec<PropTreeNode> {
    let PropTreeNode {
        path,
        name,
        property,
        value_kind,
        cardinality,
        container,
        clauses,
        children,
        value_expr,
        aggregate,
        presence_test,
        filter,
        order,
    } = node;

    let mut plain_children = Vec::new();
    let mut expanding_children = Vec::new();
    let mut aggregate_clusters: BTreeMap<ClusterKey, Vec<(String, PropTreeNode)>> = BTreeMap::new();
    for (child_name, child) in children {
        if let Some(agg) = child.aggregate.clone() {
            aggregate_clusters.entry(agg.cluster_key()).or_default().push((child_name, child));
        } else if is_expanding(&child) {
            expanding_children.push((child_name, child));
        } else {
            plain_children.push((child_name, child));
        }
    }

    // Plain (non-aggregate, non-expanding) children debranch in place:
    // each keeps exactly the variant its own subtree needs, all of which
    // stay together since they carry no independent expanding axis.
    let plain_children: Vec<(String, PropTreeNode)> = plain_children
        .into_iter()
        .map(|(child_name, child)| {
            let mut variants = debranch(child);
            (child_name, variants.drain(..).next().expect("debranch always returns at least one tree"))
        })
        .collect();

    let scaffold = |extra: Vec<(String, PropTreeNode)>| -> PropTreeNode {
        let mut n = PropTreeNode {
            path: path.clone(),
            name: name.clone(),
            property,
            value_kind: value_kind.clone(),
            cardinality,
            container,
            clauses: clauses.clone(),
            children: Default::default(),
            value_expr: value_expr.clone(),
            aggregate: aggregate.clone(),
            presence_test: presence_test.clone(),
            filter: filter.clone(),
            order: order.clone(),
        };
        n.children.extend(plain_children.clone());
        n.children.extend(extra);
        n
    };

    // Split aggregate clusters into those anchored to one of this node's
    // own expanding children's path (they travel with that child's
    // branch) and those reaching for a collection no expanding child here
    // covers.
    let expanding_paths: BTreeSet<String> = expanding_children.iter().map(|(_, c)| c.path.clone()).collect();
    let mut anchored: BTreeMap<String, Vec<(String, PropTreeNode)>> = BTreeMap::new();
    let mut unanchored: Vec<Vec<(String, PropTreeNode)>> = Vec::new();
    for (key, members) in aggregate_clusters {
        if expanding_paths.contains(&key.0) {
            anchored.entry(key.0).or_default().extend(members);
        } else {
            unanchored.push(members);
        }
    }

    if expanding_children.is_empty() {
        return match unanchored.len() {
            0 => vec![scaffold(Vec::new())],
            1 => vec![scaffold(unanchored.into_iter().next().unwrap())],
            _ => unanchored.into_iter().map(scaffold).collect(),
        };
    }

    // One branch per expanding child, each carrying every variant that
    // child's own (recursive) debranching produced, plus whichever
    // aggregate cluster is anchored to that same collection path.
    let mut branches = Vec::new();
    for (child_name, child) in expanding_children {
        let anchored_here = anchored.get(&child.path).cloned().unwrap_or_default();
        for child_variant in debranch(child) {
            let mut branch = scaffold(anchored_here.clone());
            branch.children.insert(child_name.clone(), child_variant);
            branches.push(branch);
        }
    }

    // Aggregate clusters matching none of this node's expanding children:
    // one shares no axis with anything already split out, so it is safe
    // to copy into every branch above; two or more mutually incompatible
    // ones must each get a branch of their own instead.
    match unanchored.len() {
        0 => {}
        1 => {
            let only = unanchored.into_iter().next().unwrap();
            for branch in &mut branches {
                branch.children.extend(only.clone());
            }
        }
        _ => {
            for cluster in unanchored {
                branches.push(scaffold(cluster));
            }
        }
    }

    branches
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use unified_fetch_record_schema::{Cardinality, ContainerId, ValueKind};

    use super::*;

    fn scalar_leaf(name: &str) -> PropTreeNode {
        PropTreeNode {
            path: name.to_string(),
            name: name.to_string(),
            property: None,
            value_kind: ValueKind::String,
            cardinality: Cardinality::Scalar,
            container: None,
            clauses: BTreeSet::new(),
            children: Default::default(),
            value_expr: None,
            aggregate: None,
            presence_test: None,
            filter: None,
            order: None,
        }
    }

    fn collection_node(name: &str, children: Vec<(&str, PropTreeNode)>) -> PropTreeNode {
        let mut node = scalar_leaf(name);
        node.cardinality = Cardinality::Array;
        node.value_kind = ValueKind::Object;
        node.container = Some(ContainerId(0));
        for (child_name, child) in children {
            node.children.insert(child_name.to_string(), child);
        }
        node
    }

    fn count_aggregate_leaf(name: &str, collection_path: &str) -> PropTreeNode {
        let mut leaf = scalar_leaf(name);
        leaf.value_kind = ValueKind::Number;
        leaf.aggregate = Some(crate::node::ResolvedAggregate {
            function: unified_fetch_record_schema::AggregateFunction::Count,
            collection_path: collection_path.to_string(),
            expr: unified_fetch_value_expr::ValueExpression {
                expr: unified_fetch_value_expr::Expr::Literal(unified_fetch_value_expr::Literal::Number(1.0)),
                used_paths: BTreeSet::new(),
            },
            filter: None,
            key: None,
        });
        leaf
    }

    #[test]
    fn single_scalar_tree_does_not_branch() {
        let mut root = scalar_leaf("");
        root.children.insert("name".to_string(), scalar_leaf("name"));
        let branches = debranch(root);
        assert_eq!(branches.len(), 1);
    }

    #[test]
    fn two_sibling_collections_split_into_two_branches() {
        let mut root = scalar_leaf("");
        root.children.insert("items".to_string(), collection_node("items", vec![]));
        root.children.insert("tags".to_string(), collection_node("tags", vec![]));
        let branches = debranch(root);
        assert_eq!(branches.len(), 2);
        for branch in &branches {
            let expanding_count = branch.children.values().filter(|c| is_expanding(c)).count();
            assert_eq!(expanding_count, 1);
        }
    }

    #[test]
    fn nested_collection_on_same_axis_stays_in_one_branch() {
        let variants = collection_node("variants", vec![]);
        let items = collection_node("items", vec![("variants", variants)]);
        let mut root = scalar_leaf("");
        root.children.insert("items".to_string(), items);
        let branches = debranch(root);
        assert_eq!(branches.len(), 1);
        let items_branch = &branches[0].children["items"];
        assert!(items_branch.children.contains_key("variants"));
    }

    #[test]
    fn scalar_siblings_are_copied_into_every_branch() {
        let mut root = scalar_leaf("");
        root.children.insert("name".to_string(), scalar_leaf("name"));
        root.children.insert("items".to_string(), collection_node("items", vec![]));
        root.children.insert("tags".to_string(), collection_node("tags", vec![]));
        let branches = debranch(root);
        assert_eq!(branches.len(), 2);
        for branch in &branches {
            assert!(branch.children.contains_key("name"));
        }
    }

    #[test]
    fn compatible_aggregates_over_the_same_collection_stay_in_one_branch() {
        let mut root = scalar_leaf("");
        root.children.insert("itemCount".to_string(), count_aggregate_leaf("itemCount", "items"));
        root.children.insert("itemTotal".to_string(), count_aggregate_leaf("itemTotal", "items"));
        let branches = debranch(root);
        assert_eq!(branches.len(), 1);
        assert!(branches[0].children.contains_key("itemCount"));
        assert!(branches[0].children.contains_key("itemTotal"));
    }

    #[test]
    fn incompatible_aggregates_over_different_collections_split_into_separate_branches() {
        let mut root = scalar_leaf("");
        root.children.insert("itemCount".to_string(), count_aggregate_leaf("itemCount", "items"));
        root.children.insert("tagCount".to_string(), count_aggregate_leaf("tagCount", "tags"));
        let branches = debranch(root);
        assert_eq!(branches.len(), 2, "aggregates over different collections must not share a statement");
        for branch in &branches {
            assert_eq!(branch.children.len(), 1);
        }
        let all_names: BTreeSet<&str> = branches.iter().flat_map(|b| b.children.keys().map(String::as_str)).collect();
        assert!(all_names.contains("itemCount"));
        assert!(all_names.contains("tagCount"));
    }

    #[test]
    fn an_aggregate_anchored_to_an_expanding_sibling_travels_with_its_branch() {
        let mut root = scalar_leaf("");
        root.children.insert("items".to_string(), collection_node("items", vec![]));
        root.children.insert("itemCount".to_string(), count_aggregate_leaf("itemCount", "items"));
        let branches = debranch(root);
        assert_eq!(branches.len(), 1);
        assert!(branches[0].children.contains_key("items"));
        assert!(branches[0].children.contains_key("itemCount"));
    }

    #[test]
    fn an_unrelated_aggregate_is_copied_into_every_expanding_branch() {
        let mut root = scalar_leaf("");
        root.children.insert("items".to_string(), collection_node("items", vec![]));
        root.children.insert("tags".to_string(), collection_node("tags", vec![]));
        root.children.insert("otherCount".to_string(), count_aggregate_leaf("otherCount", "others"));
        let branches = debranch(root);
        assert_eq!(branches.len(), 2);
        for branch in &branches {
            assert!(branch.children.contains_key("otherCount"));
        }
    }
}

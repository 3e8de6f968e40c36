// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Entry points: the three ways a property tree gets built, corresponding
//! to a top-level fetch, a super-type projection, and a subquery's simple
//! (already axis-restricted) tree.

use unified_fetch_record_schema::{Schema, ValueKind};

use crate::debranch::debranch;
use crate::error::{PropTreeError, PropTreeResult};
use crate::node::PropTreeNode;
use crate::options::{Clause, FetchOptions};
use crate::pattern::insert_patterns;

/// Builds every single-axis branch of the property tree requested by
/// `patterns` against `record_type_name`, under `clause`.
///
/// `scope_path`, when set, restricts the tree to properties compatible
/// with a single collection axis (used when building the property tree
/// for an `EXISTS` subquery scoped to one collection) and requires the
/// result to debranch to exactly one tree.
pub fn build_props_tree_branches(
    schema: &Schema,
    record_type_name: &str,
    clause: Clause,
    patterns: &[String],
    options: &FetchOptions,
    scope_path: Option<&str>,
) -> PropTreeResult<Vec<PropTreeNode>> {
    let record_type = schema.get_record_type_desc(record_type_name)?;
    let mut root = PropTreeNode::root(record_type.container, ValueKind::Reference(record_type.id));
    insert_patterns(schema, &mut root, record_type.container, clause, patterns, options, scope_path)?;

    let branches = debranch(root);
    tracing::debug!(
        record_type_name,
        branch_count = branches.len(),
        "prop-tree: debranched property tree"
    );
    if let Some(scope_path) = scope_path {
        if branches.len() != 1 {
            return Err(PropTreeError::AxisViolation {
                path: scope_path.to_string(),
                scope_path: scope_path.to_string(),
            });
        }
    }
    Ok(branches)
}

/// Builds the restricted tree for a record type's synthetic super-type
/// projection: an exact list of super-type property names, always under
/// `Select`, with wildcards disallowed (the super-type surface is small
/// and explicit by construction).
pub fn build_super_props_tree_branches(
    schema: &Schema,
    record_type_name: &str,
    super_prop_names: &[String],
) -> PropTreeResult<Vec<PropTreeNode>> {
    let record_type = schema.get_record_type_desc(record_type_name)?;
    let super_type_id = record_type
        .super_type
        .ok_or_else(|| PropTreeError::InvalidPath { path: record_type_name.to_string() })?;
    let super_type_name = schema.arena().record_type(super_type_id).name.clone();
    let options = FetchOptions { no_wildcards: true, ..FetchOptions::default() };
    build_props_tree_branches(schema, &super_type_name, Clause::Select, super_prop_names, &options, None)
}

/// Builds a single, non-debranched tree for an already axis-restricted
/// set of exact paths -- used when translating an `EXISTS` subquery,
/// where the caller already knows every path lies on one collection axis.
pub fn build_simple_props_tree(
    schema: &Schema,
    record_type_name: &str,
    clause: Clause,
    paths: &[String],
) -> PropTreeResult<PropTreeNode> {
    let record_type = schema.get_record_type_desc(record_type_name)?;
    let mut root = PropTreeNode::root(record_type.container, ValueKind::Reference(record_type.id));
    let options = FetchOptions { no_wildcards: true, ..FetchOptions::default() };
    insert_patterns(schema, &mut root, record_type.container, clause, paths, &options, None)?;
    Ok(root)
}

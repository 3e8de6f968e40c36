// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Column-layout plan derived from a [`QueryTreeNode`], used by
//! [`crate::result_parser`] to fold a flat result set back into its
//! nested object shape.
//!
//! The layout is computed once per compiled branch, directly from the
//! tree the compiler already built -- not by re-parsing the markup
//! label text a row's header carries. Every node's own `select_list`
//! occupies one contiguous run of columns, immediately followed by its
//! children's runs in the same order [`QueryTreeNode::all_children`]
//! walks them (single-row children first, the expanding child last);
//! that is exactly the order [`QueryTree::to_select_items`] emits
//! columns in, so a plan built this way lines up with a result row
//! built from the same tree column-for-column.

use unified_fetch_query_tree::QueryTreeNode;

/// One node's slice of a flat result row, plus its own nested plan.
#[derive(Debug, Clone)]
pub struct NodeSchema {
    /// The dotted property path this node corresponds to (empty at the
    /// root); the JSON field name a parent embeds this node's value
    /// under is this path's last segment.
    pub path: String,
    /// Markup labels for this node's own `select_list` entries, in
    /// column order.
    pub own_labels: Vec<String>,
    /// Index of this node's first own column in the flat row.
    pub own_start: usize,
    /// True if a LEFT JOIN reaches this node -- absence is possible and
    /// must be detected from NULL columns rather than assumed away.
    pub virtual_: bool,
    /// True if this node can repeat across multiple rows for the same
    /// parent instance (the expanding axis).
    pub many: bool,
    pub single_row_children: Vec<NodeSchema>,
    pub expanding_child: Option<Box<NodeSchema>>,
    /// End (exclusive) of this node's own + every descendant's columns.
    pub subtree_end: usize,
}

impl NodeSchema {
    /// The field name a parent object embeds this node's value under.
    pub fn field_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(self.path.as_str())
    }

    /// The contiguous range of columns that stays constant across every
    /// row belonging to one instance of this node (its own columns plus
    /// every single-row descendant's), i.e. everything except the
    /// expanding child's own subtree.
    pub fn stable_range(&self) -> std::ops::Range<usize> {
        let end = match &self.expanding_child {
            Some(child) => child.own_start,
            None => self.subtree_end,
        };
        self.own_start..end
    }

    /// The full range of columns sourced from this node's own joined
    /// table (directly or through descendants) -- NULL across this
    /// whole range is the unambiguous signal that an outer join here
    /// didn't match.
    pub fn subtree_range(&self) -> std::ops::Range<usize> {
        self.own_start..self.subtree_end
    }

    /// Total number of columns this branch's flat rows carry.
    pub fn total_columns(&self) -> usize {
        self.subtree_end
    }

    fn build(node: &QueryTreeNode, cursor: &mut usize) -> NodeSchema {
        let own_start = *cursor;
        let own_labels: Vec<String> = node.select_list.iter().map(|e| e.label.clone()).collect();
        *cursor += own_labels.len();

        let single_row_children: Vec<NodeSchema> =
            node.single_row_children.iter().map(|c| NodeSchema::build(c, cursor)).collect();
        let expanding_child = node.expanding_child.as_deref().map(|c| Box::new(NodeSchema::build(c, cursor)));

        NodeSchema {
            path: node.path.clone(),
            own_labels,
            own_start,
            virtual_: node.virtual_,
            many: node.many,
            single_row_children,
            expanding_child,
            subtree_end: *cursor,
        }
    }

    /// Builds a plan for `tree`'s root, covering every column its
    /// `to_select_items` projection will ever emit.
    pub fn for_tree_root(root: &QueryTreeNode) -> NodeSchema {
        let mut cursor = 0;
        NodeSchema::build(root, &mut cursor)
    }
}

#[cfg(test)]
mod tests {
    use unified_fetch_driver::PostgresLikeDriver;
    use unified_fetch_prop_tree::{build_props_tree_branches, Clause, FetchOptions};
    use unified_fetch_query_tree::for_direct_query;
    use unified_fetch_record_schema::{Cardinality, PropertyDesc, SchemaBuilder, StorageHint, ValueKind};

    use super::*;

    fn schema() -> unified_fetch_record_schema::Schema {
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
    fn plan_covers_every_projected_column() {
        let schema = schema();
        let driver = PostgresLikeDriver;
        let patterns = vec!["name".to_string(), "tags".to_string()];
        let mut branches = build_props_tree_branches(
            &schema,
            "Customer",
            Clause::Select,
            &patterns,
            &FetchOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(branches.len(), 2, "name and tags lie on different axes");

        for branch in branches.drain(..) {
            let tree = for_direct_query(&schema, &driver, "Customer", &branch).unwrap();
            let ctx_free_count = count_select_items(&tree.root);
            let plan = NodeSchema::for_tree_root(&tree.root);
            assert_eq!(plan.total_columns(), ctx_free_count);
        }
    }

    fn count_select_items(node: &unified_fetch_query_tree::QueryTreeNode) -> usize {
        node.select_list.len() + node.all_children().map(count_select_items).sum::<usize>()
    }
}

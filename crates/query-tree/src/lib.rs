// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Query Tree
//!
//! Turns a debranched property tree (`unified-fetch-prop-tree`) into a
//! join tree of SQL tables: deterministic aliases and markup labels,
//! the cardinality x kind x storage jump table that decides how each
//! property maps onto a join, and the `path -> column-SQL` map that
//! `unified-fetch-translate` resolves filter/order/value-expression
//! paths against.
//!
//! A [`QueryTree`] never renders a full statement on its own -- it
//! hands its [`QueryTree::to_table_ref`] and [`QueryTree::to_select_items`]
//! to `unified-fetch-sql-ir`'s builder, and its [`QueryTree::group_by_columns`]
//! to whoever assembles the final `SELECT`.

pub mod alias;
pub mod builder;
pub mod error;
pub mod node;
pub mod shape;

pub use alias::{child_alias, child_prefix, leaf_label, anchor_label, LetterCounter, ANCHOR_ALIAS, ROOT_ALIAS};
pub use builder::{
    build_exists_subquery, for_anchored_query, for_direct_query, for_ids_only_query,
    for_super_props_query, ExistsSubquery,
};
pub use error::{QueryTreeError, QueryTreeResult};
pub use node::{QueryTree, QueryTreeNode, SelectEntry, SqlBinding};
pub use shape::{
    classify, resolve_reverse_collection_shape, resolve_reverse_target_shape, CollectionTable,
    LinkTable, PropertyShape,
};

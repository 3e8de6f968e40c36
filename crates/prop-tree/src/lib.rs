// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Property Tree Builder
//!
//! Builds a branching tree of requested properties from pattern strings
//! (`name(.name)*`, `*` wildcards, `-<path>` exclusions), validates it
//! against a [`unified_fetch_record_schema::Schema`], attaches side value
//! trees for calculated/aggregate/presence-test properties, and
//! debranches the result into single-collection-axis trees — the shape
//! the query tree builder (`unified-fetch-query-tree`) consumes.
//!
//! Three entry points, named exactly as the compiler they are modeled on
//! names them:
//!
//! - [`build_props_tree_branches`] — a top-level fetch or an `EXISTS`
//!   subquery scoped to one axis.
//! - [`build_super_props_tree_branches`] — a record type's synthetic
//!   super-type projection.
//! - [`build_simple_props_tree`] — an already axis-restricted exact path
//!   list, non-debranched.

pub mod builder;
pub mod debranch;
pub mod error;
pub mod node;
pub mod options;
pub mod pattern;
pub mod resolver;

pub use builder::{build_props_tree_branches, build_simple_props_tree, build_super_props_tree_branches};
pub use debranch::debranch;
pub use error::{PropTreeError, PropTreeResult};
pub use node::{PropTreeNode, ResolvedAggregate};
pub use options::{Clause, FetchOptions};
pub use resolver::{
    container_for, walk_path, PathWalk, SchemaCollectionResolver, SchemaContainerResolver,
};

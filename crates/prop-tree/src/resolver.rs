// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Schema-backed path resolution, plus the `ContainerResolver` /
//! `CollectionResolver` implementations that plug the schema into the
//! (otherwise schema-agnostic) `value-expr` and `query-filter` crates.

use unified_fetch_query_filter::CollectionResolver;
use unified_fetch_record_schema::{Cardinality, Container, ContainerId, PropertyDesc, PropertyId, Schema, ValueKind};
use unified_fetch_value_expr::ContainerResolver;

/// The outcome of walking a dotted path from a root container through the
/// schema, one property at a time.
pub struct PathWalk<'a> {
    pub property_id: PropertyId,
    pub property: &'a PropertyDesc,
    /// The container this property's value lives in (its *parent*
    /// container, not the one it leads into).
    pub owner_container: ContainerId,
}

/// Resolves the container a property leads into, for `Object`/`Reference`
/// value kinds. Returns `None` for scalar kinds.
pub fn container_for(schema: &Schema, property: &PropertyDesc) -> Option<ContainerId> {
    match property.value_kind {
        ValueKind::Object => property.nested_container,
        ValueKind::Reference(target) => Some(schema.arena().record_type(target).container),
        _ => None,
    }
}

fn container_ref<'a>(schema: &'a Schema, id: ContainerId) -> &'a Container {
    schema.arena().container(id)
}

/// Walks `path` (a `.`-separated chain of property names) starting from
/// `root_container`, returning the final property and the container it is
/// declared in. Fails if any intermediate segment does not lead into a
/// further container, or a segment name is unknown.
pub fn walk_path<'a>(schema: &'a Schema, root_container: ContainerId, path: &str) -> Option<PathWalk<'a>> {
    let mut container = root_container;
    let segments: Vec<&str> = path.split('.').collect();
    let mut result = None;
    for (i, segment) in segments.iter().enumerate() {
        let property_id = container_ref(schema, container).properties.get(*segment).copied()?;
        let property = schema.arena().property(property_id);
        result = Some(PathWalk { property_id, property, owner_container: container });
        let is_last = i == segments.len() - 1;
        if !is_last {
            container = container_for(schema, property)?;
        }
    }
    result
}

/// Bridges schema path resolution into `value-expr`'s
/// [`ContainerResolver`] seam: an absolute path is a container iff it
/// resolves to an `Object`/`Reference` property.
pub struct SchemaContainerResolver<'a> {
    pub schema: &'a Schema,
    pub root_container: ContainerId,
}

impl<'a> ContainerResolver for SchemaContainerResolver<'a> {
    fn is_container(&self, absolute_path: &str) -> bool {
        match walk_path(self.schema, self.root_container, absolute_path) {
            Some(walk) => walk.property.value_kind.is_container(),
            None => false,
        }
    }
}

/// Bridges schema path resolution into `query-filter`'s
/// [`CollectionResolver`] seam: an absolute path is a collection iff it
/// resolves to an array/map-cardinality property.
pub struct SchemaCollectionResolver<'a> {
    pub schema: &'a Schema,
    pub root_container: ContainerId,
}

impl<'a> CollectionResolver for SchemaCollectionResolver<'a> {
    fn is_collection(&self, absolute_path: &str) -> bool {
        match walk_path(self.schema, self.root_container, absolute_path) {
            Some(walk) => matches!(walk.property.cardinality, Cardinality::Array | Cardinality::Map),
            None => false,
        }
    }
}

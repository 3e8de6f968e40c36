// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! The cardinality x kind x storage jump table: a closed enumeration of
//! every join/select shape a property can take, classified once per
//! node so the builder matches on a handful of variants instead of
//! re-deriving the same storage-hint logic at every call site.

use unified_fetch_record_schema::{Cardinality, PropertyDesc, SchemaArena, StorageHint, ValueKind};

use crate::error::{QueryTreeError, QueryTreeResult};

/// Everything `StorageHint::Table` carries, regrouped by the field each
/// shape actually uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTable {
    pub table: String,
    pub parent_id_column: String,
    pub key_column: Option<String>,
    pub index_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTable {
    pub table: String,
    pub this_id_column: String,
    pub other_id_column: String,
}

/// The join/select action a property maps to, per the cardinality x
/// kind x storage table. A calculated or aggregate property never
/// reaches here -- those are resolved straight from
/// [`unified_fetch_prop_tree::PropTreeNode::value_expr`]/`aggregate`
/// without consulting storage at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyShape {
    /// scalar simple, same table: select column in place.
    ScalarSimpleColumn { column: String },
    /// scalar simple, own table: add a child node joined by parent id;
    /// select its value column. The table's `key_column` doubles as the
    /// value column name here, there being no per-element scalar
    /// payload column on a singleton side table.
    ScalarSimpleOwnTable { table: CollectionTable },
    /// scalar object, own table: add a child node; select a synthetic
    /// anchor (the object's own id) under markup.
    ScalarObjectOwnTable { table: CollectionTable },
    /// scalar object, same table: select the presence-test predicate
    /// (mapped TRUE/NULL) as anchor, or a bare TRUE literal if the
    /// object is not optional.
    ScalarObjectSameTable { presence_test: Option<String> },
    /// scalar ref, direct: select the fk column; add a child node to
    /// the target table if the reference itself is fetched.
    ScalarRefDirect { column: String },
    /// scalar ref, link table: add a link-table node, then optionally a
    /// target-table node.
    ScalarRefLink { link: LinkTable },
    /// scalar ref, reverse (target table): add the target-table node,
    /// joined by its own column that points back here.
    ScalarRefReverseDirect { target_column: String },
    /// scalar ref, reverse (link table): add a link-table node, joined
    /// by the reverse property's own link-table parent-id column.
    ScalarRefReverseLink { link: LinkTable },
    /// array/map simple: add the collection-table node; select a
    /// `(key|index, value)` pair.
    CollectionSimple { table: CollectionTable },
    /// array/map object: add the collection-table node; the key is its
    /// id or designated key column; recurse into its nested container.
    CollectionObject { table: CollectionTable },
    /// array/map ref, direct: collection table holds the fk column
    /// itself (a per-row reference, not a link table).
    CollectionRefDirect { table: CollectionTable },
    /// array/map ref, reverse: no table of its own -- join the target
    /// record type's table directly by its reverse fk column.
    CollectionRefReverse { target_column: String },
    /// array/map ref, link table: many-to-many via a join table.
    CollectionRefLink { link: LinkTable },
}

fn internal(msg: impl Into<String>) -> QueryTreeError {
    QueryTreeError::Internal(msg.into())
}

fn unsupported(path: &str, why: impl Into<String>) -> QueryTreeError {
    QueryTreeError::UnsupportedShape(path.to_string(), why.into())
}

/// Resolves the storage column a reverse-reference property joins
/// through: the scalar reference on the target record type named by
/// `reverse_ref_property`.
pub fn resolve_reverse_target_shape(
    arena: &SchemaArena,
    path: &str,
    target_container: unified_fetch_record_schema::ContainerId,
    reverse_property_name: &str,
) -> QueryTreeResult<PropertyShape> {
    let container = arena.container(target_container);
    let target_prop_id = container
        .properties
        .get(reverse_property_name)
        .copied()
        .ok_or_else(|| QueryTreeError::DanglingReverseReference(path.to_string()))?;
    let target_prop = arena.property(target_prop_id);
    match &target_prop.storage {
        Some(StorageHint::Column(column)) => Ok(PropertyShape::ScalarRefReverseDirect {
            target_column: column.clone(),
        }),
        Some(StorageHint::Link {
            table,
            this_id_column,
            other_id_column,
        }) => Ok(PropertyShape::ScalarRefReverseLink {
            link: LinkTable {
                table: table.clone(),
                this_id_column: this_id_column.clone(),
                other_id_column: other_id_column.clone(),
            },
        }),
        _ => Err(unsupported(
            path,
            "reverse reference target property has no column/link storage",
        )),
    }
}

/// Classifies a non-calculated property's storage into a [`PropertyShape`].
pub fn classify(path: &str, prop: &PropertyDesc) -> QueryTreeResult<PropertyShape> {
    debug_assert!(!prop.is_calculated());

    let is_collection = prop.cardinality.is_collection();
    let is_reverse = prop.is_reverse_reference();

    match (&prop.value_kind, prop.cardinality, is_collection, is_reverse) {
        (ValueKind::Reference(_), _, _, true) => {
            // Resolved by the caller via `resolve_reverse_target_shape`,
            // which needs the target record type's arena lookup this
            // function has no access to.
            Err(internal(
                "reverse references must be classified via resolve_reverse_target_shape",
            ))
        }
        (ValueKind::String | ValueKind::Number | ValueKind::Boolean | ValueKind::DateTime, Cardinality::Scalar, ..) => {
            match &prop.storage {
                Some(StorageHint::Column(column)) => Ok(PropertyShape::ScalarSimpleColumn { column: column.clone() }),
                Some(StorageHint::Table {
                    table,
                    parent_id_column,
                    key_column,
                    index_column,
                }) => Ok(PropertyShape::ScalarSimpleOwnTable {
                    table: CollectionTable {
                        table: table.clone(),
                        parent_id_column: parent_id_column.clone(),
                        key_column: key_column.clone(),
                        index_column: index_column.clone(),
                    },
                }),
                _ => Err(unsupported(path, "scalar simple property has no column/table storage")),
            }
        }
        (ValueKind::Object, Cardinality::Scalar, ..) => match &prop.storage {
            None => Ok(PropertyShape::ScalarObjectSameTable {
                presence_test: prop.presence_test.clone(),
            }),
            Some(StorageHint::Table {
                table,
                parent_id_column,
                key_column,
                index_column,
            }) => Ok(PropertyShape::ScalarObjectOwnTable {
                table: CollectionTable {
                    table: table.clone(),
                    parent_id_column: parent_id_column.clone(),
                    key_column: key_column.clone(),
                    index_column: index_column.clone(),
                },
            }),
            _ => Err(unsupported(path, "scalar object property has invalid storage")),
        },
        (ValueKind::Reference(_), Cardinality::Scalar, ..) => match &prop.storage {
            Some(StorageHint::Column(column)) => Ok(PropertyShape::ScalarRefDirect { column: column.clone() }),
            Some(StorageHint::Link {
                table,
                this_id_column,
                other_id_column,
            }) => Ok(PropertyShape::ScalarRefLink {
                link: LinkTable {
                    table: table.clone(),
                    this_id_column: this_id_column.clone(),
                    other_id_column: other_id_column.clone(),
                },
            }),
            _ => Err(unsupported(path, "scalar reference has no column/link storage")),
        },
        (ValueKind::String | ValueKind::Number | ValueKind::Boolean | ValueKind::DateTime, _, true, false) => {
            match &prop.storage {
                Some(StorageHint::Table {
                    table,
                    parent_id_column,
                    key_column,
                    index_column,
                }) => Ok(PropertyShape::CollectionSimple {
                    table: CollectionTable {
                        table: table.clone(),
                        parent_id_column: parent_id_column.clone(),
                        key_column: key_column.clone(),
                        index_column: index_column.clone(),
                    },
                }),
                _ => Err(unsupported(path, "collection-of-simple property has no table storage")),
            }
        }
        (ValueKind::Object, _, true, false) => match &prop.storage {
            Some(StorageHint::Table {
                table,
                parent_id_column,
                key_column,
                index_column,
            }) => Ok(PropertyShape::CollectionObject {
                table: CollectionTable {
                    table: table.clone(),
                    parent_id_column: parent_id_column.clone(),
                    key_column: key_column.clone(),
                    index_column: index_column.clone(),
                },
            }),
            _ => Err(unsupported(path, "collection-of-object property has no table storage")),
        },
        (ValueKind::Reference(_), _, true, false) => match &prop.storage {
            Some(StorageHint::Table {
                table,
                parent_id_column,
                key_column,
                index_column,
            }) => Ok(PropertyShape::CollectionRefDirect {
                table: CollectionTable {
                    table: table.clone(),
                    parent_id_column: parent_id_column.clone(),
                    key_column: key_column.clone(),
                    index_column: index_column.clone(),
                },
            }),
            Some(StorageHint::Link {
                table,
                this_id_column,
                other_id_column,
            }) => Ok(PropertyShape::CollectionRefLink {
                link: LinkTable {
                    table: table.clone(),
                    this_id_column: this_id_column.clone(),
                    other_id_column: other_id_column.clone(),
                },
            }),
            _ => Err(unsupported(path, "collection-of-reference property has no table/link storage")),
        },
        _ => Err(internal(format!("classify fell through for '{path}'"))),
    }
}

/// Resolves `array/map reference, reverse` -- the direct-join analogue
/// to [`resolve_reverse_target_shape`] for a collection reverse ref.
pub fn resolve_reverse_collection_shape(
    arena: &SchemaArena,
    path: &str,
    target_container: unified_fetch_record_schema::ContainerId,
    reverse_property_name: &str,
) -> QueryTreeResult<PropertyShape> {
    let container = arena.container(target_container);
    let target_prop_id = container
        .properties
        .get(reverse_property_name)
        .copied()
        .ok_or_else(|| QueryTreeError::DanglingReverseReference(path.to_string()))?;
    let target_prop = arena.property(target_prop_id);
    match &target_prop.storage {
        Some(StorageHint::Column(column)) => Ok(PropertyShape::CollectionRefReverse {
            target_column: column.clone(),
        }),
        Some(StorageHint::Link {
            table,
            this_id_column,
            other_id_column,
        }) => Ok(PropertyShape::CollectionRefLink {
            link: LinkTable {
                table: table.clone(),
                this_id_column: this_id_column.clone(),
                other_id_column: other_id_column.clone(),
            },
        }),
        _ => Err(unsupported(path, "reverse collection target property has no column/link storage")),
    }
}

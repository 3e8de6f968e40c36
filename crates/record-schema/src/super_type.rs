// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Synthetic super-type injection (§3 invariant 6).
//!
//! Every record type gains a synthetic super-type exposing
//! `{recordTypeName, records: [ref(T)], count: aggregate(records, COUNT), ...}`.
//! User-declared super-properties (additional aggregates or calculated
//! properties scoped to `records`) are supplied by the caller via
//! [`SuperTypeExtras`] before `finalize` and merged in here.

use crate::arena::SchemaArena;
use crate::error::SchemaResult;
use crate::property::{AggregateFunction, AggregateSpec, Cardinality, PropertyDesc, ValueKind};
use crate::record_type::RecordTypeId;

/// Well-known name of the pseudo-id property on a synthetic super-type.
/// It is calculated (a literal), which is legal only because invariant 2
/// ("id is never calculated") is checked before super-types are injected,
/// not after.
pub const SUPER_TYPE_ID_PROPERTY: &str = "recordTypeName";

/// Well-known name of the synthetic `records` collection property.
pub const SUPER_TYPE_RECORDS_PROPERTY: &str = "records";

/// Well-known name of the synthetic `count` aggregate property.
pub const SUPER_TYPE_COUNT_PROPERTY: &str = "count";

/// User-declared additions to a record type's super-type, registered on
/// the builder prior to `finalize` and consumed during injection.
#[derive(Debug, Clone, Default)]
pub struct SuperTypeExtras {
    pub properties: Vec<PropertyDesc>,
}

pub(crate) fn inject_super_type(
    arena: &mut SchemaArena,
    record_type_id: RecordTypeId,
    extras: SuperTypeExtras,
) -> SchemaResult<RecordTypeId> {
    let record_type_name = arena.record_type(record_type_id).name.clone();
    let super_type_name = format!("{record_type_name}$Super");

    let super_type_id = RecordTypeId(arena.record_types.len());
    let container_id = arena.push_container(super_type_id);

    let id_prop = PropertyDesc::new(SUPER_TYPE_ID_PROPERTY, ValueKind::String, Cardinality::Scalar)
        .with_calc(format!("literal(\"{record_type_name}\")"));
    let id_property = arena.push_property(id_prop);
    arena.containers[container_id.0]
        .properties
        .insert(SUPER_TYPE_ID_PROPERTY.to_string(), id_property);

    let records_prop = PropertyDesc::new(
        SUPER_TYPE_RECORDS_PROPERTY,
        ValueKind::Reference(record_type_id),
        Cardinality::Array,
    );
    let records_property = arena.push_property(records_prop);
    arena.containers[container_id.0]
        .properties
        .insert(SUPER_TYPE_RECORDS_PROPERTY.to_string(), records_property);

    let count_prop = PropertyDesc::new(SUPER_TYPE_COUNT_PROPERTY, ValueKind::Number, Cardinality::Scalar)
        .with_aggregate(AggregateSpec {
            collection_path: SUPER_TYPE_RECORDS_PROPERTY.to_string(),
            function: AggregateFunction::Count,
            expr: SUPER_TYPE_RECORDS_PROPERTY.to_string(),
            filter: None,
            key: None,
        });
    let count_property = arena.push_property(count_prop);
    arena.containers[container_id.0]
        .properties
        .insert(SUPER_TYPE_COUNT_PROPERTY.to_string(), count_property);

    let extra_count = extras.properties.len();
    for prop in extras.properties {
        let prop_name = prop.name.clone();
        let prop_id = arena.push_property(prop);
        arena.containers[container_id.0].properties.insert(prop_name, prop_id);
    }
    tracing::debug!(
        record_type = %record_type_name,
        extra_properties = extra_count,
        "record-schema: injected synthetic super-type"
    );

    let record_type_table = arena.record_type(record_type_id).table.clone();
    arena.record_types.push(crate::record_type::RecordTypeDesc {
        id: super_type_id,
        name: super_type_name.clone(),
        // Synthetic: the super-type has no table of its own. A super
        // query's root FROM is the underlying record type's table --
        // `records` is that same per-row scope, and `count` aggregates
        // over it -- so the super-type descriptor just carries it
        // through rather than leaving it unrepresentable.
        table: record_type_table,
        container: container_id,
        id_property,
        super_type: None,
    });
    arena.record_type_by_name.insert(super_type_name, super_type_id);

    Ok(super_type_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaBuilder;

    #[test]
    fn super_type_exposes_records_and_count() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Order",
                "orders",
                "id",
                vec![PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                    .with_storage(crate::property::StorageHint::Column("id".into()))],
            )
            .unwrap();
        let schema = builder.finalize().unwrap();
        let order = schema.arena().get_record_type_desc("Order").unwrap();
        let super_type_id = order.super_type.expect("super type injected");
        let super_type = schema.arena().record_type(super_type_id);
        assert_eq!(super_type.name, "Order$Super");
        let container = schema.arena().container(super_type.container);
        assert!(container.properties.contains_key(SUPER_TYPE_RECORDS_PROPERTY));
        assert!(container.properties.contains_key(SUPER_TYPE_COUNT_PROPERTY));
    }
}

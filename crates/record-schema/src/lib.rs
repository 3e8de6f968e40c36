// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Record-Fetch Engine — Record-Type Schema
//!
//! This crate provides the read-only record-type schema that the query
//! compiler (`unified-fetch-prop-tree`, `unified-fetch-query-tree`,
//! `unified-fetch-fetch`) binds against.
//!
//! ## Architecture
//!
//! Descriptors are held in an arena ([`SchemaArena`]) addressed by
//! numeric ids ([`RecordTypeId`], [`ContainerId`], [`PropertyId`]); a
//! child's back reference to its container is a non-owning id, never a
//! pointer, so the arena can be shared behind `Arc` without lifetime
//! gymnastics.
//!
//! Construction is two-phase ([`SchemaBuilder`]): phase 1 registers
//! descriptors and defers invariant checks that need the full arena;
//! phase 2 (`finalize`) runs every deferred validator, injects the
//! synthetic super-type for each record type, and freezes the schema.
//! No mutation is possible after `finalize` — [`Schema`] only exposes
//! shared references into its arena.

pub mod arena;
pub mod error;
pub mod property;
pub mod record_type;
pub mod super_type;

use std::sync::Arc;

pub use arena::{SchemaArena, SchemaBuilder};
pub use error::{SchemaError, SchemaResult};
pub use property::{
    AggregateFunction, AggregateSpec, Cardinality, PropertyDesc, PropertyId, StorageHint, ValueKind,
};
pub use record_type::{Container, ContainerId, RecordTypeDesc, RecordTypeId};
pub use super_type::{SuperTypeExtras, SUPER_TYPE_COUNT_PROPERTY, SUPER_TYPE_RECORDS_PROPERTY};

/// A finalized, immutable schema. Shared read-only across fetches.
#[derive(Debug, Clone)]
pub struct Schema {
    arena: Arc<SchemaArena>,
}

impl Schema {
    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    pub fn has_record_type(&self, name: &str) -> bool {
        self.arena.has_record_type(name)
    }

    pub fn get_record_type_desc(&self, name: &str) -> SchemaResult<&RecordTypeDesc> {
        self.arena.get_record_type_desc(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::StorageHint;

    fn sample_builder() -> SchemaBuilder {
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
                ],
            )
            .unwrap();
        builder
    }

    #[test]
    fn finalize_freezes_and_exposes_schema() {
        let schema = sample_builder().finalize().unwrap();
        assert!(schema.has_record_type("Customer"));
        assert!(schema.has_record_type("Customer$Super"));
    }

    #[test]
    fn unknown_record_type_is_an_error() {
        let schema = sample_builder().finalize().unwrap();
        assert!(schema.get_record_type_desc("Nope").is_err());
    }

    #[test]
    fn missing_presence_test_is_rejected() {
        let mut builder = SchemaBuilder::new();
        let result = builder.add_record_type(
            "Account",
            "accounts",
            "id",
            vec![
                PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                    .with_storage(StorageHint::Column("id".into())),
                PropertyDesc::new("billingAddress", ValueKind::Object, Cardinality::Scalar)
                    .optional(),
            ],
        );
        assert!(result.is_ok());
        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, SchemaError::MissingPresenceTest { .. }));
    }

    #[test]
    fn calculated_id_is_rejected() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Widget",
                "widgets",
                "id",
                vec![PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar).with_calc("1")],
            )
            .unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, SchemaError::CalculatedId { .. }));
    }

    #[test]
    fn collection_without_table_is_rejected() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Widget",
                "widgets",
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("tags", ValueKind::String, Cardinality::Array),
                ],
            )
            .unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, SchemaError::MissingCollectionTable { .. }));
    }

    #[test]
    fn reverse_reference_requires_matching_target_property() {
        let mut builder = SchemaBuilder::new();
        // Customer and Order reference each other, so both are reserved
        // before either is fully defined.
        let customer = builder.reserve_record_type("Customer", "customers").unwrap();
        let order = builder.reserve_record_type("Order", "orders").unwrap();

        builder
            .define_record_type(
                order,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("customer", ValueKind::Reference(customer), Cardinality::Scalar)
                        .with_storage(StorageHint::Column("customer_id".into())),
                ],
            )
            .unwrap();
        builder
            .define_record_type(
                customer,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("orders", ValueKind::Reference(order), Cardinality::Array)
                        .with_reverse_ref("customer"),
                ],
            )
            .unwrap();

        let schema = builder.finalize().unwrap();
        let customer_rt = schema.get_record_type_desc("Customer").unwrap();
        let container = schema.arena().container(customer_rt.container);
        assert!(container.properties.contains_key("orders"));
    }

    #[test]
    fn reverse_reference_to_non_scalar_target_is_rejected() {
        let mut builder = SchemaBuilder::new();
        let customer = builder.reserve_record_type("Customer", "customers").unwrap();
        let order = builder.reserve_record_type("Order", "orders").unwrap();

        builder
            .define_record_type(
                order,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    // `customer` is an array, not scalar -- invalid reverse-ref target.
                    PropertyDesc::new("customer", ValueKind::Reference(customer), Cardinality::Array)
                        .with_storage(StorageHint::Table {
                            table: "order_customers".into(),
                            parent_id_column: "order_id".into(),
                            key_column: None,
                            index_column: None,
                        }),
                ],
            )
            .unwrap();
        builder
            .define_record_type(
                customer,
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("orders", ValueKind::Reference(order), Cardinality::Array)
                        .with_reverse_ref("customer"),
                ],
            )
            .unwrap();

        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidReverseReference { .. }));
    }
}

// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Record types and containers.
//!
//! A container is a properties carrier: either a record type's top-level
//! container, or a nested-object property's inner schema. Containers are
//! addressed by [`ContainerId`], a non-owning arena index — the back
//! reference from a child property to its owning container is a relation,
//! never ownership, per the schema's lifecycle rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::property::PropertyId;

/// Arena index of a record type. Stable for the lifetime of a [`crate::Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordTypeId(pub usize);

/// Arena index of a container (record type top-level, or a nested object's).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub usize);

/// A properties carrier: a record type's top-level scope, or a nested
/// object property's inner scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// The record type this container ultimately belongs to (its own, for
    /// top-level containers; the enclosing record type, for nested ones).
    pub owner: RecordTypeId,
    /// Keyed by name rather than insertion order, so wildcard expansion
    /// and markup assignment see a deterministic (alphabetical) property
    /// order across runs regardless of how the schema was built.
    pub properties: BTreeMap<String, PropertyId>,
}

impl Container {
    pub fn property_names_in_order(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// A top-level record type: a container plus an id property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeDesc {
    pub id: RecordTypeId,
    pub name: String,
    /// Name of the SQL table this record type's own (non-collection,
    /// non-link) rows live in.
    pub table: String,
    pub container: ContainerId,
    pub id_property: PropertyId,
    /// Set once [`crate::Schema::finalize`] has injected the synthetic
    /// super-type for this record type.
    pub super_type: Option<RecordTypeId>,
}

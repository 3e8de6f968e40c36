// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Two-phase schema construction: register descriptors, defer invariant
//! checks that need the full arena, then finalize and freeze.
//!
//! Mirrors the "on-library-complete callback" pattern from the source
//! system: phase 1 registers descriptors and defers validators that may
//! need to see record types registered later (e.g. reverse-reference
//! targets); phase 2 runs every deferred validator, injects the synthetic
//! super-type for each record type, and freezes the arena.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{SchemaError, SchemaResult};
use crate::property::{Cardinality, PropertyDesc, PropertyId, StorageHint, ValueKind};
use crate::record_type::{Container, ContainerId, RecordTypeDesc, RecordTypeId};
use crate::super_type::{self, SuperTypeExtras};

/// Immutable arena of schema descriptors, shared read-only across fetches
/// after finalization (`Arc<Schema>`).
#[derive(Debug, Default)]
pub struct SchemaArena {
    pub(crate) record_types: Vec<RecordTypeDesc>,
    pub(crate) containers: Vec<Container>,
    pub(crate) properties: Vec<PropertyDesc>,
    pub(crate) record_type_by_name: BTreeMap<String, RecordTypeId>,
}

impl SchemaArena {
    pub fn record_type(&self, id: RecordTypeId) -> &RecordTypeDesc {
        &self.record_types[id.0]
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.containers[id.0]
    }

    pub fn property(&self, id: PropertyId) -> &PropertyDesc {
        &self.properties[id.0]
    }

    pub fn find_record_type(&self, name: &str) -> Option<RecordTypeId> {
        self.record_type_by_name.get(name).copied()
    }

    pub fn get_record_type_desc(&self, name: &str) -> SchemaResult<&RecordTypeDesc> {
        let id = self
            .find_record_type(name)
            .ok_or_else(|| SchemaError::UnknownRecordType(name.to_string()))?;
        Ok(self.record_type(id))
    }

    pub fn has_record_type(&self, name: &str) -> bool {
        self.record_type_by_name.contains_key(name)
    }

    pub fn find_property(&self, container: ContainerId, name: &str) -> Option<PropertyId> {
        self.container(container).properties.get(name).copied()
    }

    pub(crate) fn push_container(&mut self, owner: RecordTypeId) -> ContainerId {
        let id = ContainerId(self.containers.len());
        self.containers.push(Container {
            id,
            owner,
            properties: BTreeMap::new(),
        });
        id
    }

    pub(crate) fn push_property(&mut self, desc: PropertyDesc) -> PropertyId {
        let id = PropertyId(self.properties.len());
        self.properties.push(desc);
        id
    }
}

type DeferredValidator = Box<dyn FnOnce(&SchemaArena) -> SchemaResult<()>>;

/// Builds a [`crate::Schema`] across the two phases described above.
pub struct SchemaBuilder {
    arena: SchemaArena,
    deferred: Vec<DeferredValidator>,
    super_type_extras: BTreeMap<RecordTypeId, SuperTypeExtras>,
    finalized: bool,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            arena: SchemaArena::default(),
            deferred: Vec::new(),
            super_type_extras: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Registers user-declared additions (extra aggregates or calculated
    /// properties scoped to `records`) to be merged into `record_type_id`'s
    /// synthetic super-type at [`Self::finalize`]. Calling this more than
    /// once for the same record type appends to the existing extras rather
    /// than replacing them.
    pub fn add_super_type_extras(&mut self, record_type_id: RecordTypeId, extras: SuperTypeExtras) {
        self.super_type_extras.entry(record_type_id).or_default().properties.extend(extras.properties);
    }

    /// Registers a record type with its id property and remaining
    /// properties, deferring the per-property invariant checks (§3,
    /// invariants 1-5) to finalization time.
    pub fn add_record_type(
        &mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        id_property_name: impl Into<String>,
        properties: Vec<PropertyDesc>,
    ) -> SchemaResult<RecordTypeId> {
        let record_type_id = self.reserve_record_type(name, table)?;
        self.define_record_type(record_type_id, id_property_name, properties)?;
        Ok(record_type_id)
    }

    /// Reserves a record type name and its backing table, returning its
    /// id before its properties are known. Used to break forward-reference
    /// cycles: two record types that reference each other can each reserve
    /// first, then [`Self::define_record_type`] the other's id into their
    /// own properties.
    pub fn reserve_record_type(
        &mut self,
        name: impl Into<String>,
        table: impl Into<String>,
    ) -> SchemaResult<RecordTypeId> {
        if self.finalized {
            return Err(SchemaError::AlreadyFinalized);
        }
        let name = name.into();
        if self.arena.record_type_by_name.contains_key(&name) {
            return Err(SchemaError::DuplicateRecordType(name));
        }
        let record_type_id = RecordTypeId(self.arena.record_types.len());
        let container_id = self.arena.push_container(record_type_id);
        // Placeholder id property; replaced by `define_record_type`.
        let placeholder_id = self.arena.push_property(PropertyDesc::new(
            "$reserved",
            ValueKind::Number,
            Cardinality::Scalar,
        ));
        self.arena.record_types.push(RecordTypeDesc {
            id: record_type_id,
            name: name.clone(),
            table: table.into(),
            container: container_id,
            id_property: placeholder_id,
            super_type: None,
        });
        self.arena.record_type_by_name.insert(name, record_type_id);
        Ok(record_type_id)
    }

    /// Fills in the properties of a record type previously reserved with
    /// [`Self::reserve_record_type`].
    pub fn define_record_type(
        &mut self,
        record_type_id: RecordTypeId,
        id_property_name: impl Into<String>,
        properties: Vec<PropertyDesc>,
    ) -> SchemaResult<()> {
        if self.finalized {
            return Err(SchemaError::AlreadyFinalized);
        }
        let id_property_name = id_property_name.into();
        let name = self.arena.record_type(record_type_id).name.clone();
        let container_id = self.arena.record_type(record_type_id).container;

        let mut id_property = None;
        for prop in properties {
            let prop_name = prop.name.clone();
            if self.arena.container(container_id).properties.contains_key(&prop_name) {
                return Err(SchemaError::DuplicateProperty {
                    record_type: name.clone(),
                    property: prop_name,
                });
            }
            let is_id = prop_name == id_property_name;
            let prop_id = self.arena.push_property(prop);
            self.arena.containers[container_id.0]
                .properties
                .insert(prop_name.clone(), prop_id);
            if is_id {
                id_property = Some(prop_id);
            }
        }
        let id_property = id_property.ok_or_else(|| SchemaError::UnknownProperty {
            record_type: name.clone(),
            property: id_property_name,
        })?;
        self.arena.record_types[record_type_id.0].id_property = id_property;

        self.deferred.push(Box::new(move |arena: &SchemaArena| {
            validate_record_type_invariants(arena, record_type_id)
        }));
        Ok(())
    }

    /// Registers a nested-object container (the inner schema of an
    /// `Object`-kind property) and returns its id.
    pub fn add_nested_container(
        &mut self,
        owner: RecordTypeId,
        properties: Vec<PropertyDesc>,
    ) -> ContainerId {
        let container_id = self.arena.push_container(owner);
        for prop in properties {
            let prop_name = prop.name.clone();
            let prop_id = self.arena.push_property(prop);
            self.arena.containers[container_id.0]
                .properties
                .insert(prop_name, prop_id);
        }
        container_id
    }

    /// Registers an arbitrary deferred validator, for cross-record-type
    /// checks that only make sense once every record type is registered.
    pub fn defer_validation<F>(&mut self, f: F)
    where
        F: FnOnce(&SchemaArena) -> SchemaResult<()> + 'static,
    {
        self.deferred.push(Box::new(f));
    }

    /// Runs every deferred validator, injects the synthetic super-type for
    /// each record type, and freezes the schema.
    pub fn finalize(mut self) -> SchemaResult<crate::Schema> {
        self.finalized = true;
        for validator in self.deferred.drain(..) {
            validator(&self.arena)?;
        }

        let record_type_ids: Vec<RecordTypeId> =
            self.arena.record_types.iter().map(|rt| rt.id).collect();
        tracing::debug!(
            record_type_count = record_type_ids.len(),
            "record-schema: finalizing schema"
        );
        for record_type_id in record_type_ids {
            let extras = self.super_type_extras.remove(&record_type_id).unwrap_or_default();
            let super_type_id = super_type::inject_super_type(&mut self.arena, record_type_id, extras)?;
            self.arena.record_types[record_type_id.0].super_type = Some(super_type_id);
        }

        Ok(crate::Schema {
            arena: Arc::new(self.arena),
        })
    }
}

fn validate_record_type_invariants(arena: &SchemaArena, record_type_id: RecordTypeId) -> SchemaResult<()> {
    let record_type = arena.record_type(record_type_id);
    let container = arena.container(record_type.container);

    for (prop_name, &prop_id) in &container.properties {
        let prop = arena.property(prop_id);
        let is_id = prop_id == record_type.id_property;

        // Invariant 2: id property is never calculated.
        if is_id && prop.is_calculated() {
            return Err(SchemaError::CalculatedId {
                record_type: record_type.name.clone(),
                property: prop_name.clone(),
            });
        }

        // Invariant 4: calculated/aggregate conflicts with table/column/
        // presenceTest/order/filter/reverseRefProperty.
        if prop.is_calculated() {
            if prop.storage.is_some() {
                return Err(SchemaError::CalculatedConflict {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    conflicting: "storage (table/column)",
                });
            }
            if prop.presence_test.is_some() {
                return Err(SchemaError::CalculatedConflict {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    conflicting: "presenceTest",
                });
            }
            if prop.order.is_some() {
                return Err(SchemaError::CalculatedConflict {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    conflicting: "order",
                });
            }
            if prop.filter.is_some() {
                return Err(SchemaError::CalculatedConflict {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    conflicting: "filter",
                });
            }
            if prop.reverse_ref_property.is_some() {
                return Err(SchemaError::CalculatedConflict {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    conflicting: "reverseRefProperty",
                });
            }
            continue;
        }

        // Invariant 1: optional scalar object stored in the parent table
        // must have a presence test.
        if prop.value_kind == ValueKind::Object
            && prop.cardinality == Cardinality::Scalar
            && prop.optional
            && matches!(prop.storage, Some(StorageHint::Column(_)) | None)
            && prop.presence_test.is_none()
        {
            return Err(SchemaError::MissingPresenceTest {
                record_type: record_type.name.clone(),
                property: prop_name.clone(),
            });
        }

        // Invariant 5: non-scalar stored properties must have a separate
        // table with a parent-id column.
        if prop.cardinality.is_collection() {
            match &prop.storage {
                Some(StorageHint::Table { .. }) | Some(StorageHint::Link { .. }) => {}
                _ => {
                    return Err(SchemaError::MissingCollectionTable {
                        record_type: record_type.name.clone(),
                        property: prop_name.clone(),
                    });
                }
            }
        }

        // Invariant 3: a reverse reference points at a scalar,
        // non-calculated ref on the target type whose target is this
        // container's record type.
        if let Some(target_prop_name) = &prop.reverse_ref_property {
            let ValueKind::Reference(target_record_type_id) = prop.value_kind else {
                return Err(SchemaError::InvalidReverseReference {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    target: "<non-reference>".to_string(),
                });
            };
            let target_record_type = arena.record_type(target_record_type_id);
            let target_container = arena.container(target_record_type.container);
            let target_prop_id = target_container
                .properties
                .get(target_prop_name)
                .copied()
                .ok_or_else(|| SchemaError::InvalidReverseReference {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    target: target_record_type.name.clone(),
                })?;
            let target_prop = arena.property(target_prop_id);
            let points_back = matches!(
                target_prop.value_kind,
                ValueKind::Reference(back_id) if back_id == record_type_id
            );
            if target_prop.cardinality != Cardinality::Scalar
                || target_prop.is_calculated()
                || !points_back
            {
                return Err(SchemaError::InvalidReverseReference {
                    record_type: record_type.name.clone(),
                    property: prop_name.clone(),
                    target: target_record_type.name.clone(),
                });
            }
        }
    }

    Ok(())
}

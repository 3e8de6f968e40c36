// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Property descriptors: the scalar/array/map fields of a container.

use serde::{Deserialize, Serialize};

use crate::record_type::{ContainerId, RecordTypeId};

/// Arena index of a property. Stable for the lifetime of a [`crate::Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub usize);

/// Scalar value kind a property carries.
///
/// `Object` properties carry their own nested container of child
/// properties (see [`PropertyDesc::nested_container`]); `Reference`
/// properties point at another record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    DateTime,
    Object,
    Reference(RecordTypeId),
}

impl ValueKind {
    /// Whether a path can continue through this property (object or reference).
    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::Reference(_))
    }
}

/// Cardinality of a property's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Scalar,
    Array,
    Map,
}

impl Cardinality {
    pub fn is_collection(&self) -> bool {
        matches!(self, Cardinality::Array | Cardinality::Map)
    }
}

/// Where a property's value physically lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageHint {
    /// Same table as the parent, in the named column.
    Column(String),
    /// A separate table, joined back to the parent by `parent_id_column`.
    Table {
        table: String,
        parent_id_column: String,
        /// Key column for maps, or the synthetic own-id for object collections.
        key_column: Option<String>,
        /// Position column for ordered arrays.
        index_column: Option<String>,
    },
    /// Reference stored via a link (join) table rather than an fk column.
    Link {
        table: String,
        this_id_column: String,
        other_id_column: String,
    },
}

/// Aggregate function kinds available to `aggregate` properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// An `aggregate` calculated property: `aggregate(collection-path, fn, expr, filter?, key?)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub collection_path: String,
    pub function: AggregateFunction,
    /// The scalar expression being aggregated, relative to `collection_path`.
    pub expr: String,
    /// Optional filter scoped to the aggregated collection, in predicate-string form.
    pub filter: Option<String>,
    /// Path of a scalar property on the collection, relative to
    /// `collection_path`, to group by instead of collapsing to one row --
    /// turns the aggregate into a map aggregate keyed by that property.
    pub key: Option<String>,
}

impl AggregateSpec {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A property of a [`crate::container::Container`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDesc {
    pub name: String,
    pub value_kind: ValueKind,
    pub cardinality: Cardinality,
    pub storage: Option<StorageHint>,
    /// Inner container for an `Object`-kind property, registered separately
    /// via [`crate::arena::SchemaArena::push_container`] (through
    /// [`crate::arena::SchemaBuilder::add_nested_container`]) since a
    /// container's own properties may themselves reference record types
    /// not yet defined. Unused for every other value kind.
    pub nested_container: Option<ContainerId>,

    /// Calculated value expression text, if this is a calculated property.
    pub calc: Option<String>,
    /// Aggregate spec, if this is an aggregate property.
    pub aggregate: Option<AggregateSpec>,
    /// Presence-test filter text for an optional same-table nested object.
    pub presence_test: Option<String>,
    /// Scoped filter for a collection or view, in predicate-string form.
    pub filter: Option<String>,
    /// Scoped order for a collection or view.
    pub order: Option<Vec<String>>,
    /// Name of the scalar reference on the target type, for reverse references.
    pub reverse_ref_property: Option<String>,

    /// Whether this property is fetched by a `*` wildcard by default.
    pub fetched_by_default: bool,
    /// Whether an absent value leaves a `NULL`/outer-joined row rather than excluding it.
    pub optional: bool,
}

impl PropertyDesc {
    pub fn new(name: impl Into<String>, value_kind: ValueKind, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            value_kind,
            cardinality,
            storage: None,
            nested_container: None,
            calc: None,
            aggregate: None,
            presence_test: None,
            filter: None,
            order: None,
            reverse_ref_property: None,
            fetched_by_default: true,
            optional: false,
        }
    }

    pub fn with_storage(mut self, storage: StorageHint) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attaches the inner container for an `Object`-kind property.
    pub fn with_nested_container(mut self, container: ContainerId) -> Self {
        self.nested_container = Some(container);
        self
    }

    pub fn with_calc(mut self, expr: impl Into<String>) -> Self {
        self.calc = Some(expr.into());
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateSpec) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn with_presence_test(mut self, filter: impl Into<String>) -> Self {
        self.presence_test = Some(filter.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_reverse_ref(mut self, target_property: impl Into<String>) -> Self {
        self.reverse_ref_property = Some(target_property.into());
        self
    }

    pub fn not_fetched_by_default(mut self) -> Self {
        self.fetched_by_default = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_calculated(&self) -> bool {
        self.calc.is_some() || self.aggregate.is_some()
    }

    pub fn is_reverse_reference(&self) -> bool {
        self.reverse_ref_property.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_storage_column() {
        let prop = PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
            .with_storage(StorageHint::Column("name".into()));
        assert!(matches!(prop.storage, Some(StorageHint::Column(ref c)) if c == "name"));
    }

    #[test]
    fn calculated_property_reports_is_calculated() {
        let prop = PropertyDesc::new("fullName", ValueKind::String, Cardinality::Scalar)
            .with_calc("firstName.concat(lastName)");
        assert!(prop.is_calculated());
    }

    #[test]
    fn value_kind_container_check() {
        assert!(ValueKind::Object.is_container());
        assert!(ValueKind::Reference(RecordTypeId(0)).is_container());
        assert!(!ValueKind::String.is_container());
    }
}

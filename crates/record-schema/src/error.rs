// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Errors raised while registering or finalizing a schema.

use thiserror::Error;

/// Result type alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema-bind-time validation failures, raised once at [`crate::Schema::finalize`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("record type '{0}' is not registered")]
    UnknownRecordType(String),

    #[error("property '{property}' not found on record type '{record_type}'")]
    UnknownProperty { record_type: String, property: String },

    #[error(
        "optional scalar object property '{record_type}.{property}' is stored in the parent table but has no presence test"
    )]
    MissingPresenceTest { record_type: String, property: String },

    #[error("id property '{record_type}.{property}' may not be calculated")]
    CalculatedId { record_type: String, property: String },

    #[error(
        "reverse reference '{record_type}.{property}' must point at a scalar, non-calculated reference on '{target}' back to '{record_type}'"
    )]
    InvalidReverseReference {
        record_type: String,
        property: String,
        target: String,
    },

    #[error(
        "calculated/aggregate property '{record_type}.{property}' may not also declare {conflicting}"
    )]
    CalculatedConflict {
        record_type: String,
        property: String,
        conflicting: &'static str,
    },

    #[error(
        "non-scalar stored property '{record_type}.{property}' must declare a separate table with a parent-id column"
    )]
    MissingCollectionTable { record_type: String, property: String },

    #[error("record type '{0}' is already registered")]
    DuplicateRecordType(String),

    #[error("property '{property}' is already registered on record type '{record_type}'")]
    DuplicateProperty { record_type: String, property: String },

    #[error("schema has already been finalized; no further registration is allowed")]
    AlreadyFinalized,
}

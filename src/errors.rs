//! Error types for schema resolution and graph statement compilation.
//!
//! Two families:
//!
//! - [`SchemaError`] - a malformed declaration, raised while resolving the
//!   type registry at process start. Fatal: resolution either produces a
//!   complete schema or nothing.
//! - [`GraphError`] - a per-request failure: a missing node, an instance that
//!   does not conform to the resolved schema, or a store-level fault.
//!   Surfaced to the caller, never retried here.

use thiserror::Error;
use uuid::Uuid;

/// A configuration fault in the declared type graph.
///
/// Raised once, during [`resolve`](crate::schema::resolve); the process
/// should treat any variant as a startup failure.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("type '{name}' is declared more than once")]
    DuplicateType { name: String },

    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("type '{type_name}' declares unknown parent '{parent}'")]
    UnknownParent { type_name: String, parent: String },

    #[error("type '{type_name}' mixes in unknown trait '{name}'")]
    UnknownTrait { type_name: String, name: String },

    #[error("relation '{type_name}.{field}' is missing a reverse name")]
    MissingReverseName { type_name: String, field: String },

    #[error("field '{field}' on type '{type_name}' is a reserved name")]
    ReservedFieldName { type_name: String, field: String },

    #[error(
        "type name '{type_name}' contains '{fragment}', which is reserved for internal use"
    )]
    ReservedTypeName {
        type_name: String,
        fragment: &'static str,
    },

    #[error(
        "relation '{type_name}.{field}' narrows '{narrows}', \
         which does not exist on any ancestor of '{type_name}'"
    )]
    UnknownNarrowTarget {
        type_name: String,
        field: String,
        narrows: String,
    },

    #[error("relation '{type_name}.{field}' target union mixes relatable and scalar members")]
    MixedTargetUnion { type_name: String, field: String },

    #[error("relation '{type_name}.{field}' target '{target}' is not a relatable type")]
    TargetNotRelatable {
        type_name: String,
        field: String,
        target: String,
    },

    #[error(
        "relation '{type_name}.{field}' wraps its target in an optional; \
         express cardinality with min/max counts instead"
    )]
    OptionalTarget { type_name: String, field: String },

    #[error("relation '{type_name}.{field}' resolves to no concrete target types")]
    EmptyTargetSet { type_name: String, field: String },
}

/// A per-request failure compiling or executing a graph statement.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node '{uid}' of type '{type_name}' not found")]
    NotFound { type_name: String, uid: Uuid },

    #[error("validation failed for '{type_name}': {message}")]
    Validation { type_name: String, message: String },

    #[error("uid '{uid}' already exists with conflicting type '{existing_type}'")]
    WriteConflict { uid: Uuid, existing_type: String },

    #[error("store error: {message}")]
    Store { message: String },
}

impl GraphError {
    /// Shorthand for a validation failure on a named type.
    pub fn validation(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Validation {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

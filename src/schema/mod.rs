//! Schema resolution: declarations in, immutable resolved schema out.
//!
//! # Architecture
//!
//! Resolution is a pipeline of ordered passes over the collected
//! declarations:
//!
//! 1. registration and name checks,
//! 2. specialization of relation carriers against their targets,
//! 3. arena construction with label sets and flattened properties,
//! 4. outgoing relation resolution, including narrowing,
//! 5. embedded-field resolution,
//! 6. incoming-relation propagation,
//! 7. cycle analysis for inline edit chains,
//! 8. projection derivation (Reference, View, Edit).
//!
//! The output, [`ResolvedSchema`], is a fully cross-linked arena of
//! [`ResolvedType`]s addressed by [`TypeId`]. It is built once at startup and
//! never mutated afterwards; every later compiler (create, update, read)
//! reads from it without locking.

mod projections;
mod resolve;
mod types;

pub use projections::{Projections, ReferenceShape, Shape, ShapeField, ShapeTarget};
pub use resolve::{BASE_NODE_LABEL, resolve};
pub use types::{
    EmbeddedField, IncomingRelation, IncomingVia, PropertyField, RelationField, ResolvedSchema,
    ResolvedType, TypeId,
};

//! modelgraph library - typed graph entity model core
//!
//! Provides schema resolution for a declared type graph (inheritance, trait
//! mixins, reified relations, embedded ownership) and compiles validated
//! instance trees into parameterized graph statements for creating, updating
//! and reading aggregates through an external store adapter.

pub mod cypher;
pub mod errors;
pub mod indexes;
pub mod instance;
pub mod registry;
pub mod schema;
pub mod store;

pub use cypher::{CompiledStatement, CreateStatement, compile_create, compile_read, compile_update};
pub use errors::{GraphError, SchemaError};
pub use instance::{Instance, RelationValue, WriteMode};
pub use registry::TypeRegistry;
pub use schema::{ResolvedSchema, TypeId, resolve};

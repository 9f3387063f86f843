//! Differential graph statement compilation.
//!
//! # Architecture
//!
//! Three compilers, one per operation, each turning a resolved schema plus a
//! validated [`Instance`](crate::instance::Instance) (or a bare identifier)
//! into a single Cypher statement with named parameters:
//!
//! - [`compile_create`] writes a fresh aggregate: one node clause per owned
//!   descendant, one edge clause per structural link and declared relation.
//! - [`compile_update`] reconciles an existing aggregate differentially:
//!   whole-map property overwrite, set reconciliation for plain relations,
//!   upsert-and-recurse for inline children, cascade cleanup on detach.
//! - [`compile_read`] reconstructs an aggregate: owned subtree to unbounded
//!   depth, one hop into references, incoming relations grouped by reverse
//!   name.
//!
//! Every literal value is bound as a named parameter, never interpolated
//! into statement text, so statements are injection-safe and plan-cacheable.
//! Parameter and node identifiers are sequential, making compiled statements
//! deterministic and directly assertable in tests.

mod create;
mod params;
mod read;
mod update;

pub use create::{CreateStatement, compile_create};
pub use params::Params;
pub use read::compile_read;
pub use update::compile_update;

/// A statement ready for the store adapter: text plus named parameters.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub statement: String,
    pub params: Params,
}

//! Resolved schema types.
//!
//! Everything here is produced once by [`resolve`](super::resolve) and read
//! for the lifetime of the process. Types live in an arena addressed by
//! [`TypeId`]; all cross-type links are ids, never names, so lookups after
//! resolution are index operations.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::registry::{Capabilities, PropertyKind};

use super::projections::Projections;

/// Stable arena index of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A scalar property field on a resolved type.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyField {
    pub name: String,
    pub kind: PropertyKind,
}

/// A fully resolved outgoing relation field.
#[derive(Debug, Clone)]
pub struct RelationField {
    pub name: String,
    pub reverse_name: String,
    /// Concrete target types. For a reified relation these are the
    /// specialized carrier types, whose own `target` field holds the real
    /// endpoints.
    pub targets: Vec<TypeId>,
    pub relation_props: Option<BTreeMap<String, PropertyKind>>,
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    pub create_inline: bool,
    pub edit_inline: bool,
    pub delete_related_on_detach: bool,
    /// Edge labels this field answers to. Contains the field's own name and,
    /// when the field narrows an ancestor relation, the whole narrowed
    /// lineage, so both names remain queryable.
    pub relation_labels: BTreeSet<String>,
    /// True when the targets are specialized relation carriers.
    pub via_reified: bool,
}

impl RelationField {
    /// Upper-cased relationship type used in compiled statements.
    pub fn edge_type(&self) -> String {
        self.name.to_uppercase()
    }
}

/// A resolved embedded field. Embedded children are owned absolutely and
/// always cascade-deleted on detach.
#[derive(Debug, Clone)]
pub struct EmbeddedField {
    pub name: String,
    pub targets: Vec<TypeId>,
    pub min_count: usize,
    pub max_count: Option<usize>,
}

impl EmbeddedField {
    pub fn edge_type(&self) -> String {
        self.name.to_uppercase()
    }
}

/// How an incoming relation reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IncomingVia {
    Direct,
    /// The forward relation was declared on an embedded descendant of the
    /// origin aggregate.
    Embedded,
    /// The forward relation passes through a specialized relation carrier.
    Reified,
}

/// A derived incoming-relation entry: who points here, under which declared
/// reverse name, and through what kind of hop.
#[derive(Debug, Clone)]
pub struct IncomingRelation {
    pub origin: TypeId,
    /// The forward field name on the origin type.
    pub relation_name: String,
    pub relation_props: Option<BTreeMap<String, PropertyKind>>,
    pub via: IncomingVia,
}

/// One fully resolved node type.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub id: TypeId,
    pub name: String,
    pub parent: Option<TypeId>,
    pub is_abstract: bool,
    /// True for synthesized carrier-times-target specializations.
    pub is_reified: bool,
    /// Full label set: the ancestor chain (self first), the root marker
    /// `BaseNode`, heritable traits from anywhere in the chain, and
    /// non-heritable traits mixed in directly.
    pub labels: Vec<String>,
    pub properties: Vec<PropertyField>,
    pub relations: Vec<RelationField>,
    pub embedded: Vec<EmbeddedField>,
    /// Derived reverse index, keyed by declared reverse name.
    pub incoming: BTreeMap<String, Vec<IncomingRelation>>,
    pub capabilities: Capabilities,
}

impl ResolvedType {
    pub fn relation(&self, name: &str) -> Option<&RelationField> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn embedded_field(&self, name: &str) -> Option<&EmbeddedField> {
        self.embedded.iter().find(|e| e.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyField> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// String-kinded property names, the inputs to full-text indexing.
    pub fn text_property_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.kind.is_text())
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// The immutable, process-lifetime product of schema resolution.
#[derive(Debug)]
pub struct ResolvedSchema {
    pub(crate) types: Vec<ResolvedType>,
    pub(crate) by_name: BTreeMap<String, TypeId>,
    pub(crate) projections: BTreeMap<TypeId, Projections>,
}

impl ResolvedSchema {
    pub fn get(&self, id: TypeId) -> &ResolvedType {
        &self.types[id.index()]
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn type_by_name(&self, name: &str) -> Option<&ResolvedType> {
        self.type_id(name).map(|id| self.get(id))
    }

    pub fn types(&self) -> impl Iterator<Item = &ResolvedType> {
        self.types.iter()
    }

    /// Concrete, directly addressable types: not abstract and not a
    /// synthesized relation carrier.
    pub fn aggregate_types(&self) -> impl Iterator<Item = &ResolvedType> {
        self.types
            .iter()
            .filter(|t| !t.is_abstract && !t.is_reified)
    }

    /// Concrete descendants of a type, the type itself included when it is
    /// concrete.
    pub fn concrete_descendants(&self, id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let t = self.get(current);
            if !t.is_abstract {
                out.push(current);
            }
            for candidate in &self.types {
                if candidate.parent == Some(current) {
                    stack.push(candidate.id);
                }
            }
        }
        out.sort();
        out
    }

    /// Whether `descendant` is `ancestor` or transitively inherits from it.
    pub fn is_descendant(&self, descendant: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }

    /// Projections for a concrete type. Abstract types have none; they are
    /// never directly addressable.
    pub fn projections(&self, id: TypeId) -> Option<&Projections> {
        self.projections.get(&id)
    }
}

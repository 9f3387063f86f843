//! Derived projections: Reference, View and Edit shapes per concrete type.
//!
//! Shapes are what the route layer publishes and what instance validation
//! checks against. Every shape implicitly carries the `uid` identifier and
//! the `real_type` discriminator; `base` records the base-class linkage the
//! write compiler needs for subtype payloads.
//!
//! Edit derivation is cycle-safe: an `edit_inline` chain that returns to the
//! owning type (directly or via a subtype) is broken with a forward-declared
//! reference to the peer's Edit shape instead of being inlined. The check is
//! precise - a type that merely co-occurs in an inline chain without cycling
//! back is inlined in full.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::registry::{PropertyKind, ShapeOverride};

use super::types::{ResolvedType, TypeId};

/// Minimal pointer shape: identifier plus discriminator, optionally carrying
/// the attributes of the relation it was reached through.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceShape {
    pub type_name: String,
    pub relation_props: Option<BTreeMap<String, PropertyKind>>,
}

/// One resolved target position inside a shape field.
#[derive(Debug, Clone, Serialize)]
pub enum ShapeTarget {
    Reference(ReferenceShape),
    Inline(Box<Shape>),
    /// Cycle break: refers to the named type's shape by forward declaration
    /// instead of inlining it.
    Deferred(String),
}

/// A field of a derived shape.
#[derive(Debug, Clone, Serialize)]
pub enum ShapeField {
    Scalar(PropertyKind),
    Relation {
        targets: Vec<ShapeTarget>,
        relation_props: Option<BTreeMap<String, PropertyKind>>,
        min_count: Option<usize>,
        max_count: Option<usize>,
    },
    Embedded {
        targets: Vec<ShapeTarget>,
    },
    /// View only: aggregated incoming relations under one reverse name.
    Incoming { origins: Vec<ReferenceShape> },
}

/// A full derived shape for one concrete type.
#[derive(Debug, Clone, Serialize)]
pub struct Shape {
    /// Concrete-type discriminator (`real_type`).
    pub type_name: String,
    /// Parent type, when any: the base-class linkage.
    pub base: Option<String>,
    pub fields: BTreeMap<String, ShapeField>,
}

/// The three projections derived for every concrete type.
#[derive(Debug, Clone, Serialize)]
pub struct Projections {
    pub reference: ReferenceShape,
    pub view: Shape,
    pub edit: Shape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mode {
    View,
    Edit,
}

impl Mode {
    fn inlines(self, rel: &super::types::RelationField) -> bool {
        match self {
            Mode::View => rel.create_inline,
            Mode::Edit => rel.edit_inline,
        }
    }
}

pub(crate) fn build_projections(
    types: &[ResolvedType],
    overrides: &BTreeMap<TypeId, (Option<ShapeOverride>, Option<ShapeOverride>)>,
) -> BTreeMap<TypeId, Projections> {
    let mut builder = ProjectionBuilder {
        types,
        overrides,
        cache: BTreeMap::new(),
    };
    types
        .iter()
        .filter(|t| !t.is_abstract)
        .map(|t| {
            let projections = Projections {
                reference: ReferenceShape {
                    type_name: t.name.clone(),
                    relation_props: None,
                },
                view: builder.shape(t.id, Mode::View),
                edit: builder.shape(t.id, Mode::Edit),
            };
            (t.id, projections)
        })
        .collect()
}

struct ProjectionBuilder<'a> {
    types: &'a [ResolvedType],
    overrides: &'a BTreeMap<TypeId, (Option<ShapeOverride>, Option<ShapeOverride>)>,
    cache: BTreeMap<(TypeId, Mode), Shape>,
}

impl ProjectionBuilder<'_> {
    fn get(&self, id: TypeId) -> &ResolvedType {
        &self.types[id.index()]
    }

    fn is_descendant(&self, descendant: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }

    /// Whether an inline chain starting at `from` reaches `origin` or one of
    /// its subtypes. `from` itself counts: a self-reference is the shortest
    /// cycle.
    fn returns_to(
        &self,
        from: TypeId,
        origin: TypeId,
        mode: Mode,
        visited: &mut BTreeSet<TypeId>,
    ) -> bool {
        if self.is_descendant(from, origin) {
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        let t = self.get(from);
        for rel in &t.relations {
            // A reified carrier is inlined but carries its target as a
            // reference, so the chain stops at the carrier.
            if rel.via_reified || !mode.inlines(rel) {
                continue;
            }
            for target in &rel.targets {
                if self.returns_to(*target, origin, mode, visited) {
                    return true;
                }
            }
        }
        for emb in &t.embedded {
            for target in &emb.targets {
                if self.returns_to(*target, origin, mode, visited) {
                    return true;
                }
            }
        }
        false
    }

    fn shape(&mut self, id: TypeId, mode: Mode) -> Shape {
        if let Some(shape) = self.cache.get(&(id, mode)) {
            return shape.clone();
        }
        let t = self.get(id);

        let override_shape = match (mode, self.overrides.get(&id)) {
            (Mode::View, Some((Some(o), _))) | (Mode::Edit, Some((_, Some(o)))) => Some(o),
            _ => None,
        };
        if let Some(o) = override_shape {
            let shape = Shape {
                type_name: t.name.clone(),
                base: t.parent.map(|p| self.get(p).name.clone()),
                fields: o
                    .fields
                    .iter()
                    .map(|(n, k)| (n.clone(), ShapeField::Scalar(*k)))
                    .collect(),
            };
            self.cache.insert((id, mode), shape.clone());
            return shape;
        }

        let mut fields = BTreeMap::new();
        for prop in &t.properties {
            fields.insert(prop.name.clone(), ShapeField::Scalar(prop.kind));
        }

        for rel in t.relations.clone() {
            let mut targets = Vec::new();
            if rel.via_reified || mode.inlines(&rel) {
                for target in &rel.targets {
                    if self.returns_to(*target, id, mode, &mut BTreeSet::new()) {
                        targets.push(ShapeTarget::Deferred(self.get(*target).name.clone()));
                    } else {
                        targets.push(ShapeTarget::Inline(Box::new(self.shape(*target, mode))));
                    }
                }
            } else {
                for target in &rel.targets {
                    targets.push(ShapeTarget::Reference(ReferenceShape {
                        type_name: self.get(*target).name.clone(),
                        relation_props: rel.relation_props.clone(),
                    }));
                }
            }
            fields.insert(
                rel.name.clone(),
                ShapeField::Relation {
                    targets,
                    relation_props: rel.relation_props.clone(),
                    min_count: rel.min_count,
                    max_count: rel.max_count,
                },
            );
        }

        for emb in self.get(id).embedded.clone() {
            let mut targets = Vec::new();
            for target in &emb.targets {
                if self.returns_to(*target, id, mode, &mut BTreeSet::new()) {
                    targets.push(ShapeTarget::Deferred(self.get(*target).name.clone()));
                } else {
                    targets.push(ShapeTarget::Inline(Box::new(self.shape(*target, mode))));
                }
            }
            fields.insert(emb.name.clone(), ShapeField::Embedded { targets });
        }

        if mode == Mode::View {
            let t = self.get(id);
            for (reverse_name, entries) in &t.incoming {
                let origins = entries
                    .iter()
                    .map(|e| ReferenceShape {
                        type_name: self.get(e.origin).name.clone(),
                        relation_props: e.relation_props.clone(),
                    })
                    .collect();
                fields.insert(reverse_name.clone(), ShapeField::Incoming { origins });
            }
        }

        let t = self.get(id);
        let shape = Shape {
            type_name: t.name.clone(),
            base: t.parent.map(|p| self.get(p).name.clone()),
            fields,
        };
        self.cache.insert((id, mode), shape.clone());
        shape
    }
}

//! Declaration types collected by the [`TypeRegistry`](super::TypeRegistry).
//!
//! These are the raw, as-declared descriptions of node types, traits,
//! relation-carrier generics and their fields. No resolution happens here;
//! every cross-type name is just a string until the schema resolution
//! compiler checks and expands it.

use std::collections::BTreeMap;

use serde::Serialize;

/// Primitive kind of a scalar property field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyKind {
    String,
    Int,
    Float,
    Bool,
    DateTime,
    Uri,
}

impl PropertyKind {
    /// Whether values of this kind participate in full-text indexes.
    pub fn is_text(&self) -> bool {
        matches!(self, PropertyKind::String)
    }
}

/// An unresolved relation or embedded-field target.
///
/// Targets are declared by name and expanded to concrete node types during
/// resolution. Abstract types and traits are valid *declared* targets (they
/// expand to their concrete leaves) but never valid resolved targets
/// themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A named node type; expands to the type (if concrete) plus all its
    /// concrete descendants.
    Node(String),
    /// A named trait; expands to every concrete type carrying the trait.
    Trait(String),
    /// A union of targets; members must all be relatable.
    Union(Vec<Target>),
    /// A scalar member. Never valid inside a relation target; exists so a
    /// declaration mixing node and scalar members can be rejected with a
    /// precise error.
    Scalar(PropertyKind),
    /// An optional-wrapped target. Always rejected: cardinality is expressed
    /// through min/max counts, never through nullability.
    Optional(Box<Target>),
    /// A relation-carrier generic applied to a target
    /// (e.g. `Identification<Person>`).
    Reified {
        carrier: String,
        target: Box<Target>,
        /// Reverse name for the carrier's own `target` hop.
        /// Defaults to `is_target_of`.
        target_reverse_name: Option<String>,
    },
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }

    pub fn trait_(name: impl Into<String>) -> Self {
        Target::Trait(name.into())
    }

    pub fn union(members: impl IntoIterator<Item = Target>) -> Self {
        Target::Union(members.into_iter().collect())
    }

    pub fn reified(carrier: impl Into<String>, target: Target) -> Self {
        Target::Reified {
            carrier: carrier.into(),
            target: Box::new(target),
            target_reverse_name: None,
        }
    }

    pub fn optional(target: Target) -> Self {
        Target::Optional(Box::new(target))
    }
}

/// Declared outgoing relation field.
///
/// `reverse_name` is required for a valid schema; it is optional here so the
/// resolver can fail with a proper [`SchemaError`](crate::errors::SchemaError)
/// instead of the declaration site panicking.
#[derive(Debug, Clone)]
pub struct RelationDecl {
    pub name: String,
    pub target: Target,
    pub reverse_name: Option<String>,
    /// Shape of attributes carried on the edge itself.
    pub relation_props: Option<BTreeMap<String, PropertyKind>>,
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    pub create_inline: bool,
    pub edit_inline: bool,
    pub delete_related_on_detach: bool,
    /// Name of an ancestor relation field this field replaces.
    pub narrows: Option<String>,
}

impl RelationDecl {
    pub fn new(name: impl Into<String>, target: Target, reverse_name: impl Into<String>) -> Self {
        RelationDecl {
            name: name.into(),
            target,
            reverse_name: Some(reverse_name.into()),
            relation_props: None,
            min_count: None,
            max_count: None,
            create_inline: false,
            edit_inline: false,
            delete_related_on_detach: false,
            narrows: None,
        }
    }

    /// Declare a relation without a reverse name. Only useful to exercise the
    /// resolver's missing-reverse-name check.
    pub fn unnamed_reverse(name: impl Into<String>, target: Target) -> Self {
        let mut decl = Self::new(name, target, "");
        decl.reverse_name = None;
        decl
    }

    pub fn relation_props(mut self, props: BTreeMap<String, PropertyKind>) -> Self {
        self.relation_props = Some(props);
        self
    }

    pub fn min_count(mut self, n: usize) -> Self {
        self.min_count = Some(n);
        self
    }

    pub fn max_count(mut self, n: usize) -> Self {
        self.max_count = Some(n);
        self
    }

    pub fn create_inline(mut self) -> Self {
        self.create_inline = true;
        self
    }

    /// Implies `create_inline`: an inline-editable child is also created
    /// inline.
    pub fn edit_inline(mut self) -> Self {
        self.create_inline = true;
        self.edit_inline = true;
        self
    }

    pub fn delete_related_on_detach(mut self) -> Self {
        self.delete_related_on_detach = true;
        self
    }

    pub fn narrows(mut self, ancestor_field: impl Into<String>) -> Self {
        self.narrows = Some(ancestor_field.into());
        self
    }
}

/// Declared embedded field. Embedded children are owned absolutely: they are
/// cascade-deleted on detach regardless of any per-field flag.
#[derive(Debug, Clone)]
pub struct EmbeddedDecl {
    pub name: String,
    pub target: Target,
    pub min_count: usize,
    pub max_count: Option<usize>,
}

impl EmbeddedDecl {
    /// Default cardinality is exactly one, matching the common case of a
    /// single owned sub-object.
    pub fn new(name: impl Into<String>, target: Target) -> Self {
        EmbeddedDecl {
            name: name.into(),
            target,
            min_count: 1,
            max_count: Some(1),
        }
    }

    pub fn counts(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_count = min;
        self.max_count = max;
        self
    }
}

/// Per-type operation gates consumed by the route layer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capabilities {
    pub creatable: bool,
    pub editable: bool,
    pub deletable: bool,
    pub searchable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            creatable: true,
            editable: true,
            deletable: true,
            searchable: true,
        }
    }
}

/// A hand-authored replacement for a derived View or Edit projection.
///
/// Overrides list the scalar fields the author wants exposed; the projection
/// builder still stamps the `uid`/`real_type` discriminator and base-class
/// linkage the write compiler depends on.
#[derive(Debug, Clone)]
pub struct ShapeOverride {
    pub fields: Vec<(String, PropertyKind)>,
}

impl ShapeOverride {
    pub fn new(fields: impl IntoIterator<Item = (&'static str, PropertyKind)>) -> Self {
        ShapeOverride {
            fields: fields
                .into_iter()
                .map(|(n, k)| (n.to_string(), k))
                .collect(),
        }
    }
}

/// Declared node type.
#[derive(Debug, Clone)]
pub struct NodeDecl {
    pub name: String,
    pub parent: Option<String>,
    pub is_abstract: bool,
    pub traits: Vec<String>,
    pub properties: Vec<(String, PropertyKind)>,
    pub relations: Vec<RelationDecl>,
    pub embedded: Vec<EmbeddedDecl>,
    pub capabilities: Capabilities,
    pub view_override: Option<ShapeOverride>,
    pub edit_override: Option<ShapeOverride>,
}

impl NodeDecl {
    pub fn new(name: impl Into<String>) -> Self {
        NodeDecl {
            name: name.into(),
            parent: None,
            is_abstract: false,
            traits: Vec::new(),
            properties: Vec::new(),
            relations: Vec::new(),
            embedded: Vec::new(),
            capabilities: Capabilities::default(),
            view_override: None,
            edit_override: None,
        }
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parent = Some(name.into());
        self
    }

    /// Abstract types are never directly instantiable and never appear in a
    /// resolved target set.
    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn mixin(mut self, trait_name: impl Into<String>) -> Self {
        self.traits.push(trait_name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push((name.into(), kind));
        self
    }

    pub fn relation(mut self, decl: RelationDecl) -> Self {
        self.relations.push(decl);
        self
    }

    pub fn embedded(mut self, decl: EmbeddedDecl) -> Self {
        self.embedded.push(decl);
        self
    }

    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn view_override(mut self, shape: ShapeOverride) -> Self {
        self.view_override = Some(shape);
        self
    }

    pub fn edit_override(mut self, shape: ShapeOverride) -> Self {
        self.edit_override = Some(shape);
        self
    }
}

/// Declared shared-trait mixin.
///
/// Heritable traits apply to the declaring type and all its descendants;
/// non-heritable traits apply only to the type that mixes them in directly
/// and are stripped from further subclasses.
#[derive(Debug, Clone)]
pub struct TraitDecl {
    pub name: String,
    pub heritable: bool,
    pub properties: Vec<(String, PropertyKind)>,
}

impl TraitDecl {
    pub fn heritable(name: impl Into<String>) -> Self {
        TraitDecl {
            name: name.into(),
            heritable: true,
            properties: Vec::new(),
        }
    }

    pub fn non_heritable(name: impl Into<String>) -> Self {
        TraitDecl {
            name: name.into(),
            heritable: false,
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push((name.into(), kind));
        self
    }
}

/// Declared relation-carrier generic ("relation with attributes").
///
/// Each application of the carrier to a concrete target is specialized into
/// its own concrete node type during resolution; the carrier itself is never
/// instantiable.
#[derive(Debug, Clone)]
pub struct ReifiedDecl {
    pub name: String,
    pub properties: Vec<(String, PropertyKind)>,
}

impl ReifiedDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ReifiedDecl {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push((name.into(), kind));
        self
    }
}

//! Schema resolution: from declared registry to resolved arena.
//!
//! Resolution runs in ordered passes; later passes rely on earlier passes
//! having completed for *every* type, not just the one currently in hand:
//!
//! 1. Registration and declaration checks (duplicates, reserved names,
//!    unknown parents/traits).
//! 2. Reified specialization: every carrier-times-target application becomes
//!    its own concrete node type, resolved before anything may target it.
//! 3. Arena construction: ancestry, label sets, flattened property tables.
//! 4. Outgoing relation resolution: trait/abstract/union targets expanded to
//!    concrete leaves, narrowing applied.
//! 5. Embedded field resolution.
//! 6. Incoming (reverse) relation propagation, including relations reached
//!    through embedded descendants and reified hops.
//! 7./8. Projection construction (see `projections`).
//!
//! Any declaration fault aborts the whole resolution with a
//! [`SchemaError`]; a partially resolved schema is never observable.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::errors::SchemaError;
use crate::registry::{
    Capabilities, NodeDecl, RelationDecl, ShapeOverride, Target, TraitDecl, TypeRegistry,
};

use super::projections;
use super::types::{
    EmbeddedField, IncomingRelation, IncomingVia, PropertyField, RelationField, ResolvedSchema,
    ResolvedType, TypeId,
};

/// Label applied to every node type as the root of the hierarchy.
pub const BASE_NODE_LABEL: &str = "BaseNode";

/// Reserved property names: the persisted layout every node carries plus the
/// internal relation-attribute holder.
const RESERVED_FIELD_NAMES: &[&str] = &[
    "uid",
    "real_type",
    "created_when",
    "modified_when",
    "created_by",
    "modified_by",
    "relation_properties",
];

const RESERVED_NAME_FRAGMENT: &str = "Embedded";

/// Default reverse name for the carrier-to-target hop of a reified relation.
const REIFIED_TARGET_REVERSE: &str = "is_target_of";

/// Resolve a sealed registry into an immutable schema.
pub fn resolve(registry: TypeRegistry) -> Result<ResolvedSchema, SchemaError> {
    let mut resolver = Resolver::new(registry)?;
    resolver.specialize_reified()?;
    resolver.build_arena()?;
    resolver.resolve_relations()?;
    resolver.resolve_embedded()?;
    resolver.propagate_incoming();
    resolver.finish()
}

struct Resolver {
    nodes: Vec<NodeDecl>,
    node_index: BTreeMap<String, usize>,
    traits: BTreeMap<String, TraitDecl>,
    reified_decls: BTreeMap<String, crate::registry::ReifiedDecl>,
    /// Names of synthesized carrier-times-target types.
    synthesized: BTreeSet<String>,
    children: BTreeMap<String, Vec<String>>,
    types: Vec<ResolvedType>,
    overrides: BTreeMap<TypeId, (Option<ShapeOverride>, Option<ShapeOverride>)>,
}

impl Resolver {
    /// Pass 1: record every declaration and reject malformed ones.
    fn new(registry: TypeRegistry) -> Result<Self, SchemaError> {
        let TypeRegistry {
            nodes,
            traits,
            reified,
        } = registry;

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut node_index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if !seen.insert(node.name.clone()) {
                return Err(SchemaError::DuplicateType {
                    name: node.name.clone(),
                });
            }
            if node.name.contains(RESERVED_NAME_FRAGMENT) {
                return Err(SchemaError::ReservedTypeName {
                    type_name: node.name.clone(),
                    fragment: RESERVED_NAME_FRAGMENT,
                });
            }
            check_reserved_fields(&node.name, node)?;
            node_index.insert(node.name.clone(), i);
        }

        let mut trait_map = BTreeMap::new();
        for t in traits {
            if !seen.insert(t.name.clone()) {
                return Err(SchemaError::DuplicateType { name: t.name });
            }
            trait_map.insert(t.name.clone(), t);
        }

        let mut reified_map = BTreeMap::new();
        for r in reified {
            if !seen.insert(r.name.clone()) {
                return Err(SchemaError::DuplicateType { name: r.name });
            }
            for (field, _) in &r.properties {
                if RESERVED_FIELD_NAMES.contains(&field.as_str()) {
                    return Err(SchemaError::ReservedFieldName {
                        type_name: r.name.clone(),
                        field: field.clone(),
                    });
                }
            }
            reified_map.insert(r.name.clone(), r);
        }

        // Referential checks, now that all names are known.
        for node in &nodes {
            if let Some(parent) = &node.parent {
                if !node_index.contains_key(parent) {
                    return Err(SchemaError::UnknownParent {
                        type_name: node.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            for trait_name in &node.traits {
                if !trait_map.contains_key(trait_name) {
                    return Err(SchemaError::UnknownTrait {
                        type_name: node.name.clone(),
                        name: trait_name.clone(),
                    });
                }
            }
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &nodes {
            if let Some(parent) = &node.parent {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }

        debug!(
            nodes = nodes.len(),
            traits = trait_map.len(),
            carriers = reified_map.len(),
            "registered declarations"
        );

        Ok(Resolver {
            nodes,
            node_index,
            traits: trait_map,
            reified_decls: reified_map,
            synthesized: BTreeSet::new(),
            children,
            types: Vec::new(),
            overrides: BTreeMap::new(),
        })
    }

    /// Pass 2: synthesize one concrete node type per carrier-times-target
    /// application. The synthesized type owns a `target` relation field and
    /// is registered before any relation resolution, so it is available as a
    /// relation target in pass 4.
    fn specialize_reified(&mut self) -> Result<(), SchemaError> {
        let mut pending: Vec<NodeDecl> = Vec::new();
        for node in &self.nodes {
            for rel in &node.relations {
                let Target::Reified {
                    carrier,
                    target,
                    target_reverse_name,
                } = &rel.target
                else {
                    continue;
                };
                let carrier_decl = self.reified_decls.get(carrier).ok_or_else(|| {
                    SchemaError::UnknownType {
                        name: carrier.clone(),
                    }
                })?;
                if matches!(target.as_ref(), Target::Reified { .. }) {
                    return Err(SchemaError::TargetNotRelatable {
                        type_name: node.name.clone(),
                        field: rel.name.clone(),
                        target: carrier.clone(),
                    });
                }

                let synth_name = specialized_name(carrier, target);
                if self.node_index.contains_key(&synth_name) {
                    continue;
                }

                let reverse = target_reverse_name
                    .clone()
                    .unwrap_or_else(|| REIFIED_TARGET_REVERSE.to_string());
                let mut synth = NodeDecl::new(synth_name.clone()).capabilities(Capabilities {
                    creatable: false,
                    editable: false,
                    deletable: false,
                    searchable: false,
                });
                for (prop_name, kind) in &carrier_decl.properties {
                    synth = synth.property(prop_name.clone(), *kind);
                }
                synth = synth.relation(RelationDecl::new(
                    "target",
                    target.as_ref().clone(),
                    reverse,
                ));

                debug!(name = %synth_name, carrier = %carrier, "specialized relation carrier");
                self.node_index.insert(synth_name.clone(), self.nodes.len() + pending.len());
                self.synthesized.insert(synth_name);
                pending.push(synth);
            }
        }
        self.nodes.extend(pending);
        Ok(())
    }

    /// Pass 3: allocate the arena and compute ancestry-dependent data
    /// (labels, flattened properties, capabilities).
    fn build_arena(&mut self) -> Result<(), SchemaError> {
        for (i, node) in self.nodes.iter().enumerate() {
            let id = TypeId(i as u32);
            let parent = node
                .parent
                .as_ref()
                .map(|p| TypeId(self.node_index[p] as u32));
            let is_reified = self.synthesized.contains(&node.name);

            let chain = self.ancestor_chain(&node.name);
            let mut labels: Vec<String> = chain.clone();
            if is_reified {
                labels.push("ReifiedRelation".to_string());
            }
            labels.push(BASE_NODE_LABEL.to_string());
            for trait_name in self.applied_traits(&node.name) {
                labels.push(trait_name);
            }

            let properties = self.flattened_properties(&node.name);
            let mut capabilities = node.capabilities;
            if node.is_abstract {
                capabilities.creatable = false;
            }

            self.overrides
                .insert(id, (node.view_override.clone(), node.edit_override.clone()));

            self.types.push(ResolvedType {
                id,
                name: node.name.clone(),
                parent,
                is_abstract: node.is_abstract,
                is_reified,
                labels,
                properties,
                relations: Vec::new(),
                embedded: Vec::new(),
                incoming: BTreeMap::new(),
                capabilities,
            });
        }
        Ok(())
    }

    /// Ancestor chain names, self first, root last.
    fn ancestor_chain(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            chain.push(n.clone());
            current = self.nodes[self.node_index[&n]].parent.clone();
        }
        chain
    }

    /// Trait labels applied to a type: heritable traits mixed anywhere in the
    /// ancestor chain, plus non-heritable traits mixed in directly only.
    fn applied_traits(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        for (depth, ancestor) in self.ancestor_chain(name).iter().enumerate() {
            let decl = &self.nodes[self.node_index[ancestor]];
            for trait_name in &decl.traits {
                let heritable = self.traits[trait_name].heritable;
                if (heritable || depth == 0) && !out.contains(trait_name) {
                    out.push(trait_name.clone());
                }
            }
        }
        out
    }

    /// Scalar property table: ancestor fields first (root-most outward),
    /// then trait-contributed fields under the same heritability rule as
    /// trait labels.
    fn flattened_properties(&self, name: &str) -> Vec<PropertyField> {
        let mut out: Vec<PropertyField> = Vec::new();
        let chain = self.ancestor_chain(name);
        for ancestor in chain.iter().rev() {
            let decl = &self.nodes[self.node_index[ancestor]];
            for (prop_name, kind) in &decl.properties {
                if !out.iter().any(|p| &p.name == prop_name) {
                    out.push(PropertyField {
                        name: prop_name.clone(),
                        kind: *kind,
                    });
                }
            }
        }
        for trait_name in self.applied_traits(name) {
            for (prop_name, kind) in &self.traits[&trait_name].properties {
                if !out.iter().any(|p| &p.name == prop_name) {
                    out.push(PropertyField {
                        name: prop_name.clone(),
                        kind: *kind,
                    });
                }
            }
        }
        out
    }

    /// Pass 4: resolve outgoing relations for every type, parents before
    /// children so narrowing can see the inherited field set.
    fn resolve_relations(&mut self) -> Result<(), SchemaError> {
        let mut resolved: Vec<Option<Vec<RelationField>>> = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            self.relations_for(i, &mut resolved)?;
        }
        for (i, fields) in resolved.into_iter().enumerate() {
            self.types[i].relations = fields.unwrap_or_default();
        }
        Ok(())
    }

    fn relations_for(
        &self,
        index: usize,
        resolved: &mut Vec<Option<Vec<RelationField>>>,
    ) -> Result<Vec<RelationField>, SchemaError> {
        if let Some(fields) = &resolved[index] {
            return Ok(fields.clone());
        }
        let decl = &self.nodes[index];

        let mut inherited = match &decl.parent {
            Some(parent) => self.relations_for(self.node_index[parent], resolved)?,
            None => Vec::new(),
        };

        let mut own = Vec::new();
        for rel in &decl.relations {
            let reverse_name = match &rel.reverse_name {
                Some(r) if !r.is_empty() => r.clone(),
                _ => {
                    return Err(SchemaError::MissingReverseName {
                        type_name: decl.name.clone(),
                        field: rel.name.clone(),
                    });
                }
            };

            let mut relation_labels: BTreeSet<String> = BTreeSet::new();
            relation_labels.insert(rel.name.clone());
            if let Some(narrowed) = &rel.narrows {
                let position = inherited.iter().position(|f| &f.name == narrowed);
                let Some(position) = position else {
                    return Err(SchemaError::UnknownNarrowTarget {
                        type_name: decl.name.clone(),
                        field: rel.name.clone(),
                        narrows: narrowed.clone(),
                    });
                };
                let ancestor_field = inherited.remove(position);
                relation_labels.insert(ancestor_field.name.clone());
                relation_labels.extend(ancestor_field.relation_labels);
            }

            let (targets, via_reified) = match &rel.target {
                Target::Reified { carrier, target, .. } => {
                    let synth = specialized_name(carrier, target);
                    let id = TypeId(self.node_index[&synth] as u32);
                    (vec![id], true)
                }
                other => (
                    self.expand_target(other, &decl.name, &rel.name)?,
                    false,
                ),
            };

            own.push(RelationField {
                name: rel.name.clone(),
                reverse_name,
                targets,
                relation_props: rel.relation_props.clone(),
                min_count: rel.min_count,
                max_count: rel.max_count,
                create_inline: rel.create_inline,
                edit_inline: rel.edit_inline,
                delete_related_on_detach: rel.delete_related_on_detach,
                relation_labels,
                via_reified,
            });
        }

        // Own declarations shadow inherited fields of the same name.
        inherited.retain(|f| !own.iter().any(|o| o.name == f.name));
        inherited.extend(own);
        resolved[index] = Some(inherited.clone());
        Ok(inherited)
    }

    /// Expand a declared target to concrete type ids. Traits, unions and
    /// abstract types expand to their concrete leaves; scalars and optional
    /// wrappers are rejected here.
    fn expand_target(
        &self,
        target: &Target,
        type_name: &str,
        field: &str,
    ) -> Result<Vec<TypeId>, SchemaError> {
        let mut names = BTreeSet::new();
        self.expand_into(target, type_name, field, &mut names)?;
        if names.is_empty() {
            return Err(SchemaError::EmptyTargetSet {
                type_name: type_name.to_string(),
                field: field.to_string(),
            });
        }
        let mut ids: Vec<TypeId> = names
            .into_iter()
            .map(|n| TypeId(self.node_index[&n] as u32))
            .collect();
        // Arena (declaration) order, not alphabetical.
        ids.sort();
        Ok(ids)
    }

    fn expand_into(
        &self,
        target: &Target,
        type_name: &str,
        field: &str,
        out: &mut BTreeSet<String>,
    ) -> Result<(), SchemaError> {
        match target {
            Target::Node(name) | Target::Trait(name) => {
                self.expand_named(name, type_name, field, out)
            }
            Target::Union(members) => {
                let mut scalar_members = 0usize;
                let mut relatable_members = 0usize;
                for member in members {
                    match member {
                        Target::Scalar(_) => scalar_members += 1,
                        Target::Optional(_) => {
                            return Err(SchemaError::OptionalTarget {
                                type_name: type_name.to_string(),
                                field: field.to_string(),
                            });
                        }
                        other => {
                            relatable_members += 1;
                            self.expand_into(other, type_name, field, out)?;
                        }
                    }
                }
                if scalar_members > 0 {
                    if relatable_members > 0 {
                        return Err(SchemaError::MixedTargetUnion {
                            type_name: type_name.to_string(),
                            field: field.to_string(),
                        });
                    }
                    return Err(SchemaError::TargetNotRelatable {
                        type_name: type_name.to_string(),
                        field: field.to_string(),
                        target: "scalar union".to_string(),
                    });
                }
                Ok(())
            }
            Target::Scalar(kind) => Err(SchemaError::TargetNotRelatable {
                type_name: type_name.to_string(),
                field: field.to_string(),
                target: format!("{kind:?}"),
            }),
            Target::Optional(_) => Err(SchemaError::OptionalTarget {
                type_name: type_name.to_string(),
                field: field.to_string(),
            }),
            Target::Reified { carrier, .. } => Err(SchemaError::TargetNotRelatable {
                type_name: type_name.to_string(),
                field: field.to_string(),
                target: carrier.clone(),
            }),
        }
    }

    fn expand_named(
        &self,
        name: &str,
        type_name: &str,
        field: &str,
        out: &mut BTreeSet<String>,
    ) -> Result<(), SchemaError> {
        if self.node_index.contains_key(name) {
            self.collect_concrete_descendants(name, out);
            return Ok(());
        }
        if let Some(trait_decl) = self.traits.get(name) {
            for node in &self.nodes {
                let applies = if trait_decl.heritable {
                    self.ancestor_chain(&node.name)
                        .iter()
                        .any(|a| self.nodes[self.node_index[a]].traits.contains(&trait_decl.name))
                } else {
                    node.traits.contains(&trait_decl.name)
                };
                if applies && !node.is_abstract {
                    out.insert(node.name.clone());
                }
            }
            return Ok(());
        }
        if self.reified_decls.contains_key(name) {
            return Err(SchemaError::TargetNotRelatable {
                type_name: type_name.to_string(),
                field: field.to_string(),
                target: name.to_string(),
            });
        }
        Err(SchemaError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Concrete descendants of a named type, itself included when concrete;
    /// abstract intermediates are recursed through but never collected.
    fn collect_concrete_descendants(&self, name: &str, out: &mut BTreeSet<String>) {
        let decl = &self.nodes[self.node_index[name]];
        if !decl.is_abstract {
            out.insert(name.to_string());
        }
        if let Some(children) = self.children.get(name) {
            for child in children {
                self.collect_concrete_descendants(child, out);
            }
        }
    }

    /// Pass 5: resolve embedded fields. Embedded targets expand exactly like
    /// relation targets; the per-aggregate traversal map used by pass 6 is
    /// derived on demand from these tables.
    fn resolve_embedded(&mut self) -> Result<(), SchemaError> {
        for i in 0..self.nodes.len() {
            let decl = &self.nodes[i];
            let mut fields = Vec::new();

            // Embedded fields inherit like relations do.
            let mut chain_decls: Vec<&NodeDecl> = self
                .ancestor_chain(&decl.name)
                .iter()
                .map(|n| &self.nodes[self.node_index[n]])
                .collect();
            chain_decls.reverse();

            for chain_decl in chain_decls {
                for emb in &chain_decl.embedded {
                    if fields
                        .iter()
                        .any(|f: &EmbeddedField| f.name == emb.name)
                    {
                        continue;
                    }
                    let targets = self.expand_target(&emb.target, &decl.name, &emb.name)?;
                    fields.push(EmbeddedField {
                        name: emb.name.clone(),
                        targets,
                        min_count: emb.min_count,
                        max_count: emb.max_count,
                    });
                }
            }
            self.types[i].embedded = fields;
        }
        Ok(())
    }

    /// Pass 6: build the incoming-relation tables. Every concrete aggregate
    /// propagates its outgoing relations - those declared directly and those
    /// reachable by walking its embedded subtree - onto the target types,
    /// keyed by reverse name. Reified hops attribute the reverse edge to the
    /// outer relation's reverse name, never the carrier's.
    fn propagate_incoming(&mut self) {
        let mut incoming: Vec<BTreeMap<String, Vec<IncomingRelation>>> =
            vec![BTreeMap::new(); self.types.len()];

        for origin in &self.types {
            if origin.is_abstract || origin.is_reified {
                continue;
            }
            let mut outgoing: Vec<(RelationField, IncomingVia)> = origin
                .relations
                .iter()
                .map(|r| (r.clone(), IncomingVia::Direct))
                .collect();
            self.collect_embedded_outgoing(origin.id, &mut outgoing, &mut BTreeSet::new());

            for (rel, via) in outgoing {
                let (real_targets, via) = if rel.via_reified {
                    let mut targets = Vec::new();
                    for carrier_id in &rel.targets {
                        if let Some(target_field) = self.types[carrier_id.index()].relation("target")
                        {
                            targets.extend(target_field.targets.iter().copied());
                        }
                    }
                    (targets, IncomingVia::Reified)
                } else {
                    (rel.targets.clone(), via)
                };

                for target in real_targets {
                    let entries = incoming[target.index()]
                        .entry(rel.reverse_name.clone())
                        .or_default();
                    let duplicate = entries.iter().any(|e| {
                        e.origin == origin.id && e.relation_name == rel.name && e.via == via
                    });
                    if !duplicate {
                        entries.push(IncomingRelation {
                            origin: origin.id,
                            relation_name: rel.name.clone(),
                            relation_props: rel.relation_props.clone(),
                            via,
                        });
                    }
                }
            }
        }

        for (i, map) in incoming.into_iter().enumerate() {
            self.types[i].incoming = map;
        }
    }

    /// Walk embedded fields transitively, collecting the outgoing relations
    /// of embedded types. Recursion never crosses a relation hop: a related
    /// aggregate's own embedded subgraph belongs to that aggregate.
    fn collect_embedded_outgoing(
        &self,
        id: TypeId,
        out: &mut Vec<(RelationField, IncomingVia)>,
        visited: &mut BTreeSet<TypeId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for emb in &self.types[id.index()].embedded {
            for target in &emb.targets {
                let embedded_type = &self.types[target.index()];
                for rel in &embedded_type.relations {
                    if !out.iter().any(|(r, _)| {
                        r.name == rel.name && r.reverse_name == rel.reverse_name
                    }) {
                        out.push((rel.clone(), IncomingVia::Embedded));
                    }
                }
                self.collect_embedded_outgoing(*target, out, visited);
            }
        }
    }

    /// Passes 7 and 8 live in `projections`; this seals the arena.
    fn finish(self) -> Result<ResolvedSchema, SchemaError> {
        let by_name: BTreeMap<String, TypeId> = self
            .types
            .iter()
            .map(|t| (t.name.clone(), t.id))
            .collect();
        let projections = projections::build_projections(&self.types, &self.overrides);
        debug!(types = self.types.len(), "schema resolved");
        Ok(ResolvedSchema {
            types: self.types,
            by_name,
            projections,
        })
    }
}

fn check_reserved_fields(type_name: &str, node: &NodeDecl) -> Result<(), SchemaError> {
    let reserved = |field: &str| RESERVED_FIELD_NAMES.contains(&field);
    for (field, _) in &node.properties {
        if reserved(field) {
            return Err(SchemaError::ReservedFieldName {
                type_name: type_name.to_string(),
                field: field.clone(),
            });
        }
    }
    for rel in &node.relations {
        if reserved(&rel.name) {
            return Err(SchemaError::ReservedFieldName {
                type_name: type_name.to_string(),
                field: rel.name.clone(),
            });
        }
    }
    for emb in &node.embedded {
        if reserved(&emb.name) {
            return Err(SchemaError::ReservedFieldName {
                type_name: type_name.to_string(),
                field: emb.name.clone(),
            });
        }
    }
    Ok(())
}

/// Synthetic name for a carrier applied to a target: `{Target}{Carrier}`.
fn specialized_name(carrier: &str, target: &Target) -> String {
    format!("{}{}", target_display(target), carrier)
}

fn target_display(target: &Target) -> String {
    match target {
        Target::Node(n) | Target::Trait(n) => n.clone(),
        Target::Union(members) => members
            .iter()
            .map(target_display)
            .collect::<Vec<_>>()
            .join("Or"),
        Target::Optional(inner) => target_display(inner),
        Target::Scalar(kind) => format!("{kind:?}"),
        Target::Reified { carrier, target, .. } => {
            format!("{}{}", target_display(target), carrier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EmbeddedDecl, PropertyKind, ReifiedDecl, RelationDecl};

    fn pets_registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(
                NodeDecl::new("Pet").property("name", PropertyKind::String),
            )
            .declare_node(NodeDecl::new("Cat").parent("Pet"))
            .declare_node(
                NodeDecl::new("Person")
                    .property("name", PropertyKind::String)
                    .relation(RelationDecl::new("pets", Target::node("Pet"), "is_pet_of")),
            );
        registry
    }

    #[test]
    fn test_label_set_is_ancestor_chain_plus_base() {
        let schema = resolve(pets_registry()).unwrap();
        let cat = schema.type_by_name("Cat").unwrap();
        assert_eq!(cat.labels, vec!["Cat", "Pet", "BaseNode"]);
    }

    #[test]
    fn test_non_heritable_trait_excluded_from_descendants() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_trait(TraitDecl::non_heritable("Adoptable"))
            .declare_trait(TraitDecl::heritable("Nameable"))
            .declare_node(NodeDecl::new("Pet").mixin("Adoptable").mixin("Nameable"))
            .declare_node(NodeDecl::new("Cat").parent("Pet"));
        let schema = resolve(registry).unwrap();

        let pet = schema.type_by_name("Pet").unwrap();
        assert!(pet.labels.contains(&"Adoptable".to_string()));
        assert!(pet.labels.contains(&"Nameable".to_string()));

        // Heritable traits flow down; non-heritable ones are stripped.
        let cat = schema.type_by_name("Cat").unwrap();
        assert!(!cat.labels.contains(&"Adoptable".to_string()));
        assert!(cat.labels.contains(&"Nameable".to_string()));
    }

    #[test]
    fn test_relation_targets_expand_to_concrete_leaves() {
        let schema = resolve(pets_registry()).unwrap();
        let person = schema.type_by_name("Person").unwrap();
        let pets = person.relation("pets").unwrap();
        let names: Vec<&str> = pets
            .targets
            .iter()
            .map(|id| schema.get(*id).name.as_str())
            .collect();
        assert_eq!(names, vec!["Pet", "Cat"]);
    }

    #[test]
    fn test_abstract_type_excluded_from_target_set() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Animal").abstract_())
            .declare_node(NodeDecl::new("Dog").parent("Animal"))
            .declare_node(
                NodeDecl::new("Person").relation(RelationDecl::new(
                    "pets",
                    Target::node("Animal"),
                    "is_pet_of",
                )),
            );
        let schema = resolve(registry).unwrap();
        let pets = schema.type_by_name("Person").unwrap().relation("pets").unwrap();
        let names: Vec<&str> = pets
            .targets
            .iter()
            .map(|id| schema.get(*id).name.as_str())
            .collect();
        assert_eq!(names, vec!["Dog"]);
    }

    #[test]
    fn test_trait_target_expands_to_implementors() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_trait(TraitDecl::heritable("Ownable"))
            .declare_node(NodeDecl::new("Pet").mixin("Ownable"))
            .declare_node(NodeDecl::new("Cat").parent("Pet"))
            .declare_node(NodeDecl::new("House").mixin("Ownable"))
            .declare_node(
                NodeDecl::new("Person").relation(RelationDecl::new(
                    "owns",
                    Target::trait_("Ownable"),
                    "owned_by",
                )),
            );
        let schema = resolve(registry).unwrap();
        let owns = schema.type_by_name("Person").unwrap().relation("owns").unwrap();
        let mut names: Vec<&str> = owns
            .targets
            .iter()
            .map(|id| schema.get(*id).name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Cat", "House", "Pet"]);
    }

    #[test]
    fn test_missing_reverse_name_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("Pet")).declare_node(
            NodeDecl::new("Person")
                .relation(RelationDecl::unnamed_reverse("pets", Target::node("Pet"))),
        );
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::MissingReverseName { .. }));
    }

    #[test]
    fn test_reserved_field_name_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(
            NodeDecl::new("Person").property("relation_properties", PropertyKind::String),
        );
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::ReservedFieldName { .. }));
    }

    #[test]
    fn test_embedded_fragment_in_type_name_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("EmbeddedThing"));
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::ReservedTypeName { .. }));
    }

    #[test]
    fn test_optional_target_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("Pet")).declare_node(
            NodeDecl::new("Person").relation(RelationDecl::new(
                "pet",
                Target::optional(Target::node("Pet")),
                "is_pet_of",
            )),
        );
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::OptionalTarget { .. }));
    }

    #[test]
    fn test_mixed_union_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("Pet")).declare_node(
            NodeDecl::new("Person").relation(RelationDecl::new(
                "stuff",
                Target::union([Target::node("Pet"), Target::Scalar(PropertyKind::String)]),
                "stuff_of",
            )),
        );
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::MixedTargetUnion { .. }));
    }

    #[test]
    fn test_narrowing_replaces_field_and_unions_labels() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Person"))
            .declare_node(
                NodeDecl::new("Activity").relation(RelationDecl::new(
                    "involved",
                    Target::node("Person"),
                    "involved_in",
                )),
            )
            .declare_node(
                NodeDecl::new("Payment").parent("Activity").relation(
                    RelationDecl::new("payer", Target::node("Person"), "payer_of")
                        .narrows("involved"),
                ),
            );
        let schema = resolve(registry).unwrap();
        let payment = schema.type_by_name("Payment").unwrap();

        assert!(payment.relation("involved").is_none());
        let payer = payment.relation("payer").unwrap();
        assert!(payer.relation_labels.contains("payer"));
        assert!(payer.relation_labels.contains("involved"));

        // The parent keeps its own field untouched.
        let activity = schema.type_by_name("Activity").unwrap();
        assert!(activity.relation("involved").is_some());
    }

    #[test]
    fn test_narrowing_unknown_ancestor_field_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("Person")).declare_node(
            NodeDecl::new("Payment").relation(
                RelationDecl::new("payer", Target::node("Person"), "payer_of")
                    .narrows("involved"),
            ),
        );
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownNarrowTarget { .. }));
    }

    #[test]
    fn test_reified_specialization_registered_as_concrete_type() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_reified(
                ReifiedDecl::new("Identification").property("certainty", PropertyKind::Int),
            )
            .declare_node(NodeDecl::new("Person"))
            .declare_node(
                NodeDecl::new("Statement").relation(RelationDecl::new(
                    "identifies",
                    Target::reified("Identification", Target::node("Person")),
                    "identified_by",
                )),
            );
        let schema = resolve(registry).unwrap();

        let carrier = schema.type_by_name("PersonIdentification").unwrap();
        assert!(carrier.is_reified);
        assert!(!carrier.capabilities.creatable);
        assert!(carrier.labels.contains(&"ReifiedRelation".to_string()));
        assert!(carrier.property("certainty").is_some());

        let target_field = carrier.relation("target").unwrap();
        assert_eq!(target_field.reverse_name, "is_target_of");
        assert_eq!(
            schema.get(target_field.targets[0]).name,
            "Person".to_string()
        );

        let outer = schema
            .type_by_name("Statement")
            .unwrap()
            .relation("identifies")
            .unwrap();
        assert!(outer.via_reified);
        assert_eq!(schema.get(outer.targets[0]).name, "PersonIdentification");
    }

    #[test]
    fn test_incoming_relation_keyed_by_reverse_name() {
        let schema = resolve(pets_registry()).unwrap();
        let cat = schema.type_by_name("Cat").unwrap();
        let entries = cat.incoming.get("is_pet_of").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(schema.get(entries[0].origin).name, "Person");
        assert_eq!(entries[0].via, IncomingVia::Direct);
    }

    #[test]
    fn test_reified_incoming_uses_outer_reverse_name() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_reified(ReifiedDecl::new("Identification"))
            .declare_node(NodeDecl::new("Person"))
            .declare_node(
                NodeDecl::new("Statement").relation(RelationDecl::new(
                    "identifies",
                    Target::reified("Identification", Target::node("Person")),
                    "identified_by",
                )),
            );
        let schema = resolve(registry).unwrap();
        let person = schema.type_by_name("Person").unwrap();

        let entries = person.incoming.get("identified_by").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(schema.get(entries[0].origin).name, "Statement");
        assert_eq!(entries[0].via, IncomingVia::Reified);
        // The carrier's own reverse name is not a key on the target.
        assert!(!person.incoming.contains_key("is_target_of"));
    }

    #[test]
    fn test_incoming_propagates_through_embedded_fields() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Source"))
            .declare_node(
                NodeDecl::new("Citation").relation(RelationDecl::new(
                    "source",
                    Target::node("Source"),
                    "cited_in",
                )),
            )
            .declare_node(
                NodeDecl::new("Statement")
                    .embedded(EmbeddedDecl::new("citation", Target::node("Citation"))),
            );
        let schema = resolve(registry).unwrap();
        let source = schema.type_by_name("Source").unwrap();
        let entries = source.incoming.get("cited_in").unwrap();

        // Both the embedded type itself and the aggregate that embeds it
        // point here; the aggregate's entry is marked as embedded.
        let origins: Vec<(String, IncomingVia)> = entries
            .iter()
            .map(|e| (schema.get(e.origin).name.clone(), e.via))
            .collect();
        assert!(origins.contains(&("Citation".to_string(), IncomingVia::Direct)));
        assert!(origins.contains(&("Statement".to_string(), IncomingVia::Embedded)));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Person"))
            .declare_node(NodeDecl::new("Person"));
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType { .. }));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut registry = TypeRegistry::new();
        registry.declare_node(NodeDecl::new("Cat").parent("Pet"));
        let err = resolve(registry).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownParent { .. }));
    }

    #[test]
    fn test_abstract_type_not_creatable() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Animal").abstract_())
            .declare_node(NodeDecl::new("Dog").parent("Animal"));
        let schema = resolve(registry).unwrap();
        assert!(!schema.type_by_name("Animal").unwrap().capabilities.creatable);
        assert!(schema.type_by_name("Dog").unwrap().capabilities.creatable);
    }
}

//! The type registry: declarations as the application author wrote them.
//!
//! The registry has a two-phase lifecycle. While open it accepts node, trait
//! and relation-carrier declarations in any order; sealing happens when the
//! registry is handed to [`resolve`](crate::schema::resolve), which consumes
//! it by value. The resolved schema is immutable for the rest of the process;
//! resetting for tests means building a fresh registry and resolving again,
//! never mutating sealed state.

mod decl;

pub use decl::{
    Capabilities, EmbeddedDecl, NodeDecl, PropertyKind, ReifiedDecl, RelationDecl, ShapeOverride,
    Target, TraitDecl,
};

/// Collected declarations, not yet checked or resolved.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    pub(crate) nodes: Vec<NodeDecl>,
    pub(crate) traits: Vec<TraitDecl>,
    pub(crate) reified: Vec<ReifiedDecl>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Record a node type declaration. Duplicates are caught at resolution,
    /// not here, so declaration order never matters.
    pub fn declare_node(&mut self, decl: NodeDecl) -> &mut Self {
        self.nodes.push(decl);
        self
    }

    pub fn declare_trait(&mut self, decl: TraitDecl) -> &mut Self {
        self.traits.push(decl);
        self
    }

    pub fn declare_reified(&mut self, decl: ReifiedDecl) -> &mut Self {
        self.reified.push(decl);
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.traits.is_empty() && self.reified.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_starts_empty() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn test_registry_collects_declarations() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Person"))
            .declare_trait(TraitDecl::heritable("Relatable"))
            .declare_reified(ReifiedDecl::new("Identification"));
        assert_eq!(registry.node_count(), 1);
        assert!(!registry.is_empty());
    }
}

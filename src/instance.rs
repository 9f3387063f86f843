//! Instance payloads: the data side of a write.
//!
//! An [`Instance`] is an untyped tree of property values, relation values and
//! embedded children, keyed by field name. It is what a route handler builds
//! from a request body before handing it to the create or update compiler.
//! [`Instance::validate`] checks the whole tree against the resolved schema
//! and either returns the root's [`TypeId`] or a
//! [`GraphError::Validation`](crate::errors::GraphError) naming the first
//! offending field.
//!
//! Field names are normalized to snake_case on insertion, so payloads written
//! in camelCase address the same schema fields.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::GraphError;
use crate::registry::PropertyKind;
use crate::schema::{RelationField, ResolvedSchema, ResolvedType, TypeId};

/// Whether a payload is creating a fresh aggregate or editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Edit,
}

/// One value under a relation field.
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// A pointer at an existing node.
    Reference {
        uid: Uuid,
        real_type: String,
        relation_props: BTreeMap<String, Value>,
    },
    /// An inline child, created or updated as part of the owning write.
    Inline(Instance),
}

/// An untyped instance tree addressed by schema field names.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    pub type_name: String,
    /// Present on edits and on inline children that already exist; absent on
    /// fresh creates.
    pub uid: Option<Uuid>,
    pub properties: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, Vec<RelationValue>>,
    pub embedded: BTreeMap<String, Vec<Instance>>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Instance {
            type_name: type_name.into(),
            ..Instance::default()
        }
    }

    pub fn with_uid(mut self, uid: Uuid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(snake_case(name), value);
        self
    }

    /// Append a reference value under a relation field.
    pub fn reference(mut self, field: &str, uid: Uuid, real_type: impl Into<String>) -> Self {
        self.relations
            .entry(snake_case(field))
            .or_default()
            .push(RelationValue::Reference {
                uid,
                real_type: real_type.into(),
                relation_props: BTreeMap::new(),
            });
        self
    }

    /// Append a reference carrying attributes on the edge itself.
    pub fn reference_with_props(
        mut self,
        field: &str,
        uid: Uuid,
        real_type: impl Into<String>,
        relation_props: BTreeMap<String, Value>,
    ) -> Self {
        self.relations
            .entry(snake_case(field))
            .or_default()
            .push(RelationValue::Reference {
                uid,
                real_type: real_type.into(),
                relation_props,
            });
        self
    }

    /// Append an inline child under a relation field.
    pub fn inline(mut self, field: &str, child: Instance) -> Self {
        self.relations
            .entry(snake_case(field))
            .or_default()
            .push(RelationValue::Inline(child));
        self
    }

    /// Append an embedded child.
    pub fn embed(mut self, field: &str, child: Instance) -> Self {
        self.embedded
            .entry(snake_case(field))
            .or_default()
            .push(child);
        self
    }

    /// Check this tree against the schema.
    ///
    /// In [`WriteMode::Edit`] the root must carry a uid; inline children
    /// without one are treated as fresh creates, which the update compiler
    /// handles through its upsert path.
    pub fn validate(
        &self,
        schema: &ResolvedSchema,
        mode: WriteMode,
    ) -> Result<TypeId, GraphError> {
        if mode == WriteMode::Edit && self.uid.is_none() {
            return Err(GraphError::validation(
                &self.type_name,
                "edit payload is missing a uid",
            ));
        }
        self.validate_node(schema, true)
    }

    fn validate_node(&self, schema: &ResolvedSchema, top_level: bool) -> Result<TypeId, GraphError> {
        let t = schema.type_by_name(&self.type_name).ok_or_else(|| {
            GraphError::validation(&self.type_name, "unknown type")
        })?;
        if t.is_abstract {
            return Err(GraphError::validation(
                &self.type_name,
                "abstract types cannot be instantiated",
            ));
        }
        // Relation carriers only exist inline under the relation that
        // specialized them.
        if top_level && t.is_reified {
            return Err(GraphError::validation(
                &self.type_name,
                "relation carriers cannot be written as top-level aggregates",
            ));
        }

        for (name, value) in &self.properties {
            let prop = t.property(name).ok_or_else(|| {
                GraphError::validation(&t.name, format!("unknown property '{name}'"))
            })?;
            if !kind_matches(prop.kind, value) {
                return Err(GraphError::validation(
                    &t.name,
                    format!("property '{name}' has the wrong kind for {:?}", prop.kind),
                ));
            }
        }

        for (name, values) in &self.relations {
            let rel = t.relation(name).ok_or_else(|| {
                GraphError::validation(&t.name, format!("unknown relation '{name}'"))
            })?;
            check_cardinality(&t.name, name, values.len(), rel.min_count, rel.max_count)?;
            for value in values {
                self.validate_relation_value(schema, t, rel, value)?;
            }
        }

        // Required fields that are absent entirely.
        for rel in &t.relations {
            if !self.relations.contains_key(&rel.name) {
                check_cardinality(&t.name, &rel.name, 0, rel.min_count, rel.max_count)?;
            }
        }
        for emb in &t.embedded {
            if !self.embedded.contains_key(&emb.name) {
                check_cardinality(&t.name, &emb.name, 0, Some(emb.min_count), emb.max_count)?;
            }
        }

        for (name, children) in &self.embedded {
            let emb = t.embedded_field(name).ok_or_else(|| {
                GraphError::validation(&t.name, format!("unknown embedded field '{name}'"))
            })?;
            check_cardinality(&t.name, name, children.len(), Some(emb.min_count), emb.max_count)?;
            for child in children {
                let child_id = child.validate_node(schema, false)?;
                if !emb.targets.iter().any(|&target| schema.is_descendant(child_id, target)) {
                    return Err(GraphError::validation(
                        &t.name,
                        format!(
                            "embedded field '{name}' does not accept type '{}'",
                            child.type_name
                        ),
                    ));
                }
            }
        }

        Ok(t.id)
    }

    fn validate_relation_value(
        &self,
        schema: &ResolvedSchema,
        owner: &ResolvedType,
        rel: &RelationField,
        value: &RelationValue,
    ) -> Result<(), GraphError> {
        match value {
            RelationValue::Reference {
                real_type,
                relation_props,
                ..
            } => {
                if rel.via_reified {
                    return Err(GraphError::validation(
                        &owner.name,
                        format!("relation '{}' requires inline carrier payloads", rel.name),
                    ));
                }
                let target_id = schema.type_id(real_type).ok_or_else(|| {
                    GraphError::validation(&owner.name, format!("unknown target type '{real_type}'"))
                })?;
                if !rel.targets.iter().any(|&t| schema.is_descendant(target_id, t)) {
                    return Err(GraphError::validation(
                        &owner.name,
                        format!("relation '{}' does not accept type '{real_type}'", rel.name),
                    ));
                }
                for (name, value) in relation_props {
                    let declared = rel
                        .relation_props
                        .as_ref()
                        .and_then(|props| props.get(name))
                        .ok_or_else(|| {
                            GraphError::validation(
                                &owner.name,
                                format!(
                                    "relation '{}' does not declare edge attribute '{name}'",
                                    rel.name
                                ),
                            )
                        })?;
                    if !kind_matches(*declared, value) {
                        return Err(GraphError::validation(
                            &owner.name,
                            format!(
                                "edge attribute '{name}' on relation '{}' has the wrong kind for {declared:?}",
                                rel.name
                            ),
                        ));
                    }
                }
            }
            RelationValue::Inline(child) => {
                if !rel.create_inline && !rel.via_reified {
                    return Err(GraphError::validation(
                        &owner.name,
                        format!("relation '{}' only accepts references", rel.name),
                    ));
                }
                let child_id = child.validate_node(schema, false)?;
                if !rel.targets.iter().any(|&t| schema.is_descendant(child_id, t)) {
                    return Err(GraphError::validation(
                        &owner.name,
                        format!(
                            "relation '{}' does not accept type '{}'",
                            rel.name, child.type_name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_cardinality(
    type_name: &str,
    field: &str,
    count: usize,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), GraphError> {
    if let Some(min) = min
        && count < min
    {
        return Err(GraphError::validation(
            type_name,
            format!("field '{field}' requires at least {min} value(s), got {count}"),
        ));
    }
    if let Some(max) = max
        && count > max
    {
        return Err(GraphError::validation(
            type_name,
            format!("field '{field}' allows at most {max} value(s), got {count}"),
        ));
    }
    Ok(())
}

fn kind_matches(kind: PropertyKind, value: &Value) -> bool {
    match kind {
        PropertyKind::String | PropertyKind::DateTime | PropertyKind::Uri => value.is_string(),
        PropertyKind::Int => value.is_i64() || value.is_u64(),
        PropertyKind::Float => value.is_number(),
        PropertyKind::Bool => value.is_boolean(),
    }
}

/// Convert a camelCase field name to the snake_case form used by the schema.
/// Names already in snake_case pass through unchanged.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EmbeddedDecl, NodeDecl, RelationDecl, Target, TypeRegistry};
    use crate::schema::resolve;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(PropertyKind::String, json!("Fluffy"), true)]
    #[case(PropertyKind::String, json!(3), false)]
    #[case(PropertyKind::Int, json!(3), true)]
    #[case(PropertyKind::Int, json!(3.5), false)]
    #[case(PropertyKind::Float, json!(3.5), true)]
    #[case(PropertyKind::Float, json!(3), true)]
    #[case(PropertyKind::Bool, json!(true), true)]
    #[case(PropertyKind::Bool, json!("true"), false)]
    #[case(PropertyKind::DateTime, json!("2026-01-01T00:00:00Z"), true)]
    #[case(PropertyKind::Uri, json!("https://example.org"), true)]
    fn test_kind_matches(
        #[case] kind: PropertyKind,
        #[case] value: serde_json::Value,
        #[case] expected: bool,
    ) {
        assert_eq!(kind_matches(kind, &value), expected);
    }

    fn pet_schema() -> ResolvedSchema {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(
                NodeDecl::new("Pet")
                    .property("name", PropertyKind::String)
                    .property("age", PropertyKind::Int),
            )
            .declare_node(NodeDecl::new("Cat").parent("Pet"))
            .declare_node(
                NodeDecl::new("Person")
                    .property("name", PropertyKind::String)
                    .relation(
                        RelationDecl::new("pets", Target::node("Pet"), "is_pet_of").max_count(2),
                    ),
            );
        resolve(registry).unwrap()
    }

    #[test]
    fn test_valid_create_payload() {
        let schema = pet_schema();
        let person = Instance::new("Person")
            .property("name", json!("John"))
            .reference("pets", Uuid::new_v4(), "Cat");
        let id = person.validate(&schema, WriteMode::Create).unwrap();
        assert_eq!(id, schema.type_id("Person").unwrap());
    }

    #[test]
    fn test_camel_case_keys_normalized() {
        let schema = {
            let mut registry = TypeRegistry::new();
            registry.declare_node(
                NodeDecl::new("Person").property("last_seen", PropertyKind::DateTime),
            );
            resolve(registry).unwrap()
        };
        let person = Instance::new("Person").property("lastSeen", json!("2026-01-01T00:00:00Z"));
        assert!(person.properties.contains_key("last_seen"));
        person.validate(&schema, WriteMode::Create).unwrap();
    }

    #[test]
    fn test_unknown_property_rejected() {
        let schema = pet_schema();
        let person = Instance::new("Person").property("nickname", json!("J"));
        let err = person.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("unknown property 'nickname'"));
    }

    #[test]
    fn test_wrong_property_kind_rejected() {
        let schema = pet_schema();
        let pet = Instance::new("Pet").property("age", json!("three"));
        let err = pet.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("wrong kind"));
    }

    #[test]
    fn test_abstract_type_rejected() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Entity").abstract_())
            .declare_node(NodeDecl::new("Person").parent("Entity"));
        let schema = resolve(registry).unwrap();
        let err = Instance::new("Entity")
            .validate(&schema, WriteMode::Create)
            .unwrap_err();
        assert!(err.to_string().contains("abstract"));
    }

    #[test]
    fn test_subtype_accepted_as_relation_target() {
        let schema = pet_schema();
        // Cat is a Pet, so it satisfies a Pet-targeted relation.
        let person = Instance::new("Person").reference("pets", Uuid::new_v4(), "Cat");
        person.validate(&schema, WriteMode::Create).unwrap();
    }

    #[test]
    fn test_unrelated_type_rejected_as_relation_target() {
        let schema = pet_schema();
        let person = Instance::new("Person").reference("pets", Uuid::new_v4(), "Person");
        let err = person.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("does not accept type 'Person'"));
    }

    #[test]
    fn test_max_count_enforced() {
        let schema = pet_schema();
        let mut person = Instance::new("Person");
        for _ in 0..3 {
            person = person.reference("pets", Uuid::new_v4(), "Pet");
        }
        let err = person.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("at most 2"));
    }

    #[rstest]
    #[case("lastSeen", "last_seen")]
    #[case("Name", "name")]
    #[case("petID", "pet_id")]
    #[case("last_seen", "last_seen")]
    fn test_snake_case_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(snake_case(input), expected);
    }

    fn certainty_schema() -> ResolvedSchema {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Person"))
            .declare_node(
                NodeDecl::new("Statement").relation(
                    RelationDecl::new("subject", Target::node("Person"), "subject_of")
                        .relation_props(BTreeMap::from([(
                            "certainty".to_string(),
                            PropertyKind::Int,
                        )])),
                ),
            );
        resolve(registry).unwrap()
    }

    #[test]
    fn test_reference_edge_attribute_kind_checked() {
        let schema = certainty_schema();
        let bad = Instance::new("Statement").reference_with_props(
            "subject",
            Uuid::new_v4(),
            "Person",
            BTreeMap::from([("certainty".to_string(), json!("very"))]),
        );
        let err = bad.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("edge attribute 'certainty'"));

        let good = Instance::new("Statement").reference_with_props(
            "subject",
            Uuid::new_v4(),
            "Person",
            BTreeMap::from([("certainty".to_string(), json!(3))]),
        );
        good.validate(&schema, WriteMode::Create).unwrap();
    }

    #[test]
    fn test_undeclared_edge_attribute_rejected() {
        let schema = certainty_schema();
        let statement = Instance::new("Statement").reference_with_props(
            "subject",
            Uuid::new_v4(),
            "Person",
            BTreeMap::from([("no_such_attr".to_string(), json!(true))]),
        );
        let err = statement.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err
            .to_string()
            .contains("does not declare edge attribute 'no_such_attr'"));
    }

    #[test]
    fn test_inline_rejected_on_reference_only_relation() {
        let schema = pet_schema();
        let person = Instance::new("Person").inline("pets", Instance::new("Pet"));
        let err = person.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("only accepts references"));
    }

    #[test]
    fn test_edit_requires_uid() {
        let schema = pet_schema();
        let err = Instance::new("Person")
            .validate(&schema, WriteMode::Edit)
            .unwrap_err();
        assert!(err.to_string().contains("missing a uid"));
    }

    #[test]
    fn test_embedded_child_validated_recursively() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Citation").property("page", PropertyKind::Int))
            .declare_node(
                NodeDecl::new("Statement")
                    .embedded(EmbeddedDecl::new("citation", Target::node("Citation"))),
            );
        let schema = resolve(registry).unwrap();

        let bad = Instance::new("Statement").embed(
            "citation",
            Instance::new("Citation").property("page", json!("twelve")),
        );
        assert!(bad.validate(&schema, WriteMode::Create).is_err());

        let good = Instance::new("Statement").embed(
            "citation",
            Instance::new("Citation").property("page", json!(12)),
        );
        good.validate(&schema, WriteMode::Create).unwrap();
    }

    #[test]
    fn test_embedded_min_count_enforced() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Citation"))
            .declare_node(
                NodeDecl::new("Statement")
                    .embedded(EmbeddedDecl::new("citation", Target::node("Citation"))),
            );
        let schema = resolve(registry).unwrap();
        let statement = Instance::new("Statement");
        let err = statement.validate(&schema, WriteMode::Create).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }
}

//! Update-path compilation: differential reconciliation of one aggregate.
//!
//! The compiled statement is a single Cypher statement built from:
//!
//! - a whole-map property overwrite on the root (`SET n = $props`), with the
//!   creation timestamp/author preserved through `coalesce` and the
//!   modification audit fields refreshed;
//! - for each non-inline relation present in the payload: one subquery that
//!   `MERGE`s edges to every desired target (add-if-missing, no-op when
//!   present) and one that deletes edges to targets absent from the desired
//!   set;
//! - for each inline-editable or embedded child: an upsert keyed on
//!   `{uid, real_type}` - a stored node whose discriminator no longer matches
//!   is a non-match and gets recreated - followed by recursion into the
//!   child's own fields and a `MERGE` of the owning edge;
//! - a cleanup subquery per inline/embedded field removing edges to children
//!   no longer listed, cascading through `DeleteDetach`-tagged paths when the
//!   relation is configured to (embedded fields always cascade).
//!
//! Fields absent from the payload are left untouched; reconciliation is
//! per-field, not per-aggregate. Compiling the same payload twice yields the
//! same statement, and its `MERGE`-based edges make re-execution a no-op.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::GraphError;
use crate::instance::{Instance, RelationValue, WriteMode};
use crate::schema::{EmbeddedField, RelationField, ResolvedSchema, ResolvedType};

use super::create::{edge_props, structural_tags};
use super::params::{NameGen, Params, bind, label_fragment};
use super::CompiledStatement;

/// Compile an update statement for an existing aggregate.
///
/// The payload must carry the root's uid. A root uid that does not exist in
/// the store matches nothing and the statement is a no-op; surfacing that as
/// [`NotFound`](GraphError::NotFound) is the caller's job, from the empty
/// result row set.
pub fn compile_update(
    schema: &ResolvedSchema,
    instance: &Instance,
    actor: &str,
) -> Result<CompiledStatement, GraphError> {
    let root_id = instance.validate(schema, WriteMode::Edit)?;
    let root = schema.get(root_id).clone();
    let root_uid = instance.uid.ok_or_else(|| {
        GraphError::validation(&instance.type_name, "edit payload is missing a uid")
    })?;

    let mut compiler = UpdateCompiler {
        schema,
        generator: NameGen::new(),
        params: Params::new(),
        lines: Vec::new(),
        actor_param: String::new(),
    };
    compiler.actor_param = bind(&mut compiler.params, &mut compiler.generator, json!(actor));

    let root_var = compiler.generator.node();
    let uid_param = bind(
        &mut compiler.params,
        &mut compiler.generator,
        json!(root_uid.to_string()),
    );
    compiler
        .lines
        .push(format!("MATCH ({root_var}:BaseNode {{uid: ${uid_param}}})"));
    compiler.emit_property_overwrite(&root_var, &root, instance, root_uid);
    compiler.emit_fields(&root, instance, &root_var)?;
    compiler.lines.push(format!("RETURN {root_var}.uid AS uid"));

    Ok(CompiledStatement {
        statement: compiler.lines.join("\n"),
        params: compiler.params,
    })
}

struct UpdateCompiler<'a> {
    schema: &'a ResolvedSchema,
    generator: NameGen,
    params: Params,
    lines: Vec<String>,
    actor_param: String,
}

impl UpdateCompiler<'_> {
    fn resolved(&self, type_name: &str) -> Result<&ResolvedType, GraphError> {
        self.schema
            .type_by_name(type_name)
            .ok_or_else(|| GraphError::validation(type_name, "unknown type"))
    }

    /// Whole property map for `SET n = $props`, uid and discriminator
    /// included so the overwrite cannot strip them.
    fn props_param(&mut self, t: &ResolvedType, instance: &Instance, uid: Uuid) -> String {
        let mut map = serde_json::Map::new();
        map.insert("uid".to_string(), json!(uid.to_string()));
        map.insert("real_type".to_string(), json!(t.name));
        for (name, value) in &instance.properties {
            map.insert(name.clone(), value.clone());
        }
        bind(&mut self.params, &mut self.generator, Value::Object(map))
    }

    fn emit_property_overwrite(
        &mut self,
        var: &str,
        t: &ResolvedType,
        instance: &Instance,
        uid: Uuid,
    ) {
        let props = self.props_param(t, instance, uid);
        // Capture the creation audit before the overwrite wipes it.
        self.lines.push(format!(
            "WITH {var}, {var}.created_when AS {var}_created, {var}.created_by AS {var}_creator"
        ));
        self.lines.push(format!("SET {var} = ${props}"));
        self.lines.push(format!(
            "SET {var} += {{created_when: coalesce({var}_created, datetime()), \
             created_by: coalesce({var}_creator, ${actor}), \
             modified_when: datetime(), modified_by: ${actor}}}",
            actor = self.actor_param
        ));
    }

    fn emit_fields(
        &mut self,
        t: &ResolvedType,
        instance: &Instance,
        var: &str,
    ) -> Result<(), GraphError> {
        for (name, values) in &instance.relations {
            let rel = t
                .relation(name)
                .ok_or_else(|| {
                    GraphError::validation(&t.name, format!("unknown relation '{name}'"))
                })?
                .clone();
            if rel.create_inline || rel.via_reified {
                self.emit_inline_relation(var, &rel, values)?;
            } else {
                self.emit_set_reconciliation(var, &rel, values);
            }
        }

        for (name, children) in &instance.embedded {
            let emb = t
                .embedded_field(name)
                .ok_or_else(|| {
                    GraphError::validation(&t.name, format!("unknown embedded field '{name}'"))
                })?
                .clone();
            self.emit_embedded_field(var, &emb, children)?;
        }
        Ok(())
    }

    /// Non-inline relation: edges added for missing desired targets, removed
    /// for stored targets no longer desired, target nodes never touched.
    fn emit_set_reconciliation(&mut self, var: &str, rel: &RelationField, values: &[RelationValue]) {
        let desired: Vec<String> = values
            .iter()
            .filter_map(|v| match v {
                RelationValue::Reference { uid, .. } => Some(uid.to_string()),
                RelationValue::Inline(_) => None,
            })
            .collect();
        let desired_param = bind(&mut self.params, &mut self.generator, json!(desired));
        let props_param = bind(&mut self.params, &mut self.generator, edge_props(rel, None));
        let edge_var = self.generator.edge();
        let edge_type = rel.edge_type();

        self.lines.push(format!(
            "CALL {{\n\
               WITH {var}\n\
               UNWIND ${desired_param} AS wanted\n\
               MATCH (target:BaseNode {{uid: wanted}})\n\
               MERGE ({var})-[{edge_var}:{edge_type}]->(target)\n\
               ON CREATE SET {edge_var} += ${props_param}\n\
             }}"
        ));
        self.emit_cleanup(var, &edge_type, &desired_param, rel.delete_related_on_detach);
    }

    /// Inline-editable relation: upsert each child, recurse, re-affirm the
    /// edge, then drop edges to children absent from the desired set.
    fn emit_inline_relation(
        &mut self,
        var: &str,
        rel: &RelationField,
        values: &[RelationValue],
    ) -> Result<(), GraphError> {
        let mut desired: Vec<String> = Vec::new();
        let tags = structural_tags(rel);
        let edge_type = rel.edge_type();

        for value in values {
            match value {
                RelationValue::Reference { uid, .. } => {
                    // An inline-capable relation still accepts a plain
                    // reference to an existing aggregate.
                    desired.push(uid.to_string());
                    let uid_param = bind(
                        &mut self.params,
                        &mut self.generator,
                        json!(uid.to_string()),
                    );
                    let props_param =
                        bind(&mut self.params, &mut self.generator, edge_props(rel, None));
                    let edge_var = self.generator.edge();
                    self.lines.push(format!(
                        "CALL {{\n\
                           WITH {var}\n\
                           MATCH (target:BaseNode {{uid: ${uid_param}}})\n\
                           MERGE ({var})-[{edge_var}:{edge_type}]->(target)\n\
                           ON CREATE SET {edge_var} += ${props_param}\n\
                         }}"
                    ));
                }
                RelationValue::Inline(child) => {
                    let uid = child.uid.unwrap_or_else(Uuid::new_v4);
                    desired.push(uid.to_string());
                    let props_param =
                        bind(&mut self.params, &mut self.generator, edge_props(rel, None));
                    self.emit_child_upsert(var, &edge_type, Some(&props_param), child, uid, &tags)?;
                }
            }
        }

        let desired_param = bind(&mut self.params, &mut self.generator, json!(desired));
        self.emit_cleanup(var, &edge_type, &desired_param, rel.delete_related_on_detach);
        Ok(())
    }

    fn emit_embedded_field(
        &mut self,
        var: &str,
        emb: &EmbeddedField,
        children: &[Instance],
    ) -> Result<(), GraphError> {
        let mut desired: Vec<String> = Vec::new();
        let edge_type = emb.edge_type();
        for child in children {
            let uid = child.uid.unwrap_or_else(Uuid::new_v4);
            desired.push(uid.to_string());
            self.emit_child_upsert(
                var,
                &edge_type,
                None,
                child,
                uid,
                &["Embedded", "DeleteDetach"],
            )?;
        }
        let desired_param = bind(&mut self.params, &mut self.generator, json!(desired));
        // Ownership is absolute: detached embedded children always cascade.
        self.emit_cleanup(var, &edge_type, &desired_param, true);
        Ok(())
    }

    /// One upsert subquery for an owned child: `MERGE` on `{uid, real_type}`
    /// so a stale discriminator falls through to a fresh create, then the
    /// property overwrite and the child's own fields.
    fn emit_child_upsert(
        &mut self,
        owner_var: &str,
        edge_type: &str,
        edge_props_param: Option<&str>,
        child: &Instance,
        uid: Uuid,
        tags: &[&str],
    ) -> Result<(), GraphError> {
        let t = self.resolved(&child.type_name)?.clone();
        let child_var = self.generator.node();
        let edge_var = self.generator.edge();

        let mut labels: Vec<&str> = t.labels.iter().map(String::as_str).collect();
        labels.extend(tags);

        let uid_param = bind(
            &mut self.params,
            &mut self.generator,
            json!(uid.to_string()),
        );
        let type_param = bind(&mut self.params, &mut self.generator, json!(t.name));
        let props = self.props_param(&t, child, uid);

        self.lines.push(format!("CALL {{\n  WITH {owner_var}"));
        self.lines.push(format!(
            "  MERGE ({child_var}{} {{uid: ${uid_param}, real_type: ${type_param}}})",
            label_fragment(&labels)
        ));
        self.lines.push(format!(
            "  WITH {owner_var}, {child_var}, \
             {child_var}.created_when AS {child_var}_created, \
             {child_var}.created_by AS {child_var}_creator"
        ));
        self.lines.push(format!("  SET {child_var} = ${props}"));
        self.lines.push(format!(
            "  SET {child_var} += {{created_when: coalesce({child_var}_created, datetime()), \
             created_by: coalesce({child_var}_creator, ${actor}), \
             modified_when: datetime(), modified_by: ${actor}}}",
            actor = self.actor_param
        ));
        self.lines.push(format!(
            "  MERGE ({owner_var})-[{edge_var}:{edge_type}]->({child_var})"
        ));
        if let Some(props_param) = edge_props_param {
            self.lines
                .push(format!("  ON CREATE SET {edge_var} += ${props_param}"));
        }
        self.emit_fields(&t, child, &child_var)?;
        self.lines.push("}".to_string());
        Ok(())
    }

    /// Drop edges to stored targets absent from the desired set. When
    /// `cascade` is set, the detached child and everything reachable from it
    /// through further `DeleteDetach`-tagged nodes is deleted with it.
    fn emit_cleanup(&mut self, var: &str, edge_type: &str, desired_param: &str, cascade: bool) {
        let mut subquery = format!(
            "CALL {{\n\
               WITH {var}\n\
               MATCH ({var})-[stale_edge:{edge_type}]->(stale:BaseNode)\n\
               WHERE NOT stale.uid IN ${desired_param}\n\
               DELETE stale_edge"
        );
        if cascade {
            subquery.push_str(&format!(
                "\n  WITH stale\n\
                   WHERE stale:DeleteDetach\n\
                   MATCH (stale)(()-->(:DeleteDetach)){{0,}}(gone:DeleteDetach)\n\
                   DETACH DELETE gone"
            ));
        }
        subquery.push_str("\n}");
        self.lines.push(subquery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        EmbeddedDecl, NodeDecl, PropertyKind, RelationDecl, Target, TypeRegistry,
    };
    use crate::schema::resolve;
    use serde_json::json;

    fn pet_schema() -> ResolvedSchema {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Pet").property("name", PropertyKind::String))
            .declare_node(
                NodeDecl::new("Person")
                    .property("name", PropertyKind::String)
                    .relation(RelationDecl::new("pets", Target::node("Pet"), "is_pet_of")),
            );
        resolve(registry).unwrap()
    }

    #[test]
    fn test_update_overwrites_properties_and_preserves_creation_audit() {
        let schema = pet_schema();
        let uid = Uuid::new_v4();
        let person = Instance::new("Person")
            .with_uid(uid)
            .property("name", json!("John"));
        let compiled = compile_update(&schema, &person, "tester").unwrap();

        assert!(compiled.statement.contains("MATCH (n0:BaseNode {uid: $p1})"));
        assert!(compiled.statement.contains("SET n0 = $p2"));
        assert!(compiled
            .statement
            .contains("created_when: coalesce(n0_created, datetime())"));
        assert!(compiled.statement.contains("modified_by: $p0"));
        // The whole-map overwrite carries uid and discriminator.
        assert_eq!(
            compiled.params["p2"],
            json!({"uid": uid.to_string(), "real_type": "Person", "name": "John"})
        );
    }

    #[test]
    fn test_update_reconciles_reference_set() {
        let schema = pet_schema();
        let (a, c) = (Uuid::new_v4(), Uuid::new_v4());
        let person = Instance::new("Person")
            .with_uid(Uuid::new_v4())
            .reference("pets", a, "Pet")
            .reference("pets", c, "Pet");
        let compiled = compile_update(&schema, &person, "tester").unwrap();

        // Add-missing side: UNWIND over the desired set, MERGE so an edge
        // that already exists is a no-op.
        assert!(compiled.statement.contains("UNWIND $p3 AS wanted"));
        assert!(compiled.statement.contains("MERGE (n0)-[e0:PETS]->(target)"));
        // Remove-absent side: delete only edges outside the desired set.
        assert!(compiled.statement.contains("WHERE NOT stale.uid IN $p3"));
        assert!(compiled.statement.contains("DELETE stale_edge"));
        assert_eq!(
            compiled.params["p3"],
            json!([a.to_string(), c.to_string()])
        );
        // Non-cascading relation: no subtree deletion.
        assert!(!compiled.statement.contains("DETACH DELETE"));
    }

    #[test]
    fn test_update_is_deterministic_for_identical_payload() {
        let schema = pet_schema();
        let uid = Uuid::new_v4();
        let pet_uid = Uuid::new_v4();
        let build = || {
            Instance::new("Person")
                .with_uid(uid)
                .property("name", json!("John"))
                .reference("pets", pet_uid, "Pet")
        };
        let first = compile_update(&schema, &build(), "tester").unwrap();
        let second = compile_update(&schema, &build(), "tester").unwrap();
        assert_eq!(first.statement, second.statement);
        assert_eq!(first.params, second.params);
    }

    #[test]
    fn test_update_upserts_inline_child_by_uid_and_discriminator() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Part").property("label", PropertyKind::String))
            .declare_node(
                NodeDecl::new("Machine").relation(
                    RelationDecl::new("parts", Target::node("Part"), "part_of").edit_inline(),
                ),
            );
        let schema = resolve(registry).unwrap();
        let part_uid = Uuid::new_v4();
        let machine = Instance::new("Machine").with_uid(Uuid::new_v4()).inline(
            "parts",
            Instance::new("Part")
                .with_uid(part_uid)
                .property("label", json!("gear")),
        );
        let compiled = compile_update(&schema, &machine, "tester").unwrap();

        // MERGE on uid plus discriminator: a stored node whose real_type no
        // longer matches falls through to a fresh create.
        assert!(compiled.statement.contains(
            "MERGE (n1:Part:BaseNode:CreateInline:ReadInline:EditInline {uid: $p4, real_type: $p5})"
        ));
        assert!(compiled.statement.contains("MERGE (n0)-[e0:PARTS]->(n1)"));
        assert_eq!(compiled.params["p4"], json!(part_uid.to_string()));
    }

    #[test]
    fn test_update_cascades_configured_inline_detach() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Part"))
            .declare_node(
                NodeDecl::new("Machine").relation(
                    RelationDecl::new("parts", Target::node("Part"), "part_of")
                        .edit_inline()
                        .delete_related_on_detach(),
                ),
            );
        let schema = resolve(registry).unwrap();
        let machine = Instance::new("Machine")
            .with_uid(Uuid::new_v4())
            .inline("parts", Instance::new("Part"));
        let compiled = compile_update(&schema, &machine, "tester").unwrap();

        // The cascade walks DeleteDetach-tagged paths, not just the one node.
        assert!(compiled.statement.contains("WHERE stale:DeleteDetach"));
        assert!(compiled
            .statement
            .contains("MATCH (stale)(()-->(:DeleteDetach)){0,}(gone:DeleteDetach)"));
        assert!(compiled.statement.contains("DETACH DELETE gone"));
    }

    #[test]
    fn test_update_embedded_always_cascades() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Citation").property("page", PropertyKind::Int))
            .declare_node(
                NodeDecl::new("Statement")
                    .embedded(EmbeddedDecl::new("citation", Target::node("Citation"))),
            );
        let schema = resolve(registry).unwrap();
        let statement = Instance::new("Statement").with_uid(Uuid::new_v4()).embed(
            "citation",
            Instance::new("Citation").property("page", json!(3)),
        );
        let compiled = compile_update(&schema, &statement, "tester").unwrap();

        assert!(compiled
            .statement
            .contains("MERGE (n1:Citation:BaseNode:Embedded:DeleteDetach"));
        assert!(compiled.statement.contains("DETACH DELETE gone"));
    }

    #[test]
    fn test_update_leaves_absent_fields_untouched() {
        let schema = pet_schema();
        let person = Instance::new("Person")
            .with_uid(Uuid::new_v4())
            .property("name", json!("John"));
        let compiled = compile_update(&schema, &person, "tester").unwrap();
        // No pets in the payload, no reconciliation of the pets field.
        assert!(!compiled.statement.contains(":PETS"));
    }

    #[test]
    fn test_update_requires_uid() {
        let schema = pet_schema();
        let person = Instance::new("Person");
        assert!(compile_update(&schema, &person, "tester").is_err());
    }

    #[test]
    fn test_update_recurses_into_inline_child_relations() {
        let mut registry = TypeRegistry::new();
        registry
            .declare_node(NodeDecl::new("Supplier"))
            .declare_node(
                NodeDecl::new("Part").relation(RelationDecl::new(
                    "supplier",
                    Target::node("Supplier"),
                    "supplies",
                )),
            )
            .declare_node(
                NodeDecl::new("Machine").relation(
                    RelationDecl::new("parts", Target::node("Part"), "part_of").edit_inline(),
                ),
            );
        let schema = resolve(registry).unwrap();
        let supplier_uid = Uuid::new_v4();
        let machine = Instance::new("Machine").with_uid(Uuid::new_v4()).inline(
            "parts",
            Instance::new("Part")
                .with_uid(Uuid::new_v4())
                .reference("supplier", supplier_uid, "Supplier"),
        );
        let compiled = compile_update(&schema, &machine, "tester").unwrap();

        // The child's own non-inline relation is reconciled inside the
        // child's subquery, scoped to the child variable.
        assert!(compiled.statement.contains("MERGE (n1)-[e1:SUPPLIER]->(target)"));
        assert!(compiled.statement.contains("MATCH (n1)-[stale_edge:SUPPLIER]"));
    }
}

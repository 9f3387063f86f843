//! Create-path compilation: a validated instance tree to one CREATE statement.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::GraphError;
use crate::instance::{Instance, RelationValue, WriteMode};
use crate::schema::{RelationField, ResolvedSchema, ResolvedType};

use super::params::{NameGen, Params, bind, label_fragment};

/// A compiled create statement, plus the identifier assigned to the root so
/// the caller can read the aggregate back.
#[derive(Debug, Clone)]
pub struct CreateStatement {
    pub statement: String,
    pub params: Params,
    pub root_uid: Uuid,
}

/// Compile a create statement for a fresh aggregate.
///
/// Every owned node (the root, inline-created children, embedded children,
/// relation carriers) is assigned a fresh identifier unless the payload pins
/// one. Referenced-only nodes are matched by their existing identifier
/// inside a per-reference subquery after all node creation, so a reference
/// whose identifier does not exist drops only its own edge - the aggregate
/// is still written, with that edge silently missing.
pub fn compile_create(
    schema: &ResolvedSchema,
    instance: &Instance,
    actor: &str,
) -> Result<CreateStatement, GraphError> {
    instance.validate(schema, WriteMode::Create)?;

    let mut compiler = CreateCompiler {
        schema,
        generator: NameGen::new(),
        params: Params::new(),
        creates: Vec::new(),
        edges: Vec::new(),
        references: Vec::new(),
        actor_param: String::new(),
    };
    compiler.actor_param = bind(
        &mut compiler.params,
        &mut compiler.generator,
        json!(actor),
    );

    let (root_var, root_uid) = compiler.emit_node(instance, &[])?;

    let mut lines = compiler.creates;
    lines.extend(compiler.edges);
    lines.extend(compiler.references);
    lines.push(format!("RETURN {root_var}.uid AS uid"));

    Ok(CreateStatement {
        statement: lines.join("\n"),
        params: compiler.params,
        root_uid,
    })
}

/// Structural tags an inline child inherits from its owning relation. A
/// relation carrier owes its labels to `ReifiedRelation` alone; it picks up
/// inline tags only when the relation also declares them.
pub(crate) fn structural_tags(rel: &RelationField) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if rel.create_inline {
        tags.push("CreateInline");
        tags.push("ReadInline");
    }
    if rel.edit_inline {
        tags.push("EditInline");
    }
    if rel.delete_related_on_detach {
        tags.push("DeleteDetach");
    }
    tags
}

/// Edge attributes every relation edge carries: the declared reverse name and
/// the label lineage, merged with any per-edge declared attributes.
pub(crate) fn edge_props(rel: &RelationField, extra: Option<&Params>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("reverse_name".to_string(), json!(rel.reverse_name));
    map.insert(
        "relation_labels".to_string(),
        json!(rel.relation_labels.iter().collect::<Vec<_>>()),
    );
    if let Some(extra) = extra {
        for (name, value) in extra {
            map.insert(name.clone(), value.clone());
        }
    }
    Value::Object(map)
}

struct CreateCompiler<'a> {
    schema: &'a ResolvedSchema,
    generator: NameGen,
    params: Params,
    creates: Vec<String>,
    edges: Vec<String>,
    /// One subquery per non-inline reference, emitted after every CREATE so
    /// an unmatched uid cannot abort the node writes.
    references: Vec<String>,
    actor_param: String,
}

impl CreateCompiler<'_> {
    fn resolved(&self, type_name: &str) -> Result<&ResolvedType, GraphError> {
        self.schema
            .type_by_name(type_name)
            .ok_or_else(|| GraphError::validation(type_name, "unknown type"))
    }

    /// Emit one owned node and, recursively, everything it owns. Returns the
    /// node's statement variable and its assigned identifier.
    fn emit_node(
        &mut self,
        instance: &Instance,
        extra_labels: &[&str],
    ) -> Result<(String, Uuid), GraphError> {
        let t = self.resolved(&instance.type_name)?.clone();
        let uid = instance.uid.unwrap_or_else(Uuid::new_v4);
        let var = self.generator.node();

        let mut labels: Vec<&str> = t.labels.iter().map(String::as_str).collect();
        labels.extend(extra_labels);

        let uid_param = bind(&mut self.params, &mut self.generator, json!(uid.to_string()));
        let type_param = bind(&mut self.params, &mut self.generator, json!(t.name));
        let mut fields = vec![
            format!("uid: ${uid_param}"),
            format!("real_type: ${type_param}"),
        ];
        for (name, value) in &instance.properties {
            let param = bind(&mut self.params, &mut self.generator, value.clone());
            fields.push(format!("{name}: ${param}"));
        }
        fields.push("created_when: datetime()".to_string());
        fields.push("modified_when: datetime()".to_string());
        fields.push(format!("created_by: ${}", self.actor_param));
        fields.push(format!("modified_by: ${}", self.actor_param));

        self.creates.push(format!(
            "CREATE ({var}{} {{{}}})",
            label_fragment(&labels),
            fields.join(", ")
        ));

        for (name, values) in &instance.relations {
            let rel = t
                .relation(name)
                .ok_or_else(|| {
                    GraphError::validation(&t.name, format!("unknown relation '{name}'"))
                })?
                .clone();
            for value in values {
                self.emit_relation_value(&var, &rel, value)?;
            }
        }

        for (name, children) in &instance.embedded {
            let emb = t
                .embedded_field(name)
                .ok_or_else(|| {
                    GraphError::validation(&t.name, format!("unknown embedded field '{name}'"))
                })?
                .clone();
            for child in children {
                let (child_var, _) = self.emit_node(child, &["Embedded", "DeleteDetach"])?;
                self.edges.push(format!(
                    "CREATE ({var})-[:{}]->({child_var})",
                    emb.edge_type()
                ));
            }
        }

        Ok((var, uid))
    }

    fn emit_relation_value(
        &mut self,
        owner_var: &str,
        rel: &RelationField,
        value: &RelationValue,
    ) -> Result<(), GraphError> {
        match value {
            RelationValue::Reference {
                uid,
                relation_props,
                ..
            } => {
                let target_var = self.generator.node();
                let uid_param =
                    bind(&mut self.params, &mut self.generator, json!(uid.to_string()));
                let extra = (!relation_props.is_empty()).then(|| relation_props.clone());
                let props_param = bind(
                    &mut self.params,
                    &mut self.generator,
                    edge_props(rel, extra.as_ref()),
                );
                self.references.push(format!(
                    "CALL {{\n\
                       WITH {owner_var}\n\
                       MATCH ({target_var}:BaseNode {{uid: ${uid_param}}})\n\
                       CREATE ({owner_var})-[:{} ${props_param}]->({target_var})\n\
                     }}",
                    rel.edge_type()
                ));
            }
            RelationValue::Inline(child) => {
                let tags = structural_tags(rel);
                let (child_var, _) = self.emit_node(child, &tags)?;
                let props_param = bind(
                    &mut self.params,
                    &mut self.generator,
                    edge_props(rel, None),
                );
                self.edges.push(format!(
                    "CREATE ({owner_var})-[:{} ${props_param}]->({child_var})",
                    rel.edge_type()
                ));
            }
        }
        Ok(())
    }
}

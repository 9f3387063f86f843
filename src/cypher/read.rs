//! Read-path compilation: one statement reconstructing an aggregate.
//!
//! The statement walks three kinds of paths from the root and merges the
//! results into a single nested map (via APOC):
//!
//! - the owned subtree, following structurally tagged nodes (`ReadInline`,
//!   `Embedded`, `ReifiedRelation`) to unbounded depth;
//! - one hop into every referenced aggregate, directly or from the boundary
//!   of the owned subtree, so references render as pointers, never expanded;
//! - incoming relations, grouped by the reverse name carried on the edge,
//!   with structural intermediates excluded - an embedded or reified hop
//!   contributes the real aggregate behind it, not itself.
//!
//! Result ordering is unspecified; callers needing determinism sort
//! client-side.

use uuid::Uuid;

use crate::schema::{ResolvedSchema, TypeId};

use super::CompiledStatement;
use super::params::{NameGen, Params, bind};

const STRUCTURAL: &str = "ReadInline|Embedded|ReifiedRelation";

/// Compile a read statement for one aggregate of the given type.
///
/// A uid that matches nothing yields an empty row set; the caller surfaces
/// that as [`NotFound`](crate::errors::GraphError::NotFound).
pub fn compile_read(schema: &ResolvedSchema, id: TypeId, uid: Uuid) -> CompiledStatement {
    let t = schema.get(id);
    let mut params = Params::new();
    let mut generator = NameGen::new();
    let uid_param = bind(&mut params, &mut generator, uid.to_string().into());

    let has_outgoing = !t.relations.is_empty() || !t.embedded.is_empty();
    let has_incoming = !t.incoming.is_empty();

    let mut lines = vec![format!(
        "MATCH (node:{} {{uid: ${uid_param}}})",
        t.name
    )];

    if has_outgoing {
        lines.push(format!(
            "OPTIONAL MATCH direct_paths = (node)-[]->(direct:BaseNode)\n\
             WHERE NOT direct:Embedded AND NOT direct:ReadInline AND NOT direct:ReifiedRelation"
        ));
        lines.push(format!(
            "OPTIONAL MATCH owned_paths = \
             (node)-[]->(:{STRUCTURAL})(()-[]->(:{STRUCTURAL})){{0,}}()"
        ));
        lines.push(format!(
            "OPTIONAL MATCH boundary_paths = \
             (node)-[]->(:{STRUCTURAL})(()-[]->(:{STRUCTURAL})){{0,}}()-[]->(reference:BaseNode)\n\
             WHERE NOT reference:Embedded AND NOT reference:ReadInline \
             AND NOT reference:ReifiedRelation"
        ));
        lines.push(
            "WITH node, apoc.coll.flatten([collect(direct_paths), collect(owned_paths), \
             collect(boundary_paths)]) AS paths"
                .to_string(),
        );
    } else {
        lines.push("WITH node, [] AS paths".to_string());
    }

    if has_incoming {
        // Direct incoming edges from real aggregates.
        lines.push(
            "CALL {\n\
               WITH node\n\
               OPTIONAL MATCH (origin:BaseNode)-[direct_edge]->(node)\n\
               WHERE NOT origin:Embedded AND NOT origin:ReifiedRelation \
               AND direct_edge.reverse_name IS NOT NULL\n\
               WITH origin, direct_edge WHERE origin IS NOT NULL\n\
               RETURN collect({reverse_name: direct_edge.reverse_name, \
               uid: origin.uid, real_type: origin.real_type}) AS direct_incoming\n\
             }"
            .to_string(),
        );
        // Incoming through a relation carrier: attributed to the outer
        // relation's reverse name, not the carrier's own hop.
        lines.push(
            "CALL {\n\
               WITH node\n\
               OPTIONAL MATCH (origin:BaseNode)-[outer_edge]->(:ReifiedRelation)-[]->(node)\n\
               WHERE NOT origin:Embedded AND NOT origin:ReifiedRelation\n\
               WITH origin, outer_edge WHERE origin IS NOT NULL\n\
               RETURN collect({reverse_name: outer_edge.reverse_name, \
               uid: origin.uid, real_type: origin.real_type}) AS reified_incoming\n\
             }"
            .to_string(),
        );
        // Incoming declared on an embedded descendant: attributed to the
        // embedded relation's own reverse name, origin is the owning
        // aggregate root.
        lines.push(
            "CALL {\n\
               WITH node\n\
               OPTIONAL MATCH (origin:BaseNode)-[]->\
               (:Embedded)(()-[]->(:Embedded)){0,}(:Embedded)-[last_edge]->(node)\n\
               WHERE NOT origin:Embedded AND NOT origin:ReifiedRelation \
               AND last_edge.reverse_name IS NOT NULL\n\
               WITH origin, last_edge WHERE origin IS NOT NULL\n\
               RETURN collect({reverse_name: last_edge.reverse_name, \
               uid: origin.uid, real_type: origin.real_type}) AS embedded_incoming\n\
             }"
            .to_string(),
        );
    }

    lines.push("CALL apoc.convert.toTree(paths, false) YIELD value".to_string());
    if has_incoming {
        lines.push(
            "WITH node, value, apoc.map.groupByMulti(direct_incoming + reified_incoming + \
             embedded_incoming, \"reverse_name\") AS incoming"
                .to_string(),
        );
        lines.push(
            "RETURN apoc.map.mergeList([properties(node), value, {incoming: incoming}]) AS result"
                .to_string(),
        );
    } else {
        lines.push("RETURN apoc.map.mergeList([properties(node), value]) AS result".to_string());
    }

    CompiledStatement {
        statement: lines.join("\n"),
        params,
    }
}

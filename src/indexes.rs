//! Index and constraint bootstrap.
//!
//! One uniqueness constraint guards the process-wide `uid` namespace; each
//! searchable aggregate type with string-kinded fields gets a full-text
//! index over them. Installation is one-time bootstrap work, outside request
//! handling: every statement is issued independently, and a failure on one
//! is logged and does not abort the rest.

use tracing::{debug, warn};

use crate::cypher::Params;
use crate::schema::ResolvedSchema;
use crate::store::StoreAdapter;

/// The statements that would bring a store's indexes in line with the schema.
pub fn index_statements(schema: &ResolvedSchema) -> Vec<String> {
    let mut statements = vec![
        "CREATE CONSTRAINT BaseNodeUidUnique IF NOT EXISTS \
         FOR (n:BaseNode) REQUIRE n.uid IS UNIQUE"
            .to_string(),
    ];
    for t in schema.aggregate_types() {
        if !t.capabilities.searchable {
            continue;
        }
        let fields = t.text_property_names();
        if fields.is_empty() {
            continue;
        }
        let props = fields
            .iter()
            .map(|f| format!("n.{f}"))
            .collect::<Vec<_>>()
            .join(", ");
        statements.push(format!(
            "CREATE FULLTEXT INDEX {name}FullTextIndex IF NOT EXISTS \
             FOR (n:{name}) ON EACH [{props}]",
            name = t.name
        ));
    }
    statements
}

/// Install all index statements, continuing past per-statement failures.
/// Returns the number of statements that succeeded.
pub fn install_indexes(schema: &ResolvedSchema, store: &dyn StoreAdapter) -> usize {
    let mut installed = 0;
    for statement in index_statements(schema) {
        match store.execute(&statement, &Params::new()) {
            Ok(_) => {
                debug!(statement, "index statement installed");
                installed += 1;
            }
            Err(error) => {
                warn!(%error, statement, "index statement failed, continuing");
            }
        }
    }
    installed
}

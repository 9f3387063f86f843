//! The store adapter boundary.
//!
//! This crate compiles statements; it never talks to a graph store itself.
//! A driver implements [`StoreAdapter`] and executes each compiled statement
//! as one store-managed transaction. Retry and timeout policy belong to the
//! adapter, not here.

use serde_json::Value;

use crate::cypher::Params;
use crate::errors::GraphError;

/// Rows returned by one statement execution.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn empty() -> Self {
        QueryResult::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The single value of a single-row, single-column result, if that is
    /// what came back.
    pub fn single(&self) -> Option<&Value> {
        match self.rows.as_slice() {
            [row] => match row.as_slice() {
                [value] => Some(value),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Executes one statement against the backing graph store.
pub trait StoreAdapter: Send + Sync {
    fn execute(&self, statement: &str, params: &Params) -> Result<QueryResult, GraphError>;
}

//! Named-parameter bookkeeping shared by the statement compilers.

use std::collections::BTreeMap;

use serde_json::Value;

/// Named parameters accompanying a compiled statement.
pub type Params = BTreeMap<String, Value>;

/// Sequential generator for parameter names (`p0`, `p1`, ...) and node
/// identifiers (`n0`, `n1`, ...).
///
/// Counters never reset within one compilation, so every identifier in a
/// statement is unique and compilation is deterministic for a given input.
#[derive(Debug, Default)]
pub(crate) struct NameGen {
    params: u32,
    nodes: u32,
    edges: u32,
}

impl NameGen {
    pub(crate) fn new() -> Self {
        NameGen::default()
    }

    pub(crate) fn edge(&mut self) -> String {
        let name = format!("e{}", self.edges);
        self.edges += 1;
        name
    }

    pub(crate) fn param(&mut self) -> String {
        let name = format!("p{}", self.params);
        self.params += 1;
        name
    }

    pub(crate) fn node(&mut self) -> String {
        let name = format!("n{}", self.nodes);
        self.nodes += 1;
        name
    }
}

/// Bind a value under a fresh parameter name and return the name.
pub(crate) fn bind(params: &mut Params, generator: &mut NameGen, value: Value) -> String {
    let name = generator.param();
    params.insert(name.clone(), value);
    name
}

/// Render a label set as a Cypher fragment (`:A:B:C`).
pub(crate) fn label_fragment<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|l| format!(":{}", l.as_ref()))
        .collect::<String>()
}

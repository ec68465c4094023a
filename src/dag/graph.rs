// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{FlowError, Result};

/// Process-level dependency graph of a workflow.
///
/// Edge direction: producer -> consumer. The graph is kept acyclic at all
/// times; an edge that would close a cycle is rejected when it is added.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&mut self, name: &str) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(FlowError::ConfigError(format!(
                "process '{name}' is defined more than once"
            )));
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::UnknownProcess(name.to_string()))
    }

    /// Record that `to` consumes something `from` produces.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let a = self.node(from)?;
        let b = self.node(to)?;
        if a == b || has_path_connecting(&self.graph, b, a, None) {
            return Err(FlowError::DagCycle(format!(
                "connecting '{from}' -> '{to}' would create a cycle"
            )));
        }
        self.graph.update_edge(a, b, ());
        Ok(())
    }

    pub fn processes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Immediate producers feeding `name`.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Immediate consumers of `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// The given processes plus everything upstream of them.
    pub fn upstream_closure<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = roots
            .into_iter()
            .filter_map(|r| self.index.get(r).copied())
            .collect();
        while let Some(idx) = stack.pop() {
            if !seen.insert(self.graph[idx].clone()) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
        }
        seen
    }

    /// Processes ordered so that producers come before consumers.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|i| self.graph[i].clone()).collect())
            .map_err(|cycle| {
                FlowError::DagCycle(format!(
                    "cycle involving process '{}'",
                    self.graph[cycle.node_id()]
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DagGraph {
        let mut g = DagGraph::new();
        for n in ["a", "b", "c", "d"] {
            g.add_process(n).unwrap();
        }
        g.add_edge("a", "b").unwrap();
        g.add_edge("b", "c").unwrap();
        g
    }

    #[test]
    fn back_edge_is_rejected() {
        let mut g = chain();
        assert!(matches!(g.add_edge("c", "a"), Err(FlowError::DagCycle(_))));
        assert!(matches!(g.add_edge("b", "b"), Err(FlowError::DagCycle(_))));
        assert!(g.add_edge("a", "c").is_ok());
    }

    #[test]
    fn upstream_closure_follows_producers() {
        let g = chain();
        let closure = g.upstream_closure(["b"]);
        assert_eq!(
            closure.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn topological_order_puts_producers_first() {
        let g = chain();
        let order = g.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert_eq!(g.dependencies_of("b"), vec!["a"]);
        assert_eq!(g.dependents_of("b"), vec!["c"]);
    }

    #[test]
    fn duplicate_and_unknown_processes() {
        let mut g = chain();
        let mut names: Vec<&str> = g.processes().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(g.add_process("a").is_err());
        assert!(matches!(
            g.add_edge("a", "zzz"),
            Err(FlowError::UnknownProcess(_))
        ));
    }
}

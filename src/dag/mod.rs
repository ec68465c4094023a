// src/dag/mod.rs

//! Process dependency graph.
//!
//! [`graph`] mirrors the port connections at process granularity. It keeps
//! the workflow acyclic as edges are added and answers the structural
//! questions the engine asks: upstream closure for `--run-to`, topological
//! order for dry-run output.

pub mod graph;

pub use graph::DagGraph;

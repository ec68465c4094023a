// src/engine/mod.rs

//! Workflow engine.
//!
//! [`workflow`] is the builder: it owns the processes, wires their ports and
//! checks the graph. [`runtime`] executes a built workflow: one tokio task
//! per process, all started together, with the workflow waiting on the set
//! of tasks as a barrier. There is no central scheduler loop; processes
//! block on their in-ports and the bounded channels provide backpressure.

pub mod runtime;
pub mod workflow;

pub use runtime::RunReport;
pub use workflow::Workflow;

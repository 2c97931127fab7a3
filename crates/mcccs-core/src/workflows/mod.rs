//! # Workflows Module
//!
//! The user-facing layer: the declared operation table and the orchestrator
//! that walks it over a project's jobs.
//!
//! ## Architecture
//!
//! - **Operations** ([`operations`]) - Named operations with their pre- and postconditions
//! - **Flow** ([`flow`]) - Status reporting, multi-pass runs and forced execution
//!
//! A pass attempts every eligible operation of every selected job once. Runs
//! repeat passes until nothing is eligible or the pass limit is reached, so a
//! fresh job reaches its final production replicate after a handful of passes.

pub mod flow;
pub mod operations;

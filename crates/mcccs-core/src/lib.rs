//! # MCCCS Flow Core Library
//!
//! Drives a parameter sweep of Monte Carlo simulations through the
//! melt → cool → equilibration → production pipeline of the MCCCS-MN engine.
//! Each state point lives in its own job workspace; the library decides which
//! step every job needs next, prepares its input decks and runs the engine.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** State points and their content-derived ids,
//!   job workspaces and their persisted documents, stage naming and the
//!   keyword substitution applied to input templates.
//!
//! - **[`engine`]: The Logic Core.** Pure predicates over a job's files,
//!   named document transitions, the derived job state, configuration and the
//!   stage runner that invokes the external engine.
//!
//! - **[`workflows`]: The Public API.** The operation table and the
//!   orchestrator behind `status`, `run` and `exec`.

pub mod core;
pub mod engine;
pub mod workflows;

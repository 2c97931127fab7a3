//! # Core Module
//!
//! Stateless building blocks of the pipeline: the state point that identifies a
//! simulation and the sweep files that list them, the per-job workspace and its
//! persisted document, stage naming conventions for engine files, and keyword
//! resolution of input templates.
//!
//! Nothing in this layer runs the engine or decides what happens next; that is
//! the job of [`crate::engine`].

pub mod document;
pub mod job;
pub mod stage;
pub mod statepoint;
pub mod sweep;
pub mod template;

//! # Engine Module
//!
//! The stateful half of the pipeline: everything that inspects a job, moves it
//! from one stage to the next, or talks to the external simulation binary.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Engine location, replicate targets and job selection
//! - **Predicates** ([`predicates`]) - Pure readiness and completion checks over a job
//! - **Transitions** ([`transitions`]) - Named updates of the persisted job document
//! - **State Machine** ([`state`]) - The stage a job has reached, derived from its files
//! - **Stage Runner** ([`runner`]) - Invokes the engine and harvests its output artifacts
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Engine-level error taxonomy

pub mod config;
pub mod error;
pub mod predicates;
pub mod progress;
pub mod runner;
pub mod state;
pub mod transitions;

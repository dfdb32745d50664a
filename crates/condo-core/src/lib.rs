//! Project-management lifecycle for ClawCondos: condos group goals, goals
//! own ordered tasks, and tasks are handed to externally managed agent
//! sessions.
//!
//! This crate is synchronous and runtime-free. It owns the data model, the
//! dependency resolver, the kickoff claim phase, the retry/failure
//! supervisor, phase-cascade selection and the deferred cascade queue. The
//! async engine that talks to the session gateway lives in `condo-server`.

pub mod cascade;
pub mod clock;
pub mod condo;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod goal;
pub mod io;
pub mod kickoff;
pub mod paths;
pub mod planning;
pub mod resolver;
pub mod store;
pub mod supervisor;
pub mod task;
pub mod types;

pub use error::{CondoError, Result};

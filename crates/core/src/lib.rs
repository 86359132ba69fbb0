//! Domain core for entities flowing through multi-step workflows.
//!
//! Everything in this crate is pure, in-memory logic. Callers load
//! definitions, records, and submissions elsewhere and pass them in.

pub mod completion;
pub mod editor;
pub mod error;
pub mod metadata_schema;
pub mod options;
pub mod requests;
pub mod step_status;
pub mod submissions;
pub mod types;
pub mod workflow;

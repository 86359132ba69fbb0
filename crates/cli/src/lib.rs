//! Command-line access to the workflow core.
//!
//! Commands load JSON snapshots from disk, run the pure core functions, and
//! return serializable results for the binary to print.

pub mod commands;
pub mod config;

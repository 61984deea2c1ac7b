#![deny(unsafe_code)]

//! Shared test utilities for the funclab workspace.
//!
//! Provides reusable source fixtures, a temporary workspace, config builders
//! and tracing helpers so that individual crate tests stay concise and
//! consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! funclab-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod tracing_setup;
pub mod workspace;

//! Shared data model, configuration and error types for parley.
//!
//! Every other parley crate depends on this one. It carries no I/O beyond
//! reading and writing the TOML configuration file.

pub mod config;
pub mod error;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use types::*;

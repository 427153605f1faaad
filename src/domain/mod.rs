//! Domain layer for the dependency resolution loop
//!
//! Models, errors and the port traits that external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    CollaboratorError, ConfigError, MutatorError, OracleError, ProcessError, RecorderError,
    ValidationError,
};

//! Infrastructure layer module
//!
//! Adapters for everything outside the resolution loop:
//! - Process execution (tokio)
//! - pip environment mutation
//! - Claude Messages API client and the repair oracle built on it
//! - Run artifacts (history JSON, metrics summary, requirement files)
//! - Configuration and credentials
//! - Logging infrastructure
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod artifacts;
pub mod claude;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod logging;
pub mod oracle;
pub mod process;

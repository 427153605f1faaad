//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rolling JSON log files
//! - Secret scrubbing for text that leaves the process
//! - CI log groups around validation runs

pub mod ci_groups;
pub mod logger;
pub mod secret_scrubbing;

pub use ci_groups::CiGroup;
pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubber;

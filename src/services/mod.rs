pub mod failure_summarizer;
pub mod resolution_controller;
pub mod validation_harness;

pub use failure_summarizer::{find_summary_line, summarize};
pub use resolution_controller::ResolutionController;
pub use validation_harness::{ExecutionEnvironment, ValidationHarness};

//! Integration testing for the faleproxy binary
//!
//! `infrastructure` wraps the library harness for this binary, `scenarios`
//! holds the tests.

pub mod infrastructure;
pub mod scenarios;

pub use infrastructure::{harness_config, init_tracing, SubjectTestRun};

//! Process-lifecycle harness for testing a short-lived network service.
//!
//! Start one child server, wait for its readiness marker, run assertions
//! against it, and tear it down deterministically. Setup errors are fatal,
//! assertion errors belong to a single test, and teardown problems are
//! collected as warnings and logged, never raised.

pub mod client;
pub mod context;
pub mod error;
pub mod fixture;
pub mod launcher;
pub mod output;
pub mod readiness;
pub mod teardown;

pub use client::{AssertionClient, FetchOutcome};
pub use context::{run_bounded, HarnessConfig, HarnessContext};
pub use error::{HarnessError, HarnessResult, TeardownWarning};
pub use fixture::{FixtureServer, SAMPLE_HTML_WITH_YALE};
pub use launcher::{SubjectConfig, SubjectProcess, SubjectState};
pub use output::{CapturedOutput, OutputSnapshot, OutputStream};
pub use readiness::await_ready;
pub use teardown::{teardown, terminate_subject, TeardownConfig, TeardownReport};

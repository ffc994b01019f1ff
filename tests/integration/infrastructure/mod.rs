pub mod html_assertions;
pub mod subject_harness;

pub use html_assertions::*;
pub use subject_harness::{harness_config, init_tracing, SubjectTestRun, SUBJECT_BINARY};

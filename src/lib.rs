//! faleproxy
//!
//! An HTTP proxy that fetches a page and rewrites "Yale" to "Fale" in its
//! text, together with the process harness used to test it end to end:
//!
//! ```text
//! HarnessContext::setup
//!   ├── FixtureServer::start          in-process origin serving fixed HTML
//!   ├── SubjectProcess::start         faleproxy child on an isolated port
//!   ├── await_ready                   stdout marker scan raced with a timeout
//!   └── AssertionClient::for_subject  POST /fetch, GET probes
//! HarnessContext::teardown
//!   └── SIGTERM → wait → SIGKILL, then fixture stop; warnings collected
//! ```

pub mod environment;
pub mod harness;
pub mod proxy;

pub use environment::Environment;

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;

use super::error::{HarnessError, HarnessResult};
use super::launcher::{SubjectProcess, SubjectState};
use crate::proxy::FetchResponse;

/// What a `POST /fetch` produced
///
/// A structured rejection is a normal outcome, not an error: tests that
/// provoke one assert on it like on any other value.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Transformed(FetchResponse),
    Rejected { status: StatusCode, error: String },
}

/// HTTP client bound to a ready subject
pub struct AssertionClient {
    http: reqwest::Client,
    base_url: String,
    addr: SocketAddr,
}

impl AssertionClient {
    /// Fails with [`HarnessError::NotReady`] unless the readiness gate has passed.
    pub fn for_subject(subject: &SubjectProcess, request_timeout: Duration) -> HarnessResult<Self> {
        if subject.state() != SubjectState::Ready {
            return Err(HarnessError::NotReady(subject.state()));
        }

        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url: subject.base_url(),
            addr: SocketAddr::from(([127, 0, 0, 1], subject.port())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /fetch` with `{ "url": url }`.
    pub async fn fetch(&self, url: &str) -> HarnessResult<FetchOutcome> {
        self.fetch_json(serde_json::json!({ "url": url })).await
    }

    /// `POST /fetch` with an arbitrary JSON body.
    pub async fn fetch_json(&self, body: Value) -> HarnessResult<FetchOutcome> {
        debug!("POST /fetch {}", body);
        let response = self
            .http
            .post(format!("{}/fetch", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            HarnessError::Assertion(format!("/fetch returned {} with a non-JSON body ({}): {}", status, e, text))
        })?;

        interpret(status, payload)
    }

    /// Expects a 200 with `success: true` and rewritten `content`.
    pub async fn expect_transformed(&self, url: &str) -> HarnessResult<FetchResponse> {
        match self.fetch(url).await? {
            FetchOutcome::Transformed(response) => Ok(response),
            FetchOutcome::Rejected { status, error } => Err(HarnessError::Assertion(format!(
                "expected {} to be transformed, got {}: {}",
                url, status, error
            ))),
        }
    }

    /// Expects a structured error with exactly `expected` status and returns its message.
    pub async fn expect_rejected(&self, body: Value, expected: StatusCode) -> HarnessResult<String> {
        match self.fetch_json(body).await? {
            FetchOutcome::Rejected { status, error } if status == expected => Ok(error),
            FetchOutcome::Rejected { status, error } => Err(HarnessError::Assertion(format!(
                "expected status {}, got {}: {}",
                expected, status, error
            ))),
            FetchOutcome::Transformed(_) => Err(HarnessError::Assertion(format!(
                "expected status {}, got a transformed page",
                expected
            ))),
        }
    }

    /// Plain `GET` liveness probe.
    pub async fn get(&self, path: &str) -> HarnessResult<StatusCode> {
        let response = self.http.get(format!("{}{}", self.base_url, path)).send().await?;
        Ok(response.status())
    }

    /// Whether the subject still accepts TCP connections.
    pub async fn is_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(self.addr)).await,
            Ok(Ok(_))
        )
    }
}

fn interpret(status: StatusCode, payload: Value) -> HarnessResult<FetchOutcome> {
    if status.is_success() {
        let response: FetchResponse = serde_json::from_value(payload.clone()).map_err(|e| {
            HarnessError::Assertion(format!("malformed success body ({}): {}", e, payload))
        })?;
        if !response.success {
            return Err(HarnessError::Assertion(format!(
                "status {} but success is false: {}",
                status, payload
            )));
        }
        return Ok(FetchOutcome::Transformed(response));
    }

    match payload.get("error").and_then(Value::as_str) {
        Some(error) => Ok(FetchOutcome::Rejected {
            status,
            error: error.to_string(),
        }),
        None => Err(HarnessError::Assertion(format!(
            "status {} without an error message: {}",
            status, payload
        ))),
    }
}

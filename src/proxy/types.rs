//! JSON bodies exchanged on `POST /fetch`.

use serde::{Deserialize, Serialize};

/// Request body of `POST /fetch`. `url` is optional so that a missing field
/// reaches the handler and gets the proxy's own 400 instead of a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Successful `POST /fetch` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub success: bool,
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_url: String,
}

/// Body of every non-2xx response the proxy produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// src/models/api.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /servers/{kind}/page/{n}`
#[derive(Debug, Deserialize)]
pub struct PageResponse {
    pub error: i64,
    #[serde(default)]
    pub info: Option<String>,
    // Kept as raw values so one malformed row does not cost the whole page.
    #[serde(default)]
    pub data: Option<Vec<Value>>,
}

/// Body of `POST /servers/{kind}/crawler`.
#[derive(Debug, Serialize)]
pub struct CrawlerUpload<'a, R> {
    pub servers: &'a [R],
}

#[derive(Debug, Deserialize)]
pub struct CrawlerResponse {
    pub error: i64,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub data: Option<UploadSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UploadSummary {
    pub updated: u64,
    pub total: u64,
}

/// One vote forwarded by the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub auth_token: String,
    pub ip: String,
    pub port: u16,
    pub token: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VotePayload {
    Batch(Vec<VoteRequest>),
    Single(VoteRequest),
}

impl VotePayload {
    pub fn into_votes(self) -> Vec<VoteRequest> {
        match self {
            Self::Batch(votes) => votes,
            Self::Single(vote) => vec![vote],
        }
    }
}

/// Indices into the submitted votes, split by Votifier result.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub success: Vec<usize>,
    pub failed: Vec<usize>,
}

/// Envelope shared by every relay response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub error: u32,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            error: 0,
            info: "success".to_string(),
            data: Some(data),
        }
    }
}

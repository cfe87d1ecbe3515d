// src/error.rs
use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the remote catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog answered with HTTP {0}")]
    Status(StatusCode),

    #[error("catalog returned error code {code}: {info}")]
    Api { code: i64, info: String },

    #[error("catalog page has no data")]
    MissingData,
}

/// Why a single live-status probe did not produce fresh data.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

/// Failures forwarding a vote to a Votifier listener.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("votifier connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("votifier timed out")]
    Timeout,

    #[error("votifier protocol error: {0}")]
    Protocol(String),

    #[error("vote rejected: {0}")]
    Rejected(String),
}

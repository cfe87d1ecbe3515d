// src/utils.rs
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use log::debug;
use serde_json::json;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid auth token")]
    Unauthorized,
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Failed to extract client IP")]
    MissingPeerIP,
}

impl RequestError {
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidPayload(_) => 1001,
            Self::Unauthorized => 1002,
            Self::RateLimitExceeded => 1003,
            Self::MissingPeerIP => 1004,
        }
    }
}

impl ResponseError for RequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "info": self.to_string(),
        }))
    }
}

/// Client address for rate limiting.
///
/// The first `X-Forwarded-For` hop is only honoured when the relay runs behind
/// a trusted proxy; otherwise the connection peer is used.
pub fn client_ip(req: &HttpRequest, trust_forwarded_for: bool) -> Result<IpAddr, RequestError> {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            debug!("Using X-Forwarded-For: {}", ip);
            return Ok(ip);
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)
}

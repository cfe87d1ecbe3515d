// src/handlers/vote.rs
use actix_web::{ web, HttpRequest, HttpResponse };
use log::{ debug, warn };
use std::sync::Arc;
use crate::handlers::IpRateLimiter;
use crate::models::api::{ ApiResponse, VoteOutcome, VotePayload };
use crate::utils::{ client_ip, RequestError };
use crate::votifier::{ Vote, VoteSender };

const MAX_VOTES_PER_REQUEST: usize = 100;

pub struct RelayState {
    pub secret_token: String,
    pub trust_forwarded_for: bool,
    pub sender: Arc<dyn VoteSender>,
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| RequestError::InvalidPayload(err.to_string()).into())
}

/// Forwards one vote or a batch of votes to the servers' Votifier listeners.
///
/// Every item must carry the relay secret; delivery failures are reported
/// per item and never fail the request as a whole.
pub async fn submit_votes(
    req: HttpRequest,
    state: web::Data<RelayState>,
    rate_limiter: web::Data<IpRateLimiter>,
    payload: web::Json<VotePayload>,
) -> Result<HttpResponse, RequestError> {
    let peer_ip = client_ip(&req, state.trust_forwarded_for)?;
    if rate_limiter.check_key(&peer_ip).is_err() {
        warn!("Rate limit exceeded for votes from ip: {}", peer_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let votes = payload.into_inner().into_votes();
    if votes.is_empty() || votes.len() > MAX_VOTES_PER_REQUEST {
        return Err(RequestError::InvalidPayload(format!(
            "expected 1 to {} votes, got {}",
            MAX_VOTES_PER_REQUEST,
            votes.len()
        )));
    }
    if state.secret_token.is_empty() || votes.iter().any(|v| v.auth_token != state.secret_token) {
        warn!("Rejected vote request with invalid auth token from {}", peer_ip);
        return Err(RequestError::Unauthorized);
    }

    let mut outcome = VoteOutcome::default();
    for (index, request) in votes.into_iter().enumerate() {
        let vote = Vote {
            ip: request.ip,
            port: request.port,
            token: request.token,
            username: request.username,
        };
        match state.sender.send_vote(&vote).await {
            Ok(()) => {
                debug!("Delivered vote from {} to {}:{}", vote.username, vote.ip, vote.port);
                outcome.success.push(index);
            }
            Err(e) => {
                warn!("Failed to deliver vote to {}:{}: {}", vote.ip, vote.port, e);
                outcome.failed.push(index);
            }
        }
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}

// src/votifier.rs
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{BigEndian, WriteBytesExt};
use log::debug;
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use crate::error::VoteError;

const V2_MAGIC: u16 = 0x733A;
const MAX_LINE_LEN: usize = 4096;

/// A vote addressed to one Minecraft server's Votifier listener.
#[derive(Debug, Clone)]
pub struct Vote {
    pub ip: String,
    pub port: u16,
    pub token: String,
    pub username: String,
}

#[async_trait]
pub trait VoteSender: Send + Sync {
    async fn send_vote(&self, vote: &Vote) -> Result<(), VoteError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VotePayload<'a> {
    service_name: &'a str,
    username: &'a str,
    address: &'a str,
    timestamp: u64,
    challenge: &'a str,
}

#[derive(Serialize)]
struct SignedMessage<'a> {
    payload: &'a str,
    signature: String,
}

#[derive(Deserialize)]
struct VoteReply {
    status: String,
    #[serde(default)]
    cause: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// NuVotifier v2 client (token-based, HMAC-SHA256 signed).
pub struct VotifierClient {
    service_name: String,
    timeout: Duration,
}

impl VotifierClient {
    pub fn new(service_name: &str, timeout: Duration) -> Self {
        Self {
            service_name: service_name.to_string(),
            timeout,
        }
    }

    async fn exchange(&self, vote: &Vote) -> Result<(), VoteError> {
        let stream = TcpStream::connect((vote.ip.as_str(), vote.port)).await?;
        let mut reader = BufReader::new(stream);

        let greeting = read_line(&mut reader).await?;
        let challenge = parse_greeting(&greeting)?;
        debug!("Votifier {}:{} greeted with challenge {}", vote.ip, vote.port, challenge);

        let address = format!("{}:{}", vote.ip, vote.port);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let payload = serde_json::to_string(&VotePayload {
            service_name: &self.service_name,
            username: &vote.username,
            address: &address,
            timestamp,
            challenge: &challenge,
        })
        .map_err(|e| VoteError::Protocol(e.to_string()))?;

        let frame = encode_message(&payload, &vote.token)?;
        reader.get_mut().write_all(&frame).await?;

        let reply = read_line(&mut reader).await?;
        let reply: VoteReply = serde_json::from_str(reply.trim())
            .map_err(|e| VoteError::Protocol(format!("invalid reply: {}", e)))?;
        if reply.status == "ok" {
            Ok(())
        } else {
            Err(VoteError::Rejected(
                reply.cause.or(reply.error).unwrap_or(reply.status),
            ))
        }
    }
}

#[async_trait]
impl VoteSender for VotifierClient {
    async fn send_vote(&self, vote: &Vote) -> Result<(), VoteError> {
        match tokio::time::timeout(self.timeout, self.exchange(vote)).await {
            Ok(result) => result,
            Err(_) => Err(VoteError::Timeout),
        }
    }
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> Result<String, VoteError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(VoteError::Protocol("connection closed".to_string()));
    }
    if line.len() > MAX_LINE_LEN {
        return Err(VoteError::Protocol("line too long".to_string()));
    }
    Ok(line)
}

/// `VOTIFIER 2 <challenge>`
fn parse_greeting(line: &str) -> Result<String, VoteError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("VOTIFIER"), Some("2"), Some(challenge)) => Ok(challenge.to_string()),
        (Some("VOTIFIER"), Some(version), _) => Err(VoteError::Protocol(format!(
            "unsupported votifier version {}",
            version
        ))),
        _ => Err(VoteError::Protocol(format!("unexpected greeting {:?}", line.trim()))),
    }
}

fn encode_message(payload: &str, token: &str) -> Result<Vec<u8>, VoteError> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, token.as_bytes());
    let signature = STANDARD.encode(hmac::sign(&key, payload.as_bytes()).as_ref());
    let message = serde_json::to_vec(&SignedMessage { payload, signature })
        .map_err(|e| VoteError::Protocol(e.to_string()))?;
    let len = u16::try_from(message.len())
        .map_err(|_| VoteError::Protocol("vote message too large".to_string()))?;

    let mut frame = Vec::with_capacity(message.len() + 4);
    WriteBytesExt::write_u16::<BigEndian>(&mut frame, V2_MAGIC)?;
    WriteBytesExt::write_u16::<BigEndian>(&mut frame, len)?;
    frame.extend_from_slice(&message);
    Ok(frame)
}

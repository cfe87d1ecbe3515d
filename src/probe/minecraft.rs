// src/probe/minecraft.rs
use async_trait::async_trait;
use byteorder::{BigEndian, WriteBytesExt};
use chrono::Utc;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::debug;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use crate::error::ProbeError;
use crate::models::server::MinecraftServer;
use super::{Probe, ProbeOutcome};

// -1 asks the server to report its own protocol version.
const STATUS_PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const MAX_STATUS_LEN: usize = 2_097_151;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: StatusPlayers,
}

#[derive(Debug, Deserialize)]
struct StatusPlayers {
    online: u64,
    max: u64,
}

/// Server List Ping over TCP.
pub struct MinecraftProbe {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl MinecraftProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            timeout,
        }
    }

    /// Follows `_minecraft._tcp.<host>` for any hostname, whatever port the
    /// catalog lists. Falls back to `host:port` when no record resolves.
    async fn resolve(&self, host: &str, port: u16) -> (String, u16) {
        if !wants_srv(host) {
            return (host.to_string(), port);
        }

        match self.resolver.srv_lookup(format!("_minecraft._tcp.{}", host)).await {
            Ok(lookup) => match lookup.iter().next() {
                Some(srv) => {
                    let target = srv.target().to_utf8();
                    debug!("SRV {} -> {}:{}", host, target, srv.port());
                    (target.trim_end_matches('.').to_string(), srv.port())
                }
                None => (host.to_string(), port),
            },
            Err(e) => {
                debug!("No SRV record for {}: {}", host, e);
                (host.to_string(), port)
            }
        }
    }

    async fn query(&self, host: &str, port: u16) -> Result<StatusPlayers, ProbeError> {
        let (host, port) = self.resolve(host, port).await;
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;

        let mut handshake = Vec::new();
        write_varint(&mut handshake, 0x00);
        write_varint(&mut handshake, STATUS_PROTOCOL_VERSION);
        write_string(&mut handshake, &host);
        WriteBytesExt::write_u16::<BigEndian>(&mut handshake, port)?;
        write_varint(&mut handshake, NEXT_STATE_STATUS);
        write_packet(&mut stream, &handshake).await?;
        write_packet(&mut stream, &[0x00]).await?;

        let _packet_len = read_varint(&mut stream).await?;
        let packet_id = read_varint(&mut stream).await?;
        if packet_id != 0x00 {
            return Err(ProbeError::Protocol(format!("unexpected packet id {:#x}", packet_id)));
        }

        let json_len = read_varint(&mut stream).await?;
        let json_len = usize::try_from(json_len)
            .ok()
            .filter(|len| *len <= MAX_STATUS_LEN)
            .ok_or_else(|| ProbeError::Protocol(format!("invalid status length {}", json_len)))?;

        let mut body = vec![0u8; json_len];
        stream.read_exact(&mut body).await?;

        let status: StatusResponse = serde_json::from_slice(&body)
            .map_err(|e| ProbeError::Protocol(format!("invalid status json: {}", e)))?;
        Ok(status.players)
    }
}

#[async_trait]
impl Probe for MinecraftProbe {
    type Record = MinecraftServer;

    async fn probe(&self, record: &MinecraftServer) -> ProbeOutcome<MinecraftServer> {
        let result = match tokio::time::timeout(self.timeout, self.query(&record.ip, record.port)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        };

        let mut next = record.clone();
        next.updated = Utc::now();
        match result {
            Ok(players) => {
                next.online = true;
                next.players = players.online;
                next.players_max = players.max;
                ProbeOutcome::Refreshed(next)
            }
            Err(e) => {
                next.online = false;
                next.players = 0;
                ProbeOutcome::Down(next, e)
            }
        }
    }
}

fn wants_srv(host: &str) -> bool {
    !host.is_empty() && host.parse::<IpAddr>().is_err()
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

async fn write_packet<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), ProbeError> {
    let mut frame = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut frame, payload.len() as i32);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await?;
    Ok(())
}

async fn read_varint<R: AsyncRead + Unpin>(stream: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for position in 0..5 {
        let byte = stream.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt too long".to_string()))
}

// src/probe/mod.rs
pub mod discord;
pub mod minecraft;

use async_trait::async_trait;
use crate::error::ProbeError;
use crate::models::server::ServerRecord;

/// Result of probing one server.
#[derive(Debug)]
pub enum ProbeOutcome<R> {
    /// The server answered; the record carries fresh liveness data.
    Refreshed(R),
    /// The server did not answer and the failure is itself the new state.
    Down(R, ProbeError),
    /// Nothing usable came back; the stored record must stay as it is.
    Unchanged(ProbeError),
}

/// Per-kind live status query.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    type Record: ServerRecord;

    async fn probe(&self, record: &Self::Record) -> ProbeOutcome<Self::Record>;
}

// src/probe/discord.rs
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use crate::error::ProbeError;
use crate::models::server::DiscordServer;
use super::{Probe, ProbeOutcome};

#[derive(Debug, Deserialize)]
struct Invite {
    guild: Option<InviteGuild>,
    approximate_member_count: Option<u64>,
    approximate_presence_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct InviteGuild {
    name: Option<String>,
    icon: Option<String>,
    banner: Option<String>,
    splash: Option<String>,
}

/// Invite metadata lookup against the Discord REST API.
pub struct DiscordProbe {
    http: Client,
    api_url: String,
    courtesy_delay: Duration,
}

impl DiscordProbe {
    pub fn new(api_url: &str, courtesy_delay: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("rsl-crawler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            courtesy_delay,
        })
    }

    async fn fetch_invite(&self, invite_code: &str) -> Result<Invite, ProbeError> {
        let url = format!("{}/invites/{}", self.api_url, invite_code);
        let response = self.http
            .get(&url)
            .query(&[("with_counts", "true"), ("with_expiration", "true")])
            .send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Probe for DiscordProbe {
    type Record = DiscordServer;

    async fn probe(&self, record: &DiscordServer) -> ProbeOutcome<DiscordServer> {
        tokio::time::sleep(self.courtesy_delay).await;

        let invite = match self.fetch_invite(&record.invite_code).await {
            Ok(invite) => invite,
            Err(e) => return ProbeOutcome::Unchanged(e),
        };

        let Some(guild) = invite.guild else {
            return ProbeOutcome::Unchanged(ProbeError::Malformed("invite has no guild"));
        };
        let Some(name) = guild.name else {
            return ProbeOutcome::Unchanged(ProbeError::Malformed("guild has no name"));
        };
        let Some(members_total) = invite.approximate_member_count else {
            return ProbeOutcome::Unchanged(ProbeError::Malformed("missing member count"));
        };

        let mut next = record.clone();
        next.name = Some(name);
        next.icon = guild.icon;
        next.banner = guild.banner;
        next.splash = guild.splash;
        next.members = invite.approximate_presence_count.unwrap_or(0);
        next.members_total = members_total;
        next.updated = Utc::now();
        ProbeOutcome::Refreshed(next)
    }
}

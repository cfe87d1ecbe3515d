use std::env;
use std::str::FromStr;
use std::time::Duration;
use std::num::NonZeroU32;
use governor::Quota;
use crate::models::server::Kind;

#[derive(Clone)]
pub struct Config {
    // Catalog
    pub catalog_url: String,
    pub secret_token: String,
    pub max_pages: u32,
    pub page_delay_ms: u64,
    pub refresh_interval_secs: u64,

    // Upload
    pub upload_interval_secs: u64,
    pub upload_batch_size: usize,

    // Probing
    pub discord_api_url: String,
    pub enable_minecraft: bool,
    pub enable_discord: bool,
    pub minecraft_probe_delay_ms: u64,
    pub minecraft_probe_timeout_ms: u64,
    pub discord_probe_delay_ms: u64,
    pub discord_courtesy_delay_ms: u64,

    // Vote relay
    pub bind_address: String,
    pub port: u16,
    pub trust_forwarded_for: bool,
    pub vote_period_secs: u64,
    pub vote_burst_limit: u32,
    pub votifier_service_name: String,
    pub votifier_timeout_ms: u64,
}

/// Timers and limits for one kind's loader, scheduler and uploader.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_pages: u32,
    pub page_delay: Duration,
    pub refresh_interval: Duration,
    pub upload_interval: Duration,
    pub batch_size: usize,
    pub probe_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: "https://api.rabbitserverlist.com/v1".to_string(),
            secret_token: String::new(),
            max_pages: 50,
            page_delay_ms: 1000,
            refresh_interval_secs: 1800,
            upload_interval_secs: 60,
            upload_batch_size: 20,
            discord_api_url: "https://discord.com/api/v10".to_string(),
            enable_minecraft: true,
            enable_discord: true,
            minecraft_probe_delay_ms: 2000,
            minecraft_probe_timeout_ms: 5000,
            discord_probe_delay_ms: 500,
            discord_courtesy_delay_ms: 500,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            trust_forwarded_for: false,
            vote_period_secs: 1,
            vote_burst_limit: 30,
            votifier_service_name: "rabbitserverlist".to_string(),
            votifier_timeout_ms: 5000,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            catalog_url: env_or("CATALOG_URL", defaults.catalog_url),
            secret_token: env_or("CRAWLER_SECRET_TOKEN", defaults.secret_token),
            max_pages: env_or("CATALOG_MAX_PAGES", defaults.max_pages),
            page_delay_ms: env_or("CATALOG_PAGE_DELAY_MS", defaults.page_delay_ms),
            refresh_interval_secs: env_or("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs),

            upload_interval_secs: env_or("UPLOAD_INTERVAL_SECS", defaults.upload_interval_secs),
            upload_batch_size: env_or("UPLOAD_BATCH_SIZE", defaults.upload_batch_size),

            discord_api_url: env_or("DISCORD_API_URL", defaults.discord_api_url),
            enable_minecraft: env_or("ENABLE_MINECRAFT", defaults.enable_minecraft),
            enable_discord: env_or("ENABLE_DISCORD", defaults.enable_discord),
            minecraft_probe_delay_ms: env_or("MINECRAFT_PROBE_DELAY_MS", defaults.minecraft_probe_delay_ms),
            minecraft_probe_timeout_ms: env_or("MINECRAFT_PROBE_TIMEOUT_MS", defaults.minecraft_probe_timeout_ms),
            discord_probe_delay_ms: env_or("DISCORD_PROBE_DELAY_MS", defaults.discord_probe_delay_ms),
            discord_courtesy_delay_ms: env_or("DISCORD_COURTESY_DELAY_MS", defaults.discord_courtesy_delay_ms),

            bind_address: env_or("BIND_ADDRESS", defaults.bind_address),
            port: env_or("PORT", defaults.port),
            trust_forwarded_for: env_or("TRUST_FORWARDED_FOR", defaults.trust_forwarded_for),
            vote_period_secs: env_or("VOTE_PERIOD_SECS", defaults.vote_period_secs),
            vote_burst_limit: env_or("VOTE_BURST_LIMIT", defaults.vote_burst_limit),
            votifier_service_name: env_or("VOTIFIER_SERVICE_NAME", defaults.votifier_service_name),
            votifier_timeout_ms: env_or("VOTIFIER_TIMEOUT_MS", defaults.votifier_timeout_ms),
        }
    }

    pub fn pipeline_settings(&self, kind: Kind) -> PipelineSettings {
        let probe_delay_ms = match kind {
            Kind::Minecraft => self.minecraft_probe_delay_ms,
            Kind::Discord => self.discord_probe_delay_ms,
        };

        PipelineSettings {
            max_pages: self.max_pages,
            page_delay: Duration::from_millis(self.page_delay_ms),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            upload_interval: Duration::from_secs(self.upload_interval_secs.max(1)),
            batch_size: self.upload_batch_size.max(1),
            probe_delay: Duration::from_millis(probe_delay_ms),
        }
    }

    pub fn minecraft_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.minecraft_probe_timeout_ms)
    }

    pub fn discord_courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.discord_courtesy_delay_ms)
    }

    pub fn votifier_timeout(&self) -> Duration {
        Duration::from_millis(self.votifier_timeout_ms)
    }

    pub fn vote_quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.vote_burst_limit).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(Duration::from_secs(self.vote_period_secs.max(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_catalog_contract() {
        let config = Config::default();
        let minecraft = config.pipeline_settings(Kind::Minecraft);
        let discord = config.pipeline_settings(Kind::Discord);

        assert_eq!(minecraft.max_pages, 50);
        assert_eq!(minecraft.batch_size, 20);
        assert_eq!(minecraft.page_delay, Duration::from_millis(1000));
        assert_eq!(minecraft.probe_delay, Duration::from_millis(2000));
        assert_eq!(discord.probe_delay, Duration::from_millis(500));
        assert_eq!(config.minecraft_probe_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = Config {
            upload_batch_size: 0,
            ..Config::default()
        };
        assert_eq!(config.pipeline_settings(Kind::Minecraft).batch_size, 1);
    }
}

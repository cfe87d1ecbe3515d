// src/crawler/mod.rs
pub mod loader;
pub mod scheduler;
pub mod uploader;

use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use crate::catalog::CatalogClient;
use crate::config::PipelineSettings;
use crate::models::server::{Kind, ServerRecord};
use crate::probe::Probe;
use crate::storage::memory::{DirtySet, Registry};
use loader::Loader;
use scheduler::Scheduler;
use uploader::Uploader;

const MIN_RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub kind: Kind,
    pub servers: usize,
    pub dirty: usize,
}

/// Read-only view of a running pipeline, used by the health endpoint.
pub trait PipelineMonitor: Send + Sync {
    fn status(&self) -> PipelineStatus;
}

/// Loader, scheduler and uploader of one kind, sharing one registry and dirty set.
pub struct Pipeline<P: Probe> {
    probe: Arc<P>,
    catalog: Arc<CatalogClient>,
    registry: Arc<Registry<P::Record>>,
    dirty: Arc<DirtySet>,
    settings: PipelineSettings,
}

impl<P: Probe> Pipeline<P> {
    pub fn new(probe: P, catalog: Arc<CatalogClient>, settings: PipelineSettings) -> Self {
        Self {
            probe: Arc::new(probe),
            catalog,
            registry: Arc::new(Registry::new()),
            dirty: Arc::new(DirtySet::new()),
            settings,
        }
    }

    fn kind(&self) -> Kind {
        <P::Record as ServerRecord>::KIND
    }

    fn loader(&self) -> Loader<P::Record> {
        Loader::new(
            self.catalog.clone(),
            self.registry.clone(),
            self.settings.max_pages,
            self.settings.page_delay,
        )
    }

    fn uploader(&self) -> Uploader<P::Record> {
        Uploader::new(
            self.catalog.clone(),
            self.registry.clone(),
            self.dirty.clone(),
            self.settings.batch_size,
        )
    }

    /// Spawns the three activities on the current runtime.
    ///
    /// The first refresh runs immediately and the scheduler starts once it has
    /// finished; later refreshes and uploads fire on their own intervals.
    pub fn start(self: Arc<Self>) {
        info!("Starting {} pipeline", self.kind());
        tokio::spawn(self.clone().supervise_scheduler());
        tokio::spawn(self.clone().refresh_periodically());
        tokio::spawn(self.upload_periodically());
    }

    async fn supervise_scheduler(self: Arc<Self>) {
        self.loader().refresh().await;

        loop {
            info!("Starting {} crawler", self.kind());
            let scheduler = Scheduler::new(
                self.probe.clone(),
                self.registry.clone(),
                self.dirty.clone(),
                self.settings.probe_delay,
            );

            match tokio::spawn(scheduler.run()).await {
                Ok(()) => warn!("{} crawler stopped", self.kind()),
                Err(e) => error!("{} crawler crashed: {}", self.kind(), e),
            }
            tokio::time::sleep(self.settings.probe_delay.max(MIN_RESTART_DELAY)).await;
        }
    }

    async fn refresh_periodically(self: Arc<Self>) {
        let loader = self.loader();
        let period = self.settings.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            info!("Fetching {} data", self.kind());
            loader.refresh().await;
        }
    }

    async fn upload_periodically(self: Arc<Self>) {
        let uploader = self.uploader();
        let period = self.settings.upload_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            info!("Uploading {} data", self.kind());
            if let Err(e) = uploader.flush().await {
                debug!("{} upload will be retried next tick: {}", self.kind(), e);
            }
        }
    }
}

impl<P: Probe> PipelineMonitor for Pipeline<P> {
    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            kind: self.kind(),
            servers: self.registry.len(),
            dirty: self.dirty.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::MinecraftServer;
    use crate::probe::ProbeOutcome;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct AlwaysOnline;

    #[async_trait]
    impl Probe for AlwaysOnline {
        type Record = MinecraftServer;

        async fn probe(&self, record: &MinecraftServer) -> ProbeOutcome<MinecraftServer> {
            let mut next = record.clone();
            next.online = true;
            next.players = 42;
            next.updated = Utc::now();
            ProbeOutcome::Refreshed(next)
        }
    }

    #[tokio::test]
    async fn test_pipeline_loads_probes_and_uploads() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/minecraft/page/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0,
                "data": [{
                    "id": 77,
                    "ip": "127.0.0.1",
                    "port": 25565,
                    "online": false,
                    "players": 0,
                    "players_max": 10,
                    "votes": 2,
                    "votes_total": 20,
                    "updated": "2024-01-01T00:00:00.000Z"
                }]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/minecraft/page/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": 0, "data": [] })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/servers/minecraft/crawler"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0,
                "info": "success",
                "data": { "updated": 1, "total": 1 }
            })))
            .mount(&mock_server)
            .await;

        let catalog = Arc::new(CatalogClient::new(&mock_server.uri(), "secret").unwrap());
        let settings = PipelineSettings {
            max_pages: 50,
            page_delay: Duration::ZERO,
            refresh_interval: Duration::from_secs(3600),
            upload_interval: Duration::from_millis(200),
            batch_size: 20,
            probe_delay: Duration::from_millis(50),
        };
        let pipeline = Arc::new(Pipeline::new(AlwaysOnline, catalog, settings));
        pipeline.clone().start();

        tokio::time::sleep(Duration::from_millis(700)).await;

        let status = pipeline.status();
        assert_eq!(status.kind, Kind::Minecraft);
        assert_eq!(status.servers, 1);

        let uploads: Vec<serde_json::Value> = mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.method.as_str() == "POST")
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect();
        assert!(!uploads.is_empty());
        assert_eq!(uploads[0]["servers"][0]["id"], json!(77));
        assert_eq!(uploads[0]["servers"][0]["players"], json!(42));
        assert_eq!(uploads[0]["servers"][0]["votes"], json!(2));
    }
}

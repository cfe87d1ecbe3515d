// src/crawler/scheduler.rs
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use crate::models::server::ServerRecord;
use crate::probe::{Probe, ProbeOutcome};
use crate::storage::memory::{DirtySet, Registry};

/// Round-robin liveness loop: always probes the stalest record next.
pub struct Scheduler<P: Probe> {
    probe: Arc<P>,
    registry: Arc<Registry<P::Record>>,
    dirty: Arc<DirtySet>,
    delay: Duration,
    // Probes that came back `Unchanged` leave `updated` alone; remembering the
    // attempt keeps one broken entry from monopolising the loop.
    unchanged_attempts: HashMap<u64, DateTime<Utc>>,
}

impl<P: Probe> Scheduler<P> {
    pub fn new(
        probe: Arc<P>,
        registry: Arc<Registry<P::Record>>,
        dirty: Arc<DirtySet>,
        delay: Duration,
    ) -> Self {
        Self {
            probe,
            registry,
            dirty,
            delay,
            unchanged_attempts: HashMap::new(),
        }
    }

    fn select(&self) -> Option<P::Record> {
        self.registry.stalest_by(|record| {
            let updated = record.updated();
            match self.unchanged_attempts.get(&record.id()) {
                Some(attempted) if *attempted > updated => *attempted,
                _ => updated,
            }
        })
    }

    /// Probes one record. Returns the probed ID, or `None` when the registry is empty.
    pub async fn step(&mut self) -> Option<u64> {
        let record = self.select()?;
        let id = record.id();
        let kind = <P::Record as ServerRecord>::KIND;
        trace!("Crawling {} server #{}", kind, id);

        match self.probe.probe(&record).await {
            ProbeOutcome::Refreshed(next) => {
                self.unchanged_attempts.remove(&id);
                self.registry.apply_probe(&next);
            }
            ProbeOutcome::Down(next, e) => {
                debug!("{} server #{} is down: {}", kind, id, e);
                self.unchanged_attempts.remove(&id);
                self.registry.apply_probe(&next);
            }
            ProbeOutcome::Unchanged(e) => {
                debug!("{} server #{} left unchanged: {}", kind, id, e);
                self.unchanged_attempts.insert(id, Utc::now());
            }
        }

        self.dirty.mark(id);
        Some(id)
    }

    /// Runs until the task is dropped.
    pub async fn run(mut self) {
        loop {
            self.step().await;
            tokio::time::sleep(self.delay).await;
        }
    }
}

// src/main.rs
mod catalog;
mod config;
mod crawler;
mod error;
mod handlers;
mod models;
mod probe;
mod storage;
mod utils;
mod votifier;

use actix_web::{ web, App, HttpServer };
use env_logger::Env;
use std::sync::Arc;
use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::crawler::{ Pipeline, PipelineMonitor };
use crate::handlers::IpRateLimiter;
use crate::handlers::index::Monitors;
use crate::handlers::vote::RelayState;
use crate::models::server::Kind;
use crate::probe::discord::DiscordProbe;
use crate::probe::minecraft::MinecraftProbe;
use crate::votifier::VotifierClient;
use log::{ info, warn };

fn startup_error(what: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("Failed to create {}: {}", what, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("Failed to create {}: {}", what, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    if config.secret_token.is_empty() {
        warn!("CRAWLER_SECRET_TOKEN is not set; uploads and votes will be rejected");
    }

    let catalog = Arc::new(
        CatalogClient::new(&config.catalog_url, &config.secret_token)
            .map_err(|e| startup_error("catalog client", e))?
    );

    let mut monitors: Monitors = Vec::new();

    if config.enable_minecraft {
        let probe = MinecraftProbe::new(config.minecraft_probe_timeout());
        let pipeline = Arc::new(
            Pipeline::new(probe, catalog.clone(), config.pipeline_settings(Kind::Minecraft))
        );
        pipeline.clone().start();
        monitors.push(pipeline as Arc<dyn PipelineMonitor>);
    }

    if config.enable_discord {
        let probe = DiscordProbe::new(&config.discord_api_url, config.discord_courtesy_delay())
            .map_err(|e| startup_error("discord client", e))?;
        let pipeline = Arc::new(
            Pipeline::new(probe, catalog.clone(), config.pipeline_settings(Kind::Discord))
        );
        pipeline.clone().start();
        monitors.push(pipeline as Arc<dyn PipelineMonitor>);
    }

    let monitors = web::Data::new(monitors);
    let relay = web::Data::new(RelayState {
        secret_token: config.secret_token.clone(),
        trust_forwarded_for: config.trust_forwarded_for,
        sender: Arc::new(
            VotifierClient::new(&config.votifier_service_name, config.votifier_timeout())
        ),
    });
    let vote_rate_limiter: web::Data<IpRateLimiter> = web::Data::new(
        IpRateLimiter::keyed(config.vote_quota())
    );

    let bind = format!("{}:{}", config.bind_address, config.port);
    info!("Starting vote relay on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(monitors.clone())
            .app_data(relay.clone())
            .app_data(vote_rate_limiter.clone())
            .configure(handlers::configure)
    })
        .bind(&bind)?
        .run().await
}

pub mod index;
pub mod vote;

use actix_web::web;
use governor::{ RateLimiter, clock::DefaultClock };
use governor::state::keyed::DefaultKeyedStateStore;
use std::net::IpAddr;

pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(vote::json_config())
        .route("/", web::get().to(index::index))
        .route("/vote/minecraft", web::post().to(vote::submit_votes));
}

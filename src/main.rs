mod access;
mod action;
mod config;
mod error;
mod flow;
mod media;
mod model;
mod registration;
mod search;
mod server;
mod session;
mod storage;
mod tg;

use crate::{
    access::AccessPolicy, config::Config, flow::Registrar, session::MemorySessions, storage::Storage,
};
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // без токена и с битым конфигом не стартуем
    let config = Config::from_env()?;
    let bot = Bot::new(&config.bot_token);

    let storage = Arc::new(Storage::new(&config.store_path).await?);
    let policy = Arc::new(AccessPolicy::load(config.admin_ids.iter().copied(), storage.clone()).await?);
    let sessions = Arc::new(MemorySessions::new(config.session_idle));
    let registrar = Registrar::new(sessions, storage.clone(), policy.clone(), config.order, config.allow_edit);

    let app = Arc::new(tg::App {
        registrar,
        catalog: storage,
        policy,
        settings: tg::Settings::from_config(&config),
        controls: tg::Controls::new(config.session_idle),
    });

    server::run(bot, app, &config).await
}

use crate::config::Config;
use crate::media::{is_image_path, telegram_file_url, ImageFetcher};
use crate::tg::{self, App};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use teloxide::{prelude::*, types::FileId, update_listeners::webhooks};
use tokio::net::TcpListener;

#[derive(Clone)]
struct HttpState {
    bot: Bot,
    fetcher: ImageFetcher,
}

#[derive(Debug, Deserialize)]
struct ThumbParams {
    file_id: String,
}

/// `GET /` и `GET /thumb?file_id=`. Webhook-маршрут добавляет teloxide.
fn router(bot: Bot, fetcher: ImageFetcher) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/thumb", get(thumb))
        .with_state(HttpState { bot, fetcher })
}

async fn liveness() -> &'static str {
    "Bot is running ✅"
}

/// Прокси постера для превью инлайн-результатов. Одна попытка, без ретраев.
async fn thumb(State(state): State<HttpState>, Query(params): Query<ThumbParams>) -> Response {
    let file = match state.bot.get_file(FileId(params.file_id)).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(error = %e, "thumb: unknown file");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    if !is_image_path(&file.path) {
        tracing::debug!(path = %file.path, "thumb: not an image file");
        return StatusCode::NOT_FOUND.into_response();
    }
    let url = telegram_file_url(state.bot.api_url().as_str(), state.bot.token(), &file.path);
    match state.fetcher.fetch_image(&url).await {
        Ok(image) => ([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "thumb: upstream fetch failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Поднимает HTTP и запускает диспетчер: webhook, если задан публичный адрес, иначе polling.
pub async fn run(bot: Bot, app: Arc<App>, config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let http = router(bot.clone(), ImageFetcher::new()?);
    let mut dispatcher = tg::dispatcher(bot.clone(), app);

    match config.webhook_url() {
        Some(url) => {
            let (listener, stop_flag, webhook) =
                webhooks::axum_to_router(bot, webhooks::Options::new(addr, url)).await?;
            let tcp = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "http server started, webhook mode");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, webhook.merge(http))
                    .with_graceful_shutdown(stop_flag)
                    .await
                {
                    tracing::error!(error = %e, "http server failed");
                }
            });
            dispatcher
                .dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("Webhook listener error"))
                .await;
        }
        None => {
            let tcp = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "http server started, long polling mode");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(tcp, http).await {
                    tracing::error!(error = %e, "http server failed");
                }
            });
            dispatcher.dispatch().await;
        }
    }
    Ok(())
}

//! Mini-app server: a static game page plus a health probe. The embedded
//! game talks back to the bot exclusively through Telegram's `sendData`, so
//! there are no API routes here.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::services::{ServeDir, ServeFile};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(super::health::health_check))
        .route_service("/game", ServeFile::new("public/game.html"))
        .fallback_service(ServeDir::new("public"))
}

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::body::Body;
use http::StatusCode;
use tower_http::trace::TraceLayer;
mod middleware;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bot;
mod config;
mod db;
mod error;
mod routes;
mod services;

use config::Config;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grow_spark_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Grow Spark bot");

    // Initialize database
    let pool = services::init::init_db(&config).await?;

    let state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
    });

    // Telegram bot: register the command list in the UI, then build the
    // long-polling dispatcher.
    let tg_bot = bot::create_bot(&config);
    if let Err(e) = bot::setup_bot_commands(&tg_bot).await {
        tracing::warn!("Failed to register bot commands: {}", e);
    }
    let mut dispatcher = bot::dispatcher(tg_bot, state.clone());

    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Rate limiter for the admin surface; it exposes a password form.
    let mut admin_builder = GovernorConfigBuilder::default();
    admin_builder.per_second(config.rate_limit.admin_per_second.into());
    admin_builder.burst_size(config.rate_limit.admin_burst);
    admin_builder.key_extractor(SmartIpKeyExtractor);
    admin_builder.error_handler(|error: GovernorError| -> http::Response<Body> {
        match error {
            GovernorError::TooManyRequests { wait_time, headers } => {
                let mut resp = http::Response::new(Body::from("Too many requests"));
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                if let Ok(v) = http::HeaderValue::from_str(&wait_time.to_string()) {
                    resp.headers_mut().insert(http::header::RETRY_AFTER, v);
                }
                resp
            }
            GovernorError::UnableToExtractKey => {
                let mut resp = http::Response::new(Body::from(
                    "Unable to determine client IP for rate limiting",
                ));
                *resp.status_mut() = StatusCode::BAD_REQUEST;
                resp
            }
            GovernorError::Other { code, msg, headers } => {
                let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
                let mut resp = http::Response::new(Body::from(body));
                *resp.status_mut() = StatusCode::from_u16(code.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if let Some(hmap) = headers {
                    for (name, value) in hmap.iter() {
                        resp.headers_mut().append(name.clone(), value.clone());
                    }
                }
                resp
            }
        }
    });

    let admin_gov_conf = Arc::new(
        admin_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build admin governor config"))?,
    );

    // Background cleanup for the limiter's per-IP storage.
    let admin_cleaner = {
        let limiter = admin_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Admin rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("admin rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let admin_rate_layer = GovernorLayer {
        config: admin_gov_conf.clone(),
    };

    // Admin dashboard on its own listener so it can be firewalled separately.
    let admin_app = routes::admin::router()
        .layer(admin_rate_layer)
        .with_state(state.clone())
        .layer(axum::middleware::from_fn(
            middleware::headers::security_headers,
        ))
        .layer(TraceLayer::new_for_http());

    // Mini-app server: static game page + health probe.
    let game_app = routes::game::router()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    let game_addr = format!("{}:{}", config.server.host, config.server.game_port);
    let admin_addr = format!("{}:{}", config.server.host, config.server.admin_port);

    let game_listener = tokio::net::TcpListener::bind(&game_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;

    tracing::info!("Mini app listening on {}", game_addr);
    tracing::info!("Admin dashboard listening on {}", admin_addr);

    let game_server = axum::serve(game_listener, game_app.into_make_service());
    let admin_server = axum::serve(
        admin_listener,
        admin_app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let signal_fut = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to bind SIGTERM");
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to bind Ctrl+C");
        }
    };

    tokio::select! {
        _ = dispatcher.dispatch() => {
            tracing::warn!("Bot dispatcher stopped");
        }
        res = game_server => {
            if let Err(e) = res {
                tracing::error!("Mini app server error: {}", e);
            }
        }
        res = admin_server => {
            if let Err(e) = res {
                tracing::error!("Admin server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Shutdown signal received");
        }
    }

    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = admin_cleaner.join() {
        tracing::warn!("Rate limiter cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

mod error;
mod routes;
mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use finscope_core::auth::AuthClient;
use finscope_core::config::Settings;
use finscope_core::llm::gateway::GatewayClient;
use finscope_core::llm::LlmClient;
use finscope_core::market::YahooQuoteClient;
use finscope_core::storage::object::{ObjectStore, SupabaseStorage};
use finscope_core::storage::PgStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

const RECEIPT_UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match finscope_core::storage::migrate(&pool).await {
                Ok(()) => Some(PgStore::new(pool)),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let llm = optional_service("AI gateway", GatewayClient::from_settings(&settings))
        .map(|c| Arc::new(c) as Arc<dyn LlmClient>);
    let objects = optional_service("receipt storage", SupabaseStorage::from_settings(&settings))
        .map(|s| Arc::new(s) as Arc<dyn ObjectStore>);
    let auth = optional_service("auth", AuthClient::from_settings(&settings));
    let quotes = Arc::new(YahooQuoteClient::from_settings(&settings)?);

    let state = AppState {
        store,
        llm,
        objects,
        auth,
        quotes,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/analyze", post(routes::analysis::analyze))
        .route("/analyses", get(routes::analysis::list_analyses))
        .route(
            "/receipts",
            post(routes::receipts::upload_receipts)
                .layer(DefaultBodyLimit::max(RECEIPT_UPLOAD_LIMIT_BYTES)),
        )
        .route("/receipts/extract", post(routes::receipts::extract_receipt))
        .route("/receipts/:id", delete(routes::receipts::remove_receipt))
        .route("/investments/compare", post(routes::market::compare))
        .route("/support/chat", post(routes::support::chat))
        .route("/market/quotes", post(routes::market::quotes))
        .route("/market/search", get(routes::market::search))
        .route(
            "/market/recommendations",
            get(routes::market::recommendations),
        )
        .route(
            "/portfolios",
            get(routes::trades::list_portfolios).put(routes::trades::upsert_portfolio),
        )
        .route("/portfolios/holdings", get(routes::trades::holdings))
        .route(
            "/trades",
            get(routes::trades::list_trades).post(routes::trades::create_trade),
        )
        .route("/trades/stats", get(routes::trades::trade_stats))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

fn optional_service<T>(name: &'static str, built: anyhow::Result<T>) -> Option<T> {
    match built {
        Ok(service) => Some(service),
        Err(e) => {
            tracing::error!(service = name, error = %e, "service unavailable; routes needing it will answer 503");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

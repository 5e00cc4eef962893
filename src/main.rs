use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod economy;
mod error;
mod handlers;
mod models;
mod scheduler;

use auth::rate_limit::RateLimitState;
use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twocups_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    let config = Arc::new(config);

    // Database
    let db = db::create_pool(&config.database_url).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let rate_limiter = RateLimitState::new();

    let state = AppState {
        db,
        config: config.clone(),
        rate_limiter,
    };

    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        // Couple pairing & settings
        .route("/api/couple", post(handlers::couples::create_couple))
        .route("/api/couple/join", post(handlers::couples::join_couple))
        .route("/api/couple", get(handlers::couples::get_couple))
        .route("/api/couple", put(handlers::couples::update_couple))
        // Attempts (the gem economy core)
        .route("/api/attempts", post(handlers::attempts::log_attempt))
        .route("/api/attempts", get(handlers::attempts::list_attempts))
        .route(
            "/api/attempts/:id/acknowledge",
            post(handlers::attempts::acknowledge_attempt),
        )
        .route(
            "/api/attempts/daily-info",
            get(handlers::attempts::daily_attempts_info),
        )
        .route(
            "/api/gems/daily",
            get(handlers::attempts::daily_gem_earnings),
        )
        // Requests
        .route("/api/requests", post(handlers::requests::create_request))
        .route("/api/requests", get(handlers::requests::list_requests))
        .route(
            "/api/requests/:id",
            delete(handlers::requests::cancel_request),
        )
        .route(
            "/api/requests/active-info",
            get(handlers::requests::active_requests_info),
        )
        // Suggestions
        .route(
            "/api/suggestions",
            post(handlers::suggestions::create_suggestion),
        )
        .route(
            "/api/suggestions",
            get(handlers::suggestions::list_suggestions),
        )
        .route(
            "/api/suggestions/:id",
            delete(handlers::suggestions::delete_suggestion),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = vec![config
            .frontend_url
            .parse::<axum::http::HeaderValue>()
            .unwrap()];
        // In dev, also allow LAN access (e.g. testing from another device)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    // Daily coal/diamond job
    scheduler::spawn_daily_scheduler(state.db.clone(), config.daily_job_hour_utc);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    // Use into_make_service_with_connect_info to provide client IP for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .unwrap();
}

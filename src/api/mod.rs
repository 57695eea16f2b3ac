use axum::{
    Router,
    http::{HeaderValue, StatusCode},
    middleware,
    response::Response,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::token::TokenService;

pub mod auth;
mod error;
pub mod stats;
pub mod users;
mod validation;

pub use error::ApiError;

pub struct AppState {
    pub store: Store,

    pub tokens: Arc<TokenService>,

    pub config: Arc<Config>,
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let secret = config.resolve_secret_key()?;

    let store = Store::with_pool_options(
        &config.general.database_path,
        config.security.clone(),
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let tokens = Arc::new(TokenService::new(
        &secret,
        config.auth.token_validity_days,
    ));

    Ok(Arc::new(AppState {
        store,
        tokens,
        config: Arc::new(config),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/{username}", get(users::get_user))
        .route("/users/{username}", patch(users::edit_user))
        .route("/users/{username}", delete(users::delete_user))
        .route("/users/{username}/stats", get(stats::get_stats))
        .route("/users/{username}/stats", patch(stats::edit_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .merge(api_router)
        .fallback(not_found)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> Response {
    error::error_response(StatusCode::NOT_FOUND, "Not Found")
}

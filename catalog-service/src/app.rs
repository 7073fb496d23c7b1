use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::Router;
use common_auth::TokenVerifier;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::metrics::ServiceMetrics;
use crate::movie_handlers::{create_movie, delete_movie, get_movie, list_movies, update_movie};
use crate::tokens::TokenSigner;
use crate::user_handlers::{get_me, login, register, update_profile};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub verifier: Arc<TokenVerifier>,
    pub signer: Arc<TokenSigner>,
    pub metrics: Arc<ServiceMetrics>,
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, StatusCode> {
    state.metrics.render().map_err(|err| {
        tracing::warn!(error = %err, "Unable to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:3001"),
            HeaderValue::from_static("http://localhost:5173"),
        ]))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/me", get(get_me))
        .route("/users", patch(update_profile))
        .route("/movies", post(create_movie).get(list_movies))
        .route(
            "/movies/:movie_id",
            get(get_movie).patch(update_movie).delete(delete_movie),
        )
        .with_state(state)
        .layer(cors)
}

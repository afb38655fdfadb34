pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod remote;
pub mod store;
pub mod sync;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use auth::Authenticator;
use db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub auth: Arc<Authenticator>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/todos",
            get(handlers::get_todos).put(handlers::put_todos),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
        .with_state(state)
}

use std::{net::Ipv4Addr, sync::Arc};

use tracing::info;

use tasksync::auth::{Authenticator, JwksVerifier};
use tasksync::{create_app, db, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("TASKSYNC_PORT")
        .expect("TASKSYNC_PORT to be set")
        .parse()
        .expect("port number");

    let db_path = std::env::var("TASKSYNC_DB").unwrap_or_else(|_| "todos.db".to_string());

    let auth_enabled = std::env::var("TASKSYNC_AUTH")
        .map(|value| value != "false")
        .unwrap_or(true);

    let auth = if auth_enabled {
        let domain = std::env::var("AUTH0_DOMAIN").expect("AUTH0_DOMAIN to be set");
        let audience = std::env::var("AUTH0_AUDIENCE").expect("AUTH0_AUDIENCE to be set");
        Authenticator::Jwks(JwksVerifier::new(&domain, &audience))
    } else {
        info!("authentication disabled, acting as fixed test subject");
        Authenticator::Bypass {
            subject: "test".to_string(),
        }
    };

    let db = db::init_db(&db_path).expect("initializing database");

    let state = AppState {
        db,
        auth: Arc::new(auth),
    };
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to port");

    info!("running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}

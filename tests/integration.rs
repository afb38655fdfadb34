use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::net::TcpListener;

use tasksync::auth::Authenticator;
use tasksync::mirror::MemoryMirror;
use tasksync::models::{Task, TaskStatus};
use tasksync::notify::LogNotifier;
use tasksync::remote::{CachedTokenSource, HttpRemote, Remote, TokenError, TokenSource};
use tasksync::store::Store;
use tasksync::{create_app, db, AppState};

const TEST_TOKEN: &str = "test-bearer-token";
const TEST_SUBJECT: &str = "auth0|user123";

struct TestServer {
    addr: String,
    client: Client,
}

impl TestServer {
    async fn new() -> Self {
        let db = db::init_db(":memory:").expect("in-memory database");
        let auth = Authenticator::Static {
            token: TEST_TOKEN.to_string(),
            subject: TEST_SUBJECT.to_string(),
        };

        let state = AppState {
            db,
            auth: Arc::new(auth),
        };
        let app = create_app(state);

        // Bind to random available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = format!("http://{}", listener.local_addr().unwrap());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::new();

        TestServer { addr, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

fn sample_list() -> Value {
    json!({
        "todoList": [
            {
                "id": "1",
                "title": "Buy milk",
                "status": "incomplete",
                "time": "2023-01-01T00:00:00Z",
                "comments": [
                    { "comment": "semi-skimmed", "time": "2023-01-02T00:00:00Z" }
                ]
            },
            {
                "id": "2",
                "title": "Fix bike",
                "status": "complete",
                "time": "2023-01-03T00:00:00Z"
            }
        ]
    })
}

#[tokio::test]
async fn request_without_token_is_rejected_before_any_write() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .put(server.url("/todos"))
        .json(&sample_list())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Unauthorized");

    // Nothing was persisted for the subject
    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn request_with_wrong_token_is_rejected() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth("some-other-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .get(server.url("/todos"))
        .header("Authorization", "NotBearer scheme")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_without_stored_record_is_not_found() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "No todo list found");
}

#[tokio::test]
async fn put_then_get_round_trips_the_record() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&sample_list())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let saved: Value = resp.json().await.unwrap();
    assert_eq!(saved["id"], TEST_SUBJECT);
    assert_eq!(saved["todoList"], sample_list()["todoList"]);
    let created_at = saved["created_at"].as_str().unwrap();
    let updated = saved["updated"].as_str().unwrap();
    assert!(OffsetDateTime::parse(created_at, &Rfc3339).is_ok());
    assert!(OffsetDateTime::parse(updated, &Rfc3339).is_ok());

    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Value = resp.json().await.unwrap();
    assert_eq!(fetched, saved);
}

#[tokio::test]
async fn overwrite_preserves_created_at() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&sample_list())
        .send()
        .await
        .unwrap();
    let first: Value = resp.json().await.unwrap();

    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "todoList": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let second: Value = resp.json().await.unwrap();

    assert_eq!(second["created_at"], first["created_at"]);
    assert_eq!(second["todoList"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn put_without_body_is_a_bad_request() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn put_with_malformed_shape_is_a_bad_request() {
    let server = TestServer::new().await;

    // missing required task fields
    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "todoList": [ { "id": "1" } ] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // status outside the two allowed values
    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({
            "todoList": [
                { "id": "1", "title": "x", "status": "done", "time": "2023-01-01T00:00:00Z" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // list is not a list
    let resp = server
        .client
        .put(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({ "todoList": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // nothing landed
    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_permissive_cors_headers() {
    let server = TestServer::new().await;

    let resp = server
        .client
        .get(server.url("/todos"))
        .bearer_auth(TEST_TOKEN)
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );

    // preflight for the cross-origin PUT
    let resp = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/todos"))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "PUT")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("access-control-allow-methods"));
}

struct StaticTokens;

#[async_trait]
impl TokenSource for StaticTokens {
    async fn token(&self) -> Result<String, TokenError> {
        Ok(TEST_TOKEN.to_string())
    }
}

struct WrongTokens;

#[async_trait]
impl TokenSource for WrongTokens {
    async fn token(&self) -> Result<String, TokenError> {
        Ok("stale-or-forged".to_string())
    }
}

fn sample_task() -> Task {
    Task {
        id: "1".to_string(),
        title: "Buy milk".to_string(),
        status: TaskStatus::Incomplete,
        time: "2023-01-01T00:00:00Z".to_string(),
        comments: None,
    }
}

#[tokio::test]
async fn store_syncs_against_a_live_server() {
    let server = TestServer::new().await;
    let remote = Arc::new(HttpRemote::new(&server.addr, Arc::new(StaticTokens)));

    let store = Store::new(
        Arc::new(MemoryMirror::new()),
        Arc::clone(&remote) as Arc<dyn Remote>,
        Arc::new(LogNotifier),
    );

    // brand-new subject: no record yet, which is a state, not an error
    store.load_initial_list().await.unwrap();
    assert!(store.todo_list().is_none());
    assert!(store.initial_load_complete());

    store.add_task(TEST_SUBJECT, sample_task()).unwrap();
    store.syncer().wait_idle().await;

    let fetched = remote.get_list().await.unwrap();
    assert_eq!(fetched, Some(vec![sample_task()]));
}

#[tokio::test]
async fn remote_classifies_auth_failures_as_errors() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(&server.addr, Arc::new(WrongTokens));

    assert!(remote.get_list().await.is_err());
    assert!(remote.put_list(&[sample_task()]).await.is_err());
}

struct CountingTokens {
    exp: u64,
    calls: Mutex<u32>,
}

impl CountingTokens {
    fn new(exp: u64) -> Self {
        CountingTokens {
            exp,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TokenSource for CountingTokens {
    async fn token(&self) -> Result<String, TokenError> {
        *self.calls.lock().unwrap() += 1;
        let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": self.exp }).to_string());
        Ok(format!("header.{payload}.signature"))
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn unexpired_token_is_fetched_once() {
    let source = Arc::new(CountingTokens::new(unix_now() + 3600));
    let cached = CachedTokenSource::new(Arc::clone(&source) as Arc<dyn TokenSource>);

    let first = cached.token().await.unwrap();
    let second = cached.token().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(*source.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn expired_token_is_fetched_again() {
    let source = Arc::new(CountingTokens::new(unix_now().saturating_sub(3600)));
    let cached = CachedTokenSource::new(Arc::clone(&source) as Arc<dyn TokenSource>);

    cached.token().await.unwrap();
    cached.token().await.unwrap();

    assert_eq!(*source.calls.lock().unwrap(), 2);
}

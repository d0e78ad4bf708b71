#![allow(dead_code)]

use reqwest::{multipart, Client};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Once,
};
use uuid::Uuid;
use water_talk::{
    backend::{LocalObjectStorage, MemoryRowStore, TokenAuthProvider},
    config::jwt::JwtConfig,
    models::UserModel,
    AppState,
};

static INIT: Once = Once::new();
static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Mumbai, the default map center area.
pub const MUMBAI: (f64, f64) = (19.0760, 72.8777);

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        std::env::set_var("RATE_LIMIT_ENABLED", "false");
        std::env::set_var("ENABLE_HSTS", "false");
    });
}

pub struct TestApp {
    pub addr: String,
    pub state: AppState,
    pub upload_dir: PathBuf,
    pub client: Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }
}

pub async fn spawn_app() -> TestApp {
    init_env();

    let upload_dir = std::env::temp_dir().join(format!("water-talk-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

    let jwt = JwtConfig {
        secret: "integration_test_secret_that_is_at_least_32_characters_long".to_string(),
        access_token_expiry: 900,
    };
    let store = Arc::new(MemoryRowStore::new());
    let storage = Arc::new(LocalObjectStorage::new(&upload_dir, "/uploads"));
    let auth = Arc::new(TokenAuthProvider::new(store.clone(), jwt).with_hash_cost(4));

    let state = AppState::new(store, storage, auth);
    state.spawn_session_watcher();

    let app = axum::Router::new()
        .route("/", axum::routing::get(|| async { "ok" }))
        .merge(water_talk::routes::create_routes())
        .nest_service("/uploads", tower_http::services::ServeDir::new(&upload_dir))
        .layer(axum::middleware::from_fn(
            water_talk::middleware::security::security_headers_middleware,
        ))
        .layer(axum::extract::Extension(state.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        state,
        upload_dir,
        client: Client::new(),
    }
}

fn unique_email(prefix: &str) -> String {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}_{}_{}@test.org", prefix, counter, Uuid::new_v4().simple())
}

/// Sign up and return (user_id, token).
async fn signup(app: &TestApp, body: Value) -> (Uuid, String) {
    let resp = app
        .client
        .post(app.url("/auth/signup"))
        .json(&body)
        .send()
        .await
        .expect("Failed to sign up");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Signup response is not JSON");
    assert!(
        body["success"].as_bool().unwrap_or(false),
        "Signup failed: status={}, body={}",
        status,
        body
    );

    let user_id = body["data"]["user"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .unwrap_or_else(|| panic!("Response missing user id: {}", body));
    let token = body["data"]["token"]
        .as_str()
        .unwrap_or_else(|| panic!("Response missing token: {}", body))
        .to_string();
    (user_id, token)
}

pub async fn create_citizen(app: &TestApp) -> (Uuid, String) {
    signup(
        app,
        serde_json::json!({
            "full_name": "Test Citizen",
            "email": unique_email("citizen"),
            "password": "test_password_123",
            "confirm_password": "test_password_123",
            "role": "citizen",
        }),
    )
    .await
}

pub async fn create_ngo(app: &TestApp, name: &str, location: Option<(f64, f64)>) -> (Uuid, String) {
    let Some((lat, lng)) = location else {
        return create_ngo_without_location(app, name).await;
    };
    signup(
        app,
        serde_json::json!({
            "full_name": name,
            "email": unique_email("ngo"),
            "password": "test_password_123",
            "confirm_password": "test_password_123",
            "role": "ngo",
            "latitude": lat,
            "longitude": lng,
            "operation_area": "Thane",
        }),
    )
    .await
}

/// The signup form insists on a location for NGOs; older profiles may lack one.
async fn create_ngo_without_location(app: &TestApp, name: &str) -> (Uuid, String) {
    let session = app
        .state
        .auth
        .sign_up(&unique_email("ngo"), "test_password_123")
        .await
        .expect("Failed to create identity");
    app.state
        .store
        .insert_profile(UserModel {
            id: session.user_id,
            full_name: name.to_string(),
            email: session.email.clone(),
            role: "ngo".to_string(),
            latitude: None,
            longitude: None,
            operation_area: Some("Thane".to_string()),
            created_at: chrono::Utc::now().naive_utc(),
        })
        .await
        .expect("Failed to insert profile");
    (session.user_id, session.access_token)
}

/// Minimal baseline JPEG header: SOI followed by a SOF0 segment.
pub fn jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08];
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Minimal PNG: signature plus an IHDR chunk carrying the dimensions.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 2, 0, 0, 0, 0, 0, 0, 0]);
    data
}

pub fn image_part(data: Vec<u8>, mime: &str, file_name: &str) -> multipart::Part {
    multipart::Part::bytes(data)
        .file_name(file_name.to_string())
        .mime_str(mime)
        .expect("valid mime type")
}

pub fn complaint_form(
    description: &str,
    location: Option<(f64, f64)>,
    image: Option<multipart::Part>,
) -> multipart::Form {
    let mut form = multipart::Form::new().text("description", description.to_string());
    if let Some((lat, lng)) = location {
        form = form
            .text("latitude", lat.to_string())
            .text("longitude", lng.to_string());
    }
    if let Some(image) = image {
        form = form.part("image", image);
    }
    form
}

/// File a complaint and return the response body.
pub async fn submit_complaint(
    app: &TestApp,
    token: &str,
    form: multipart::Form,
) -> (reqwest::StatusCode, Value) {
    let resp = app
        .client
        .post(app.url("/complaints"))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to submit complaint");
    let status = resp.status();
    let body: Value = resp.json().await.expect("Response is not JSON");
    (status, body)
}

pub async fn post_empty(app: &TestApp, token: &str, path: &str) -> (reqwest::StatusCode, Value) {
    let resp = app
        .client
        .post(app.url(path))
        .bearer_auth(token)
        .send()
        .await
        .expect("Request failed");
    let status = resp.status();
    let body: Value = resp.json().await.expect("Response is not JSON");
    (status, body)
}

pub async fn get_json(app: &TestApp, token: &str, path: &str) -> (reqwest::StatusCode, Value) {
    let resp = app
        .client
        .get(app.url(path))
        .bearer_auth(token)
        .send()
        .await
        .expect("Request failed");
    let status = resp.status();
    let body: Value = resp.json().await.expect("Response is not JSON");
    (status, body)
}

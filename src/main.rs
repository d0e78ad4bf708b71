use axum::{extract::Extension, middleware, response::IntoResponse, routing::get, Json, Router};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use water_talk::{
    backend::{
        AuthProvider, LocalObjectStorage, MemoryRowStore, ObjectStorage, PgRowStore, RowStore,
        TokenAuthProvider,
    },
    config::{
        self,
        app::{AppConfig, LogFormat, StoreBackend},
    },
    migration, routes, AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Auth routes
        water_talk::handlers::auth::signup,
        water_talk::handlers::auth::login,
        water_talk::handlers::auth::logout,
        water_talk::handlers::auth::me,
        // Complaint routes
        water_talk::handlers::complaint::submit_complaint,
        water_talk::handlers::complaint::list_complaints,
        water_talk::handlers::complaint::my_complaints,
        water_talk::handlers::complaint::nearby_complaints,
        water_talk::handlers::complaint::get_complaint,
        water_talk::handlers::complaint::accept_complaint,
        water_talk::handlers::complaint::upload_completion,
        water_talk::handlers::complaint::approve_completion,
        // Map
        water_talk::handlers::map::map_markers,
        // Uploads
        water_talk::handlers::upload::preview_image,
    ),
    components(
        schemas(
            water_talk::response::ApiResponse<serde_json::Value>,
            water_talk::response::PaginatedResponse<serde_json::Value>,
            water_talk::error::AppError,
            // Auth
            water_talk::services::auth::SignupRequest,
            water_talk::services::auth::LoginRequest,
            water_talk::handlers::auth::SessionResponse,
            water_talk::handlers::auth::UserResponse,
            water_talk::models::Role,
            // Complaints
            water_talk::models::Complaint,
            water_talk::models::ComplaintStatus,
            water_talk::services::complaint::NearbyComplaint,
            water_talk::handlers::complaint::ComplaintForm,
            water_talk::utils::geo::Coordinates,
            // Map
            water_talk::services::map::MapView,
            water_talk::services::map::MapMarker,
            water_talk::services::map::MarkerIcon,
            water_talk::services::map::MarkerAction,
            water_talk::services::map::MarkerPopup,
            // Uploads
            water_talk::handlers::upload::ImageForm,
            water_talk::utils::image::ImagePreview,
        )
    ),
    tags(
        (name = "auth", description = "Signup, login and sessions"),
        (name = "complaints", description = "Filing and handling pollution complaints"),
        (name = "map", description = "Map markers"),
        (name = "uploads", description = "Image checks"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Validate configuration before doing anything else
    let app_config = AppConfig::from_env()?;
    let jwt_config = config::jwt::JwtConfig::from_env()?;

    init_tracing(app_config.log_format);
    tracing::info!("Starting Water Talk API v{}...", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&app_config.upload_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create upload directory '{}': {}",
            app_config.upload_dir,
            e
        )
    })?;

    let store: Arc<dyn RowStore> = match &app_config.store {
        StoreBackend::Postgres { database_url } => {
            let db = config::database::get_database(database_url).await?;
            tracing::info!("Database connected successfully");

            migration::Migrator::up(&db, None).await?;
            tracing::info!("Database migrations applied successfully");

            Arc::new(PgRowStore::new(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory row store, data is lost on restart");
            Arc::new(MemoryRowStore::new())
        }
    };

    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(
        &app_config.upload_dir,
        app_config.public_base_url.clone(),
    ));
    let auth: Arc<dyn AuthProvider> = Arc::new(TokenAuthProvider::new(store.clone(), jwt_config));

    let state = AppState::new(store, storage, auth)
        .with_nearby_radius(app_config.nearby_default_radius_km);
    let _session_watcher = state.spawn_session_watcher();

    let app = create_app(&app_config.upload_dir).layer(Extension(state));

    let addr = app_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "water_talk=debug,tower_http=debug,axum=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        // Cookie sessions need credentials, which a wildcard origin forbids.
        cors.allow_origin(origins).allow_credentials(true)
    }
}

fn create_app(upload_dir: &str) -> Router {
    Router::new()
        .route("/", get(health_check))
        .merge(routes::create_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(middleware::from_fn(
            water_talk::middleware::security::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let store_ok = state.store.ping().await;
    let status = if store_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Water Talk API",
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_ok,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}

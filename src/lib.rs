use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod repository;
pub mod storage;

// Routing segregation (Public, Authenticated, Admin) — the authorization
// table, expressed as modules.
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes the state types easily accessible to main.rs and the tests.
pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3CoverStorage, StorageState};

/// ApiDoc
///
/// Auto-generates the OpenAPI document for the storefront. Aggregates every
/// route decorated with `#[utoipa::path]` and the schemas used in their
/// bodies; the JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home, handlers::show_products, handlers::books_by_category,
        handlers::search_books, handlers::book_detail, handlers::about_page,
        handlers::contact_page, handlers::register_page, handlers::register_user,
        handlers::login_page, handlers::login, handlers::logout, handlers::get_me,
        handlers::view_cart, handlers::add_to_cart, handlers::update_cart_item,
        handlers::remove_cart_item, handlers::checkout, handlers::get_admin_stats,
        handlers::get_admin_books, handlers::create_book, handlers::update_book,
        handlers::delete_book, handlers::create_category, handlers::delete_category,
        handlers::presign_cover_upload
    ),
    components(
        schemas(
            models::Book, models::Category, models::CartLine, models::HomeView,
            models::CatalogView, models::StaticPageView, models::CartView,
            models::SessionProfile, models::AdminDashboardStats,
            models::RegisterRequest, models::LoginRequest, models::CreateBookRequest,
            models::UpdateBookRequest, models::CreateCategoryRequest,
            models::UpdateCartItemRequest,
            models::PresignedUrlRequest, models::PresignedUrlResponse,
            pagination::Page<models::Book>,
        )
    ),
    tags(
        (name = "devbooks", description = "devbooks storefront API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding all application
/// services and configuration, shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository layer: the catalog, users and carts behind a trait object.
    pub repo: RepositoryState,
    /// Storage layer: cover-image bucket access and presigned uploads.
    pub storage: StorageState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors pull individual components out of the shared AppState. The
// AuthUser extractor, for instance, needs only the repository and config.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated routes. `AuthUser` implements
/// `FromRequestParts`, so if session validation fails the extractor rejects
/// the request with 401 before the handler runs; on success the request
/// simply proceeds.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// require_admin
///
/// Gate for the `/admin` nest: authentication (via the extractor, 401 when
/// absent) plus the role check (403 for anyone who is not an admin). Putting
/// the check on the layer rather than in each handler keeps the rule table
/// in one place.
async fn require_admin(auth_user: AuthUser, request: Request, next: Next) -> Response {
    if auth_user.role != "admin" {
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies the authorization layers per
/// route module, and registers the shared state. The merge order mirrors the
/// authorization table: explicit public rules, then session-gated rules,
/// then the role-gated admin nest, then the default-deny fallback.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS configuration.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name used for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base router assembly.
    let base_router = Router::new()
        // Documentation: the generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: no middleware.
        .merge(public::public_routes())
        // Authenticated routes: behind the session gate.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Admin routes: nested under /admin, behind the role gate.
        .nest(
            "/admin",
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), require_admin)),
        )
        // Everything else: authenticated or nothing (default-deny tail of
        // the rule table).
        .fallback(handlers::default_deny)
        // Apply the unified state to all routes.
        .with_state(state);

    // 3. Observability and correlation layers (outermost).
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: one span per request/response cycle,
                // tagged with the generated id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS layer.
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: pulls the `x-request-id` header into the
/// span so every log line of a request shares the same correlation id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

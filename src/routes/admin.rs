use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Routes nested under `/admin`, restricted to the 'admin' role. The nest is
/// wrapped in the admin layer (authentication plus role check) in
/// `create_router`, so no anonymous or customer request reaches a handler
/// here: missing session is a 401, wrong role a 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Dashboard counters (books, categories, users, open carts).
        .route("/stats", get(handlers::get_admin_stats))
        // GET+POST /admin/books
        // The full catalog, including out-of-stock titles, and book creation.
        .route(
            "/books",
            get(handlers::get_admin_books).post(handlers::create_book),
        )
        // PUT+DELETE /admin/books/{id}
        // Partial update and removal of a title.
        .route(
            "/books/{id}",
            put(handlers::update_book).delete(handlers::delete_book),
        )
        // POST /admin/categories, DELETE /admin/categories/{id}
        // Category management.
        .route("/categories", post(handlers::create_category))
        .route("/categories/{id}", delete(handlers::delete_category))
        // POST /admin/covers/presigned
        // Mints a short-lived direct-upload URL for a cover image.
        .route("/covers/presigned", post(handlers::presign_cover_upload))
}

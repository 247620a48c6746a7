use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Every route an anonymous visitor may hit: the storefront pages, the
/// account gateways, and the cart. This module is the "permit all" section
/// of the authorization table.
///
/// The cart is deliberately public — visitors build a cart before they log
/// in, and the pre-auth cart is merged into their account cart at login.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET / and /home
        // The storefront home page: newest arrivals, best sellers, categories.
        .route("/", get(handlers::home))
        .route("/home", get(handlers::home))
        // GET /products?page=N
        // The paginated catalog, 12 titles per page.
        .route("/products", get(handlers::show_products))
        // GET /category/{id}?page=N
        // The catalog restricted to one category.
        .route("/category/{id}", get(handlers::books_by_category))
        // GET /search?keyword=...&page=N
        // Keyword search across title, author and description.
        .route("/search", get(handlers::search_books))
        // GET /book/{id}
        // A single book's detail page. Unknown ids are a clean 404.
        .route("/book/{id}", get(handlers::book_detail))
        // GET /about and /contact
        // Static information pages.
        .route("/about", get(handlers::about_page))
        .route("/contact", get(handlers::contact_page))
        // GET+POST /register
        // The registration page and the account-creation action.
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register_user),
        )
        // GET+POST /login
        // The login page and the credential check. Success sets the session
        // cookie and merges any pre-auth cart into the user's cart.
        .route("/login", get(handlers::login_page).post(handlers::login))
        // POST /logout
        // Clears the session cookie and redirects home.
        .route("/logout", post(handlers::logout))
        // Cart operations, all public (see module docs).
        .route("/cart", get(handlers::view_cart))
        .route("/cart/add/{book_id}", post(handlers::add_to_cart))
        .route("/cart/update/{book_id}", post(handlers::update_cart_item))
        .route("/cart/remove/{book_id}", post(handlers::remove_cart_item))
}

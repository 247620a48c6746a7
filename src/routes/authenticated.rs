use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes requiring a valid session, enforced by the auth middleware layered
/// on top of this router when it is merged. Handlers here receive a resolved
/// `AuthUser` and act on that identity.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /checkout
        // Consumes the user's cart: stock down, sold counts up, cart cleared.
        // The example of the authorization table's default-deny tail: not in
        // the public list, so a session is required.
        .route("/checkout", post(handlers::checkout))
        // GET /me
        // The authenticated user's profile and role.
        .route("/me", get(handlers::get_me))
}

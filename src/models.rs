use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pagination::Page;

// --- Core Catalog Schemas (Mapped to Database) ---

/// Book
///
/// Represents a title in the `books` table. This is the primary record the
/// storefront displays: listings, category pages, search results, and the
/// detail page all render projections of this struct.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Book {
    pub id: Uuid,
    // FK to categories.id.
    pub category_id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,

    /// Unit price in cents. Stored as an integer to avoid floating point
    /// rounding in cart totals.
    pub price_cents: i64,

    /// Object-storage key of the cover image (uploaded via the presigned
    /// cover pipeline by an administrator).
    pub cover_image: String,

    pub stock: i32,
    /// Cumulative units sold. Drives the "top selling" shelf on the home page.
    pub sold_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category
///
/// A browsable shelf in the `categories` table. The category list appears in
/// the navigation of every catalog view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// User
///
/// An account record from the `users` table. The credential fields are never
/// serialized into responses; only the identity and role leave the server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,

    // Salted digest of the password. Kept out of every JSON payload.
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,

    // The RBAC field: 'customer' or 'admin'.
    pub role: String,

    pub created_at: DateTime<Utc>,
}

/// CartItem
///
/// One line of a cart in the `cart_items` table. `owner_id` is either a user
/// id (logged-in cart) or an anonymous cart id issued as a cookie before
/// login. The composite key (owner_id, book_id) makes additions idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct CartItem {
    pub owner_id: Uuid,
    pub book_id: Uuid,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

/// CartLine
///
/// A cart line joined with its book, ready for display. Produced by the
/// repository so the handler never re-fetches books one by one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct CartLine {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub cover_image: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub line_total_cents: i64,
}

// --- View Models (Output Schemas) ---
//
// These mirror the attribute sets the storefront pages are assembled from.
// Template rendering itself is out of scope; each route returns the complete
// view model for its page.

/// HomeView
///
/// The home page: newest arrivals, best sellers, and the category navigation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct HomeView {
    pub newest_books: Vec<Book>,
    pub top_selling_books: Vec<Book>,
    pub categories: Vec<Category>,
    /// Marks the active navigation entry ("home", "products", ...).
    pub active_page: String,
}

/// CatalogView
///
/// Shared view model for `/products`, `/category/{id}` and `/search`. The
/// three routes differ only in how the book page was selected, which is
/// reflected in `active_category` and `search_keyword`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CatalogView {
    pub books: Page<Book>,
    pub categories: Vec<Category>,
    /// Zero-based index of the page being displayed.
    pub current_page: i64,
    /// Ordered 1..N page links; empty when there are no results.
    pub page_numbers: Vec<i64>,
    pub active_category: Option<Uuid>,
    pub search_keyword: Option<String>,
    pub active_page: String,
}

/// StaticPageView
///
/// View model for pages with no dynamic data (about, contact, login,
/// register). Carries only the navigation marker.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct StaticPageView {
    pub active_page: String,
}

/// CartView
///
/// The cart page: joined lines plus precomputed totals.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total_items: i64,
    pub total_cents: i64,
}

/// SessionProfile
///
/// The authenticated user's public identity, returned by `/me` and on a
/// successful login. Deliberately excludes the credential fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct SessionProfile {
    pub id: Uuid,
    pub username: String,
    pub role: String,
}

/// AdminDashboardStats
///
/// Counters for the administration dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct AdminDashboardStats {
    pub total_books: i64,
    pub total_categories: i64,
    pub total_users: i64,
    /// Number of carts (anonymous or user-owned) with at least one line.
    pub open_carts: i64,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input for POST /register. The password is hashed before it ever reaches
/// the repository; the clear text is never persisted or logged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// LoginRequest
///
/// Input for POST /login, the form-login replacement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// CreateBookRequest
///
/// Admin payload for adding a title to the catalog. The cover image key is
/// provided after the presigned upload completes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub description: String,
    pub price_cents: i64,
    pub category_id: Uuid,
    pub cover_image_key: String,
    pub stock: i32,
}

/// UpdateBookRequest
///
/// Partial update payload for PUT /admin/books/{id}. All fields are
/// `Option<T>`; only provided fields are written (COALESCE semantics in the
/// Postgres repository).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateBookRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i32>,
}

/// CreateCategoryRequest
///
/// Admin payload for adding a category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: String,
}

/// UpdateCartItemRequest
///
/// Body for POST /cart/update/{book_id}. A quantity of zero removes the line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

/// PresignedUrlRequest
///
/// Admin input for requesting a short-lived cover upload URL
/// (POST /admin/covers/presigned).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Default)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "cover.jpg")]
    pub filename: String,
    /// The MIME type, used to constrain the upload to the allowed type.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

/// PresignedUrlResponse
///
/// The temporary upload URL plus the object key to store on the book record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    pub resource_key: String,
}

use crate::{
    AppState,
    auth::{self, AuthUser, CartOwner},
    repository::{CategoryDelete, MAX_LINE_QUANTITY},
    models::{
        AdminDashboardStats, Book, CartView, CatalogView, Category,
        CreateBookRequest, CreateCategoryRequest, HomeView, LoginRequest, PresignedUrlRequest,
        PresignedUrlResponse, RegisterRequest, SessionProfile, StaticPageView, UpdateBookRequest,
        UpdateCartItemRequest, User,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

/// Books shown on each home page shelf (newest arrivals, best sellers).
const HOME_SHELF_SIZE: i64 = 8;

// --- Query Parameter Structs ---

/// PageQuery
///
/// The `?page=` parameter shared by the catalog listing routes. Zero-based,
/// defaulting to the first page.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// SearchQuery
///
/// Parameters for GET /search. The keyword is mandatory; a request without
/// it is rejected by the extractor with a client error.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SearchQuery {
    pub keyword: String,
    pub page: Option<i64>,
}

/// AddCartQuery
///
/// Optional `?quantity=` for POST /cart/add/{book_id}; one unit when absent.
/// A query parameter rather than a body so the storefront's plain form
/// button needs no payload.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AddCartQuery {
    pub quantity: Option<i32>,
}

// --- Storefront Handlers ---

/// home
///
/// [Public Route] The storefront home page: newest arrivals, best sellers,
/// and the category navigation. Served at both `/` and `/home`.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Home page view model", body = HomeView))
)]
pub async fn home(State(state): State<AppState>) -> Json<HomeView> {
    let newest_books = state.repo.get_newest_books(HOME_SHELF_SIZE).await;
    let top_selling_books = state.repo.get_top_selling_books(HOME_SHELF_SIZE).await;
    let categories = state.repo.get_categories().await;

    Json(HomeView {
        newest_books,
        top_selling_books,
        categories,
        active_page: "home".to_string(),
    })
}

/// show_products
///
/// [Public Route] The paginated catalog (12 titles per page). The page-number
/// list is 1..N for display as page links, empty when there are no results.
#[utoipa::path(
    get,
    path = "/products",
    params(PageQuery),
    responses((status = 200, description = "Catalog page", body = CatalogView))
)]
pub async fn show_products(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<CatalogView> {
    let page = query.page.unwrap_or(0).max(0);
    let books = state.repo.get_books(page).await;
    let categories = state.repo.get_categories().await;

    Json(CatalogView {
        page_numbers: books.page_numbers(),
        books,
        categories,
        current_page: page,
        active_category: None,
        search_keyword: None,
        active_page: "products".to_string(),
    })
}

/// books_by_category
///
/// [Public Route] The catalog filtered to one category. An unknown category
/// renders an empty page rather than an error, matching the listing routes'
/// degrade-to-empty behavior.
#[utoipa::path(
    get,
    path = "/category/{id}",
    params(("id" = Uuid, Path, description = "Category ID"), PageQuery),
    responses((status = 200, description = "Catalog page for the category", body = CatalogView))
)]
pub async fn books_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Json<CatalogView> {
    let page = query.page.unwrap_or(0).max(0);
    let books = state.repo.get_books_by_category(category_id, page).await;
    let categories = state.repo.get_categories().await;

    Json(CatalogView {
        page_numbers: books.page_numbers(),
        books,
        categories,
        current_page: page,
        active_category: Some(category_id),
        search_keyword: None,
        active_page: "products".to_string(),
    })
}

/// search_books
///
/// [Public Route] Keyword search over title, author and description,
/// case-insensitive, paginated like the catalog. The keyword is echoed back
/// so the page can repopulate its search box.
#[utoipa::path(
    get,
    path = "/search",
    params(SearchQuery),
    responses((status = 200, description = "Search results page", body = CatalogView))
)]
pub async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<CatalogView> {
    let page = query.page.unwrap_or(0).max(0);
    let books = state.repo.search_books(&query.keyword, page).await;
    let categories = state.repo.get_categories().await;

    Json(CatalogView {
        page_numbers: books.page_numbers(),
        books,
        categories,
        current_page: page,
        active_category: None,
        search_keyword: Some(query.keyword),
        active_page: "products".to_string(),
    })
}

/// book_detail
///
/// [Public Route] A single book's detail page. A missing id surfaces as a
/// client-visible 404, never a server crash.
#[utoipa::path(
    get,
    path = "/book/{id}",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book detail", body = Book),
        (status = 404, description = "No such book")
    )
)]
pub async fn book_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Book>, StatusCode> {
    match state.repo.get_book(id).await {
        Some(book) => Ok(Json(book)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// about_page
///
/// [Public Route] The static "about us" page.
#[utoipa::path(
    get,
    path = "/about",
    responses((status = 200, description = "About page", body = StaticPageView))
)]
pub async fn about_page() -> Json<StaticPageView> {
    Json(StaticPageView {
        active_page: "about".to_string(),
    })
}

/// contact_page
///
/// [Public Route] The static contact page.
#[utoipa::path(
    get,
    path = "/contact",
    responses((status = 200, description = "Contact page", body = StaticPageView))
)]
pub async fn contact_page() -> Json<StaticPageView> {
    Json(StaticPageView {
        active_page: "contact".to_string(),
    })
}

// --- Account Handlers ---

/// register_page
///
/// [Public Route] The registration form's view model.
#[utoipa::path(
    get,
    path = "/register",
    responses((status = 200, description = "Registration page", body = StaticPageView))
)]
pub async fn register_page() -> Json<StaticPageView> {
    Json(StaticPageView {
        active_page: "register".to_string(),
    })
}

/// register_user
///
/// [Public Route] Creates a customer account. The password is salted and
/// hashed here; the clear text never reaches the repository or the logs.
/// A taken username is a 409, blank credentials a 400.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionProfile),
        (status = 400, description = "Blank username or password"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionProfile>), StatusCode> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let salt = auth::generate_salt();
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: payload.email.trim().to_string(),
        password_hash: auth::hash_password(&payload.password, &salt),
        salt,
        role: "customer".to_string(),
        created_at: Utc::now(),
    };

    match state.repo.create_user(user).await {
        Some(created) => Ok((
            StatusCode::CREATED,
            Json(SessionProfile {
                id: created.id,
                username: created.username,
                role: created.role,
            }),
        )),
        None => Err(StatusCode::CONFLICT),
    }
}

/// login_page
///
/// [Public Route] The login form's view model.
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Login page", body = StaticPageView))
)]
pub async fn login_page() -> Json<StaticPageView> {
    Json(StaticPageView {
        active_page: "login".to_string(),
    })
}

/// login
///
/// [Public Route] Username/password authentication. On success:
/// 1. any pre-auth cart the visitor built anonymously is merged into the
///    user's cart, summing quantities where both hold the same book;
/// 2. a signed session cookie is set and the anonymous cart cookie cleared.
///
/// Bad credentials are a 401 with no hint about which field was wrong.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionProfile),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    cart: CartOwner,
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, StatusCode> {
    let user = state
        .repo
        .get_user_by_username(payload.username.trim())
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !auth::verify_password(&payload.password, &user.salt, &user.password_hash) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    // The cart built before logging in follows the user into their account.
    if let CartOwner {
        id: Some(guest_cart),
        is_session: false,
    } = cart
    {
        state.repo.merge_carts(guest_cart, user.id).await;
    }

    let token = auth::issue_session_token(user.id, &state.config.session_secret);
    let headers = AppendHeaders([
        (SET_COOKIE, auth::session_cookie(&token, &state.config.env)),
        (SET_COOKIE, auth::clear_cart_cookie()),
    ]);

    Ok((
        headers,
        Json(SessionProfile {
            id: user.id,
            username: user.username,
            role: user.role,
        }),
    )
        .into_response())
}

/// logout
///
/// [Public Route] Clears the session cookie and redirects to the home page.
/// Idempotent: logging out without a session is still a redirect home.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 303, description = "Session cleared, redirected home"))
)]
pub async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, auth::clear_session_cookie())]),
        Redirect::to("/"),
    )
}

/// get_me
///
/// [Authenticated Route] The session's profile, as resolved by the AuthUser
/// extractor.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = SessionProfile))
)]
pub async fn get_me(AuthUser { id, username, role }: AuthUser) -> Json<SessionProfile> {
    Json(SessionProfile { id, username, role })
}

// --- Cart Handlers ---
//
// Cart routes are public: anonymous visitors build a cart under a cookie id
// before they ever log in.

/// view_cart
///
/// [Public Route] The cart page for whoever owns the current cart — the
/// logged-in user, or the anonymous cart cookie. No cart yet means an empty
/// view, not an error.
#[utoipa::path(
    get,
    path = "/cart",
    responses((status = 200, description = "Cart contents", body = CartView))
)]
pub async fn view_cart(owner: CartOwner, State(state): State<AppState>) -> Json<CartView> {
    let lines = match owner.id {
        Some(id) => state.repo.get_cart(id).await,
        None => Vec::new(),
    };

    let total_items = lines.iter().map(|l| l.quantity as i64).sum();
    let total_cents = lines.iter().map(|l| l.line_total_cents).sum();

    Json(CartView {
        lines,
        total_items,
        total_cents,
    })
}

/// add_to_cart
///
/// [Public Route] Adds a book to the cart (quantity defaults to 1, capped at
/// the per-line maximum). For a visitor with no cart yet, a fresh anonymous
/// cart id is minted and set as a cookie on this response. An unknown book
/// id is a 404.
#[utoipa::path(
    post,
    path = "/cart/add/{book_id}",
    params(("book_id" = Uuid, Path, description = "Book ID"), AddCartQuery),
    responses(
        (status = 200, description = "Added"),
        (status = 400, description = "Quantity out of range"),
        (status = 404, description = "No such book")
    )
)]
pub async fn add_to_cart(
    owner: CartOwner,
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
    Query(query): Query<AddCartQuery>,
) -> Response {
    let quantity = query.quantity.unwrap_or(1);
    if quantity <= 0 || quantity > MAX_LINE_QUANTITY {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let (owner_id, minted) = match owner.id {
        Some(id) => (id, false),
        // First cart action of an anonymous visit: mint the cart id now and
        // hand it back as a cookie below.
        None => (Uuid::new_v4(), true),
    };

    if !state.repo.add_cart_item(owner_id, book_id, quantity).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    if minted {
        (
            AppendHeaders([(SET_COOKIE, auth::cart_cookie(owner_id))]),
            StatusCode::OK,
        )
            .into_response()
    } else {
        StatusCode::OK.into_response()
    }
}

/// update_cart_item
///
/// [Public Route] Sets a line's quantity. Zero removes the line; a negative
/// or over-the-cap quantity is a 400; a line that does not exist is a 404.
#[utoipa::path(
    post,
    path = "/cart/update/{book_id}",
    params(("book_id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated"),
        (status = 400, description = "Quantity out of range"),
        (status = 404, description = "No such cart line")
    )
)]
pub async fn update_cart_item(
    owner: CartOwner,
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> StatusCode {
    let Some(owner_id) = owner.id else {
        return StatusCode::NOT_FOUND;
    };
    if payload.quantity < 0 || payload.quantity > MAX_LINE_QUANTITY {
        return StatusCode::BAD_REQUEST;
    }

    let ok = if payload.quantity == 0 {
        state.repo.remove_cart_item(owner_id, book_id).await
    } else {
        state
            .repo
            .set_cart_quantity(owner_id, book_id, payload.quantity)
            .await
    };

    if ok { StatusCode::OK } else { StatusCode::NOT_FOUND }
}

/// remove_cart_item
///
/// [Public Route] Drops a line from the cart.
#[utoipa::path(
    post,
    path = "/cart/remove/{book_id}",
    params(("book_id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Removed"),
        (status = 404, description = "No such cart line")
    )
)]
pub async fn remove_cart_item(
    owner: CartOwner,
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> StatusCode {
    let Some(owner_id) = owner.id else {
        return StatusCode::NOT_FOUND;
    };
    if state.repo.remove_cart_item(owner_id, book_id).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// checkout
///
/// [Authenticated Route] Consumes the user's cart: stock is decremented,
/// sold counts bumped, and the cart cleared in one repository transaction.
/// An empty cart is a 400. This route sits behind the authentication layer —
/// anonymous carts must go through login (and the merge) first.
#[utoipa::path(
    post,
    path = "/checkout",
    responses(
        (status = 200, description = "Order placed, cart cleared"),
        (status = 400, description = "Cart was empty")
    )
)]
pub async fn checkout(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> StatusCode {
    if state.repo.checkout_cart(id).await {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

// --- Admin Handlers ---
//
// Everything below is nested under /admin, behind the admin role layer; the
// handlers themselves receive only requests from administrators.

/// get_admin_stats
///
/// [Admin Route] Counters for the administration dashboard.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Dashboard stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> Json<AdminDashboardStats> {
    Json(state.repo.get_stats().await)
}

/// get_admin_books
///
/// [Admin Route] The full catalog, including titles out of stock.
#[utoipa::path(
    get,
    path = "/admin/books",
    responses((status = 200, description = "All books", body = [Book]))
)]
pub async fn get_admin_books(State(state): State<AppState>) -> Json<Vec<Book>> {
    Json(state.repo.get_all_books().await)
}

/// create_book
///
/// [Admin Route] Adds a title to the catalog. The cover image is expected to
/// already exist in storage (uploaded via the presigned URL flow).
#[utoipa::path(
    post,
    path = "/admin/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Created", body = Book),
        (status = 400, description = "Blank title or unknown category")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), StatusCode> {
    if payload.title.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match state.repo.create_book(payload).await {
        Some(book) => Ok((StatusCode::CREATED, Json(book))),
        // The named category does not exist.
        None => Err(StatusCode::BAD_REQUEST),
    }
}

/// update_book
///
/// [Admin Route] Partial update of a title; only provided fields change
/// (COALESCE semantics in the repository).
#[utoipa::path(
    put,
    path = "/admin/books/{id}",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBookRequest,
    responses(
        (status = 200, description = "Updated", body = Book),
        (status = 404, description = "No such book")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookRequest>,
) -> Result<Json<Book>, StatusCode> {
    match state.repo.update_book(id, payload).await {
        Some(book) => Ok(Json(book)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// delete_book
///
/// [Admin Route] Removes a title from the catalog.
#[utoipa::path(
    delete,
    path = "/admin/books/{id}",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such book")
    )
)]
pub async fn delete_book(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.delete_book(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// create_category
///
/// [Admin Route] Adds a browsable category.
#[utoipa::path(
    post,
    path = "/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 400, description = "Blank name")
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), StatusCode> {
    if payload.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let category = state.repo.create_category(payload).await;
    Ok((StatusCode::CREATED, Json(category)))
}

/// delete_category
///
/// [Admin Route] Removes a category. A category still referenced by books
/// cannot be deleted; move or delete the books first.
#[utoipa::path(
    delete,
    path = "/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such category"),
        (status = 409, description = "Books still reference the category")
    )
)]
pub async fn delete_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    match state.repo.delete_category(id).await {
        CategoryDelete::Deleted => StatusCode::NO_CONTENT,
        CategoryDelete::NotFound => StatusCode::NOT_FOUND,
        CategoryDelete::InUse => StatusCode::CONFLICT,
    }
}

/// presign_cover_upload
///
/// [Admin Route] Generates a short-lived URL for uploading a cover image
/// directly to object storage. The URL is constrained to the declared MIME
/// type and the object key is minted server-side.
#[utoipa::path(
    post,
    path = "/admin/covers/presigned",
    request_body = PresignedUrlRequest,
    responses((status = 200, description = "URL", body = PresignedUrlResponse))
)]
pub async fn presign_cover_upload(
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> impl IntoResponse {
    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let object_key = format!("covers/{}.{}", Uuid::new_v4(), extension);

    match state
        .storage
        .presign_cover_upload(&object_key, &payload.file_type)
        .await
    {
        Ok(url) => {
            let response = PresignedUrlResponse {
                upload_url: url,
                resource_key: object_key,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            // Log the storage failure, return a generic internal error.
            tracing::error!("cover presign error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed").into_response()
        }
    }
}

// --- Fallback ---

/// default_deny
///
/// The router's fallback: any path outside the enumerated route table
/// requires authentication (the extractor rejects anonymous requests with a
/// 401) and is then a plain 404.
pub async fn default_deny(_user: AuthUser) -> StatusCode {
    StatusCode::NOT_FOUND
}

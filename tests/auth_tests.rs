use chrono::Utc;
use devbooks::{
    AppConfig, AppState, MemoryRepository, MockStorageService,
    auth::{generate_salt, hash_password},
    create_router,
    models::{AdminDashboardStats, SessionProfile, User},
    repository::RepositoryState,
    storage::StorageState,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

struct TestApp {
    address: String,
    repo: Arc<MemoryRepository>,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(MockStorageService::new()) as StorageState,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        repo,
    }
}

/// Seeds an account the way the register handler would create it and returns
/// its id.
fn seed_account(app: &TestApp, username: &str, password: &str, role: &str) -> Uuid {
    let salt = generate_salt();
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: hash_password(password, &salt),
        salt,
        role: role.to_string(),
        created_at: Utc::now(),
    };
    let id = user.id;
    app.repo.seed_user(user);
    id
}

fn cookie_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("client")
}

#[tokio::test]
async fn test_register_login_me_logout_flow() {
    let app = spawn_app().await;
    let client = cookie_client();

    // Register.
    let created = client
        .post(format!("{}/register", app.address))
        .json(&json!({
            "username": "reader",
            "email": "reader@example.com",
            "password": "turn-the-page"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    // Wrong password is rejected and leaves no session behind.
    let denied = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": "reader", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);
    let me = client.get(format!("{}/me", app.address)).send().await.unwrap();
    assert_eq!(me.status(), 401);

    // Correct login sets the session cookie.
    let accepted = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": "reader", "password": "turn-the-page" }))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 200);
    let profile: SessionProfile = accepted.json().await.unwrap();
    assert_eq!(profile.username, "reader");
    assert_eq!(profile.role, "customer");

    let me = client.get(format!("{}/me", app.address)).send().await.unwrap();
    assert_eq!(me.status(), 200);

    // Logout clears the cookie; the session no longer works.
    let out = client
        .post(format!("{}/logout", app.address))
        .send()
        .await
        .unwrap();
    assert!(out.status().is_success());

    let me = client.get(format!("{}/me", app.address)).send().await.unwrap();
    assert_eq!(me.status(), 401);
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Blank credentials.
    let blank = client
        .post(format!("{}/register", app.address))
        .json(&json!({ "username": "  ", "email": "x@example.com", "password": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);

    // Duplicate username.
    seed_account(&app, "taken", "pw", "customer");
    let duplicate = client
        .post(format!("{}/register", app.address))
        .json(&json!({
            "username": "taken",
            "email": "again@example.com",
            "password": "pw2"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);
}

#[tokio::test]
async fn test_public_routes_are_open_to_anonymous_visitors() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for path in [
        "/",
        "/home",
        "/products",
        "/search?keyword=anything",
        "/about",
        "/contact",
        "/register",
        "/login",
        "/cart",
        "/health",
    ] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .send()
            .await
            .unwrap();
        assert!(
            response.status().is_success(),
            "expected {} to be public, got {}",
            path,
            response.status()
        );
    }
}

#[tokio::test]
async fn test_admin_routes_are_role_gated() {
    let app = spawn_app().await;
    let customer_id = seed_account(&app, "shopper", "pw", "customer");
    let admin_id = seed_account(&app, "boss", "pw", "admin");
    let client = reqwest::Client::new();

    // Anonymous: no identity at all.
    let anonymous = client
        .get(format!("{}/admin/stats", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    // Authenticated but not an admin. The local bypass header stands in for
    // a real session here.
    let forbidden = client
        .get(format!("{}/admin/stats", app.address))
        .header("x-user-id", customer_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    // Admin.
    let allowed = client
        .get(format!("{}/admin/stats", app.address))
        .header("x-user-id", admin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    let stats: AdminDashboardStats = allowed.json().await.unwrap();
    assert_eq!(stats.total_users, 2);
}

#[tokio::test]
async fn test_admin_catalog_management() {
    let app = spawn_app().await;
    let admin_id = seed_account(&app, "boss", "pw", "admin");
    let client = reqwest::Client::new();

    // Create a category, then a book in it.
    let category: serde_json::Value = client
        .post(format!("{}/admin/categories", app.address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({ "name": "Databases", "description": "" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let category_id = category["id"].as_str().unwrap().to_string();

    let created = client
        .post(format!("{}/admin/books", app.address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({
            "title": "Query Plans",
            "author": "E. Xplain",
            "description": "",
            "price_cents": 2599,
            "category_id": category_id,
            "cover_image_key": "covers/query-plans.jpg",
            "stock": 5
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let book: serde_json::Value = created.json().await.unwrap();
    let book_id = book["id"].as_str().unwrap().to_string();

    // A blank title is rejected.
    let invalid = client
        .post(format!("{}/admin/books", app.address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({
            "title": "   ",
            "author": "N. Obody",
            "description": "",
            "price_cents": 100,
            "category_id": category_id,
            "cover_image_key": "",
            "stock": 0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);

    // So is a category id that references nothing.
    let orphan = client
        .post(format!("{}/admin/books", app.address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({
            "title": "Orphan",
            "author": "N. Obody",
            "description": "",
            "price_cents": 100,
            "category_id": Uuid::new_v4(),
            "cover_image_key": "",
            "stock": 0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(orphan.status(), 400);

    // The category cannot be deleted while the book references it.
    let in_use = client
        .delete(format!("{}/admin/categories/{}", app.address, category_id))
        .header("x-user-id", admin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(in_use.status(), 409);

    // Partial update touches only the provided fields.
    let updated = client
        .put(format!("{}/admin/books/{}", app.address, book_id))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({ "price_cents": 1999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);
    let updated: serde_json::Value = updated.json().await.unwrap();
    assert_eq!(updated["price_cents"], 1999);
    assert_eq!(updated["title"], "Query Plans");

    // Delete, then the detail page 404s.
    let deleted = client
        .delete(format!("{}/admin/books/{}", app.address, book_id))
        .header("x-user-id", admin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let gone = client
        .get(format!("{}/book/{}", app.address, book_id))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), 404);

    // With its last book gone, the category can be removed.
    let emptied = client
        .delete(format!("{}/admin/categories/{}", app.address, category_id))
        .header("x-user-id", admin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(emptied.status(), 204);
}

#[tokio::test]
async fn test_presigned_cover_upload() {
    let app = spawn_app().await;
    let admin_id = seed_account(&app, "boss", "pw", "admin");
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/admin/covers/presigned", app.address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({ "filename": "cover.jpg", "file_type": "image/jpeg" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let key = body["resource_key"].as_str().unwrap();
    assert!(key.starts_with("covers/"));
    assert!(key.ends_with(".jpg"));
    assert!(body["upload_url"].as_str().unwrap().contains(key));
}

#[tokio::test]
async fn test_presigned_upload_storage_failure_is_server_error() {
    // Same app wiring, but with storage that refuses to sign.
    let repo = Arc::new(MemoryRepository::new());
    let admin = {
        let salt = generate_salt();
        User {
            id: Uuid::new_v4(),
            username: "boss".to_string(),
            email: "boss@example.com".to_string(),
            password_hash: hash_password("pw", &salt),
            salt,
            role: "admin".to_string(),
            created_at: Utc::now(),
        }
    };
    let admin_id = admin.id;
    repo.seed_user(admin);

    let state = AppState {
        repo: repo as RepositoryState,
        storage: Arc::new(MockStorageService::new_failing()) as StorageState,
        config: AppConfig::default(),
    };
    let router = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let address = format!("http://127.0.0.1:{}", port);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/admin/covers/presigned", address))
        .header("x-user-id", admin_id.to_string())
        .json(&json!({ "filename": "cover.png", "file_type": "image/png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_checkout_requires_a_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/checkout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_unknown_routes_default_to_deny() {
    let app = spawn_app().await;
    let user_id = seed_account(&app, "shopper", "pw", "customer");
    let client = reqwest::Client::new();

    // Anonymous: the miss is indistinguishable from a protected route.
    let anonymous = client
        .get(format!("{}/no-such-page", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    // Authenticated: a plain not-found.
    let authed = client
        .get(format!("{}/no-such-page", app.address))
        .header("x-user-id", user_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(authed.status(), 404);
}

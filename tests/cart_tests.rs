use chrono::Utc;
use devbooks::{
    AppConfig, AppState, MemoryRepository, MockStorageService,
    auth::{generate_salt, hash_password},
    create_router,
    models::{Book, CartView, Category, User},
    repository::{Repository, RepositoryState},
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

fn seed_book(app: &TestApp, title: &str, price_cents: i64, stock: i32) -> Book {
    let category = Category {
        id: Uuid::new_v4(),
        name: format!("{} shelf", title),
        description: String::new(),
    };
    app.repo.seed_category(category.clone());

    let now = Utc::now();
    let book = Book {
        id: Uuid::new_v4(),
        category_id: category.id,
        title: title.to_string(),
        author: "A. Author".to_string(),
        description: String::new(),
        price_cents,
        cover_image: String::new(),
        stock,
        sold_count: 0,
        created_at: now,
        updated_at: now,
    };
    app.repo.seed_book(book.clone());
    book
}

fn seed_customer(app: &TestApp, username: &str, password: &str) -> Uuid {
    let salt = generate_salt();
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: hash_password(password, &salt),
        salt,
        role: "customer".to_string(),
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

async fn fetch_cart(client: &reqwest::Client, address: &str) -> CartView {
    client
        .get(format!("{}/cart", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_anonymous_cart_survives_across_requests() {
    let app = spawn_app().await;
    let book = seed_book(&app, "Guest Pick", 1000, 5);
    let client = cookie_client();

    // Empty before anything is added.
    let empty = fetch_cart(&client, &app.address).await;
    assert!(empty.lines.is_empty());
    assert_eq!(empty.total_cents, 0);

    // First add mints the anonymous cart cookie.
    let added = client
        .post(format!("{}/cart/add/{}?quantity=2", app.address, book.id))
        .send()
        .await
        .unwrap();
    assert_eq!(added.status(), 200);

    // The cookie carries the cart into the next request.
    let cart = fetch_cart(&client, &app.address).await;
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.total_items, 2);
    assert_eq!(cart.total_cents, 2000);
    assert_eq!(cart.lines[0].line_total_cents, 2000);
}

#[tokio::test]
async fn test_add_unknown_book_is_not_found() {
    let app = spawn_app().await;
    let client = cookie_client();

    let response = client
        .post(format!("{}/cart/add/{}", app.address, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_add_rejects_out_of_range_quantities() {
    let app = spawn_app().await;
    let book = seed_book(&app, "Zero", 1000, 5);
    let client = cookie_client();

    let zero = client
        .post(format!("{}/cart/add/{}?quantity=0", app.address, book.id))
        .send()
        .await
        .unwrap();
    assert_eq!(zero.status(), 400);

    // i32::MAX, far past the per-line cap.
    let huge = client
        .post(format!(
            "{}/cart/add/{}?quantity=2147483647",
            app.address, book.id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(huge.status(), 400);

    // Nothing was written by either attempt.
    assert!(fetch_cart(&client, &app.address).await.lines.is_empty());
}

#[tokio::test]
async fn test_update_and_remove_cart_lines() {
    let app = spawn_app().await;
    let book = seed_book(&app, "Adjustable", 500, 10);
    let client = cookie_client();

    client
        .post(format!("{}/cart/add/{}", app.address, book.id))
        .send()
        .await
        .unwrap();

    // Overwrite the quantity.
    let updated = client
        .post(format!("{}/cart/update/{}", app.address, book.id))
        .json(&json!({ "quantity": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);
    let cart = fetch_cart(&client, &app.address).await;
    assert_eq!(cart.total_items, 5);
    assert_eq!(cart.total_cents, 2500);

    // Negative and over-the-cap values are rejected, the line untouched.
    let negative = client
        .post(format!("{}/cart/update/{}", app.address, book.id))
        .json(&json!({ "quantity": -1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(negative.status(), 400);

    let oversized = client
        .post(format!("{}/cart/update/{}", app.address, book.id))
        .json(&json!({ "quantity": 2147483647 }))
        .send()
        .await
        .unwrap();
    assert_eq!(oversized.status(), 400);
    assert_eq!(fetch_cart(&client, &app.address).await.total_items, 5);

    // Zero removes the line.
    let zeroed = client
        .post(format!("{}/cart/update/{}", app.address, book.id))
        .json(&json!({ "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(zeroed.status(), 200);
    assert!(fetch_cart(&client, &app.address).await.lines.is_empty());

    // Updating or removing a line that is no longer there is a 404.
    let missing = client
        .post(format!("{}/cart/remove/{}", app.address, book.id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_login_merges_anonymous_cart_into_user_cart() {
    let app = spawn_app().await;
    let shared = seed_book(&app, "In Both Carts", 1000, 10);
    let extra = seed_book(&app, "Guest Only", 2000, 10);
    let user_id = seed_customer(&app, "reader", "pw");

    // The user already had one unit of the shared book from a previous visit.
    app.repo.add_cart_item(user_id, shared.id, 1).await;

    let client = cookie_client();

    // Anonymous browsing: two of the shared book, one extra title.
    client
        .post(format!("{}/cart/add/{}?quantity=2", app.address, shared.id))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/cart/add/{}", app.address, extra.id))
        .send()
        .await
        .unwrap();

    // Login moves the anonymous cart into the account, summing quantities.
    let login = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": "reader", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);

    let cart = fetch_cart(&client, &app.address).await;
    assert_eq!(cart.lines.len(), 2);
    let merged = cart
        .lines
        .iter()
        .find(|l| l.book_id == shared.id)
        .expect("merged line");
    assert_eq!(merged.quantity, 3);
    assert_eq!(cart.total_items, 4);
    assert_eq!(cart.total_cents, 3 * 1000 + 2000);
}

#[tokio::test]
async fn test_checkout_consumes_the_cart() {
    let app = spawn_app().await;
    let book = seed_book(&app, "Sellable", 1500, 10);
    seed_customer(&app, "buyer", "pw");

    let client = cookie_client();
    client
        .post(format!("{}/login", app.address))
        .json(&json!({ "username": "buyer", "password": "pw" }))
        .send()
        .await
        .unwrap();

    client
        .post(format!("{}/cart/add/{}?quantity=2", app.address, book.id))
        .send()
        .await
        .unwrap();

    let placed = client
        .post(format!("{}/checkout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(placed.status(), 200);

    // The cart is empty and the catalog reflects the sale.
    assert!(fetch_cart(&client, &app.address).await.lines.is_empty());
    let sold: Book = client
        .get(format!("{}/book/{}", app.address, book.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sold.stock, 8);
    assert_eq!(sold.sold_count, 2);

    // A second checkout finds nothing to buy.
    let again = client
        .post(format!("{}/checkout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 400);
}

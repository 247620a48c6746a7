use crate::models::{
    AdminDashboardStats, Book, CartItem, CartLine, Category, CreateBookRequest,
    CreateCategoryRequest, UpdateBookRequest, User,
};
use crate::pagination::{PAGE_SIZE, Page};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Upper bound on a single cart line's quantity. Keeps repeated adds from
/// overflowing the i32 column; the cart handlers reject larger requests
/// outright.
pub const MAX_LINE_QUANTITY: i32 = 999;

/// CategoryDelete
///
/// Outcome of a category removal. Categories referenced by books cannot be
/// deleted; the distinction lets the handler answer 409 instead of
/// misreporting an in-use category as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDelete {
    Deleted,
    NotFound,
    InUse,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers talk to
/// this trait only, so the same routing and view-model code runs against
/// Postgres in production and against the in-memory implementation in tests.
///
/// **Send + Sync + async_trait** make the trait object (`Arc<dyn Repository>`)
/// shareable across the server's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Storefront reads ---
    /// Most recently added titles, newest first.
    async fn get_newest_books(&self, limit: i64) -> Vec<Book>;
    /// Titles ranked by cumulative units sold.
    async fn get_top_selling_books(&self, limit: i64) -> Vec<Book>;
    /// One catalog page (zero-based), 12 titles per page.
    async fn get_books(&self, page: i64) -> Page<Book>;
    /// Catalog page restricted to a category. An unknown category yields an
    /// empty page, not an error.
    async fn get_books_by_category(&self, category_id: Uuid, page: i64) -> Page<Book>;
    /// Case-insensitive keyword search over title, author and description.
    async fn search_books(&self, keyword: &str, page: i64) -> Page<Book>;
    async fn get_book(&self, id: Uuid) -> Option<Book>;
    async fn get_categories(&self) -> Vec<Category>;

    // --- Users / Auth ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn get_user_by_username(&self, username: &str) -> Option<User>;
    /// Returns None when the username is already taken.
    async fn create_user(&self, user: User) -> Option<User>;

    // --- Cart ---
    /// The owner's cart lines joined with book data, oldest line first.
    async fn get_cart(&self, owner_id: Uuid) -> Vec<CartLine>;
    /// Adds quantity to a line, creating it if needed. False when the book
    /// does not exist.
    async fn add_cart_item(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool;
    /// Overwrites a line's quantity. False when the line does not exist.
    async fn set_cart_quantity(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool;
    async fn remove_cart_item(&self, owner_id: Uuid, book_id: Uuid) -> bool;
    /// Moves every line of `from_owner` into `into_owner`'s cart, summing
    /// quantities where both carts hold the same book. The pre-auth cart
    /// merge performed at login.
    async fn merge_carts(&self, from_owner: Uuid, into_owner: Uuid);
    /// Consumes the cart: stock down, sold_count up, lines deleted. False
    /// when the cart was empty.
    async fn checkout_cart(&self, owner_id: Uuid) -> bool;

    // --- Administration ---
    /// The whole catalog, including out-of-stock titles.
    async fn get_all_books(&self) -> Vec<Book>;
    /// None when the category does not exist (books carry a FK to it).
    async fn create_book(&self, req: CreateBookRequest) -> Option<Book>;
    /// COALESCE-style partial update. None when the book does not exist.
    async fn update_book(&self, id: Uuid, req: UpdateBookRequest) -> Option<Book>;
    async fn delete_book(&self, id: Uuid) -> bool;
    async fn create_category(&self, req: CreateCategoryRequest) -> Category;
    /// InUse when books still reference the category.
    async fn delete_category(&self, id: Uuid) -> CategoryDelete;
    async fn get_stats(&self) -> AdminDashboardStats;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The production implementation, backed by the PostgreSQL pool. Queries are
/// bound at runtime; read failures are logged and degrade to empty results
/// so a transient database error renders an empty shelf instead of a crash.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOK_COLUMNS: &str =
    "id, category_id, title, author, description, price_cents, cover_image, stock, sold_count, created_at, updated_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_newest_books(&self, limit: i64) -> Vec<Book> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC LIMIT $1");
        sqlx::query_as::<_, Book>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_newest_books error: {:?}", e);
                vec![]
            })
    }

    async fn get_top_selling_books(&self, limit: i64) -> Vec<Book> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY sold_count DESC, created_at DESC LIMIT $1"
        );
        sqlx::query_as::<_, Book>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_top_selling_books error: {:?}", e);
                vec![]
            })
    }

    async fn get_books(&self, page: i64) -> Page<Book> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_books count error: {:?}", e);
                0
            });

        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let items = sqlx::query_as::<_, Book>(&sql)
            .bind(PAGE_SIZE)
            // Saturating: an absurd ?page= must not overflow the offset.
            .bind(page.saturating_mul(PAGE_SIZE))
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_books error: {:?}", e);
                vec![]
            });

        Page::new(items, total, page, PAGE_SIZE)
    }

    async fn get_books_by_category(&self, category_id: Uuid, page: i64) -> Page<Book> {
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE category_id = $1")
                .bind(category_id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("get_books_by_category count error: {:?}", e);
                    0
                });

        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE category_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let items = sqlx::query_as::<_, Book>(&sql)
            .bind(category_id)
            .bind(PAGE_SIZE)
            .bind(page.saturating_mul(PAGE_SIZE))
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_books_by_category error: {:?}", e);
                vec![]
            });

        Page::new(items, total, page, PAGE_SIZE)
    }

    async fn search_books(&self, keyword: &str, page: i64) -> Page<Book> {
        let pattern = format!("%{}%", keyword);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM books WHERE title ILIKE $1 OR author ILIKE $1 OR description ILIKE $1",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("search_books count error: {:?}", e);
            0
        });

        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE title ILIKE $1 OR author ILIKE $1 OR description ILIKE $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let items = sqlx::query_as::<_, Book>(&sql)
            .bind(&pattern)
            .bind(PAGE_SIZE)
            .bind(page.saturating_mul(PAGE_SIZE))
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("search_books error: {:?}", e);
                vec![]
            });

        Page::new(items, total, page, PAGE_SIZE)
    }

    async fn get_book(&self, id: Uuid) -> Option<Book> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_book error: {:?}", e);
                None
            })
    }

    async fn get_categories(&self) -> Vec<Category> {
        sqlx::query_as::<_, Category>(
            "SELECT id, name, description FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_categories error: {:?}", e);
            vec![]
        })
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, salt, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or(None)
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, salt, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or(None)
    }

    async fn create_user(&self, user: User) -> Option<User> {
        // ON CONFLICT DO NOTHING plus RETURNING: a duplicate username comes
        // back as no row, which the register handler maps to 409.
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, username, email, password_hash, salt, role, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               ON CONFLICT (username) DO NOTHING
               RETURNING id, username, email, password_hash, salt, role, created_at"#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.salt)
        .bind(&user.role)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("create_user error: {:?}", e);
            None
        })
    }

    async fn get_cart(&self, owner_id: Uuid) -> Vec<CartLine> {
        sqlx::query_as::<_, CartLine>(
            r#"SELECT c.book_id, b.title, b.author, b.cover_image, b.price_cents, c.quantity,
                      b.price_cents * c.quantity AS line_total_cents
               FROM cart_items c
               JOIN books b ON c.book_id = b.id
               WHERE c.owner_id = $1
               ORDER BY c.added_at ASC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_cart error: {:?}", e);
            vec![]
        })
    }

    async fn add_cart_item(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool {
        // The book must exist before a line can reference it.
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await
            .unwrap_or(false);
        if !exists {
            return false;
        }

        // LEAST caps the summed quantity so repeated adds cannot overflow
        // the column.
        let result = sqlx::query(
            r#"INSERT INTO cart_items (owner_id, book_id, quantity, added_at)
               VALUES ($1, $2, LEAST($3, $4), NOW())
               ON CONFLICT (owner_id, book_id)
               DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4)"#,
        )
        .bind(owner_id)
        .bind(book_id)
        .bind(quantity)
        .bind(MAX_LINE_QUANTITY)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("add_cart_item error: {:?}", e);
                false
            }
        }
    }

    async fn set_cart_quantity(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool {
        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $3 WHERE owner_id = $1 AND book_id = $2",
        )
        .bind(owner_id)
        .bind(book_id)
        .bind(quantity)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("set_cart_quantity error: {:?}", e);
                false
            }
        }
    }

    async fn remove_cart_item(&self, owner_id: Uuid, book_id: Uuid) -> bool {
        let result =
            sqlx::query("DELETE FROM cart_items WHERE owner_id = $1 AND book_id = $2")
                .bind(owner_id)
                .bind(book_id)
                .execute(&self.pool)
                .await;

        match result {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("remove_cart_item error: {:?}", e);
                false
            }
        }
    }

    async fn merge_carts(&self, from_owner: Uuid, into_owner: Uuid) {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!("merge_carts begin error: {:?}", e);
                return;
            }
        };

        // Quantities for books in both carts are summed, not overwritten,
        // capped at the per-line maximum.
        let moved = sqlx::query(
            r#"INSERT INTO cart_items (owner_id, book_id, quantity, added_at)
               SELECT $2, book_id, quantity, added_at FROM cart_items WHERE owner_id = $1
               ON CONFLICT (owner_id, book_id)
               DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $3)"#,
        )
        .bind(from_owner)
        .bind(into_owner)
        .bind(MAX_LINE_QUANTITY)
        .execute(&mut *tx)
        .await;

        if let Err(e) = moved {
            tracing::error!("merge_carts copy error: {:?}", e);
            return;
        }

        if let Err(e) = sqlx::query("DELETE FROM cart_items WHERE owner_id = $1")
            .bind(from_owner)
            .execute(&mut *tx)
            .await
        {
            tracing::error!("merge_carts cleanup error: {:?}", e);
            return;
        }

        if let Err(e) = tx.commit().await {
            tracing::error!("merge_carts commit error: {:?}", e);
        }
    }

    async fn checkout_cart(&self, owner_id: Uuid) -> bool {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!("checkout_cart begin error: {:?}", e);
                return false;
            }
        };

        let updated = sqlx::query(
            r#"UPDATE books b
               SET stock = GREATEST(b.stock - c.quantity, 0),
                   sold_count = b.sold_count + c.quantity,
                   updated_at = NOW()
               FROM cart_items c
               WHERE c.owner_id = $1 AND c.book_id = b.id"#,
        )
        .bind(owner_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = updated {
            tracing::error!("checkout_cart update error: {:?}", e);
            return false;
        }

        let cleared = match sqlx::query("DELETE FROM cart_items WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
        {
            Ok(res) => res.rows_affected(),
            Err(e) => {
                tracing::error!("checkout_cart clear error: {:?}", e);
                return false;
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!("checkout_cart commit error: {:?}", e);
            return false;
        }

        cleared > 0
    }

    async fn get_all_books(&self) -> Vec<Book> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC");
        sqlx::query_as::<_, Book>(&sql)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_all_books error: {:?}", e);
                vec![]
            })
    }

    async fn create_book(&self, req: CreateBookRequest) -> Option<Book> {
        // The FK target must exist, and checking it here turns a bad
        // category id into a clean None instead of an insert error.
        let category_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(req.category_id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or(false);
        if !category_exists {
            return None;
        }

        let sql = format!(
            r#"INSERT INTO books (id, category_id, title, author, description, price_cents, cover_image, stock, sold_count, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, NOW(), NOW())
               RETURNING {BOOK_COLUMNS}"#
        );
        match sqlx::query_as::<_, Book>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.category_id)
            .bind(&req.title)
            .bind(&req.author)
            .bind(&req.description)
            .bind(req.price_cents)
            .bind(&req.cover_image_key)
            .bind(req.stock)
            .fetch_one(&self.pool)
            .await
        {
            Ok(book) => Some(book),
            Err(e) => {
                tracing::error!("create_book error: {:?}", e);
                None
            }
        }
    }

    async fn update_book(&self, id: Uuid, req: UpdateBookRequest) -> Option<Book> {
        let sql = format!(
            r#"UPDATE books
               SET title = COALESCE($2, title),
                   author = COALESCE($3, author),
                   description = COALESCE($4, description),
                   price_cents = COALESCE($5, price_cents),
                   category_id = COALESCE($6, category_id),
                   cover_image = COALESCE($7, cover_image),
                   stock = COALESCE($8, stock),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {BOOK_COLUMNS}"#
        );
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.author)
            .bind(req.description)
            .bind(req.price_cents)
            .bind(req.category_id)
            .bind(req.cover_image_key)
            .bind(req.stock)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_book error: {:?}", e);
                None
            })
    }

    async fn delete_book(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_book error: {:?}", e);
                false
            }
        }
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> Category {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3) RETURNING id, name, description",
        )
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(&req.description)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert category")
    }

    async fn delete_category(&self, id: Uuid) -> CategoryDelete {
        // Books carry a FK to the category; the delete would fail anyway,
        // and the explicit check keeps the outcome unambiguous.
        let in_use =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM books WHERE category_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or(false);
        if in_use {
            return CategoryDelete::InUse;
        }

        match sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) if res.rows_affected() > 0 => CategoryDelete::Deleted,
            Ok(_) => CategoryDelete::NotFound,
            Err(e) => {
                tracing::error!("delete_category error: {:?}", e);
                CategoryDelete::NotFound
            }
        }
    }

    async fn get_stats(&self) -> AdminDashboardStats {
        let total_books = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_categories = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let open_carts =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT owner_id) FROM cart_items")
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);
        AdminDashboardStats {
            total_books,
            total_categories,
            total_users,
            open_carts,
        }
    }
}

/// MemoryRepository
///
/// In-memory implementation of the repository, used by the integration tests
/// (and handy for demos) so the full router can be exercised without a
/// Postgres instance. Mirrors the visible behavior of `PostgresRepository`:
/// ordering, pagination, merge-on-conflict semantics.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    books: Vec<Book>,
    categories: Vec<Category>,
    users: Vec<User>,
    carts: HashMap<Uuid, Vec<CartItem>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Seed helpers used by test setups.

    pub fn seed_book(&self, book: Book) {
        self.inner.write().expect("lock").books.push(book);
    }

    pub fn seed_category(&self, category: Category) {
        self.inner.write().expect("lock").categories.push(category);
    }

    pub fn seed_user(&self, user: User) {
        self.inner.write().expect("lock").users.push(user);
    }

    fn page_of(mut books: Vec<Book>, page: i64) -> Page<Book> {
        let total = books.len() as i64;
        let start = page.saturating_mul(PAGE_SIZE).max(0) as usize;
        let items: Vec<Book> = if start >= books.len() {
            Vec::new()
        } else {
            let end = (start + PAGE_SIZE as usize).min(books.len());
            books.drain(start..end).collect()
        };
        Page::new(items, total, page, PAGE_SIZE)
    }

    fn newest_first(books: &[Book]) -> Vec<Book> {
        let mut sorted = books.to_vec();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_newest_books(&self, limit: i64) -> Vec<Book> {
        let inner = self.inner.read().expect("lock");
        let mut sorted = Self::newest_first(&inner.books);
        sorted.truncate(limit.max(0) as usize);
        sorted
    }

    async fn get_top_selling_books(&self, limit: i64) -> Vec<Book> {
        let inner = self.inner.read().expect("lock");
        let mut sorted = inner.books.clone();
        sorted.sort_by(|a, b| {
            b.sold_count
                .cmp(&a.sold_count)
                .then(b.created_at.cmp(&a.created_at))
        });
        sorted.truncate(limit.max(0) as usize);
        sorted
    }

    async fn get_books(&self, page: i64) -> Page<Book> {
        let inner = self.inner.read().expect("lock");
        Self::page_of(Self::newest_first(&inner.books), page)
    }

    async fn get_books_by_category(&self, category_id: Uuid, page: i64) -> Page<Book> {
        let inner = self.inner.read().expect("lock");
        let filtered: Vec<Book> = Self::newest_first(&inner.books)
            .into_iter()
            .filter(|b| b.category_id == category_id)
            .collect();
        Self::page_of(filtered, page)
    }

    async fn search_books(&self, keyword: &str, page: i64) -> Page<Book> {
        let needle = keyword.to_lowercase();
        let inner = self.inner.read().expect("lock");
        let filtered: Vec<Book> = Self::newest_first(&inner.books)
            .into_iter()
            .filter(|b| {
                b.title.to_lowercase().contains(&needle)
                    || b.author.to_lowercase().contains(&needle)
                    || b.description.to_lowercase().contains(&needle)
            })
            .collect();
        Self::page_of(filtered, page)
    }

    async fn get_book(&self, id: Uuid) -> Option<Book> {
        let inner = self.inner.read().expect("lock");
        inner.books.iter().find(|b| b.id == id).cloned()
    }

    async fn get_categories(&self) -> Vec<Category> {
        let mut categories = self.inner.read().expect("lock").categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        categories
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        let inner = self.inner.read().expect("lock");
        inner.users.iter().find(|u| u.id == id).cloned()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        let inner = self.inner.read().expect("lock");
        inner.users.iter().find(|u| u.username == username).cloned()
    }

    async fn create_user(&self, user: User) -> Option<User> {
        let mut inner = self.inner.write().expect("lock");
        if inner.users.iter().any(|u| u.username == user.username) {
            return None;
        }
        inner.users.push(user.clone());
        Some(user)
    }

    async fn get_cart(&self, owner_id: Uuid) -> Vec<CartLine> {
        let inner = self.inner.read().expect("lock");
        let Some(items) = inner.carts.get(&owner_id) else {
            return vec![];
        };
        let mut items = items.clone();
        items.sort_by(|a, b| a.added_at.cmp(&b.added_at));
        items
            .iter()
            .filter_map(|item| {
                let book = inner.books.iter().find(|b| b.id == item.book_id)?;
                Some(CartLine {
                    book_id: book.id,
                    title: book.title.clone(),
                    author: book.author.clone(),
                    cover_image: book.cover_image.clone(),
                    price_cents: book.price_cents,
                    quantity: item.quantity,
                    line_total_cents: book.price_cents * item.quantity as i64,
                })
            })
            .collect()
    }

    async fn add_cart_item(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool {
        let mut inner = self.inner.write().expect("lock");
        if !inner.books.iter().any(|b| b.id == book_id) {
            return false;
        }
        let cart = inner.carts.entry(owner_id).or_default();
        if let Some(line) = cart.iter_mut().find(|i| i.book_id == book_id) {
            line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
        } else {
            cart.push(CartItem {
                owner_id,
                book_id,
                quantity: quantity.min(MAX_LINE_QUANTITY),
                added_at: Utc::now(),
            });
        }
        true
    }

    async fn set_cart_quantity(&self, owner_id: Uuid, book_id: Uuid, quantity: i32) -> bool {
        let mut inner = self.inner.write().expect("lock");
        let Some(cart) = inner.carts.get_mut(&owner_id) else {
            return false;
        };
        match cart.iter_mut().find(|i| i.book_id == book_id) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    async fn remove_cart_item(&self, owner_id: Uuid, book_id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("lock");
        let Some(cart) = inner.carts.get_mut(&owner_id) else {
            return false;
        };
        let before = cart.len();
        cart.retain(|i| i.book_id != book_id);
        cart.len() < before
    }

    async fn merge_carts(&self, from_owner: Uuid, into_owner: Uuid) {
        let mut inner = self.inner.write().expect("lock");
        let Some(source) = inner.carts.remove(&from_owner) else {
            return;
        };
        let target = inner.carts.entry(into_owner).or_default();
        for item in source {
            if let Some(line) = target.iter_mut().find(|i| i.book_id == item.book_id) {
                line.quantity = line
                    .quantity
                    .saturating_add(item.quantity)
                    .min(MAX_LINE_QUANTITY);
            } else {
                target.push(CartItem {
                    owner_id: into_owner,
                    ..item
                });
            }
        }
    }

    async fn checkout_cart(&self, owner_id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("lock");
        let Some(items) = inner.carts.remove(&owner_id) else {
            return false;
        };
        if items.is_empty() {
            return false;
        }
        for item in &items {
            if let Some(book) = inner.books.iter_mut().find(|b| b.id == item.book_id) {
                book.stock = (book.stock - item.quantity).max(0);
                book.sold_count += item.quantity as i64;
                book.updated_at = Utc::now();
            }
        }
        true
    }

    async fn get_all_books(&self) -> Vec<Book> {
        let inner = self.inner.read().expect("lock");
        Self::newest_first(&inner.books)
    }

    async fn create_book(&self, req: CreateBookRequest) -> Option<Book> {
        let mut inner = self.inner.write().expect("lock");
        if !inner.categories.iter().any(|c| c.id == req.category_id) {
            return None;
        }
        let now = Utc::now();
        let book = Book {
            id: Uuid::new_v4(),
            category_id: req.category_id,
            title: req.title,
            author: req.author,
            description: req.description,
            price_cents: req.price_cents,
            cover_image: req.cover_image_key,
            stock: req.stock,
            sold_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.books.push(book.clone());
        Some(book)
    }

    async fn update_book(&self, id: Uuid, req: UpdateBookRequest) -> Option<Book> {
        let mut inner = self.inner.write().expect("lock");
        let book = inner.books.iter_mut().find(|b| b.id == id)?;
        if let Some(title) = req.title {
            book.title = title;
        }
        if let Some(author) = req.author {
            book.author = author;
        }
        if let Some(description) = req.description {
            book.description = description;
        }
        if let Some(price_cents) = req.price_cents {
            book.price_cents = price_cents;
        }
        if let Some(category_id) = req.category_id {
            book.category_id = category_id;
        }
        if let Some(cover) = req.cover_image_key {
            book.cover_image = cover;
        }
        if let Some(stock) = req.stock {
            book.stock = stock;
        }
        book.updated_at = Utc::now();
        Some(book.clone())
    }

    async fn delete_book(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("lock");
        let before = inner.books.len();
        inner.books.retain(|b| b.id != id);
        inner.books.len() < before
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> Category {
        let category = Category {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
        };
        self.inner
            .write()
            .expect("lock")
            .categories
            .push(category.clone());
        category
    }

    async fn delete_category(&self, id: Uuid) -> CategoryDelete {
        let mut inner = self.inner.write().expect("lock");
        if inner.books.iter().any(|b| b.category_id == id) {
            return CategoryDelete::InUse;
        }
        let before = inner.categories.len();
        inner.categories.retain(|c| c.id != id);
        if inner.categories.len() < before {
            CategoryDelete::Deleted
        } else {
            CategoryDelete::NotFound
        }
    }

    async fn get_stats(&self) -> AdminDashboardStats {
        let inner = self.inner.read().expect("lock");
        AdminDashboardStats {
            total_books: inner.books.len() as i64,
            total_categories: inner.categories.len() as i64,
            total_users: inner.users.len() as i64,
            open_carts: inner.carts.values().filter(|c| !c.is_empty()).count() as i64,
        }
    }
}

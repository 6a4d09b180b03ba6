//! Postgres-backed ledger store.
//!
//! Products and movements live in two tables (`products`, `stock_movements`);
//! the schema is in `migrations/0001_stock_ledger.sql`. Cascading delete and
//! SKU uniqueness are enforced by the database.
//!
//! ## Compare-and-append
//!
//! `append_checked` runs in one transaction:
//! 1. `SELECT … FOR UPDATE` on the product row (serializes appends and deletes
//!    for that product across processes; absent row → `NotFound`)
//! 2. for OUT, fold the balance from `stock_movements` and reject an overdraw
//! 3. insert the movement and commit
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) on insert | `23505` | `DuplicateSku` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Unavailable` |
//! | Database (other, incl. check `23514`) | Any other | `Internal` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` |
//! | Other | N/A | `Internal` |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, instrument};

use stockledger_catalog::{Product, ProductDraft, ProductFilter, ProductPatch};
use stockledger_core::{MovementId, ProductId};
use stockledger_ledger::{Movement, MovementDraft, MovementKind};

use super::r#trait::{LedgerStore, StoreError};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Postgres-backed ledger store.
///
/// Uses an SQLx connection pool (thread-safe). Every mutation runs in a
/// transaction so a failure leaves no partial record.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `config.url`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, draft), fields(sku = %draft.sku()))]
    pub async fn create_product(
        &self,
        draft: &ProductDraft,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (sku, name, unit, min_stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, sku, name, unit, min_stock, created_at, updated_at
            "#,
        )
        .bind(draft.sku())
        .bind(draft.name())
        .bind(draft.unit())
        .bind(draft.min_stock())
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateSku(draft.sku().to_string())
            } else {
                map_sqlx_error("create_product", e)
            }
        })?;

        product_from_row(&row)
    }

    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn patch_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                unit = COALESCE($3, unit),
                min_stock = COALESCE($4, min_stock),
                updated_at = $5
            WHERE id = $1
            RETURNING id, sku, name, unit, min_stock, created_at, updated_at
            "#,
        )
        .bind(db_id(id.get())?)
        .bind(patch.name())
        .bind(patch.unit())
        .bind(patch.min_stock())
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("patch_product", e))?
        .ok_or(StoreError::NotFound)?;

        product_from_row(&row)
    }

    /// Delete the product row; `ON DELETE CASCADE` removes its movements in the
    /// same statement.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove_product(&self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(db_id(id.get())?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        debug!(cascaded = true, "product removed");
        Ok(())
    }

    pub async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, sku, name, unit, min_stock, created_at, updated_at FROM products WHERE id = $1")
            .bind(db_id(id.get())?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn fetch_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT id, sku, name, unit, min_stock, created_at, updated_at FROM products")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    /// Products whose name or SKU contains the filter's query, as `ILIKE`.
    pub async fn search_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, name, unit, min_stock, created_at, updated_at
            FROM products
            WHERE $1::TEXT IS NULL
               OR name ILIKE $1 ESCAPE '\'
               OR sku ILIKE $1 ESCAPE '\'
            "#,
        )
        .bind(filter.query().map(like_pattern))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    /// Load a product's log in insertion order from one consistent snapshot.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn fetch_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        let id = db_id(product_id.get())?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| map_sqlx_error("product_exists", e))?;
        if !exists {
            return Err(StoreError::NotFound);
        }

        let rows = sqlx::query(
            r#"
            SELECT id, product_id, magnitude, kind, note, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_movements", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    /// Atomic compare-and-append (see module docs).
    #[instrument(
        skip(self, draft),
        fields(
            product_id = %draft.product_id(),
            kind = %draft.kind(),
            magnitude = draft.magnitude()
        )
    )]
    pub async fn append_checked(
        &self,
        draft: &MovementDraft,
        at: DateTime<Utc>,
    ) -> Result<Movement, StoreError> {
        let id = db_id(draft.product_id().get())?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let locked = sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;
        if locked.is_none() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound);
        }

        if draft.kind() == MovementKind::Out {
            let available: i64 = sqlx::query(
                r#"
                SELECT COALESCE(SUM(CASE WHEN kind = 'IN' THEN magnitude ELSE -magnitude END), 0)::BIGINT
                    AS balance
                FROM stock_movements
                WHERE product_id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("balance"))
            .map_err(|e| map_sqlx_error("derive_balance", e))?;

            if draft.magnitude() > available {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::InsufficientStock {
                    requested: draft.magnitude(),
                    available,
                });
            }
        }

        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (product_id, magnitude, kind, note, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, magnitude, kind, note, created_at
            "#,
        )
        .bind(id)
        .bind(draft.magnitude())
        .bind(draft.kind().as_str())
        .bind(draft.note())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        let movement = movement_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(movement)
    }
}

/// Run an async store call from the synchronous `LedgerStore` surface.
///
/// Requires a multi-thread tokio runtime on the calling thread's context.
fn run_blocking<T>(fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    let handle = Handle::try_current()
        .map_err(|_| StoreError::Unavailable("no tokio runtime available for PostgresLedgerStore".to_string()))?;
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(StoreError::Unavailable(
            "PostgresLedgerStore requires a multi-thread tokio runtime".to_string(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

impl LedgerStore for PostgresLedgerStore {
    fn insert_product(&self, draft: &ProductDraft, at: DateTime<Utc>) -> Result<Product, StoreError> {
        run_blocking(self.create_product(draft, at))
    }

    fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        run_blocking(self.patch_product(id, patch, at))
    }

    fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        run_blocking(self.remove_product(id))
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        run_blocking(self.fetch_product(id))
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        run_blocking(self.fetch_products())
    }

    fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        run_blocking(self.search_products(filter))
    }

    fn load_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        run_blocking(self.fetch_movements(product_id))
    }

    fn append_movement(&self, draft: &MovementDraft, at: DateTime<Utc>) -> Result<Movement, StoreError> {
        run_blocking(self.append_checked(draft, at))
    }
}

/// `%query%` with LIKE wildcards in the query matched literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn db_id(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::NotFound)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Foreign key violation: the product vanished under us.
                Some("23503") => StoreError::NotFound,
                Some("40001") | Some("40P01") => StoreError::Unavailable(msg),
                _ => StoreError::Internal(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        _ => StoreError::Internal(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: i64,
    sku: String,
    name: String,
    unit: String,
    min_stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            min_stock: row.try_get("min_stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::try_from(row.id).map_err(|e| StoreError::Internal(e.to_string()))?,
            sku: row.sku,
            name: row.name,
            unit: row.unit,
            min_stock: row.min_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    id: i64,
    product_id: i64,
    magnitude: i64,
    kind: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            magnitude: row.try_get("magnitude")?,
            kind: row.try_get("kind")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let internal = |e: stockledger_core::LedgerError| StoreError::Internal(e.to_string());
        Ok(Movement {
            id: MovementId::try_from(row.id).map_err(internal)?,
            product_id: ProductId::try_from(row.product_id).map_err(internal)?,
            magnitude: row.magnitude,
            kind: row.kind.parse::<MovementKind>().map_err(internal)?,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    ProductRow::from_row(row)
        .map_err(|e| StoreError::Internal(format!("failed to deserialize product row: {e}")))?
        .try_into()
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    MovementRow::from_row(row)
        .map_err(|e| StoreError::Internal(format!("failed to deserialize movement row: {e}")))?
        .try_into()
}

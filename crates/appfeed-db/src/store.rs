//! Product storage behind the persistence gate.
//!
//! [`PgProductStore`] writes `mobile_apps` plus its child tables in one
//! transaction. [`MemoryProductStore`] keeps products in a `Vec` and backs
//! dry runs and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use appfeed_core::NormalizedProduct;

use crate::DbError;

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Whether a product with this dedup key is already stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    async fn exists(&self, provider_id: i64, provider_product_id: &str) -> Result<bool, DbError>;

    /// Stores the product and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails; nothing is stored in that case.
    async fn insert(&self, product: &NormalizedProduct) -> Result<i64, DbError>;
}

pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of stored rows for a dedup key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the query fails.
    pub async fn count_for_key(
        &self,
        provider_id: i64,
        provider_product_id: &str,
    ) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM mobile_apps \
             WHERE provider_id = $1 AND provider_product_id = $2",
        )
        .bind(provider_id)
        .bind(provider_product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn exists(&self, provider_id: i64, provider_product_id: &str) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS ( \
                 SELECT 1 FROM mobile_apps \
                 WHERE provider_id = $1 AND provider_product_id = $2 \
             )",
        )
        .bind(provider_id)
        .bind(provider_product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, product: &NormalizedProduct) -> Result<i64, DbError> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar::<_, i64>(
            "INSERT INTO mobile_apps \
                 (provider_id, provider_product_id, title, publisher, platform, \
                  currency_code, price, category_id, category_name, \
                  subcategory_id, subcategory_name, release_date, image_dir, image_source_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING id",
        )
        .bind(product.provider_id)
        .bind(&product.provider_product_id)
        .bind(&product.title)
        .bind(&product.publisher)
        .bind(product.platform.as_str())
        .bind(product.price.currency.code())
        .bind(product.price.amount)
        .bind(product.category.id)
        .bind(&product.category.name)
        .bind(product.subcategory.id)
        .bind(&product.subcategory.name)
        .bind(product.release_date)
        .bind(&product.image_dir)
        .bind(&product.image.source_url)
        .fetch_one(&mut *tx)
        .await?;

        insert_children(&mut tx, id, product).await?;
        tx.commit().await?;

        Ok(id)
    }
}

async fn insert_children(
    tx: &mut Transaction<'_, Postgres>,
    app_id: i64,
    product: &NormalizedProduct,
) -> Result<(), DbError> {
    for (position, description) in (0_i32..).zip(&product.descriptions) {
        sqlx::query(
            "INSERT INTO mobile_app_descriptions \
                 (mobile_app_id, position, locale, title, short_description, long_description) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(app_id)
        .bind(position)
        .bind(&description.locale)
        .bind(&description.title)
        .bind(&description.short)
        .bind(&description.long)
        .execute(&mut **tx)
        .await?;
    }

    for device in &product.devices {
        sqlx::query(
            "INSERT INTO mobile_app_devices (mobile_app_id, device) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(app_id)
        .bind(device)
        .execute(&mut **tx)
        .await?;
    }

    for permission in &product.permissions {
        sqlx::query(
            "INSERT INTO mobile_app_permissions (mobile_app_id, permission) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(app_id)
        .bind(permission)
        .execute(&mut **tx)
        .await?;
    }

    for territory in &product.territories {
        sqlx::query(
            "INSERT INTO mobile_app_territories (mobile_app_id, territory) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(app_id)
        .bind(territory.as_code())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// In-process store. Ids are 1-based insertion indexes.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    products: Mutex<Vec<NormalizedProduct>>,
}

impl MemoryProductStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of everything stored so far, in insertion order.
    #[must_use]
    pub fn products(&self) -> Vec<NormalizedProduct> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NormalizedProduct>> {
        // A poisoned lock still holds a consistent Vec; nothing panics mid-push.
        self.products
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn exists(&self, provider_id: i64, provider_product_id: &str) -> Result<bool, DbError> {
        Ok(self
            .lock()
            .iter()
            .any(|p| p.dedup_key() == (provider_id, provider_product_id)))
    }

    async fn insert(&self, product: &NormalizedProduct) -> Result<i64, DbError> {
        let mut products = self.lock();
        products.push(product.clone());
        Ok(i64::try_from(products.len()).unwrap_or(i64::MAX))
    }
}

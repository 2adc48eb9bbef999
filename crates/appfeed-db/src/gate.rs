//! Insert-or-skip decision for normalized products.

use appfeed_core::NormalizedProduct;

use crate::store::ProductStore;
use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted { id: i64 },
    SkippedDuplicate,
}

/// Persists `product` unless `check_existing` is set and its
/// `(provider_id, provider_product_id)` key is already stored.
///
/// With `check_existing` off every call inserts; bulk initial imports use
/// that mode.
///
/// # Errors
///
/// Returns [`DbError`] from the store. The caller treats it as an item
/// failure.
pub async fn persist<S: ProductStore + ?Sized>(
    store: &S,
    product: &NormalizedProduct,
    check_existing: bool,
) -> Result<PersistOutcome, DbError> {
    let (provider_id, provider_product_id) = product.dedup_key();

    if check_existing && store.exists(provider_id, provider_product_id).await? {
        tracing::debug!(provider_id, provider_product_id, "already imported, skipping");
        return Ok(PersistOutcome::SkippedDuplicate);
    }

    let id = store.insert(product).await?;
    tracing::debug!(provider_id, provider_product_id, id, "inserted product");
    Ok(PersistOutcome::Inserted { id })
}

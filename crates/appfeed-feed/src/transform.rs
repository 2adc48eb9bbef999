//! Transformation of raw feed records into [`NormalizedProduct`]s.
//!
//! Validation runs in a fixed order and the first failure wins; every error
//! is scoped to the current item so the caller can log it and move on.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use appfeed_core::{
    CategoryRef, Currency, FeedConfig, ImageSpec, ImageTarget, ImportConfig, LocalizedDescription,
    NormalizedProduct, Platform, Price, StorageConfig, Territory,
};

use crate::error::TransformError;
use crate::images::{ImageStore, StoredImages};
use crate::types::{RawCategory, RawDescription, RawItem};

const MEDIUM_SIZE: u32 = 127;
const LARGE_SIZE: u32 = 210;

/// Per-run values the transformer needs besides the record itself.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub provider_id: i64,
    pub images_dir: PathBuf,
    pub tmp_images_dir: PathBuf,
    pub image_ttl_secs: u64,
}

impl TransformContext {
    #[must_use]
    pub fn from_config(feed: &FeedConfig, import: &ImportConfig, storage: &StorageConfig) -> Self {
        Self {
            provider_id: feed.provider_id,
            images_dir: storage.images_dir.clone(),
            tmp_images_dir: storage.tmp_images_dir.clone(),
            image_ttl_secs: import.image_ttl_secs,
        }
    }
}

/// Best-effort item id for log lines, without validating the record.
#[must_use]
pub fn item_id_of(raw: &Value) -> Option<String> {
    raw.get("appId").and_then(id_string)
}

/// Builds a [`NormalizedProduct`] from one raw feed record. Performs no I/O.
///
/// # Errors
///
/// Returns the first [`TransformError`] hit while validating the record.
pub fn transform_item(
    raw: &Value,
    ctx: &TransformContext,
) -> Result<NormalizedProduct, TransformError> {
    if !raw.is_object() {
        return Err(TransformError::InvalidRecord("expected a JSON object".to_owned()));
    }
    let item_id = item_id_of(raw)
        .ok_or_else(|| TransformError::InvalidRecord("missing appId".to_owned()))?;
    let (title, descriptions) = resolve_descriptions(&item_id, raw.get("description"))?;

    let item: RawItem = serde_json::from_value(raw.clone())
        .map_err(|e| TransformError::InvalidRecord(e.to_string()))?;
    let platform = resolve_platform(&item_id, item.client_platform.as_ref())?;
    let price = resolve_price(&item_id, item.currency.as_deref(), item.price.as_ref())?;
    let (category, subcategory) = resolve_categories(item.category.unwrap_or_default());
    let release_date = resolve_release_date(&item_id, item.last_modified.as_ref())?;
    let features = item.android_features.unwrap_or_default();

    let icon = item
        .image_uri
        .and_then(|uri| uri.icon)
        .filter(|icon| !icon.trim().is_empty())
        .ok_or_else(|| TransformError::MissingIcon {
            item_id: item_id.clone(),
        })?;
    let image_dir = sharded_dir(&item_id);
    let image = ImageSpec {
        tmp_file_name: last_path_segment(&icon).to_owned(),
        source_url: icon,
        tmp_dir: ctx.tmp_images_dir.clone(),
        images_dir: ctx.images_dir.clone(),
        engine_dir: format!("{}/{image_dir}", ctx.provider_id),
        ttl_secs: ctx.image_ttl_secs,
        targets: vec![
            ImageTarget {
                width: MEDIUM_SIZE,
                height: MEDIUM_SIZE,
                file_name: format!("{item_id}_medium.png"),
            },
            ImageTarget {
                width: LARGE_SIZE,
                height: LARGE_SIZE,
                file_name: format!("{item_id}_big.png"),
            },
        ],
    };

    NormalizedProduct::builder()
        .provider_id(ctx.provider_id)
        .provider_product_id(item_id.clone())
        .title(title)
        .descriptions(descriptions)
        .publisher(item.company.unwrap_or_default())
        .platform(platform)
        .price(price)
        .category(category)
        .subcategory(subcategory)
        .release_date(release_date)
        .devices(features.devices)
        .permissions(features.permissions)
        .territories(vec![Territory::All])
        .image_dir(image_dir)
        .image(image)
        .build()
        .map_err(|source| TransformError::Domain { item_id, source })
}

/// Transforms the record and then runs its image through `images`.
///
/// # Errors
///
/// Any [`TransformError`]; image failures come back as
/// [`TransformError::Image`] and abort the item.
pub async fn transform_with_images(
    raw: &Value,
    ctx: &TransformContext,
    images: &dyn ImageStore,
) -> Result<(NormalizedProduct, StoredImages), TransformError> {
    let product = transform_item(raw, ctx)?;
    let stored = images
        .store(&product.image)
        .await
        .map_err(|source| TransformError::Image {
            item_id: product.provider_product_id.clone(),
            source,
        })?;
    Ok((product, stored))
}

/// Two-level directory shard for an item id: `19002` becomes `"19/00"`.
/// Ids shorter than four characters are left-padded with zeros.
#[must_use]
pub fn sharded_dir(item_id: &str) -> String {
    let mut chars: Vec<char> = item_id.chars().collect();
    while chars.len() < 4 {
        chars.insert(0, '0');
    }
    let first: String = chars[0..2].iter().collect();
    let second: String = chars[2..4].iter().collect();
    format!("{first}/{second}")
}

fn resolve_descriptions(
    item_id: &str,
    description: Option<&Value>,
) -> Result<(String, Vec<LocalizedDescription>), TransformError> {
    let entries: Vec<(String, &Value)> = match description {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(list)) => list
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => {
            return Err(TransformError::DescriptionNotObject {
                item_id: item_id.to_owned(),
            })
        }
    };

    match entries.first() {
        Some((_, first)) if !is_empty_value(first) => {}
        _ => {
            return Err(TransformError::EmptyDescription {
                item_id: item_id.to_owned(),
            })
        }
    }

    let mut descriptions = Vec::with_capacity(entries.len());
    for (locale, entry) in entries {
        if !entry.is_object() {
            return Err(TransformError::InvalidDescriptionEntry {
                item_id: item_id.to_owned(),
                locale,
            });
        }
        let parsed: RawDescription = serde_json::from_value(entry.clone()).map_err(|_| {
            TransformError::InvalidDescriptionEntry {
                item_id: item_id.to_owned(),
                locale: locale.clone(),
            }
        })?;
        descriptions.push(LocalizedDescription {
            locale,
            title: parsed.title.unwrap_or_default(),
            short: parsed.short_description.unwrap_or_default(),
            long: parsed.description.unwrap_or_default(),
        });
    }

    let title = descriptions
        .first()
        .map(|d| d.title.clone())
        .unwrap_or_default();
    Ok((title, descriptions))
}

fn resolve_platform(item_id: &str, value: Option<&Value>) -> Result<Platform, TransformError> {
    match value.and_then(Value::as_i64) {
        Some(code) => Ok(Platform::from_code(code)),
        None => Err(TransformError::InvalidPlatform {
            item_id: item_id.to_owned(),
            value: value.map_or_else(|| "null".to_owned(), Value::to_string),
        }),
    }
}

fn resolve_price(
    item_id: &str,
    currency: Option<&str>,
    price: Option<&Value>,
) -> Result<Price, TransformError> {
    let code = currency.unwrap_or_default();
    let currency = Currency::from_code(code).map_err(|_| TransformError::UnknownCurrency {
        item_id: item_id.to_owned(),
        code: code.to_owned(),
    })?;

    let invalid = || TransformError::InvalidPrice {
        item_id: item_id.to_owned(),
        value: price.map_or_else(|| "null".to_owned(), Value::to_string),
    };
    let text = match price {
        None | Some(Value::Null) => return Ok(Price::from_minor_units(currency, Decimal::ZERO)),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(_) => return Err(invalid()),
    };
    let minor = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid())?;

    Ok(Price::from_minor_units(currency, minor))
}

fn resolve_categories(category: RawCategory) -> (CategoryRef, CategoryRef) {
    (
        CategoryRef {
            id: lenient_int(category.parent_category.as_ref()),
            name: category.parent_category_name.unwrap_or_default(),
        },
        CategoryRef {
            id: lenient_int(category.sub_category.as_ref()),
            name: category.sub_category_name.unwrap_or_default(),
        },
    )
}

fn resolve_release_date(
    item_id: &str,
    value: Option<&Value>,
) -> Result<DateTime<Utc>, TransformError> {
    let invalid = |v: &Value| TransformError::InvalidReleaseDate {
        item_id: item_id.to_owned(),
        value: v.to_string(),
    };
    let secs = match value {
        None | Some(Value::Null) => return Ok(DateTime::<Utc>::UNIX_EPOCH),
        Some(v @ Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(v))?,
        Some(v @ Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid(v))?,
        Some(v) => return Err(invalid(v)),
    };
    DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid(&Value::from(secs)))
}

/// Integer cast that never fails: numbers truncate, numeric strings parse,
/// everything else is `0`.
#[allow(clippy::cast_possible_truncation)]
fn lenient_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn id_string(value: &Value) -> Option<String> {
    let id = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_owned(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

fn last_path_segment(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod tests;

//! Vendor feed record types for the list-detail and detail endpoints.
//!
//! ## Observed shape
//!
//! ### `appId`
//! Numeric in list responses (`19002`) but occasionally a string in detail
//! responses (`"19002"`). Kept as a raw JSON value and normalized to a
//! string during transformation.
//!
//! ### `description`
//! A mapping from locale code to `{title, shortDescription, description}`.
//! Some records carry a JSON array instead of an object (positional
//! locales), and a few carry a bare string. Validated in the transformer,
//! so the field stays untyped here.
//!
//! ### `clientPlatform`
//! Integer platform code; `1` is Android. Anything that is not a JSON
//! integer is rejected by the transformer, so the raw value is kept.
//!
//! ### `price`
//! Minor units (cents). Usually an integer, sometimes a numeric string.
//!
//! ### `category`
//! Parent and sub category ids are integers or numeric strings; names are
//! plain strings and may be absent.
//!
//! ### `lastModified`
//! Epoch seconds. Absent on older records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One catalog entry as delivered by the vendor.
///
/// `appId` and `description` are validated on the raw value before this
/// schema is applied. Every field decodes leniently: a value of the wrong
/// shape reads as absent instead of rejecting the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    /// Publisher name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,

    #[serde(default)]
    pub client_platform: Option<Value>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,

    #[serde(default)]
    pub price: Option<Value>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub category: Option<RawCategory>,

    #[serde(default)]
    pub last_modified: Option<Value>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub android_features: Option<RawAndroidFeatures>,

    #[serde(default, deserialize_with = "lenient_object")]
    pub image_uri: Option<RawImageUri>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCategory {
    #[serde(default)]
    pub parent_category: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub parent_category_name: Option<String>,
    #[serde(default)]
    pub sub_category: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sub_category_name: Option<String>,
}

/// `null`, a non-list, or non-string entries all read as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAndroidFeatures {
    #[serde(default, deserialize_with = "string_list")]
    pub devices: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImageUri {
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: Option<String>,
}

/// One locale entry inside `description`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDescription {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

//! Canonical catalog record produced by the feed transformer and handed to
//! the persistence gate.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Device platform the catalog entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Android,
    Unknown,
}

impl Platform {
    /// Maps the vendor's numeric `clientPlatform` code. Only `1` is known.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Android,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "Android",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currencies the feed is known to price in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Cad,
    Eur,
    Gbp,
    Usd,
}

impl Currency {
    /// Case-insensitive lookup of a 3-letter ISO 4217 code.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCurrency`] for any code outside the
    /// supported set.
    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code.trim().to_ascii_lowercase().as_str() {
            "cad" => Ok(Self::Cad),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "usd" => Ok(Self::Usd),
            _ => Err(CoreError::UnknownCurrency(code.to_string())),
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Cad => "CAD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub currency: Currency,
    pub amount: Decimal,
}

impl Price {
    /// Builds a price from an amount in minor units (cents, pence).
    #[must_use]
    pub fn from_minor_units(currency: Currency, minor: Decimal) -> Self {
        Self {
            currency,
            amount: minor / Decimal::ONE_HUNDRED,
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// One locale's copy of the product text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedDescription {
    /// Locale key exactly as the feed delivers it (e.g. `"en"`, `"sv_SE"`).
    pub locale: String,
    pub title: String,
    pub short: String,
    pub long: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Territory {
    /// Available everywhere; the feed carries no territory data.
    All,
}

impl Territory {
    #[must_use]
    pub fn as_code(&self) -> &str {
        match self {
            Self::All => "all",
        }
    }
}

/// A single resize output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTarget {
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

/// Everything the image collaborator needs to fetch, resize and store one
/// source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub source_url: String,
    /// File name only; the download lands in `tmp_dir`.
    pub tmp_file_name: String,
    pub tmp_dir: PathBuf,
    pub images_dir: PathBuf,
    /// Sharded storage prefix, e.g. `"18/19/00"`.
    pub engine_dir: String,
    /// How long a cached temp download may be reused.
    pub ttl_secs: u64,
    pub targets: Vec<ImageTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedProduct {
    pub provider_id: i64,
    /// Vendor item id; unique together with `provider_id`.
    pub provider_product_id: String,
    pub title: String,
    pub descriptions: Vec<LocalizedDescription>,
    pub publisher: String,
    pub platform: Platform,
    pub price: Price,
    pub category: CategoryRef,
    pub subcategory: CategoryRef,
    /// Epoch zero when the feed did not report a modification time.
    pub release_date: DateTime<Utc>,
    pub devices: Vec<String>,
    pub permissions: Vec<String>,
    pub territories: Vec<Territory>,
    /// Sharded directory below the provider root, e.g. `"19/00"`.
    pub image_dir: String,
    pub image: ImageSpec,
}

impl NormalizedProduct {
    #[must_use]
    pub fn builder() -> NormalizedProductBuilder {
        NormalizedProductBuilder::default()
    }

    /// `(provider_id, provider_product_id)`.
    #[must_use]
    pub fn dedup_key(&self) -> (i64, &str) {
        (self.provider_id, &self.provider_product_id)
    }
}

/// Field-by-field assembly of a [`NormalizedProduct`].
///
/// Required fields are checked once in [`NormalizedProductBuilder::build`];
/// optional collections default to empty and territories default to
/// [`Territory::All`].
#[derive(Debug, Default)]
#[must_use]
pub struct NormalizedProductBuilder {
    provider_id: Option<i64>,
    provider_product_id: Option<String>,
    title: Option<String>,
    descriptions: Vec<LocalizedDescription>,
    publisher: Option<String>,
    platform: Option<Platform>,
    price: Option<Price>,
    category: Option<CategoryRef>,
    subcategory: Option<CategoryRef>,
    release_date: Option<DateTime<Utc>>,
    devices: Vec<String>,
    permissions: Vec<String>,
    territories: Vec<Territory>,
    image_dir: Option<String>,
    image: Option<ImageSpec>,
}

impl NormalizedProductBuilder {
    pub fn provider_id(mut self, id: i64) -> Self {
        self.provider_id = Some(id);
        self
    }

    pub fn provider_product_id(mut self, id: impl Into<String>) -> Self {
        self.provider_product_id = Some(id.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn descriptions(mut self, descriptions: Vec<LocalizedDescription>) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    pub fn category(mut self, category: CategoryRef) -> Self {
        self.category = Some(category);
        self
    }

    pub fn subcategory(mut self, subcategory: CategoryRef) -> Self {
        self.subcategory = Some(subcategory);
        self
    }

    pub fn release_date(mut self, date: DateTime<Utc>) -> Self {
        self.release_date = Some(date);
        self
    }

    pub fn devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    pub fn permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn territories(mut self, territories: Vec<Territory>) -> Self {
        self.territories = territories;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    pub fn image(mut self, image: ImageSpec) -> Self {
        self.image = Some(image);
        self
    }

    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] for the first unset required
    /// field, or [`CoreError::InvalidField`] when the product id or title
    /// is blank.
    pub fn build(self) -> Result<NormalizedProduct, CoreError> {
        let provider_product_id = self
            .provider_product_id
            .ok_or(CoreError::MissingField("provider_product_id"))?;
        if provider_product_id.trim().is_empty() {
            return Err(CoreError::InvalidField {
                field: "provider_product_id",
                reason: "must be non-empty".to_string(),
            });
        }
        let title = self.title.ok_or(CoreError::MissingField("title"))?;
        if title.trim().is_empty() {
            return Err(CoreError::InvalidField {
                field: "title",
                reason: "must be non-empty".to_string(),
            });
        }

        let territories = if self.territories.is_empty() {
            vec![Territory::All]
        } else {
            self.territories
        };

        Ok(NormalizedProduct {
            provider_id: self.provider_id.ok_or(CoreError::MissingField("provider_id"))?,
            provider_product_id,
            title,
            descriptions: self.descriptions,
            publisher: self.publisher.unwrap_or_default(),
            platform: self.platform.ok_or(CoreError::MissingField("platform"))?,
            price: self.price.ok_or(CoreError::MissingField("price"))?,
            category: self.category.ok_or(CoreError::MissingField("category"))?,
            subcategory: self
                .subcategory
                .ok_or(CoreError::MissingField("subcategory"))?,
            release_date: self.release_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            devices: self.devices,
            permissions: self.permissions,
            territories,
            image_dir: self.image_dir.ok_or(CoreError::MissingField("image_dir"))?,
            image: self.image.ok_or(CoreError::MissingField("image"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_spec() -> ImageSpec {
        ImageSpec {
            source_url: "https://cdn.example.com/icons/unnamed_2.png".to_string(),
            tmp_file_name: "unnamed_2.png".to_string(),
            tmp_dir: PathBuf::from("/tmp/images"),
            images_dir: PathBuf::from("/srv/images"),
            engine_dir: "18/19/00".to_string(),
            ttl_secs: 60,
            targets: vec![],
        }
    }

    fn complete_builder() -> NormalizedProductBuilder {
        NormalizedProduct::builder()
            .provider_id(18)
            .provider_product_id("19002")
            .title("Puzzle Quest")
            .publisher("Acme Games")
            .platform(Platform::Android)
            .price(Price::from_minor_units(Currency::Usd, Decimal::from(1999)))
            .category(CategoryRef {
                id: 3,
                name: "Games".to_string(),
            })
            .subcategory(CategoryRef {
                id: 31,
                name: "Puzzle".to_string(),
            })
            .image_dir("19/00")
            .image(image_spec())
    }

    #[test]
    fn platform_code_one_is_android() {
        assert_eq!(Platform::from_code(1), Platform::Android);
        assert_eq!(Platform::from_code(99), Platform::Unknown);
        assert_eq!(Platform::from_code(0), Platform::Unknown);
    }

    #[test]
    fn currency_lookup_is_case_insensitive() {
        assert_eq!(Currency::from_code("USD").unwrap(), Currency::Usd);
        assert_eq!(Currency::from_code("eur").unwrap(), Currency::Eur);
        assert_eq!(Currency::from_code("Gbp").unwrap(), Currency::Gbp);
        assert_eq!(Currency::from_code("cad").unwrap(), Currency::Cad);
    }

    #[test]
    fn currency_lookup_rejects_unknown_code() {
        let err = Currency::from_code("xyz").unwrap_err();
        assert!(matches!(err, CoreError::UnknownCurrency(ref c) if c == "xyz"));
    }

    #[test]
    fn price_converts_minor_units() {
        let price = Price::from_minor_units(Currency::Usd, Decimal::from(1999));
        assert_eq!(price.amount, Decimal::new(1999, 2));
        assert_eq!(price.to_string(), "19.99 USD");
    }

    #[test]
    fn builder_defaults_territories_and_release_date() {
        let product = complete_builder().build().unwrap();
        assert_eq!(product.territories, vec![Territory::All]);
        assert_eq!(product.release_date, DateTime::<Utc>::UNIX_EPOCH);
        assert!(product.devices.is_empty());
        assert!(product.permissions.is_empty());
        assert_eq!(product.dedup_key(), (18, "19002"));
    }

    #[test]
    fn builder_reports_missing_price() {
        let err = NormalizedProduct::builder()
            .provider_id(18)
            .provider_product_id("1")
            .title("No Price")
            .platform(Platform::Unknown)
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingField("price")));
    }

    #[test]
    fn builder_rejects_blank_title() {
        let err = complete_builder().title("   ").build().unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { field: "title", .. }));
    }

    #[test]
    fn territory_codes() {
        assert_eq!(Territory::All.as_code(), "all");
    }
}

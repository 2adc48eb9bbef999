//! URL templating and per-request HTTP options.

use crate::error::FeedError;

/// HTTP method, extra headers, and optional body for one feed request.
///
/// A non-empty body turns the request into a `POST`; otherwise `method` is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: Option<reqwest::Method>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestOptions {
    #[must_use]
    pub fn effective_method(&self) -> reqwest::Method {
        if self.body.as_deref().is_some_and(|b| !b.is_empty()) {
            return reqwest::Method::POST;
        }
        self.method.clone().unwrap_or(reqwest::Method::GET)
    }
}

/// A templated feed request. Recreated for every call.
#[derive(Debug, Clone)]
pub struct RetryableRequest<'a> {
    pub template: &'a str,
    pub start: u64,
    pub page_size: u64,
    pub secret: &'a str,
    pub item_id: Option<&'a str>,
    pub sort_key: &'a str,
    pub options: RequestOptions,
}

impl<'a> RetryableRequest<'a> {
    #[must_use]
    pub fn page(template: &'a str, secret: &'a str, start: u64, page_size: u64) -> Self {
        Self {
            template,
            start,
            page_size,
            secret,
            item_id: None,
            sort_key: "",
            options: RequestOptions::default(),
        }
    }

    #[must_use]
    pub fn item(template: &'a str, secret: &'a str, item_id: &'a str) -> Self {
        Self {
            template,
            start: 0,
            page_size: 1,
            secret,
            item_id: Some(item_id),
            sort_key: "",
            options: RequestOptions::default(),
        }
    }

    #[must_use]
    pub fn with_sort_key(mut self, sort_key: &'a str) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// Substitutes `{START}`, `{PAGE_SIZE}`, `{SECRET}`, `{ITEM_ID}` and
    /// `{SORT_KEY}`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidTemplate`] if `{ITEM_ID}` is present but
    /// no item id was given, or if the rendered URL does not parse.
    pub fn render(&self) -> Result<String, FeedError> {
        if self.template.contains("{ITEM_ID}") && self.item_id.is_none() {
            return Err(FeedError::InvalidTemplate {
                template: self.template.to_owned(),
                reason: "template requires {ITEM_ID} but none was given".to_owned(),
            });
        }

        let url = self
            .template
            .replace("{START}", &self.start.to_string())
            .replace("{PAGE_SIZE}", &self.page_size.to_string())
            .replace("{SECRET}", self.secret)
            .replace("{ITEM_ID}", self.item_id.unwrap_or_default())
            .replace("{SORT_KEY}", self.sort_key);

        reqwest::Url::parse(&url).map_err(|e| FeedError::InvalidTemplate {
            template: self.template.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(url)
    }
}

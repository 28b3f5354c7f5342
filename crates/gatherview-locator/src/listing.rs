//! Directory listing pages and the sources that serve them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::LocatorConfig;
use crate::error::{LocatorError, LocatorResult};

/// An anchor on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Visible text of the anchor, untrimmed.
    pub text: String,
    /// Raw `href` attribute, if present.
    pub href: Option<String>,
}

impl Link {
    /// Visible text with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Returns true if the anchor names a subdirectory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.trimmed_text().ends_with('/')
    }
}

/// A fetched listing page: its URL and its anchors in document order.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// URL the page was served from.
    pub url: Url,
    /// Anchors in document order.
    pub links: Vec<Link>,
}

impl ListingPage {
    /// Extract the anchors of an HTML document.
    #[must_use]
    pub fn parse(url: Url, html: &str) -> Self {
        let Ok(anchor) = Selector::parse("a") else {
            return Self {
                url,
                links: Vec::new(),
            };
        };

        let document = Html::parse_document(html);
        let links = document
            .select(&anchor)
            .map(|element| Link {
                text: element.text().collect(),
                href: element.value().attr("href").map(str::to_owned),
            })
            .collect();

        Self { url, links }
    }

    /// First link whose visible text contains `needle`.
    #[must_use]
    pub fn find_link_containing(&self, needle: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.text.contains(needle))
    }
}

/// Capability to retrieve listing pages.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch and parse the listing page at `url`.
    ///
    /// Non-success responses are reported as [`LocatorError::Fetch`].
    async fn fetch(&self, url: &Url) -> LocatorResult<ListingPage>;
}

/// Listing source backed by plain HTTP GET requests.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: Client,
}

impl HttpListingSource {
    /// Create a new HTTP listing source from configuration.
    pub fn new(config: &LocatorConfig) -> LocatorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch(&self, url: &Url) -> LocatorResult<ListingPage> {
        debug!(url = %url, "fetching listing page");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LocatorError::fetch(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LocatorError::fetch(
                url.as_str(),
                format!("status code error: {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LocatorError::fetch(url.as_str(), e))?;

        Ok(ListingPage::parse(url.clone(), &body))
    }
}

/// In-memory listing source for tests and offline use.
#[derive(Debug, Default)]
pub struct StaticListingSource {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl StaticListingSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    #[must_use]
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        let key = Url::parse(url).map_or_else(|_| url.to_owned(), String::from);
        self.pages.insert(key, html.into());
        self
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    async fn fetch(&self, url: &Url) -> LocatorResult<ListingPage> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        self.pages.get(url.as_str()).map_or_else(
            || {
                Err(LocatorError::fetch(
                    url.as_str(),
                    "status code error: 404 Not Found",
                ))
            },
            |html| Ok(ListingPage::parse(url.clone(), html)),
        )
    }
}

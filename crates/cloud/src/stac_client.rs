//! Async STAC client for searching Sentinel-2 catalogs.
//!
//! Supports AWS Earth Search and the Copernicus Data Space Sentinel Hub
//! catalog out of the box, plus arbitrary STAC API endpoints via
//! [`StacCatalog::Custom`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::auth::{CloudAuth, NoAuth};
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

/// Default Copernicus Data Space Sentinel Hub endpoint.
pub const CDSE_BASE_URL: &str = "https://sh.dataspace.copernicus.eu";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacCatalog {
    /// AWS Earth Search (Element 84), public COG assets.
    EarthSearch,
    /// Sentinel Hub catalog under the given service base URL
    /// (e.g. [`CDSE_BASE_URL`]); requires a bearer token.
    CopernicusHub { base_url: String },
    /// Any STAC API endpoint (root URL or `/search` URL).
    Custom(String),
}

impl StacCatalog {
    /// The Copernicus Data Space deployment of Sentinel Hub.
    pub fn copernicus() -> Self {
        Self::CopernicusHub {
            base_url: CDSE_BASE_URL.to_string(),
        }
    }

    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::CopernicusHub { base_url } => format!(
                "{}/api/v1/catalog/1.0.0/search",
                base_url.trim_end_matches('/')
            ),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Sentinel-2 L2A collection id in this catalog.
    pub fn l2a_collection(&self) -> &'static str {
        "sentinel-2-l2a"
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"es"`, `"earth-search"`, `"aws"` for Earth
    /// Search and `"hub"`, `"cdse"`, `"copernicus"` for the Copernicus hub.
    /// Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "es" | "earth-search" | "earthsearch" | "aws" => Self::EarthSearch,
            "hub" | "cdse" | "copernicus" | "copernicushub" => Self::copernicus(),
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether search requests must carry a bearer token.
    pub fn needs_auth(&self) -> bool {
        matches!(self, Self::CopernicusHub { .. })
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 500).
    pub max_items: usize,
    /// Items requested per page (default 100, the Sentinel Hub maximum).
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 500,
            page_size: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    http: HttpClient,
    options: StacClientOptions,
}

impl StacClient {
    /// Create an unauthenticated STAC client.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        Self::with_auth(catalog, options, Arc::new(NoAuth))
    }

    /// Create a STAC client that signs every request with `auth`.
    pub fn with_auth(
        catalog: StacCatalog,
        options: StacClientOptions,
        auth: Arc<dyn CloudAuth>,
    ) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout, options.max_retries)?.with_auth(auth);
        Ok(Self {
            catalog,
            http,
            options,
        })
    }

    /// The catalog this client is configured for.
    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let mut params = params.clone();
        if params.limit.is_none() {
            params.limit = Some(self.options.page_size);
        }
        self.http.post_json(&self.catalog.search_url(), &params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let max = self.options.max_items;
        let mut all_items: Vec<StacItem> = Vec::new();
        let mut page = self.search(params).await?;
        let mut pages = 1usize;

        loop {
            let next_link = page.next_link().cloned();
            let cursor = page.context_next().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            page = match (next_link, cursor) {
                (Some(link), _) => self.follow_next(&link, params).await?,
                (None, Some(cursor)) => {
                    let mut next_params = params.clone();
                    next_params.next = Some(cursor);
                    self.search(&next_params).await?
                }
                (None, None) => break,
            };
            pages += 1;
            if page.is_empty() {
                break;
            }
        }

        debug!(
            catalog = ?self.catalog,
            pages,
            items = all_items.len(),
            "STAC search complete"
        );
        all_items.truncate(max);
        Ok(all_items)
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method != "POST" {
            return self.http.get_json(&link.href).await;
        }

        let mut body = serde_json::to_value(original_params)?;
        match (&link.body, link.merge.unwrap_or(false)) {
            (Some(link_body), true) => {
                if let (Some(base_obj), Some(link_obj)) = (body.as_object_mut(), link_body.as_object()) {
                    for (k, v) in link_obj {
                        base_obj.insert(k.clone(), v.clone());
                    }
                }
            }
            (Some(link_body), false) => body = link_body.clone(),
            (None, _) => {}
        }

        if !body.is_object() {
            return Err(CloudError::Network(format!(
                "pagination body for {} is not a JSON object",
                link.href
            )));
        }
        self.http.post_json(&link.href, &body).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

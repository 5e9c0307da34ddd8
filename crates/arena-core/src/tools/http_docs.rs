//! Sponsor documentation fetched over HTTP.
//!
//! Wraps another [`SponsorCatalog`] and replaces its documentation with the
//! pages at each sponsor's `doc_urls`. Results are cached per sponsor for
//! the life of the wrapper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::catalog::{CatalogError, CatalogResult, SponsorCatalog};
use crate::domain::{HackathonContext, Sponsor};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const PAGE_CHAR_LIMIT: usize = 6000;

pub struct HttpSponsorDocs {
    inner: Arc<dyn SponsorCatalog>,
    client: Client,
    cache: Mutex<HashMap<String, String>>,
}

impl HttpSponsorDocs {
    pub fn new(inner: Arc<dyn SponsorCatalog>) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(Self {
            inner,
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch_page(&self, url: &str) -> String {
        let body = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => arena_sandbox::truncate_chars(&text, PAGE_CHAR_LIMIT),
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to read doc page");
                    "[Failed to fetch]".to_string()
                }
            },
            Ok(resp) => format!("[HTTP {}]", resp.status().as_u16()),
            Err(e) => {
                warn!(url = %url, error = %e, "failed to fetch doc page");
                "[Failed to fetch]".to_string()
            }
        };
        format!("--- {url} ---\n{body}")
    }
}

#[async_trait]
impl SponsorCatalog for HttpSponsorDocs {
    async fn hackathon(&self, hackathon_id: &str) -> CatalogResult<HackathonContext> {
        self.inner.hackathon(hackathon_id).await
    }

    async fn sponsor_docs(&self, sponsor: &Sponsor) -> CatalogResult<String> {
        if let Some(docs) = self.cache.lock().await.get(&sponsor.id) {
            debug!(sponsor_id = %sponsor.id, "sponsor docs cache hit");
            return Ok(docs.clone());
        }
        if sponsor.doc_urls.is_empty() {
            return self.inner.sponsor_docs(sponsor).await;
        }

        let mut pages = Vec::with_capacity(sponsor.doc_urls.len());
        for url in &sponsor.doc_urls {
            pages.push(self.fetch_page(url).await);
        }
        let docs = pages.join("\n\n");
        self.cache
            .lock()
            .await
            .insert(sponsor.id.clone(), docs.clone());
        Ok(docs)
    }
}

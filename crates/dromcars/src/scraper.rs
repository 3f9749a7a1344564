use crate::parser::parse_listing_page;
use crate::types::ListingCard;

use reqwest::Client;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Page {0} has no listing cards")]
    NoListings(u32),
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    base_url: String,
}

impl WebScraper {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScraperError> {
        let base_url: String = base_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}/all/page{}/", self.base_url, page)
    }

    /// Fetches one index page and returns its cards aligned by position.
    pub async fn fetch_page(&self, page: u32) -> Result<Vec<ListingCard>, ScraperError> {
        let url = self.page_url(page);
        log::info!("Fetching listing page {}...", page);
        let html = self.get_html(&url).await?;
        let cards = parse_listing_page(&html);
        if cards.is_empty() {
            return Err(ScraperError::NoListings(page));
        }
        log::debug!("Page {} yielded {} cards", page, cards.len());
        Ok(cards)
    }

    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        Ok(self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}

use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;

use crate::dataset::{DatasetError, DatasetWriter};
use crate::parser::{SkipReason, parse_card};
use crate::scraper::{ScraperError, WebScraper};
use crate::types::ListingCard;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Scraper error: {0}")]
    Scraper(#[from] ScraperError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    pub first_page: u32,
    pub last_page: u32,
    /// Slept before every page request.
    pub delay: Duration,
    pub request_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub output_dir: PathBuf,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            first_page: 1,
            last_page: 1_999,
            delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            max_consecutive_failures: 5,
            output_dir: PathBuf::from("."),
        }
    }
}

impl CrawlConfig {
    pub fn validate(self) -> Result<Self, String> {
        if self.first_page == 0 {
            return Err("First page must be greater than 0".to_string());
        }
        if self.first_page > self.last_page {
            return Err(format!(
                "First page ({}) cannot be after last page ({})",
                self.first_page, self.last_page
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err("Max consecutive failures must be greater than 0".to_string());
        }
        Ok(self)
    }
}

/// Bounded sequence of page numbers that closes after too many failures in a row.
#[derive(Debug)]
pub struct PageQueue {
    next: u32,
    last: u32,
    failures_in_a_row: u32,
    max_failures: u32,
}

impl PageQueue {
    pub fn new(first: u32, last: u32, max_failures: u32) -> Self {
        Self {
            next: first,
            last,
            failures_in_a_row: 0,
            max_failures,
        }
    }

    pub fn record_success(&mut self) {
        self.failures_in_a_row = 0;
    }

    /// Returns `true` once the failure budget is spent.
    pub fn record_failure(&mut self) -> bool {
        self.failures_in_a_row += 1;
        self.is_exhausted()
    }

    pub fn failures_in_a_row(&self) -> u32 {
        self.failures_in_a_row
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures_in_a_row >= self.max_failures
    }
}

impl Iterator for PageQueue {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.is_exhausted() || self.next > self.last {
            return None;
        }
        let page = self.next;
        self.next += 1;
        Some(page)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub written: usize,
    pub skipped: Vec<SkipReason>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub cards_written: usize,
    pub cards_skipped: usize,
    pub stopped_early: bool,
}

impl Display for CrawlReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nCrawl summary:")?;
        writeln!(f, "  Pages fetched:  {}", self.pages_fetched)?;
        writeln!(f, "  Pages failed:   {}", self.pages_failed)?;
        writeln!(f, "  Cards written:  {}", self.cards_written)?;
        writeln!(f, "  Cards skipped:  {}", self.cards_skipped)?;
        if self.stopped_early {
            writeln!(f, "  Stopped early after repeated failures")?;
        }
        Ok(())
    }
}

/// Parses and writes every card of one page. A bad card is recorded and passed over.
pub fn process_cards<W: Write>(
    cards: &[ListingCard],
    writer: &mut DatasetWriter<W>,
) -> Result<PageReport, DatasetError> {
    let mut report = PageReport::default();
    for card in cards {
        match parse_card(card) {
            Ok(record) => {
                writer.append_row(&record)?;
                report.written += 1;
            }
            Err(reason) => {
                log::warn!("Skipping card '{}': {}", card.name_year, reason);
                report.skipped.push(reason);
            }
        }
    }
    writer.flush()?;
    Ok(report)
}

/// Drives `fetch` over the queue one page at a time. Failed pages are abandoned without
/// retry; only writer failures end the crawl with an error.
pub async fn crawl_pages<W, F, Fut>(
    mut queue: PageQueue,
    delay: Duration,
    mut fetch: F,
    writer: &mut DatasetWriter<W>,
) -> Result<CrawlReport, DatasetError>
where
    W: Write,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<ListingCard>, ScraperError>>,
{
    let mut report = CrawlReport::default();

    while let Some(page) = queue.next() {
        tokio::time::sleep(delay).await;

        match fetch(page).await {
            Ok(cards) => {
                queue.record_success();
                let page_report = process_cards(&cards, writer)?;
                report.pages_fetched += 1;
                report.cards_written += page_report.written;
                report.cards_skipped += page_report.skipped.len();
                log::info!(
                    "Page {}: {} written, {} skipped",
                    page,
                    page_report.written,
                    page_report.skipped.len()
                );
            }
            Err(e) => {
                report.pages_failed += 1;
                log::warn!("Abandoning page {}: {}", page, e);
                if queue.record_failure() {
                    log::error!(
                        "Stopping crawl after {} consecutive failed pages",
                        queue.failures_in_a_row()
                    );
                    report.stopped_early = true;
                }
            }
        }
    }

    Ok(report)
}

pub struct Crawler {
    config: CrawlConfig,
    scraper: WebScraper,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        let scraper = WebScraper::new(config.base_url.clone(), config.request_timeout)?;
        Ok(Self { config, scraper })
    }

    /// Crawls the configured page range into `cars_<today>.csv` under the output directory.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let started = Local::now().date_naive();
        let (mut writer, path) = DatasetWriter::create(&self.config.output_dir, started)?;

        let queue = PageQueue::new(
            self.config.first_page,
            self.config.last_page,
            self.config.max_consecutive_failures,
        );
        let report = crawl_pages(
            queue,
            self.config.delay,
            |page| self.scraper.fetch_page(page),
            &mut writer,
        )
        .await?;

        log::info!(
            "Crawl finished: {} rows appended to {}",
            writer.rows_written(),
            path.display()
        );
        Ok(report)
    }
}

pub mod cleaner;
pub mod crawl;
pub mod dataset;
pub mod model;
pub mod parser;
pub mod scraper;
pub mod types;
pub mod utils;

pub use crawl::{CrawlConfig, Crawler};
pub use scraper::{ScraperError, WebScraper};

pub(crate) const BASE_URL: &str = "https://auto.drom.ru";

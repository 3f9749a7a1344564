use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use dromcars::cleaner::clean;
use dromcars::crawl::{CrawlConfig, Crawler};
use dromcars::dataset::{DatasetError, read_raw_dataset, write_normalized};
use dromcars::model::{
    EncodingTable, INVALID_INPUT_MESSAGE, LinearPriceModel, PredictionForm, estimate_price,
};
use dromcars::types::NormalizedListingRecord;
use dromcars::utils::{CategoryOptions, DatasetStats};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "dromcars")]
#[command(about = "An auto.drom.ru listing scraper and price estimator", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Clone, ValueEnum)]
enum StatsFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listing index pages into a dated CSV file
    Crawl {
        #[arg(long, default_value_t = 1, help = "First index page to fetch")]
        first_page: u32,

        #[arg(long, default_value_t = 1_999, help = "Last index page to fetch")]
        last_page: u32,

        #[arg(long, default_value_t = 3, help = "Seconds to wait before each request")]
        delay_secs: u64,

        #[arg(long, default_value_t = 30, help = "Per-request timeout in seconds")]
        timeout_secs: u64,

        #[arg(
            long,
            default_value_t = 5,
            help = "Stop after this many failed pages in a row"
        )]
        max_failures: u32,

        #[arg(long, default_value = ".", help = "Directory for the cars_<date>.csv file")]
        output_dir: PathBuf,

        #[arg(long, help = "Override the site base URL")]
        base_url: Option<String>,
    },
    /// Clean a raw dataset and print or export the normalized rows
    Clean {
        #[arg(help = "Raw dataset written by the crawl command")]
        input: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,

        #[arg(long, help = "Write the normalized dataset as CSV to this file")]
        out: Option<PathBuf>,
    },
    /// Summarize a cleaned dataset and list the labels available for the form
    Stats {
        #[arg(help = "Raw dataset written by the crawl command")]
        input: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: StatsFormat,
    },
    /// Estimate the price of a car with a trained model
    Predict {
        #[arg(long, help = "Encoding table (JSON)")]
        encodings: PathBuf,

        #[arg(long, help = "Serialized price model (JSON)")]
        model: PathBuf,

        #[arg(long)]
        brand: String,

        #[arg(long = "car-model", default_value = "")]
        car_model: String,

        #[arg(long, help = "Year of manufacture (integer)")]
        year: String,

        #[arg(long, help = "Engine capacity in liters")]
        engine_capacity: String,

        #[arg(long, help = "Engine power in horsepower")]
        horse_power: String,

        #[arg(long)]
        fuel: String,

        #[arg(long)]
        transmission: String,

        #[arg(long)]
        drive_unit: String,

        #[arg(long, help = "Mileage in thousands of km")]
        mileage: String,

        #[arg(long)]
        location: String,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn load_clean_rows(input: &Path) -> (usize, Vec<NormalizedListingRecord>) {
    let raw = read_raw_dataset(input).unwrap_or_else(|e| {
        log::error!("Error loading dataset: {}", e);
        process::exit(1);
    });
    let rows = clean(&raw).unwrap_or_else(|e| {
        log::error!("Error cleaning dataset: {}", e);
        process::exit(1);
    });
    (raw.len(), rows)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Crawl {
            first_page,
            last_page,
            delay_secs,
            timeout_secs,
            max_failures,
            output_dir,
            base_url,
        } => {
            let defaults = CrawlConfig::default();
            let config = CrawlConfig {
                base_url: base_url.unwrap_or(defaults.base_url),
                first_page,
                last_page,
                delay: Duration::from_secs(delay_secs),
                request_timeout: Duration::from_secs(timeout_secs),
                max_consecutive_failures: max_failures,
                output_dir,
            };

            let config = config.validate().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            log::info!(
                "Crawling pages {}..={} of {}",
                config.first_page,
                config.last_page,
                config.base_url
            );

            let crawler = Crawler::new(config).unwrap_or_else(|e| {
                log::error!("Error creating crawler: {}", e);
                process::exit(1);
            });

            let report = crawler.run().await.unwrap_or_else(|e| {
                log::error!("Crawl aborted: {}", e);
                process::exit(1);
            });

            print!("{}", report);
        }

        Commands::Clean { input, format, out } => {
            let (_, rows) = load_clean_rows(&input);

            if let Some(path) = out {
                let result = File::create(&path)
                    .map_err(DatasetError::from)
                    .and_then(|file| write_normalized(file, &rows));
                if let Err(e) = result {
                    log::error!("Error writing {}: {}", path.display(), e);
                    process::exit(1);
                }
                log::info!("Wrote {} rows to {}", rows.len(), path.display());
                return;
            }

            match format {
                OutputFormat::Json => serialize_json(&rows),
                OutputFormat::Csv => {
                    if let Err(e) = write_normalized(io::stdout().lock(), &rows) {
                        log::error!("Error writing CSV: {}", e);
                        process::exit(1);
                    }
                }
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No rows to display.");
                    } else {
                        for (i, row) in rows.iter().enumerate() {
                            println!("{:>5}. {}", i + 1, row);
                        }
                    }
                }
            }
        }

        Commands::Stats { input, format } => {
            let (raw_rows, rows) = load_clean_rows(&input);
            let stats = DatasetStats::from_rows(raw_rows, &rows);
            let options = CategoryOptions::from_rows(&rows);

            match format {
                StatsFormat::Json => serialize_json(&serde_json::json!({
                    "stats": stats,
                    "options": options,
                })),
                StatsFormat::Text => {
                    print!("{}", stats);
                    println!("\nForm options:");
                    println!("  Brands:        {}", options.brands.join(", "));
                    println!("  Fuels:         {}", options.fuels.join(", "));
                    println!("  Transmissions: {}", options.transmissions.join(", "));
                    println!("  Drive units:   {}", options.drive_units.join(", "));
                    println!("  Locations:     {}", options.locations.len());
                }
            }
        }

        Commands::Predict {
            encodings,
            model,
            brand,
            car_model,
            year,
            engine_capacity,
            horse_power,
            fuel,
            transmission,
            drive_unit,
            mileage,
            location,
        } => {
            let table = EncodingTable::load(&encodings).unwrap_or_else(|e| {
                log::error!("Error loading encoding table: {}", e);
                process::exit(1);
            });
            let price_model = LinearPriceModel::load(&model).unwrap_or_else(|e| {
                log::error!("Error loading price model: {}", e);
                process::exit(1);
            });

            if !car_model.is_empty() && !table.models_for(&brand).contains(&car_model) {
                log::warn!("Model '{}' is not listed for brand '{}'", car_model, brand);
            }

            let form = PredictionForm {
                brand,
                model: car_model,
                year,
                engine_capacity,
                horse_power,
                fuel,
                transmission,
                drive_unit,
                mileage,
                location,
            };

            match estimate_price(&price_model, &table, &form) {
                Ok(price) => println!("Estimated price: {} ₽", price),
                Err(e) => {
                    log::debug!("Prediction rejected: {}", e);
                    println!("{}", INVALID_INPUT_MESSAGE);
                    process::exit(1);
                }
            }
        }
    }
}

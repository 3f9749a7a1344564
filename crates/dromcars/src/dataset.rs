use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::types::{NORMALIZED_COLUMNS, NormalizedListingRecord, RAW_COLUMNS, RawListingRecord};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Dataset file not found: {}", .0.display())]
    MissingAsset(PathBuf),
}

/// `cars_<YYYY-MM-DD>.csv`
pub fn dataset_file_name(date: NaiveDate) -> String {
    format!("cars_{}.csv", date.format("%Y-%m-%d"))
}

/// Append-only writer of raw rows, one file per crawl start date.
pub struct DatasetWriter<W: Write> {
    inner: csv::Writer<W>,
    rows_written: usize,
}

impl DatasetWriter<File> {
    /// Opens `dir/cars_<date>.csv` for appending. The header goes in only when the file is
    /// new or empty, so a second run on the same day keeps adding rows under one header.
    pub fn create(dir: &Path, date: NaiveDate) -> Result<(Self, PathBuf), DatasetError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(dataset_file_name(date));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        log::info!(
            "Writing rows to {} ({})",
            path.display(),
            if is_empty { "new file" } else { "appending" }
        );
        Ok((Self::new(file, is_empty)?, path))
    }
}

impl<W: Write> DatasetWriter<W> {
    pub fn new(writer: W, write_header: bool) -> Result<Self, DatasetError> {
        let mut inner = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if write_header {
            inner.write_record(RAW_COLUMNS)?;
        }
        Ok(Self {
            inner,
            rows_written: 0,
        })
    }

    pub fn append_row(&mut self, record: &RawListingRecord) -> Result<(), DatasetError> {
        self.inner.write_record(record.to_csv_record())?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DatasetError> {
        Ok(self.inner.flush()?)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn into_inner(self) -> Result<W, DatasetError> {
        self.inner
            .into_inner()
            .map_err(|e| DatasetError::Io(e.into_error()))
    }
}

/// Loads a raw dataset written by [`DatasetWriter`]. Empty cells come back as `None`.
pub fn read_raw_dataset(path: &Path) -> Result<Vec<RawListingRecord>, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::MissingAsset(path.to_path_buf()));
    }
    let records = read_raw_records(File::open(path)?)?;
    log::info!("Loaded {} raw rows from {}", records.len(), path.display());
    Ok(records)
}

pub fn read_raw_records<R: Read>(reader: R) -> Result<Vec<RawListingRecord>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

pub fn write_normalized<W: Write>(
    writer: W,
    rows: &[NormalizedListingRecord],
) -> Result<(), DatasetError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(NORMALIZED_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

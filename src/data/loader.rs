use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file"))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Data loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of records to load (0 = unlimited)
    pub max_records: usize,
    /// Columns removed before encoding (identifiers and the like)
    pub drop_columns: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_records: 0,
            drop_columns: Vec::new(),
        }
    }
}

/// Parsed but not yet encoded table
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Trimmed header names, dropped columns removed
    pub headers: Vec<String>,
    /// Rows aligned with `headers`
    pub rows: Vec<StringRecord>,
}

impl RawTable {
    /// Position of a column by exact header name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Data loader for patient tables
pub struct DataLoader {
    config: LoaderConfig,
}

impl DataLoader {
    /// Create new data loader with default config
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
        }
    }

    /// Create new data loader with custom config
    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load a table from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<RawTable> {
        let path = path.as_ref();
        info!("Loading data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path)
            .with_context(|| format!("Failed to open file {:?}", path))?;

        let table = if format.is_gzipped() {
            self.parse_records(BufReader::new(GzDecoder::new(file)), format)?
        } else {
            self.parse_records(BufReader::new(file), format)?
        };

        info!("Loaded {} rows with {} columns", table.len(), table.headers.len());
        Ok(table)
    }

    /// Parse records from reader
    pub fn parse_records<R: Read>(&self, reader: R, format: FileFormat) -> Result<RawTable> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .from_reader(reader);

        let all_headers: Vec<String> = csv_reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        debug!("Headers: {:?}", all_headers);

        for dropped in &self.config.drop_columns {
            if !all_headers.iter().any(|h| h == dropped) {
                warn!("Column to drop not present: {}", dropped);
            }
        }

        let kept: Vec<usize> = all_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !self.config.drop_columns.contains(h))
            .map(|(i, _)| i)
            .collect();
        let headers = kept.iter().map(|&i| all_headers[i].clone()).collect();

        let mut rows = Vec::new();
        for (index, result) in csv_reader.records().enumerate() {
            let record = result
                .with_context(|| format!("Failed to parse CSV record at line {}", index + 2))?;

            if record.len() != all_headers.len() {
                bail!(
                    "Line {}: expected {} fields, found {}",
                    index + 2,
                    all_headers.len(),
                    record.len()
                );
            }

            let row: StringRecord = kept.iter().map(|&i| &record[i]).collect();
            rows.push(row);

            if self.config.max_records > 0 && rows.len() >= self.config.max_records {
                warn!("Reached maximum record limit: {}", self.config.max_records);
                break;
            }
        }

        Ok(RawTable { headers, rows })
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

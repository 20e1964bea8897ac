use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use flate2::read::GzDecoder;
use polars::prelude::{DataFrame, DataType, ParquetReader, SerReader};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::DashboardError;
use crate::models::{EoiRecord, Points};

/// Immutable in-memory EOI table, built once and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<EoiRecord>,
}

impl Dataset {
    pub fn new(records: Vec<EoiRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrowed view over every record, or `NoDataLoaded` for an empty table.
    pub fn view(&self) -> Result<Vec<&EoiRecord>, DashboardError> {
        if self.records.is_empty() {
            return Err(DashboardError::NoDataLoaded);
        }
        Ok(self.records.iter().collect())
    }

    pub fn for_occupation(&self, occupation: &str) -> Vec<&EoiRecord> {
        self.records
            .iter()
            .filter(|record| record.occupation == occupation)
            .collect()
    }

    pub fn occupations(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| record.occupation.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    ZipCsv,
    GzipCsv,
    Csv,
}

/// Candidate input files relative to the data directory, highest priority first.
pub const CANDIDATES: [(&str, SourceFormat); 4] = [
    ("df_master.parquet", SourceFormat::Parquet),
    ("df_master.zip", SourceFormat::ZipCsv),
    ("df_master.csv.gz", SourceFormat::GzipCsv),
    ("data/df_master.csv", SourceFormat::Csv),
];

pub fn resolve_source(data_dir: &Path) -> Option<(PathBuf, SourceFormat)> {
    CANDIDATES
        .iter()
        .map(|(relative, format)| (data_dir.join(relative), *format))
        .find(|(path, _)| path.is_file())
}

pub fn load_from_dir(data_dir: &Path) -> anyhow::Result<Dataset> {
    let Some((path, format)) = resolve_source(data_dir) else {
        warn!(
            data_dir = %data_dir.display(),
            "no EOI table found, continuing with an empty dataset"
        );
        return Ok(Dataset::empty());
    };

    let records = match format {
        SourceFormat::Parquet => read_parquet(&path)?,
        SourceFormat::ZipCsv => read_zip(&path)?,
        SourceFormat::GzipCsv | SourceFormat::Csv => read_csv_path(&path)?,
    };

    info!(path = %path.display(), rows = records.len(), "loaded EOI table");
    Ok(Dataset::new(records))
}

/// One row as it appears in the source file, before normalization.
#[derive(Debug, serde::Deserialize)]
pub struct RawRow {
    pub ds: String,
    pub occupation: String,
    pub visa_type: String,
    pub eoi_status: String,
    pub points: String,
    pub count_eois: String,
}

impl RawRow {
    pub fn into_record(self) -> anyhow::Result<EoiRecord> {
        let timestamp = parse_period(&self.ds)?;
        let count_eois = parse_count(&self.count_eois)?;
        Ok(EoiRecord {
            timestamp,
            occupation: self.occupation.trim().to_string(),
            visa_type: self.visa_type.trim().to_string(),
            eoi_status: self.eoi_status.trim().to_string(),
            points: Points::parse(&self.points),
            count_eois,
        })
    }
}

/// Parses `ds` and truncates it to the first day of its month.
pub fn parse_period(raw: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = raw.trim();
    let date = match trimmed.get(..10) {
        Some(day) => NaiveDate::parse_from_str(day, "%Y-%m-%d").ok(),
        None => NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").ok(),
    };
    let date = date.with_context(|| format!("invalid ds value `{raw}`"))?;
    Ok(month_start(date))
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn parse_count(raw: &str) -> anyhow::Result<u64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Ok(value);
    }
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("invalid count_eois value `{raw}`"))?;
    if !value.is_finite() || value.fract() != 0.0 {
        bail!("invalid count_eois value `{raw}`");
    }
    if value < 0.0 {
        bail!("count_eois must be non-negative, got `{raw}`");
    }
    Ok(value as u64)
}

pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Vec<EoiRecord>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<RawRow>().enumerate() {
        let row = result.with_context(|| format!("failed to read CSV row {}", index + 1))?;
        let record = row
            .into_record()
            .with_context(|| format!("invalid CSV row {}", index + 1))?;
        records.push(record);
    }

    Ok(records)
}

/// Reads plain CSV, or gzip-compressed CSV when the file name ends in `.gz`.
pub fn read_csv_path(path: &Path) -> anyhow::Result<Vec<EoiRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let gzipped = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let records = if gzipped {
        read_csv(GzDecoder::new(file))
    } else {
        read_csv(file)
    };
    records.with_context(|| format!("failed to parse {}", path.display()))
}

/// Reads the first `.csv` member of a zip archive.
pub fn read_zip(path: &Path) -> anyhow::Result<Vec<EoiRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive {}", path.display()))?;

    let mut member = None;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".csv") {
            member = Some(index);
            break;
        }
    }
    let index = member.with_context(|| format!("no CSV member in {}", path.display()))?;

    let entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    read_csv(entry).with_context(|| format!("failed to parse {name} in {}", path.display()))
}

pub fn read_parquet(path: &Path) -> anyhow::Result<Vec<EoiRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("failed to read parquet {}", path.display()))?;

    let ds = text_column(&df, "ds")?;
    let occupation = text_column(&df, "occupation")?;
    let visa_type = text_column(&df, "visa_type")?;
    let eoi_status = text_column(&df, "eoi_status")?;
    let points = text_column(&df, "points")?;
    let count_eois = text_column(&df, "count_eois")?;

    let mut records = Vec::with_capacity(df.height());
    for index in 0..df.height() {
        let row = RawRow {
            ds: ds[index].clone(),
            occupation: occupation[index].clone(),
            visa_type: visa_type[index].clone(),
            eoi_status: eoi_status[index].clone(),
            points: points[index].clone(),
            count_eois: count_eois[index].clone(),
        };
        let record = row
            .into_record()
            .with_context(|| format!("invalid parquet row {}", index + 1))?;
        records.push(record);
    }

    Ok(records)
}

// Every column goes through its text form so parquet and CSV share one parser.
fn text_column(df: &DataFrame, name: &str) -> anyhow::Result<Vec<String>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column `{name}`"))?;
    let text = series.cast(&DataType::String)?;
    let values = text
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

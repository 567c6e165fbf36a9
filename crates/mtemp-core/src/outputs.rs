use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::{CsvWriter, DataFrame, PolarsError, SerWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dataset::InstrumentDataset;
use crate::pipeline::PipelineReport;
use crate::spatial::{SpatialDataset, SpatialError};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Polars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("failed to encode GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to build GeoJSON: {0}")]
    Spatial(#[from] SpatialError),
    #[error("unknown output format '{0}' (expected parquet or csv)")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, OutputError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(OutputFormat::Parquet),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(OutputError::UnknownFormat(other.to_string())),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn write_frame(df: &DataFrame, path: &Path, format: OutputFormat) -> Result<()> {
    let mut writer = create(path)?;
    let mut clone = df.clone();
    let encoded = match format {
        OutputFormat::Parquet => ParquetWriter::new(&mut writer)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)
            .map(|_| ()),
        OutputFormat::Csv => CsvWriter::new(&mut writer)
            .include_header(true)
            .finish(&mut clone),
    };
    encoded.map_err(|source| OutputError::Polars {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_dataset(dataset: &InstrumentDataset, path: &Path, format: OutputFormat) -> Result<()> {
    write_frame(&dataset.df, path, format)?;
    info!(path = %path.display(), rows = dataset.height(), %format, "Wrote {}", dataset.name);
    Ok(())
}

pub fn write_spatial(spatial: &SpatialDataset, path: &Path, format: OutputFormat) -> Result<()> {
    write_frame(&spatial.df, path, format)?;
    info!(path = %path.display(), rows = spatial.height(), %format, "Wrote {}", spatial.name);
    Ok(())
}

pub fn write_geojson(spatial: &SpatialDataset, path: &Path) -> Result<()> {
    let collection = spatial.to_geojson()?;
    let writer = create(path)?;
    serde_json::to_writer_pretty(writer, &collection)?;
    info!(path = %path.display(), features = collection.features.len(), "Wrote GeoJSON");
    Ok(())
}

/// Writes every table in `report` into `dir` as `<name>.<ext>`, plus
/// `spatial.geojson`. Returns the paths written.
pub fn write_report(report: &PipelineReport, dir: &Path, format: OutputFormat) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (name, dataset) in report.datasets() {
        let path = dir.join(format!("{name}.{}", format.extension()));
        write_dataset(dataset, &path, format)?;
        written.push(path);
    }

    if let Some(spatial) = &report.spatial {
        let path = dir.join(format!("spatial.{}", format.extension()));
        write_spatial(spatial, &path, format)?;
        written.push(path);

        let path = dir.join("spatial.geojson");
        write_geojson(spatial, &path)?;
        written.push(path);
    }

    Ok(written)
}

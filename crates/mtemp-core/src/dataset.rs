use std::fmt;
use std::path::PathBuf;

use chrono::NaiveTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::channels::Channel;

/// Name of the time-of-day index column shared by every normalized dataset.
pub const TIME_COLUMN: &str = "time";

const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub(crate) const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentKind {
    Temperature,
    IrRh,
    Gps,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Temperature => "temperature",
            InstrumentKind::IrRh => "irrh",
            InstrumentKind::Gps => "gps",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of one raw input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub blake3: String,
    pub parser: String,
}

/// A time-indexed table: a unique, increasing `time` column followed by
/// channel columns. Transforms never mutate a dataset; they return a new one.
#[derive(Debug, Clone)]
pub struct InstrumentDataset {
    pub name: String,
    pub sources: Vec<SourceFile>,
    pub df: DataFrame,
}

impl InstrumentDataset {
    pub fn new(name: impl Into<String>, sources: Vec<SourceFile>, df: DataFrame) -> Self {
        Self {
            name: name.into(),
            sources,
            df,
        }
    }

    /// Builds a dataset from whole seconds since midnight and labelled
    /// `Float64` columns.
    pub fn from_columns(
        name: impl Into<String>,
        seconds: Vec<i64>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> PolarsResult<Self> {
        let mut cols = Vec::with_capacity(columns.len() + 1);
        cols.push(time_column_from_seconds(seconds)?);
        for (label, values) in columns {
            cols.push(Series::new(label.as_str().into(), values).into());
        }
        Ok(Self::new(name, Vec::new(), DataFrame::new(cols)?))
    }

    /// Same name and provenance, different table.
    pub fn with_frame(&self, df: DataFrame) -> Self {
        Self {
            name: self.name.clone(),
            sources: self.sources.clone(),
            df,
        }
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    /// Columns that parse as a [`Channel`], in frame order.
    pub fn channels(&self) -> Vec<Channel> {
        self.df
            .get_column_names()
            .into_iter()
            .filter_map(|name| Channel::parse(name.as_str()))
            .collect()
    }

    pub fn has_channel(&self, channel: &Channel) -> bool {
        self.has_column(&channel.label())
    }

    pub fn f64_values(&self, name: &str) -> PolarsResult<Vec<Option<f64>>> {
        let column = self.df.column(name)?.cast(&DataType::Float64)?;
        Ok(column.f64()?.into_iter().collect())
    }

    pub fn time_seconds(&self) -> PolarsResult<Vec<Option<i64>>> {
        time_seconds(&self.df)
    }

    pub fn time_range(&self) -> Option<(NaiveTime, NaiveTime)> {
        let seconds = self.time_seconds().ok()?;
        let first = seconds.iter().flatten().next().copied()?;
        let last = seconds.iter().flatten().last().copied()?;
        Some((naive_time(first)?, naive_time(last)?))
    }

    /// `"name (path, ...)"`, used in error context.
    pub fn describe(&self) -> String {
        if self.sources.is_empty() {
            return self.name.clone();
        }
        let paths: Vec<String> = self
            .sources
            .iter()
            .map(|source| source.path.display().to_string())
            .collect();
        format!("{} ({})", self.name, paths.join(", "))
    }
}

pub fn time_column_from_seconds(seconds: Vec<i64>) -> PolarsResult<Column> {
    let nanos: Vec<i64> = seconds.iter().map(|s| s * NANOS_PER_SECOND).collect();
    Ok(Series::new(TIME_COLUMN.into(), nanos)
        .cast(&DataType::Time)?
        .into())
}

pub(crate) fn time_seconds(df: &DataFrame) -> PolarsResult<Vec<Option<i64>>> {
    let nanos = df.column(TIME_COLUMN)?.cast(&DataType::Int64)?;
    Ok(nanos
        .i64()?
        .into_iter()
        .map(|value| value.map(|ns| ns.div_euclid(NANOS_PER_SECOND)))
        .collect())
}

pub fn naive_time(seconds: i64) -> Option<NaiveTime> {
    let seconds = u32::try_from(seconds.rem_euclid(SECONDS_PER_DAY)).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
}

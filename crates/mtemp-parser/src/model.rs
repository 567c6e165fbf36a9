use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::formats::schema::{SAMPLE_COLUMN, TIMESTAMP_COLUMN};

/// Key/value pairs from the metadata block at the top of a DAQ log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    entries: BTreeMap<String, String>,
}

impl FileMetadata {
    pub const SERIAL_NUMBER: &'static str = "Serial Number";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.get(Self::SERIAL_NUMBER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FileMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = FileMetadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

/// A DAQ table as written by the instrument.
///
/// `df` holds a `timestamp` column (naive wall-clock `Datetime`), an optional
/// `sample` counter and one `Float64` column per analog input, still named with
/// the raw channel label (for example `AI0 (°C)`).
#[derive(Debug, Clone)]
pub struct DaqFile {
    pub parser: &'static str,
    pub file_metadata: FileMetadata,
    /// 1-indexed line number of the first data row.
    pub first_data_line: usize,
    pub df: DataFrame,
}

impl DaqFile {
    pub fn channel_labels(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != TIMESTAMP_COLUMN && name.as_str() != SAMPLE_COLUMN)
            .map(|name| name.to_string())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.df.height()
    }
}

/// A GPS track with `timestamp` (UTC `Datetime`), `Latitude` and `Longitude`.
#[derive(Debug, Clone)]
pub struct GpsFile {
    pub parser: &'static str,
    pub first_data_line: usize,
    pub df: DataFrame,
}

impl GpsFile {
    pub fn row_count(&self) -> usize {
        self.df.height()
    }
}

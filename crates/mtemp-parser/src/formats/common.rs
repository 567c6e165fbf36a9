use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};
use csv::StringRecord;
use polars::prelude::*;

use super::schema::{
    LATITUDE_COLUMN, LONGITUDE_COLUMN, RAW_DATE_TIME, RAW_SAMPLE, SAMPLE_COLUMN, TIMESTAMP_COLUMN,
};
use crate::errors::ParserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaqColumnRole {
    DateTime,
    Sample,
    Channel(String),
    /// Unlabelled column produced by trailing delimiters.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct DaqColumns {
    pub timestamp: Vec<i64>,
    pub sample: Option<Vec<Option<i64>>>,
    pub channels: Vec<(String, Vec<Option<f64>>)>,
}

impl DaqColumns {
    pub fn new(roles: &[DaqColumnRole]) -> Self {
        let channels = roles
            .iter()
            .filter_map(|role| match role {
                DaqColumnRole::Channel(label) => Some((label.clone(), Vec::new())),
                _ => None,
            })
            .collect();
        let sample = roles
            .iter()
            .any(|role| *role == DaqColumnRole::Sample)
            .then(Vec::new);
        Self {
            timestamp: Vec::new(),
            sample,
            channels,
        }
    }

    pub fn row_count(&self) -> usize {
        self.timestamp.len()
    }
}

pub(crate) fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

/// Splits a `Key: Value` metadata line. Quotes and trailing delimiters that
/// spreadsheet exports add around the line are removed.
pub(crate) fn parse_metadata_line(line: &str) -> Option<(String, String)> {
    let cleaned: String = line.trim().trim_end_matches(',').replace('"', "");
    let (key, value) = cleaned.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

pub(crate) fn classify_daq_header(
    parser: &'static str,
    header: &StringRecord,
    row_index: usize,
) -> Result<Vec<DaqColumnRole>, ParserError> {
    let mut roles = Vec::with_capacity(header.len());
    let mut seen = HashSet::new();
    let mut has_date_time = false;

    for label in header.iter() {
        let trimmed = label.trim();
        let role = if trimmed.is_empty() {
            DaqColumnRole::Ignored
        } else if trimmed.eq_ignore_ascii_case(RAW_DATE_TIME) {
            has_date_time = true;
            DaqColumnRole::DateTime
        } else if trimmed.eq_ignore_ascii_case(RAW_SAMPLE) {
            DaqColumnRole::Sample
        } else {
            DaqColumnRole::Channel(trimmed.to_string())
        };

        if role != DaqColumnRole::Ignored && !seen.insert(trimmed.to_ascii_lowercase()) {
            return Err(ParserError::InvalidHeader {
                parser,
                row_index,
                message: format!("duplicate column '{trimmed}'"),
            });
        }
        roles.push(role);
    }

    if !has_date_time {
        return Err(ParserError::FormatMismatch {
            parser,
            reason: format!("column header row has no '{RAW_DATE_TIME}' column"),
        });
    }

    Ok(roles)
}

/// Reads the data rows that follow a DAQ column header.
///
/// `line_offset` is the number of physical lines that precede the input the
/// `records` were read from, so errors point at the line in the original file.
pub(crate) fn read_daq_rows<I>(
    parser: &'static str,
    roles: &[DaqColumnRole],
    records: I,
    line_offset: usize,
) -> Result<DaqColumns, ParserError>
where
    I: Iterator<Item = Result<StringRecord, csv::Error>>,
{
    let mut columns = DaqColumns::new(roles);

    for record in records {
        let record = record.map_err(|source| ParserError::Csv { parser, source })?;
        let line_index = line_offset
            + record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(columns.row_count() + 2);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let mut channel_idx = 0usize;
        for (idx, role) in roles.iter().enumerate() {
            let value = record.get(idx).unwrap_or("");
            match role {
                DaqColumnRole::DateTime => {
                    let micros = parse_daq_timestamp(parser, value, line_index)?;
                    columns.timestamp.push(micros);
                }
                DaqColumnRole::Sample => {
                    let parsed = parse_optional_i64(parser, value, line_index, RAW_SAMPLE)?;
                    if let Some(samples) = columns.sample.as_mut() {
                        samples.push(parsed);
                    }
                }
                DaqColumnRole::Channel(label) => {
                    let parsed = parse_optional_f64(parser, value, line_index, label)?;
                    columns.channels[channel_idx].1.push(parsed);
                    channel_idx += 1;
                }
                DaqColumnRole::Ignored => {}
            }
        }
    }

    if columns.row_count() == 0 {
        return Err(ParserError::EmptyData { parser });
    }

    Ok(columns)
}

pub(crate) fn build_daq_dataframe(
    parser: &'static str,
    columns: DaqColumns,
) -> Result<DataFrame, ParserError> {
    let rows = columns.row_count();
    let mut cols: Vec<Column> = Vec::with_capacity(columns.channels.len() + 2);
    cols.push(datetime_column(parser, TIMESTAMP_COLUMN, columns.timestamp)?);

    if let Some(samples) = columns.sample {
        cols.push(Series::new(SAMPLE_COLUMN.into(), samples).into());
    }

    for (label, values) in columns.channels {
        if values.len() != rows {
            return Err(ParserError::Validation {
                parser,
                message: format!(
                    "channel '{label}' had {} rows, expected {rows}",
                    values.len()
                ),
            });
        }
        cols.push(Series::new(label.as_str().into(), values).into());
    }

    DataFrame::new(cols).map_err(|err| ParserError::Validation {
        parser,
        message: format!("failed to build DAQ dataframe: {err}"),
    })
}

pub(crate) fn build_gps_dataframe(
    parser: &'static str,
    timestamp: Vec<i64>,
    latitude: Vec<Option<f64>>,
    longitude: Vec<Option<f64>>,
) -> Result<DataFrame, ParserError> {
    let cols: Vec<Column> = vec![
        datetime_column(parser, TIMESTAMP_COLUMN, timestamp)?,
        Series::new(LATITUDE_COLUMN.into(), latitude).into(),
        Series::new(LONGITUDE_COLUMN.into(), longitude).into(),
    ];
    DataFrame::new(cols).map_err(|err| ParserError::Validation {
        parser,
        message: format!("failed to build GPS dataframe: {err}"),
    })
}

fn datetime_column(
    parser: &'static str,
    name: &str,
    micros: Vec<i64>,
) -> Result<Column, ParserError> {
    Series::new(name.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map(Column::from)
        .map_err(|err| ParserError::Validation {
            parser,
            message: format!("failed to cast {name} column: {err}"),
        })
}

const DAQ_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S%.f %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    DAQ_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a DAQ `Date/Time` cell into wall-clock microseconds.
pub(crate) fn parse_daq_timestamp(
    parser: &'static str,
    value: &str,
    line_index: usize,
) -> Result<i64, ParserError> {
    let trimmed = value.trim();
    parse_naive(trimmed)
        .map(|dt| dt.and_utc().timestamp_micros())
        .ok_or_else(|| ParserError::MalformedTimestamp {
            parser,
            line_index,
            value: trimmed.to_string(),
        })
}

/// GPS receivers log UTC. Offsets, when present, are honoured; naive values
/// are taken as UTC.
pub(crate) fn parse_gps_timestamp(
    parser: &'static str,
    value: &str,
    line_index: usize,
) -> Result<i64, ParserError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc().and_utc().timestamp_micros());
    }
    let without_zulu = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    parse_naive(without_zulu)
        .map(|dt| dt.and_utc().timestamp_micros())
        .ok_or_else(|| ParserError::MalformedTimestamp {
            parser,
            line_index,
            value: trimmed.to_string(),
        })
}

pub(crate) fn parse_optional_i64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<i64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|err| ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as integer: {err}"),
        })
}

pub(crate) fn parse_optional_f64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
        Ok(_) => Ok(None),
        Err(err) => Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as float: {err}"),
        }),
    }
}

//! Per-instrument loaders: read a raw file, label its channels and return a
//! time-indexed [`InstrumentDataset`].

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveTime, Timelike};
use chrono_tz::Tz;
use mtemp_parser::formats::schema::{LATITUDE_COLUMN, LONGITUDE_COLUMN, TIMESTAMP_COLUMN};
use mtemp_parser::formats::{DaqExportParser, DaqLogParser};
use mtemp_parser::{parse_gps_file, parse_with_parsers, DaqFile, DaqParser, ParserError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::carts::{CartId, CartRegistry, HardwareConfig, RegistryError, Wiring};
use crate::channels::{Channel, Height, Sensor, Unit};
use crate::conversions::{append_fahrenheit, append_infrared, ConversionError};
use crate::dataset::{
    naive_time, time_column_from_seconds, InstrumentDataset, InstrumentKind, SourceFile,
    SECONDS_PER_DAY, TIME_COLUMN,
};
use crate::smoothing::{append_smoothed, SmoothingError, DEFAULT_WINDOW};

const MICROS_PER_SECOND: i64 = 1_000_000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParserError,
    },

    #[error("cannot label channels in {path}: {source}")]
    Registry {
        path: PathBuf,
        #[source]
        source: RegistryError,
    },

    #[error("{path} has no serial number and no cart was given")]
    MissingSerialNumber { path: PathBuf },

    #[error("{path} is missing expected column '{expected}' (found: {found:?})")]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: Vec<String>,
    },

    #[error("{path} line {line}: unparseable timestamp '{value}'")]
    MalformedTimestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("{path} row {row}: time {current} is earlier than the previous row ({previous})")]
    NonMonotonicTime {
        path: PathBuf,
        row: usize,
        previous: NaiveTime,
        current: NaiveTime,
    },

    #[error("{path} has more than one reading at {time}")]
    DuplicateTimestamp { path: PathBuf, time: NaiveTime },

    #[error("{path} row {row}: coordinate ({latitude}, {longitude}) is out of range")]
    InvalidCoordinate {
        path: PathBuf,
        row: usize,
        latitude: f64,
        longitude: f64,
    },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("conversion failed for {path}: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: ConversionError,
    },

    #[error("smoothing failed for {path}: {source}")]
    Smoothing {
        path: PathBuf,
        #[source]
        source: SmoothingError,
    },

    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// What to do with several readings that fall in the same second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the last reading of each second.
    #[default]
    KeepLast,
    Reject,
}

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub header_lines: usize,
    pub duplicates: DuplicatePolicy,
    pub smoothing_window: usize,
    pub gps_timezone: Tz,
    pub registry: CartRegistry,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            header_lines: mtemp_parser::formats::schema::DEFAULT_DAQ_HEADER_LINES,
            duplicates: DuplicatePolicy::default(),
            smoothing_window: DEFAULT_WINDOW,
            gps_timezone: Tz::UTC,
            registry: CartRegistry::default(),
        }
    }
}

impl LoaderOptions {
    /// Sets the zone GPS timestamps are shifted into, by IANA name.
    pub fn with_gps_timezone(mut self, name: &str) -> Result<Self> {
        self.gps_timezone = name
            .trim()
            .parse::<Tz>()
            .map_err(|_| LoadError::InvalidTimezone(name.to_string()))?;
        Ok(self)
    }
}

pub trait InstrumentLoader {
    fn kind(&self) -> InstrumentKind;

    /// `cart` overrides the serial number recorded in the file.
    fn load(&self, path: &Path, cart: Option<CartId>) -> Result<InstrumentDataset>;
}

pub struct TemperatureLoader<'a> {
    options: &'a LoaderOptions,
}

pub struct IrRhLoader<'a> {
    options: &'a LoaderOptions,
}

pub struct GpsLoader<'a> {
    options: &'a LoaderOptions,
}

impl<'a> TemperatureLoader<'a> {
    pub fn new(options: &'a LoaderOptions) -> Self {
        Self { options }
    }
}

impl<'a> IrRhLoader<'a> {
    pub fn new(options: &'a LoaderOptions) -> Self {
        Self { options }
    }
}

impl<'a> GpsLoader<'a> {
    pub fn new(options: &'a LoaderOptions) -> Self {
        Self { options }
    }
}

pub fn loader_for(kind: InstrumentKind, options: &LoaderOptions) -> Box<dyn InstrumentLoader + '_> {
    match kind {
        InstrumentKind::Temperature => Box::new(TemperatureLoader::new(options)),
        InstrumentKind::IrRh => Box::new(IrRhLoader::new(options)),
        InstrumentKind::Gps => Box::new(GpsLoader::new(options)),
    }
}

/// Column order of a normalized temperature file. Backup probes are only
/// present on files that carry all eight inputs.
fn temperature_layout(with_backups: bool) -> Vec<Channel> {
    let primary = |tenths| Channel::temperature(Height::from_tenths(tenths), Sensor::Primary, Unit::Celsius);
    let backup = |tenths| Channel::temperature(Height::from_tenths(tenths), Sensor::Backup, Unit::Celsius);
    if with_backups {
        vec![
            primary(6),
            primary(18),
            primary(36),
            backup(36),
            primary(54),
            backup(54),
            primary(72),
            primary(90),
        ]
    } else {
        vec![primary(6), primary(18), primary(36), primary(54), primary(72), primary(90)]
    }
}

impl InstrumentLoader for TemperatureLoader<'_> {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Temperature
    }

    fn load(&self, path: &Path, cart: Option<CartId>) -> Result<InstrumentDataset> {
        let raw = read_source(path)?;
        let parsed = parse_daq(path, &raw.content, self.options.header_lines)?;
        let source = raw.into_source(path, parsed.parser);
        let labelled = label_daq(path, &parsed, cart, self.kind(), &self.options.registry)?;
        ensure_monotonic(path, &labelled.seconds)?;

        let has_backups = labelled.has(&Channel::temperature(
            Height::from_tenths(36),
            Sensor::Backup,
            Unit::Celsius,
        ));
        let mut columns = Vec::new();
        for channel in temperature_layout(has_backups) {
            let column = labelled.take(&channel).ok_or_else(|| LoadError::SchemaMismatch {
                path: path.to_path_buf(),
                expected: channel.label(),
                found: labelled.labels(),
            })?;
            columns.push(column);
        }

        let dataset = assemble(self.kind(), source, &labelled.seconds, columns)?;
        let dataset = append_fahrenheit(&dataset).map_err(|source| LoadError::Conversion {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = collapse_duplicates(path, dataset, &labelled.seconds, self.options.duplicates)?;
        Ok(finish(path, dataset, labelled.seconds.len()))
    }
}

impl InstrumentLoader for IrRhLoader<'_> {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::IrRh
    }

    fn load(&self, path: &Path, cart: Option<CartId>) -> Result<InstrumentDataset> {
        let raw = read_source(path)?;
        let parsed = parse_daq(path, &raw.content, self.options.header_lines)?;
        let source = raw.into_source(path, parsed.parser);
        let labelled = label_daq(path, &parsed, cart, self.kind(), &self.options.registry)?;
        ensure_monotonic(path, &labelled.seconds)?;

        if !labelled.has(&Channel::InfraredRaw) {
            return Err(LoadError::SchemaMismatch {
                path: path.to_path_buf(),
                expected: Channel::InfraredRaw.label(),
                found: labelled.labels(),
            });
        }

        let seconds = labelled.seconds.clone();
        let dataset = assemble(self.kind(), source, &seconds, labelled.columns)?;
        let dataset = append_infrared(&dataset).map_err(|source| LoadError::Conversion {
            path: path.to_path_buf(),
            source,
        })?;
        // The smoothing window counts output rows, so collapse first.
        let dataset = collapse_duplicates(path, dataset, &seconds, self.options.duplicates)?;
        let dataset = append_smoothed(
            &dataset,
            &Channel::Infrared.label(),
            &Channel::SmoothedInfrared.label(),
            self.options.smoothing_window,
        )
        .map_err(|source| LoadError::Smoothing {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(finish(path, dataset, seconds.len()))
    }
}

impl InstrumentLoader for GpsLoader<'_> {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Gps
    }

    fn load(&self, path: &Path, _cart: Option<CartId>) -> Result<InstrumentDataset> {
        let raw = read_source(path)?;
        let parsed = parse_gps_file(&raw.content).map_err(|err| parse_error(path, err))?;
        let source = raw.into_source(path, parsed.parser);

        let micros = parsed.df.column(TIMESTAMP_COLUMN)?.cast(&DataType::Int64)?;
        let latitudes: Vec<Option<f64>> = parsed.df.column(LATITUDE_COLUMN)?.f64()?.into_iter().collect();
        let longitudes: Vec<Option<f64>> = parsed.df.column(LONGITUDE_COLUMN)?.f64()?.into_iter().collect();

        for (row, (lat, lon)) in latitudes.iter().zip(longitudes.iter()).enumerate() {
            if let (Some(lat), Some(lon)) = (lat, lon) {
                if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
                    return Err(LoadError::InvalidCoordinate {
                        path: path.to_path_buf(),
                        row: row + parsed.first_data_line,
                        latitude: *lat,
                        longitude: *lon,
                    });
                }
            }
        }

        let tz = self.options.gps_timezone;
        let mut seconds = Vec::with_capacity(micros.len());
        for (row, value) in micros.i64()?.into_iter().enumerate() {
            let local = value
                .and_then(DateTime::from_timestamp_micros)
                .map(|utc| utc.with_timezone(&tz).time());
            let Some(local) = local else {
                return Err(LoadError::MalformedTimestamp {
                    path: path.to_path_buf(),
                    line: row + parsed.first_data_line,
                    value: value.map(|v| v.to_string()).unwrap_or_default(),
                });
            };
            seconds.push(i64::from(local.num_seconds_from_midnight()));
        }
        ensure_monotonic(path, &seconds)?;

        let columns: Vec<Column> = vec![
            Series::new(LATITUDE_COLUMN.into(), latitudes).into(),
            Series::new(LONGITUDE_COLUMN.into(), longitudes).into(),
        ];
        let dataset = assemble(self.kind(), source, &seconds, columns)?;
        let dataset = collapse_duplicates(path, dataset, &seconds, self.options.duplicates)?;
        Ok(finish(path, dataset, seconds.len()))
    }
}

struct RawSource {
    content: String,
    blake3: String,
}

impl RawSource {
    fn into_source(self, path: &Path, parser: &str) -> SourceFile {
        SourceFile {
            path: path.to_path_buf(),
            blake3: self.blake3,
            parser: parser.to_string(),
        }
    }
}

fn read_source(path: &Path) -> Result<RawSource> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LoadError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;
    let blake3 = blake3::hash(&bytes).to_hex().to_string();
    let content = decode_text(bytes);
    Ok(RawSource { content, blake3 })
}

/// UTF-8 if valid, otherwise Latin-1 (older DAQ exports write `°` as 0xB0).
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!("Input is not UTF-8, decoding as Latin-1");
            err.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    }
}

fn parse_error(path: &Path, err: ParserError) -> LoadError {
    match err {
        ParserError::MalformedTimestamp {
            line_index, value, ..
        } => LoadError::MalformedTimestamp {
            path: path.to_path_buf(),
            line: line_index,
            value,
        },
        source => LoadError::Parse {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn parse_daq(path: &Path, content: &str, header_lines: usize) -> Result<DaqFile> {
    let daq_log = DaqLogParser::new(header_lines);
    let daq_export = DaqExportParser;
    let parsers: [&dyn DaqParser; 2] = [&daq_log, &daq_export];
    parse_with_parsers(content, &parsers).map_err(|err| parse_error(path, err))
}

/// Channel columns of a DAQ file after labelling, with the per-row time of
/// day in seconds.
struct LabelledChannels {
    seconds: Vec<i64>,
    columns: Vec<Column>,
}

impl LabelledChannels {
    fn labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    fn has(&self, channel: &Channel) -> bool {
        let label = channel.label();
        self.columns.iter().any(|c| c.name().as_str() == label)
    }

    fn take(&self, channel: &Channel) -> Option<Column> {
        let label = channel.label();
        self.columns.iter().find(|c| c.name().as_str() == label).cloned()
    }
}

/// Older exports call the lowest temperature probe 0.0 ft. Renamed to 0.6 ft
/// unless the file also has a real 0.6 ft probe of the same sensor and unit.
fn alias_lowest_probe(mapping: &mut [(String, Option<Channel>)]) {
    let lowest = Height::from_tenths(6);
    let taken: HashSet<Channel> = mapping.iter().filter_map(|(_, channel)| *channel).collect();
    for (_, channel) in mapping.iter_mut() {
        let Some(Channel::Temperature {
            height,
            sensor,
            unit,
        }) = *channel
        else {
            continue;
        };
        if height.tenths() != 0 {
            continue;
        }
        let alias = Channel::Temperature {
            height: lowest,
            sensor,
            unit,
        };
        if !taken.contains(&alias) {
            *channel = Some(alias);
        }
    }
}

fn resolve_wiring(
    path: &Path,
    parsed: &DaqFile,
    cart: Option<CartId>,
    kind: InstrumentKind,
    registry: &CartRegistry,
) -> Result<&'static Wiring> {
    let cart = match cart {
        Some(cart) => cart,
        None => {
            let serial = parsed
                .file_metadata
                .serial_number()
                .ok_or_else(|| LoadError::MissingSerialNumber {
                    path: path.to_path_buf(),
                })?;
            registry
                .cart_for_serial(serial)
                .map_err(|source| LoadError::Registry {
                    path: path.to_path_buf(),
                    source,
                })?
        }
    };
    debug!(path = %path.display(), %cart, instrument = %kind, "Applying channel wiring");
    registry
        .wiring(HardwareConfig {
            cart,
            instrument: kind,
        })
        .map_err(|source| LoadError::Registry {
            path: path.to_path_buf(),
            source,
        })
}

/// Columns whose header already names a position keep it; the rest go
/// through the cart wiring, which is only looked up when needed.
fn label_daq(
    path: &Path,
    parsed: &DaqFile,
    cart: Option<CartId>,
    kind: InstrumentKind,
    registry: &CartRegistry,
) -> Result<LabelledChannels> {
    let raw_labels = parsed.channel_labels();
    let prelabelled: Vec<Option<Channel>> = raw_labels.iter().map(|raw| Channel::parse(raw)).collect();
    let any_prelabelled = prelabelled.iter().any(Option::is_some);

    let wiring = if prelabelled.iter().any(Option::is_none) {
        match resolve_wiring(path, parsed, cart, kind, registry) {
            Ok(wiring) => Some(wiring),
            Err(err) if any_prelabelled => {
                debug!(path = %path.display(), error = %err, "No wiring for unlabelled columns");
                None
            }
            Err(err) => return Err(err),
        }
    } else {
        debug!(path = %path.display(), "Channels already carry positions; skipping wiring lookup");
        None
    };

    let mut mapping: Vec<(String, Option<Channel>)> = raw_labels
        .into_iter()
        .zip(prelabelled)
        .map(|(raw, channel)| {
            let channel = channel.or_else(|| wiring.and_then(|w| w.channel_for(&raw)));
            (raw, channel)
        })
        .collect();
    if kind == InstrumentKind::Temperature {
        alias_lowest_probe(&mut mapping);
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for (raw, channel) in mapping {
        let Some(channel) = channel else {
            debug!(path = %path.display(), column = %raw, "Dropping unmapped column");
            continue;
        };
        let label = channel.label();
        if !seen.insert(label.clone()) {
            warn!(path = %path.display(), column = %raw, channel = %label, "Channel appears twice; keeping the first");
            continue;
        }
        let series = parsed
            .df
            .column(&raw)?
            .as_materialized_series()
            .cast(&DataType::Float64)?
            .with_name(label.as_str().into());
        columns.push(series.into());
    }

    let micros = parsed.df.column(TIMESTAMP_COLUMN)?.cast(&DataType::Int64)?;
    let seconds = micros
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(|us| us.div_euclid(MICROS_PER_SECOND).rem_euclid(SECONDS_PER_DAY))
                .ok_or_else(|| LoadError::MalformedTimestamp {
                    path: path.to_path_buf(),
                    line: row + parsed.first_data_line,
                    value: String::new(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LabelledChannels { seconds, columns })
}

fn ensure_monotonic(path: &Path, seconds: &[i64]) -> Result<()> {
    for (row, pair) in seconds.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(LoadError::NonMonotonicTime {
                path: path.to_path_buf(),
                row: row + 1,
                previous: naive_time(pair[0]).unwrap_or_default(),
                current: naive_time(pair[1]).unwrap_or_default(),
            });
        }
    }
    Ok(())
}

fn assemble(
    kind: InstrumentKind,
    source: SourceFile,
    seconds: &[i64],
    columns: Vec<Column>,
) -> Result<InstrumentDataset> {
    let mut all = Vec::with_capacity(columns.len() + 1);
    all.push(time_column_from_seconds(seconds.to_vec())?);
    all.extend(columns);
    Ok(InstrumentDataset::new(kind.as_str(), vec![source], DataFrame::new(all)?))
}

fn finish(path: &Path, dataset: InstrumentDataset, rows_read: usize) -> InstrumentDataset {
    info!(
        path = %path.display(),
        instrument = %dataset.name,
        rows = dataset.height(),
        rows_read,
        columns = dataset.df.width(),
        "Loaded instrument file"
    );
    dataset
}

fn collapse_duplicates(
    path: &Path,
    dataset: InstrumentDataset,
    seconds: &[i64],
    policy: DuplicatePolicy,
) -> Result<InstrumentDataset> {
    let last_of_each_second: Vec<IdxSize> = (0..seconds.len())
        .filter(|&i| i + 1 == seconds.len() || seconds[i + 1] != seconds[i])
        .map(|i| i as IdxSize)
        .collect();

    if last_of_each_second.len() == seconds.len() {
        return Ok(dataset);
    }

    match policy {
        DuplicatePolicy::Reject => {
            let duplicate = seconds
                .windows(2)
                .find(|pair| pair[0] == pair[1])
                .map(|pair| pair[0])
                .unwrap_or_default();
            Err(LoadError::DuplicateTimestamp {
                path: path.to_path_buf(),
                time: naive_time(duplicate).unwrap_or_default(),
            })
        }
        DuplicatePolicy::KeepLast => {
            debug!(
                path = %path.display(),
                dropped = seconds.len() - last_of_each_second.len(),
                "Collapsed readings sharing a second"
            );
            let idx = IdxCa::from_vec("idx".into(), last_of_each_second);
            let df = dataset.df.take(&idx)?;
            Ok(dataset.with_frame(df))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_layout_orders_by_height() {
        let labels: Vec<String> = temperature_layout(true).iter().map(Channel::label).collect();
        assert_eq!(
            labels,
            vec![
                "0.6 ft (°C)",
                "1.8 ft (°C)",
                "3.6 ft (°C)",
                "3.6 ft b (°C)",
                "5.4 ft (°C)",
                "5.4 ft b (°C)",
                "7.2 ft (°C)",
                "9.0 ft (°C)"
            ]
        );
        assert_eq!(temperature_layout(false).len(), 6);
    }

    fn mapping(raw: &[&str]) -> Vec<(String, Option<Channel>)> {
        raw.iter()
            .map(|label| (label.to_string(), Channel::parse(label)))
            .collect()
    }

    fn labels(mapping: &[(String, Option<Channel>)]) -> Vec<Option<String>> {
        mapping.iter().map(|(_, c)| c.map(|c| c.label())).collect()
    }

    #[test]
    fn zero_foot_probe_is_aliased() {
        let mut columns = mapping(&["0.0 ft (°C)", "1.8 ft (°C)", "Raw RH 0.0 ft (V)"]);
        alias_lowest_probe(&mut columns);
        assert_eq!(
            labels(&columns),
            vec![
                Some("0.6 ft (°C)".to_string()),
                Some("1.8 ft (°C)".to_string()),
                Some("Raw RH 0.0 ft (V)".to_string())
            ]
        );
    }

    #[test]
    fn zero_foot_probe_keeps_its_label_next_to_a_real_one() {
        let mut columns = mapping(&["0.0 ft (°C)", "0.6 ft (°C)", "0.0 ft b (°C)"]);
        alias_lowest_probe(&mut columns);
        assert_eq!(
            labels(&columns),
            vec![
                Some("0.0 ft (°C)".to_string()),
                Some("0.6 ft (°C)".to_string()),
                Some("0.6 ft b (°C)".to_string())
            ]
        );
    }

    #[test]
    fn latin1_degree_sign_is_decoded() {
        assert_eq!(decode_text(b"AI0 (\xb0C)".to_vec()), "AI0 (°C)");
        assert_eq!(decode_text("1.8 ft (°C)".as_bytes().to_vec()), "1.8 ft (°C)");
    }

    #[test]
    fn backwards_time_is_rejected() {
        let err = ensure_monotonic(Path::new("t.csv"), &[1, 2, 2, 1]).unwrap_err();
        assert!(matches!(err, LoadError::NonMonotonicTime { row: 3, .. }));
    }
}

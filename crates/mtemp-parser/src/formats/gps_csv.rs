use csv::StringRecord;

use crate::errors::ParserError;
use crate::model::GpsFile;

use super::schema::{LATITUDE_COLUMN, LONGITUDE_COLUMN, RAW_GPS_TIMESTAMP};
use super::{build_gps_dataframe, parse_gps_timestamp, parse_optional_f64, strip_bom};

/// Plain GPS track export: a header row followed by one fix per line.
/// Columns other than `Timestamp`, `Latitude` and `Longitude` are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsCsvParser;

struct GpsColumnIndices {
    timestamp: usize,
    latitude: usize,
    longitude: usize,
}

impl GpsCsvParser {
    const NAME: &'static str = "GPS_CSV";

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    fn locate_columns(header: &StringRecord) -> Result<GpsColumnIndices, ParserError> {
        let find = |wanted: &'static str| {
            header
                .iter()
                .position(|label| label.trim().eq_ignore_ascii_case(wanted))
                .ok_or(ParserError::MissingColumn {
                    parser: Self::NAME,
                    column: wanted,
                })
        };

        Ok(GpsColumnIndices {
            timestamp: find(RAW_GPS_TIMESTAMP)?,
            latitude: find(LATITUDE_COLUMN)?,
            longitude: find(LONGITUDE_COLUMN)?,
        })
    }

    pub fn parse(&self, content: &str) -> Result<GpsFile, ParserError> {
        let content = strip_bom(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut records = reader.records();

        let header = records
            .next()
            .ok_or(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "file is empty".to_string(),
            })?
            .map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?;
        let indices = Self::locate_columns(&header)?;

        let mut timestamps = Vec::new();
        let mut latitudes = Vec::new();
        let mut longitudes = Vec::new();

        for record in records {
            let record = record.map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let line_index = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(timestamps.len() + 2);

            let raw_ts = record.get(indices.timestamp).unwrap_or("");
            timestamps.push(parse_gps_timestamp(Self::NAME, raw_ts, line_index)?);
            latitudes.push(parse_optional_f64(
                Self::NAME,
                record.get(indices.latitude).unwrap_or(""),
                line_index,
                LATITUDE_COLUMN,
            )?);
            longitudes.push(parse_optional_f64(
                Self::NAME,
                record.get(indices.longitude).unwrap_or(""),
                line_index,
                LONGITUDE_COLUMN,
            )?);
        }

        if timestamps.is_empty() {
            return Err(ParserError::EmptyData { parser: Self::NAME });
        }

        let df = build_gps_dataframe(Self::NAME, timestamps, latitudes, longitudes)?;
        Ok(GpsFile {
            parser: Self::NAME,
            first_data_line: 2,
            df,
        })
    }
}

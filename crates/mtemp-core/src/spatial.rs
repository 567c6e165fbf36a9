//! Attaching GPS positions to sensor readings and projecting them.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;

use geo::{BoundingRect, MultiPoint, Point, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use mtemp_parser::formats::schema::{LATITUDE_COLUMN, LONGITUDE_COLUMN};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::dataset::{naive_time, InstrumentDataset, SourceFile, TIME_COLUMN};
use crate::join::{join_on_time, JoinError};

pub const X_COLUMN: &str = "x";
pub const Y_COLUMN: &str = "y";

/// Sphere radius used by Web Mercator, in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Latitude at which Web Mercator becomes square.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_8;

#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("joining {left} with {right} on '{key}' kept no rows")]
    JoinProducedEmpty {
        left: String,
        right: String,
        key: &'static str,
    },
    #[error("row {row} has no GPS coordinate")]
    MissingCoordinate { row: usize },
    #[error("GPS dataset has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("unsupported coordinate reference system '{0}'")]
    UnknownCrs(String),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Geographic longitude/latitude in degrees.
    Wgs84,
    /// Spherical Web Mercator in metres.
    #[default]
    WebMercator,
}

impl Crs {
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }

    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Wgs84),
            3857 => Some(Crs::WebMercator),
            _ => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = SpatialError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let code = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
            .and_then(|_| trimmed[5..].trim().parse::<u32>().ok());
        code.and_then(Crs::from_epsg)
            .ok_or_else(|| SpatialError::UnknownCrs(trimmed.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = SpatialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

fn to_web_mercator(point: Point<f64>) -> Point<f64> {
    let lat = point
        .y()
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
        .to_radians();
    let x = EARTH_RADIUS_M * point.x().to_radians();
    let y = EARTH_RADIUS_M * (FRAC_PI_4 + lat / 2.0).tan().ln();
    Point::new(x, y)
}

fn from_web_mercator(point: Point<f64>) -> Point<f64> {
    let lon = (point.x() / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (point.y() / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
    Point::new(lon, lat)
}

/// Converts `point` (x = longitude / easting, y = latitude / northing)
/// between reference systems.
pub fn reproject(point: Point<f64>, from: Crs, to: Crs) -> Point<f64> {
    match (from, to) {
        (Crs::Wgs84, Crs::WebMercator) => to_web_mercator(point),
        (Crs::WebMercator, Crs::Wgs84) => from_web_mercator(point),
        _ => point,
    }
}

/// Sensor readings with one position per row. `points` and the `x`/`y`
/// columns of `df` are in `crs`.
#[derive(Debug, Clone)]
pub struct SpatialDataset {
    pub name: String,
    pub sources: Vec<SourceFile>,
    pub df: DataFrame,
    pub points: Vec<Point<f64>>,
    pub crs: Crs,
}

impl SpatialDataset {
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        MultiPoint::from(self.points.clone()).bounding_rect()
    }

    /// One Point feature per row. Every column other than `x`/`y` becomes a
    /// property; `time` is written as `HH:MM:SS`.
    pub fn to_geojson(&self) -> Result<FeatureCollection, SpatialError> {
        let seconds = crate::dataset::time_seconds(&self.df)?;
        let mut property_columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for column in self.df.get_columns() {
            let name = column.name().as_str();
            if name == TIME_COLUMN || name == X_COLUMN || name == Y_COLUMN {
                continue;
            }
            let values = column.cast(&DataType::Float64)?.f64()?.into_iter().collect();
            property_columns.push((name.to_string(), values));
        }

        let features = self
            .points
            .iter()
            .enumerate()
            .map(|(row, point)| {
                let mut properties = JsonObject::new();
                let time = seconds
                    .get(row)
                    .copied()
                    .flatten()
                    .and_then(naive_time)
                    .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
                    .unwrap_or(Value::Null);
                properties.insert(TIME_COLUMN.to_string(), time);
                for (name, values) in &property_columns {
                    let value = values
                        .get(row)
                        .copied()
                        .flatten()
                        .map(Value::from)
                        .unwrap_or(Value::Null);
                    properties.insert(name.clone(), value);
                }
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(GeoJsonValue::Point(vec![point.x(), point.y()]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert(
            "crs".to_string(),
            json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", self.crs.epsg()) }
            }),
        );

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }
}

fn set_xy(df: &mut DataFrame, points: &[Point<f64>]) -> PolarsResult<()> {
    let xs: Vec<f64> = points.iter().map(|p| p.x()).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y()).collect();
    df.with_column(Series::new(X_COLUMN.into(), xs))?;
    df.with_column(Series::new(Y_COLUMN.into(), ys))?;
    Ok(())
}

/// Joins `sensor` with the GPS track on `time` and projects every matched
/// position into `target`.
pub fn spatially_enable(
    sensor: &InstrumentDataset,
    gps: &InstrumentDataset,
    target: Crs,
) -> Result<SpatialDataset, SpatialError> {
    for column in [LATITUDE_COLUMN, LONGITUDE_COLUMN] {
        if !gps.has_column(column) {
            return Err(SpatialError::MissingColumn(column));
        }
    }

    let joined = join_on_time(sensor, gps)?;
    if joined.is_empty() {
        return Err(SpatialError::JoinProducedEmpty {
            left: sensor.describe(),
            right: gps.describe(),
            key: TIME_COLUMN,
        });
    }

    let latitudes = joined.f64_values(LATITUDE_COLUMN)?;
    let longitudes = joined.f64_values(LONGITUDE_COLUMN)?;
    let points = latitudes
        .iter()
        .zip(longitudes.iter())
        .enumerate()
        .map(|(row, (lat, lon))| match (lat, lon) {
            (Some(lat), Some(lon)) => Ok(reproject(Point::new(*lon, *lat), Crs::Wgs84, target)),
            _ => Err(SpatialError::MissingCoordinate { row }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut df = joined.df;
    set_xy(&mut df, &points)?;

    info!(
        rows = df.height(),
        crs = %target,
        "Spatially enabled {}",
        sensor.name
    );

    Ok(SpatialDataset {
        name: format!("{}+{}", sensor.name, gps.name),
        sources: joined.sources,
        df,
        points,
        crs: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn parses_epsg_codes() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert!("EPSG:27700".parse::<Crs>().is_err());
        assert!("3857".parse::<Crs>().is_err());
        assert_eq!(Crs::WebMercator.to_string(), "EPSG:3857");
    }

    #[test]
    fn origin_stays_at_origin() {
        let p = reproject(Point::new(0.0, 0.0), Crs::Wgs84, Crs::WebMercator);
        assert!(p.x().abs() < 1e-6 && p.y().abs() < 1e-6);
    }

    #[test]
    fn antimeridian_is_half_circumference() {
        let p = reproject(Point::new(180.0, 0.0), Crs::Wgs84, Crs::WebMercator);
        assert!((p.x() - PI * EARTH_RADIUS_M).abs() < 1e-6);
    }

    #[test]
    fn inverse_recovers_input() {
        let original = Point::new(-88.2434, 40.1106);
        let there = reproject(original, Crs::Wgs84, Crs::WebMercator);
        let back = reproject(there, Crs::WebMercator, Crs::Wgs84);
        assert!((back.x() - original.x()).abs() < 1e-9);
        assert!((back.y() - original.y()).abs() < 1e-9);
    }

    #[test]
    fn poles_are_clamped() {
        let pole = reproject(Point::new(0.0, 90.0), Crs::Wgs84, Crs::WebMercator);
        let edge = reproject(
            Point::new(0.0, MAX_MERCATOR_LATITUDE),
            Crs::Wgs84,
            Crs::WebMercator,
        );
        assert!(pole.y().is_finite());
        assert_eq!(pole.y(), edge.y());
    }

    #[test]
    fn same_crs_is_identity() {
        let p = Point::new(12.5, -3.25);
        assert_eq!(reproject(p, Crs::Wgs84, Crs::Wgs84), p);
    }
}

//! Raw instrument signals to physical units.
//!
//! The scalar functions reproduce the manufacturer calibrations exactly; the
//! dataset transforms append converted columns next to their sources.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::channels::{Channel, Height, Sensor, Unit};
use crate::dataset::InstrumentDataset;

/// IR sensor output at 0 °C.
pub const IR_OFFSET_VOLTS: f64 = 0.620;
/// IR sensor slope.
pub const IR_SCALE_C_PER_VOLT: f64 = 105.263;

const RH_SUPPLY_VOLTS: f64 = 5.0;
const RH_ZERO_OFFSET: f64 = 0.16;
const RH_SLOPE: f64 = 0.0062;
const RH_TEMP_COMP_INTERCEPT: f64 = 1.0546;
const RH_TEMP_COMP_SLOPE: f64 = 0.00216;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("dataset has no '{0}' column")]
    MissingChannel(String),
    #[error("no primary °F temperature column at {height} ft to compensate relative humidity")]
    MissingReferenceTemperature { height: Height },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// What to do when a raw RH channel has no temperature probe at its height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingReference {
    /// Emit an all-null RH column and log a warning.
    #[default]
    Null,
    Fail,
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * (9.0 / 5.0) + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * (5.0 / 9.0)
}

pub fn volts_to_infrared_fahrenheit(volts: f64) -> f64 {
    celsius_to_fahrenheit((volts - IR_OFFSET_VOLTS) * IR_SCALE_C_PER_VOLT)
}

/// Temperature-compensated relative humidity in percent from the sensor
/// output voltage and the air temperature at the same height in °F.
pub fn volts_to_relative_humidity(volts: f64, temperature_f: f64) -> f64 {
    let sensor_rh = (volts / RH_SUPPLY_VOLTS - RH_ZERO_OFFSET) / RH_SLOPE;
    let temperature_c = fahrenheit_to_celsius(temperature_f);
    sensor_rh / (RH_TEMP_COMP_INTERCEPT - RH_TEMP_COMP_SLOPE * temperature_c)
}

fn map_column(
    dataset: &InstrumentDataset,
    source: &str,
    f: impl Fn(f64) -> f64,
) -> Result<Vec<Option<f64>>, ConversionError> {
    Ok(dataset
        .f64_values(source)?
        .into_iter()
        .map(|value| value.map(&f))
        .collect())
}

fn with_appended(
    dataset: &InstrumentDataset,
    mut columns: Vec<Column>,
) -> Result<InstrumentDataset, ConversionError> {
    let mut output = dataset.df.clone();
    if !columns.is_empty() {
        output.hstack_mut(columns.as_mut_slice())?;
    }
    Ok(dataset.with_frame(output))
}

/// Appends a °F twin for every °C temperature column that does not have one.
pub fn append_fahrenheit(dataset: &InstrumentDataset) -> Result<InstrumentDataset, ConversionError> {
    let mut columns: Vec<Column> = Vec::new();

    for channel in dataset.channels() {
        let Channel::Temperature {
            unit: Unit::Celsius,
            ..
        } = channel
        else {
            continue;
        };
        let Some(target) = channel.with_temperature_unit(Unit::Fahrenheit) else {
            continue;
        };
        if dataset.has_channel(&target) {
            continue;
        }

        let values = map_column(dataset, &channel.label(), celsius_to_fahrenheit)?;
        columns.push(Series::new(target.label().as_str().into(), values).into());
    }

    debug!(dataset = %dataset.name, added = columns.len(), "Converted °C columns to °F");
    with_appended(dataset, columns)
}

/// Appends `IR (°F)` computed from `IR Raw (V)`.
pub fn append_infrared(dataset: &InstrumentDataset) -> Result<InstrumentDataset, ConversionError> {
    let source = Channel::InfraredRaw.label();
    if !dataset.has_column(&source) {
        return Err(ConversionError::MissingChannel(source));
    }
    if dataset.has_channel(&Channel::Infrared) {
        return Ok(dataset.clone());
    }

    let values = map_column(dataset, &source, volts_to_infrared_fahrenheit)?;
    with_appended(
        dataset,
        vec![Series::new(Channel::Infrared.label().as_str().into(), values).into()],
    )
}

/// Appends `<h>RH (%)` for every raw RH channel, compensated with the
/// primary °F probe at the same height. Needs a dataset that carries both
/// IR/RH and temperature channels, i.e. the merged dataset.
pub fn append_relative_humidity(
    dataset: &InstrumentDataset,
    missing_reference: MissingReference,
) -> Result<InstrumentDataset, ConversionError> {
    let mut columns: Vec<Column> = Vec::new();

    for channel in dataset.channels() {
        let Channel::HumidityRaw { height } = channel else {
            continue;
        };
        let target = Channel::Humidity { height };
        if dataset.has_channel(&target) {
            continue;
        }

        let reference = Channel::temperature(height, Sensor::Primary, Unit::Fahrenheit);
        let volts = dataset.f64_values(&channel.label())?;

        let values: Vec<Option<f64>> = if dataset.has_channel(&reference) {
            let temperatures = dataset.f64_values(&reference.label())?;
            volts
                .iter()
                .zip(temperatures.iter())
                .map(|(v, t)| match (v, t) {
                    (Some(v), Some(t)) => Some(volts_to_relative_humidity(*v, *t)),
                    _ => None,
                })
                .collect()
        } else {
            match missing_reference {
                MissingReference::Fail => {
                    return Err(ConversionError::MissingReferenceTemperature { height })
                }
                MissingReference::Null => {
                    warn!(
                        dataset = %dataset.name,
                        height = %height,
                        "No reference temperature for relative humidity; column left empty"
                    );
                    vec![None; volts.len()]
                }
            }
        };

        columns.push(Series::new(target.label().as_str().into(), values).into());
    }

    with_appended(dataset, columns)
}

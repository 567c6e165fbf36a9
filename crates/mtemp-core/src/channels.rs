//! Typed descriptors for the physical channels carried by normalized datasets.
//!
//! Column labels are the wire format shared with plotting consumers
//! (`"1.8 ft (°F)"`, `"Smoothed IR (°F)"`, `"7.2RH (%)"`, ...). Every
//! component classifies columns by parsing the label into a [`Channel`]
//! rather than by searching for substrings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sensor height above ground, stored in tenths of a foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Height(u16);

impl Height {
    pub const fn from_tenths(tenths: u16) -> Self {
        Self(tenths)
    }

    pub fn tenths(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl FromStr for Height {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let feet: f64 = trimmed
            .parse()
            .map_err(|_| format!("invalid height '{trimmed}'"))?;
        let tenths = (feet * 10.0).round();
        if !(0.0..=f64::from(u16::MAX)).contains(&tenths) || (feet * 10.0 - tenths).abs() > 1e-6 {
            return Err(format!("height '{trimmed}' is not a whole tenth of a foot"));
        }
        Ok(Height(tenths as u16))
    }
}

/// Carts mount a second ("b") probe at some heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Primary,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Celsius,
    Fahrenheit,
    Volts,
    Percent,
}

impl Unit {
    pub fn tag(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Fahrenheit => "°F",
            Unit::Volts => "V",
            Unit::Percent => "%",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "°C" => Some(Unit::Celsius),
            "°F" => Some(Unit::Fahrenheit),
            "V" => Some(Unit::Volts),
            "%" => Some(Unit::Percent),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Contact temperature probe; `unit` is Celsius or Fahrenheit.
    Temperature {
        height: Height,
        sensor: Sensor,
        unit: Unit,
    },
    InfraredRaw,
    Infrared,
    SmoothedInfrared,
    HumidityRaw {
        height: Height,
    },
    Humidity {
        height: Height,
    },
}

const INFRARED_RAW_LABEL: &str = "IR Raw (V)";
const INFRARED_LABEL: &str = "IR (°F)";
const SMOOTHED_INFRARED_LABEL: &str = "Smoothed IR (°F)";
const RAW_HUMIDITY_PREFIX: &str = "Raw RH ";

impl Channel {
    pub fn temperature(height: Height, sensor: Sensor, unit: Unit) -> Self {
        Channel::Temperature {
            height,
            sensor,
            unit,
        }
    }

    pub fn unit(&self) -> Unit {
        match self {
            Channel::Temperature { unit, .. } => *unit,
            Channel::InfraredRaw | Channel::HumidityRaw { .. } => Unit::Volts,
            Channel::Infrared | Channel::SmoothedInfrared => Unit::Fahrenheit,
            Channel::Humidity { .. } => Unit::Percent,
        }
    }

    pub fn height(&self) -> Option<Height> {
        match self {
            Channel::Temperature { height, .. }
            | Channel::HumidityRaw { height }
            | Channel::Humidity { height } => Some(*height),
            _ => None,
        }
    }

    /// The same temperature channel expressed in `unit`; `None` for any
    /// other channel kind.
    pub fn with_temperature_unit(&self, unit: Unit) -> Option<Self> {
        match self {
            Channel::Temperature { height, sensor, .. } => Some(Channel::Temperature {
                height: *height,
                sensor: *sensor,
                unit,
            }),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Channel::Temperature {
                height,
                sensor,
                unit,
            } => match sensor {
                Sensor::Primary => format!("{height} ft ({unit})"),
                Sensor::Backup => format!("{height} ft b ({unit})"),
            },
            Channel::InfraredRaw => INFRARED_RAW_LABEL.to_string(),
            Channel::Infrared => INFRARED_LABEL.to_string(),
            Channel::SmoothedInfrared => SMOOTHED_INFRARED_LABEL.to_string(),
            Channel::HumidityRaw { height } => format!("{RAW_HUMIDITY_PREFIX}{height} ft (V)"),
            Channel::Humidity { height } => format!("{height}RH (%)"),
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        match label {
            INFRARED_RAW_LABEL => return Some(Channel::InfraredRaw),
            INFRARED_LABEL => return Some(Channel::Infrared),
            SMOOTHED_INFRARED_LABEL => return Some(Channel::SmoothedInfrared),
            _ => {}
        }

        let (body, tag) = label.strip_suffix(')')?.rsplit_once(" (")?;
        let unit = Unit::from_tag(tag)?;
        let body = body.trim();

        match unit {
            Unit::Celsius | Unit::Fahrenheit => {
                let (height, sensor) = if let Some(h) = body.strip_suffix(" ft b") {
                    (h, Sensor::Backup)
                } else {
                    (body.strip_suffix(" ft")?, Sensor::Primary)
                };
                Some(Channel::Temperature {
                    height: height.parse().ok()?,
                    sensor,
                    unit,
                })
            }
            Unit::Volts => {
                let rest = body.strip_prefix(RAW_HUMIDITY_PREFIX)?;
                let height = rest.trim().strip_suffix("ft")?;
                Some(Channel::HumidityRaw {
                    height: height.parse().ok()?,
                })
            }
            Unit::Percent => {
                let height = body.strip_suffix("RH")?;
                Some(Channel::Humidity {
                    height: height.parse().ok()?,
                })
            }
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

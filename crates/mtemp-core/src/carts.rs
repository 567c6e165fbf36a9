//! Cart wiring registry: which DAQ input feeds which physical sensor.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::{Channel, Height, Sensor, Unit};
use crate::dataset::InstrumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartId {
    One,
    Two,
}

impl CartId {
    pub fn number(&self) -> u8 {
        match self {
            CartId::One => 1,
            CartId::Two => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(CartId::One),
            2 => Some(CartId::Two),
            _ => None,
        }
    }
}

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cart {}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub cart: CartId,
    pub instrument: InstrumentKind,
}

impl fmt::Display for HardwareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cart, self.instrument)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no channel wiring registered for {cart} {instrument}")]
    ConfigNotFound {
        cart: CartId,
        instrument: InstrumentKind,
    },
    #[error("serial number '{0}' does not belong to a known cart")]
    UnknownSerial(String),
}

/// Raw DAQ label to physical channel, in DAQ input order.
#[derive(Debug, Clone)]
pub struct Wiring {
    entries: Vec<(&'static str, Channel)>,
}

impl Wiring {
    pub fn channel_for(&self, raw_label: &str) -> Option<Channel> {
        let raw_label = raw_label.trim();
        self.entries
            .iter()
            .find(|(raw, _)| *raw == raw_label)
            .map(|(_, channel)| *channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Channel)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const fn ft(tenths: u16) -> Height {
    Height::from_tenths(tenths)
}

fn probe(tenths: u16) -> Channel {
    Channel::temperature(ft(tenths), Sensor::Primary, Unit::Celsius)
}

fn backup_probe(tenths: u16) -> Channel {
    Channel::temperature(ft(tenths), Sensor::Backup, Unit::Celsius)
}

fn raw_humidity(tenths: u16) -> Channel {
    Channel::HumidityRaw { height: ft(tenths) }
}

static WIRING: Lazy<HashMap<HardwareConfig, Wiring>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        HardwareConfig {
            cart: CartId::One,
            instrument: InstrumentKind::Temperature,
        },
        Wiring {
            entries: vec![
                ("AI0 (°C)", probe(18)),
                ("AI1 (°C)", probe(54)),
                ("AI2 (°C)", probe(6)),
                ("AI3 (°C)", probe(36)),
                ("AI4 (°C)", probe(72)),
                ("AI5 (°C)", probe(90)),
                ("AI6 (°C)", backup_probe(36)),
                ("AI7 (°C)", backup_probe(54)),
            ],
        },
    );
    table.insert(
        HardwareConfig {
            cart: CartId::Two,
            instrument: InstrumentKind::Temperature,
        },
        Wiring {
            entries: vec![
                ("AI0 (°C)", probe(54)),
                ("AI1 (°C)", probe(6)),
                ("AI2 (°C)", probe(18)),
                ("AI3 (°C)", probe(36)),
                ("AI4 (°C)", backup_probe(36)),
                ("AI5 (°C)", backup_probe(54)),
                ("AI6 (°C)", probe(72)),
                ("AI7 (°C)", probe(90)),
            ],
        },
    );
    table.insert(
        HardwareConfig {
            cart: CartId::One,
            instrument: InstrumentKind::IrRh,
        },
        Wiring {
            entries: vec![("AI0 (V)", Channel::InfraredRaw)],
        },
    );
    table.insert(
        HardwareConfig {
            cart: CartId::Two,
            instrument: InstrumentKind::IrRh,
        },
        Wiring {
            entries: vec![
                ("AI0 (V)", Channel::InfraredRaw),
                ("AI1 (V)", raw_humidity(0)),
                ("AI2 (V)", raw_humidity(72)),
                ("AI3 (V)", raw_humidity(18)),
                ("AI4 (V)", raw_humidity(90)),
            ],
        },
    );
    table
});

static SERIAL_NUMBERS: Lazy<HashMap<&'static str, CartId>> = Lazy::new(|| {
    HashMap::from([
        ("21AD4B7", CartId::One),
        ("2082107", CartId::One),
        ("1DE5504", CartId::Two),
    ])
});

pub fn wiring(config: HardwareConfig) -> Result<&'static Wiring, RegistryError> {
    WIRING
        .get(&config)
        .ok_or(RegistryError::ConfigNotFound {
            cart: config.cart,
            instrument: config.instrument,
        })
}

/// Serial-number lookup over the built-in table plus any serials added by
/// settings. Added serials take precedence.
#[derive(Debug, Clone, Default)]
pub struct CartRegistry {
    extra_serials: HashMap<String, CartId>,
}

impl CartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_serial(mut self, serial: impl Into<String>, cart: CartId) -> Self {
        self.extra_serials.insert(serial.into().trim().to_string(), cart);
        self
    }

    pub fn cart_for_serial(&self, serial: &str) -> Result<CartId, RegistryError> {
        let serial = serial.trim();
        self.extra_serials
            .get(serial)
            .or_else(|| SERIAL_NUMBERS.get(serial))
            .copied()
            .ok_or_else(|| RegistryError::UnknownSerial(serial.to_string()))
    }

    pub fn wiring(&self, config: HardwareConfig) -> Result<&'static Wiring, RegistryError> {
        wiring(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_one_temperature_wiring() {
        let table = wiring(HardwareConfig {
            cart: CartId::One,
            instrument: InstrumentKind::Temperature,
        })
        .unwrap();
        assert_eq!(table.len(), 8);
        assert_eq!(table.channel_for("AI0 (°C)").unwrap().label(), "1.8 ft (°C)");
        assert_eq!(table.channel_for("AI2 (°C)").unwrap().label(), "0.6 ft (°C)");
        assert_eq!(table.channel_for("AI7 (°C)").unwrap().label(), "5.4 ft b (°C)");
        assert_eq!(table.channel_for("AI8 (°C)"), None);
    }

    #[test]
    fn cart_two_maps_humidity_inputs() {
        let table = wiring(HardwareConfig {
            cart: CartId::Two,
            instrument: InstrumentKind::IrRh,
        })
        .unwrap();
        assert_eq!(table.channel_for("AI0 (V)"), Some(Channel::InfraredRaw));
        assert_eq!(
            table.channel_for("AI2 (V)").unwrap().label(),
            "Raw RH 7.2 ft (V)"
        );
    }

    #[test]
    fn gps_has_no_wiring() {
        let err = wiring(HardwareConfig {
            cart: CartId::One,
            instrument: InstrumentKind::Gps,
        })
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ConfigNotFound {
                cart: CartId::One,
                instrument: InstrumentKind::Gps
            }
        );
    }

    #[test]
    fn serial_numbers_resolve_to_carts() {
        let registry = CartRegistry::new();
        assert_eq!(registry.cart_for_serial("21AD4B7"), Ok(CartId::One));
        assert_eq!(registry.cart_for_serial(" 1DE5504 "), Ok(CartId::Two));
        assert_eq!(
            registry.cart_for_serial("FFFFFFF"),
            Err(RegistryError::UnknownSerial("FFFFFFF".to_string()))
        );
    }

    #[test]
    fn configured_serials_override_builtins() {
        let registry = CartRegistry::new()
            .with_serial("ABC1234", CartId::Two)
            .with_serial("21AD4B7", CartId::Two);
        assert_eq!(registry.cart_for_serial("ABC1234"), Ok(CartId::Two));
        assert_eq!(registry.cart_for_serial("21AD4B7"), Ok(CartId::Two));
    }
}

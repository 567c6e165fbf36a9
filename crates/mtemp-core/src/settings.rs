//! TOML settings and the field-test registry.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::carts::{CartId, CartRegistry};
use crate::conversions::MissingReference;
use crate::loaders::{DuplicatePolicy, LoaderOptions};
use crate::pipeline::{FieldTest, PipelineOptions};
use crate::smoothing::DEFAULT_WINDOW;
use crate::spatial::Crs;

/// Environment variable naming a settings file when `--config` is absent.
pub const CONFIG_ENV: &str = "MTEMP_CONFIG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("smoothing window must be at least 1")]
    InvalidWindow,
    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("unsupported CRS '{0}'")]
    InvalidCrs(String),
    #[error("{context}: cart {value} does not exist (expected 1 or 2)")]
    InvalidCart { context: String, value: u8 },
    #[error("field test {0} is not registered")]
    UnknownTest(u32),
    #[error("field test {0} is registered more than once")]
    DuplicateTest(u32),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub loader: LoaderSettings,
    pub smoothing: SmoothingSettings,
    pub humidity: HumiditySettings,
    pub spatial: SpatialSettings,
    pub carts: CartSettings,
    pub tests: Vec<TestEntry>,
    /// Directory of the settings file; test folders are relative to it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderSettings {
    pub header_lines: usize,
    pub duplicate_timestamps: DuplicatePolicy,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            header_lines: mtemp_parser::formats::schema::DEFAULT_DAQ_HEADER_LINES,
            duplicate_timestamps: DuplicatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmoothingSettings {
    pub window: usize,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HumiditySettings {
    pub missing_reference: MissingReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpatialSettings {
    pub gps_timezone: String,
    pub target_crs: String,
}

impl Default for SpatialSettings {
    fn default() -> Self {
        Self {
            gps_timezone: "UTC".to_string(),
            target_crs: Crs::WebMercator.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CartSettings {
    /// Extra serial numbers, mapped to cart 1 or 2.
    pub serials: BTreeMap<String, u8>,
}

/// One registered field test. File names are relative to `folder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestEntry {
    pub number: u32,
    #[serde(default)]
    pub folder: PathBuf,
    pub temperature: Option<PathBuf>,
    pub irrh: Option<PathBuf>,
    pub gps: Option<PathBuf>,
    pub cart: Option<u8>,
}

fn cart_from_number(context: impl Into<String>, value: u8) -> Result<CartId> {
    CartId::from_number(value).ok_or_else(|| SettingsError::InvalidCart {
        context: context.into(),
        value,
    })
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&text)?;
        settings.base_dir = path.parent().map(Path::to_path_buf);
        debug!(path = %path.display(), tests = settings.tests.len(), "Loaded settings");
        Ok(settings)
    }

    /// `explicit` if given, else the file named by `MTEMP_CONFIG`, else
    /// built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.smoothing.window == 0 {
            return Err(SettingsError::InvalidWindow);
        }
        self.gps_timezone()?;
        self.target_crs()?;
        self.cart_registry()?;

        let mut seen = std::collections::HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.number) {
                return Err(SettingsError::DuplicateTest(test.number));
            }
            if let Some(cart) = test.cart {
                cart_from_number(format!("test {}", test.number), cart)?;
            }
        }
        Ok(())
    }

    pub fn gps_timezone(&self) -> Result<Tz> {
        let name = self.spatial.gps_timezone.trim();
        name.parse::<Tz>()
            .map_err(|_| SettingsError::InvalidTimezone(name.to_string()))
    }

    pub fn target_crs(&self) -> Result<Crs> {
        self.spatial
            .target_crs
            .parse()
            .map_err(|_| SettingsError::InvalidCrs(self.spatial.target_crs.clone()))
    }

    pub fn cart_registry(&self) -> Result<CartRegistry> {
        self.carts
            .serials
            .iter()
            .try_fold(CartRegistry::new(), |registry, (serial, cart)| {
                let cart = cart_from_number(format!("serial {serial}"), *cart)?;
                Ok(registry.with_serial(serial.as_str(), cart))
            })
    }

    pub fn loader_options(&self) -> Result<LoaderOptions> {
        if self.smoothing.window == 0 {
            return Err(SettingsError::InvalidWindow);
        }
        Ok(LoaderOptions {
            header_lines: self.loader.header_lines,
            duplicates: self.loader.duplicate_timestamps,
            smoothing_window: self.smoothing.window,
            gps_timezone: self.gps_timezone()?,
            registry: self.cart_registry()?,
        })
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        Ok(PipelineOptions {
            loader: self.loader_options()?,
            missing_reference: self.humidity.missing_reference,
            target_crs: self.target_crs()?,
        })
    }

    pub fn test(&self, number: u32) -> Result<&TestEntry> {
        self.tests
            .iter()
            .find(|test| test.number == number)
            .ok_or(SettingsError::UnknownTest(number))
    }

    /// Input files of a registered test with paths resolved.
    pub fn field_test(&self, number: u32) -> Result<FieldTest> {
        let entry = self.test(number)?;
        let folder = match &self.base_dir {
            Some(base) => base.join(&entry.folder),
            None => entry.folder.clone(),
        };
        let cart = entry
            .cart
            .map(|cart| cart_from_number(format!("test {number}"), cart))
            .transpose()?;
        Ok(FieldTest {
            temperature: entry.temperature.as_ref().map(|p| folder.join(p)),
            irrh: entry.irrh.as_ref().map(|p| folder.join(p)),
            gps: entry.gps.as_ref().map(|p| folder.join(p)),
            cart,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.loader.header_lines, 6);
        assert_eq!(settings.loader.duplicate_timestamps, DuplicatePolicy::KeepLast);
        assert_eq!(settings.smoothing.window, 100);
        assert_eq!(settings.humidity.missing_reference, MissingReference::Null);
        assert_eq!(settings.gps_timezone().unwrap(), Tz::UTC);
        assert_eq!(settings.target_crs().unwrap(), Crs::WebMercator);
    }

    #[test]
    fn full_file_round_trips_into_options() {
        let settings = Settings::from_toml_str(
            r#"
            [loader]
            header_lines = 7
            duplicate_timestamps = "reject"

            [smoothing]
            window = 25

            [humidity]
            missing_reference = "fail"

            [spatial]
            gps_timezone = "America/Chicago"
            target_crs = "EPSG:4326"

            [carts.serials]
            "ABC1234" = 2

            [[tests]]
            number = 3
            folder = "Test_Folders/test_3"
            temperature = "temp.csv"
            gps = "gps.csv"
            cart = 2
            "#,
        )
        .unwrap();

        let options = settings.pipeline_options().unwrap();
        assert_eq!(options.loader.header_lines, 7);
        assert_eq!(options.loader.duplicates, DuplicatePolicy::Reject);
        assert_eq!(options.loader.smoothing_window, 25);
        assert_eq!(options.loader.gps_timezone, chrono_tz::America::Chicago);
        assert_eq!(options.missing_reference, MissingReference::Fail);
        assert_eq!(options.target_crs, Crs::Wgs84);
        assert_eq!(
            options.loader.registry.cart_for_serial("ABC1234"),
            Ok(CartId::Two)
        );

        let test = settings.field_test(3).unwrap();
        assert_eq!(
            test.temperature,
            Some(PathBuf::from("Test_Folders/test_3/temp.csv"))
        );
        assert_eq!(test.irrh, None);
        assert_eq!(test.cart, Some(CartId::Two));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Settings::from_toml_str("[smoothing]\nwindow = 0\n"),
            Err(SettingsError::InvalidWindow)
        ));
        assert!(matches!(
            Settings::from_toml_str("[spatial]\ngps_timezone = \"Mars/Olympus\"\n"),
            Err(SettingsError::InvalidTimezone(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[spatial]\ntarget_crs = \"EPSG:27700\"\n"),
            Err(SettingsError::InvalidCrs(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[carts.serials]\n\"X\" = 3\n"),
            Err(SettingsError::InvalidCart { value: 3, .. })
        ));
        assert!(matches!(
            Settings::from_toml_str("[loader]\nheader_lines = \"six\"\n"),
            Err(SettingsError::Toml(_))
        ));
    }

    #[test]
    fn unknown_test_number() {
        let settings = Settings::default();
        assert!(matches!(
            settings.field_test(9),
            Err(SettingsError::UnknownTest(9))
        ));
    }
}

//! One field test end to end: load every instrument that was supplied,
//! merge sensors, derive humidity and attach positions.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::Serialize;
use tracing::{info, warn};

use crate::carts::CartId;
use crate::conversions::{append_relative_humidity, MissingReference};
use crate::dataset::{InstrumentDataset, InstrumentKind};
use crate::error::{PipelineError, Result};
use crate::join::merge_sensors;
use crate::loaders::{loader_for, LoadError, LoaderOptions};
use crate::spatial::{spatially_enable, Crs, SpatialDataset};

/// Input files of one field test. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTest {
    pub temperature: Option<PathBuf>,
    pub irrh: Option<PathBuf>,
    pub gps: Option<PathBuf>,
    /// Overrides the serial numbers recorded in the DAQ files.
    pub cart: Option<CartId>,
}

impl FieldTest {
    fn inputs(&self) -> impl Iterator<Item = (InstrumentKind, &Path)> {
        [
            (InstrumentKind::Temperature, self.temperature.as_deref()),
            (InstrumentKind::IrRh, self.irrh.as_deref()),
            (InstrumentKind::Gps, self.gps.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|path| (kind, path)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub loader: LoaderOptions,
    pub missing_reference: MissingReference,
    pub target_crs: Crs,
}

#[derive(Debug)]
pub struct InstrumentFailure {
    pub instrument: InstrumentKind,
    pub path: PathBuf,
    pub error: LoadError,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub temperature: Option<InstrumentDataset>,
    pub irrh: Option<InstrumentDataset>,
    pub gps: Option<InstrumentDataset>,
    pub merged: Option<InstrumentDataset>,
    pub spatial: Option<SpatialDataset>,
    pub failures: Vec<InstrumentFailure>,
}

impl PipelineReport {
    fn slot(&mut self, kind: InstrumentKind) -> &mut Option<InstrumentDataset> {
        match kind {
            InstrumentKind::Temperature => &mut self.temperature,
            InstrumentKind::IrRh => &mut self.irrh,
            InstrumentKind::Gps => &mut self.gps,
        }
    }

    /// Output name and dataset for every instrument-level table produced.
    pub fn datasets(&self) -> Vec<(&'static str, &InstrumentDataset)> {
        [
            ("temperature", self.temperature.as_ref()),
            ("irrh", self.irrh.as_ref()),
            ("gps", self.gps.as_ref()),
            ("merged", self.merged.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, dataset)| dataset.map(|dataset| (name, dataset)))
        .collect()
    }

    pub fn summary(&self) -> Vec<DatasetSummary> {
        let mut rows: Vec<DatasetSummary> = self
            .datasets()
            .into_iter()
            .map(|(name, dataset)| {
                let range = dataset.time_range();
                DatasetSummary {
                    name: name.to_string(),
                    rows: dataset.height(),
                    columns: dataset.df.width(),
                    start: range.map(|(start, _)| start),
                    end: range.map(|(_, end)| end),
                }
            })
            .collect();
        if let Some(spatial) = &self.spatial {
            let seconds = crate::dataset::time_seconds(&spatial.df).unwrap_or_default();
            let mut times = seconds.into_iter().flatten();
            let start = times.next();
            let end = times.last().or(start);
            rows.push(DatasetSummary {
                name: "spatial".to_string(),
                rows: spatial.height(),
                columns: spatial.df.width(),
                start: start.and_then(crate::dataset::naive_time),
                end: end.and_then(crate::dataset::naive_time),
            });
        }
        rows
    }
}

/// Runs one field test. A file that fails to load is recorded in the report
/// and does not stop the others; an empty merge or spatial join does.
pub fn run(test: &FieldTest, options: &PipelineOptions) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();

    for (kind, path) in test.inputs() {
        let loader = loader_for(kind, &options.loader);
        match loader.load(path, test.cart) {
            Ok(dataset) => *report.slot(kind) = Some(dataset),
            Err(error) => {
                warn!(instrument = %kind, path = %path.display(), %error, "Instrument failed to load");
                report.failures.push(InstrumentFailure {
                    instrument: kind,
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }

    if report.temperature.is_none() && report.irrh.is_none() && report.gps.is_none() {
        return Err(PipelineError::NothingLoaded {
            failures: report.failures.len(),
        });
    }

    if let (Some(temperature), Some(irrh)) = (&report.temperature, &report.irrh) {
        let merged = merge_sensors(temperature, irrh)?;
        let merged = append_relative_humidity(&merged, options.missing_reference)?;
        report.merged = Some(merged);
    }

    if let Some(gps) = &report.gps {
        let sensor = report
            .merged
            .as_ref()
            .or(report.temperature.as_ref())
            .or(report.irrh.as_ref());
        if let Some(sensor) = sensor {
            report.spatial = Some(spatially_enable(sensor, gps, options.target_crs)?);
        } else {
            info!("GPS loaded without sensor data; skipping spatial enablement");
        }
    }

    info!(
        loaded = report.datasets().len(),
        failures = report.failures.len(),
        spatial = report.spatial.is_some(),
        "Pipeline finished"
    );
    Ok(report)
}

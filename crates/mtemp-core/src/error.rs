use thiserror::Error;

use crate::conversions::ConversionError;
use crate::join::JoinError;
use crate::outputs::OutputError;
use crate::settings::SettingsError;
use crate::spatial::SpatialError;

/// Errors that stop a pipeline run. Failures of individual instrument
/// files are not among them; they are collected in the run report.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("joining {left} with {right} on '{key}' kept no rows")]
    JoinProducedEmpty {
        left: String,
        right: String,
        key: &'static str,
    },

    #[error("Join failed: {0}")]
    Join(JoinError),

    #[error("Spatial enablement failed: {0}")]
    Spatial(SpatialError),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("No instrument file could be loaded ({failures} failed)")]
    NothingLoaded { failures: usize },

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Writing outputs failed: {0}")]
    Output(#[from] OutputError),
}

impl From<JoinError> for PipelineError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::ProducedEmpty { left, right, key } => {
                PipelineError::JoinProducedEmpty { left, right, key }
            }
            other => PipelineError::Join(other),
        }
    }
}

impl From<SpatialError> for PipelineError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::JoinProducedEmpty { left, right, key } => {
                PipelineError::JoinProducedEmpty { left, right, key }
            }
            other => PipelineError::Spatial(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

use polars::prelude::*;
use thiserror::Error;

use crate::dataset::InstrumentDataset;

/// Samples averaged into `Smoothed IR (°F)` unless settings say otherwise.
pub const DEFAULT_WINDOW: usize = 100;

#[derive(Debug, Error)]
pub enum SmoothingError {
    #[error("smoothing window must be at least 1")]
    InvalidWindow,
    #[error("cannot smooth '{0}': column not present")]
    MissingColumn(String),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Trailing moving average. `output[i]` is the mean of the `window` values
/// ending at `i`; it is `None` for the first `window - 1` positions and
/// wherever the window holds a null.
pub fn trailing_mean(
    values: &[Option<f64>],
    window: usize,
) -> Result<Vec<Option<f64>>, SmoothingError> {
    if window == 0 {
        return Err(SmoothingError::InvalidWindow);
    }

    let output = (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mut sum = 0.0;
            for value in slice {
                sum += (*value)?;
            }
            Some(sum / window as f64)
        })
        .collect();

    Ok(output)
}

/// Returns a copy of `dataset` with `target` holding the trailing mean of
/// `source`. The source column is left as it was.
pub fn append_smoothed(
    dataset: &InstrumentDataset,
    source: &str,
    target: &str,
    window: usize,
) -> Result<InstrumentDataset, SmoothingError> {
    if !dataset.has_column(source) {
        return Err(SmoothingError::MissingColumn(source.to_string()));
    }

    let values = dataset.f64_values(source)?;
    let smoothed = trailing_mean(&values, window)?;

    let mut df = dataset.df.clone();
    df.with_column(Series::new(target.into(), smoothed))?;
    Ok(dataset.with_frame(df))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_full_window_is_plain_mean() {
        let values: Vec<Option<f64>> = (1..=5).map(|v| Some(v as f64)).collect();
        let smoothed = trailing_mean(&values, 3).unwrap();
        assert_eq!(smoothed, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn nulls_poison_only_their_windows() {
        let values = vec![Some(1.0), None, Some(3.0), Some(5.0), Some(7.0)];
        let smoothed = trailing_mean(&values, 2).unwrap();
        assert_eq!(smoothed, vec![None, None, None, Some(4.0), Some(6.0)]);
    }

    #[test]
    fn window_of_one_is_identity() {
        let values = vec![Some(1.5), None, Some(-2.0)];
        assert_eq!(trailing_mean(&values, 1).unwrap(), values);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(
            trailing_mean(&[Some(1.0)], 0),
            Err(SmoothingError::InvalidWindow)
        ));
    }

    #[test]
    fn short_series_is_all_null() {
        let values = vec![Some(1.0); 4];
        assert_eq!(trailing_mean(&values, 10).unwrap(), vec![None; 4]);
    }

    #[test]
    fn missing_source_column_is_reported() {
        let dataset = InstrumentDataset::from_columns(
            "irrh",
            vec![0, 1],
            vec![("IR Raw (V)".to_string(), vec![Some(0.7), Some(0.8)])],
        )
        .unwrap();

        match append_smoothed(&dataset, "IR (°F)", "Smoothed IR (°F)", 2) {
            Err(SmoothingError::MissingColumn(column)) => assert_eq!(column, "IR (°F)"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }
}

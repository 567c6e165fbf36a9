//! Exact-time joins between instrument datasets.

use std::collections::HashSet;

use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::dataset::{InstrumentDataset, TIME_COLUMN};

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("dataset '{dataset}' has no '{key}' column")]
    MissingKey { dataset: String, key: &'static str },
    #[error("column '{column}' exists in both '{left}' and '{right}'")]
    ColumnConflict {
        left: String,
        right: String,
        column: String,
    },
    #[error("joining {left} with {right} on '{key}' kept no rows")]
    ProducedEmpty {
        left: String,
        right: String,
        key: &'static str,
    },
    #[error("cannot join an empty list of datasets")]
    NoInputs,
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, JoinError>;

fn require_key(dataset: &InstrumentDataset) -> Result<()> {
    if dataset.has_column(TIME_COLUMN) {
        Ok(())
    } else {
        Err(JoinError::MissingKey {
            dataset: dataset.describe(),
            key: TIME_COLUMN,
        })
    }
}

/// Inner join on `time`. The result is sorted by time and holds `time`,
/// then `left`'s columns, then `right`'s. Disjoint inputs give an empty
/// dataset.
pub fn join_on_time(left: &InstrumentDataset, right: &InstrumentDataset) -> Result<InstrumentDataset> {
    require_key(left)?;
    require_key(right)?;

    let left_names: HashSet<String> = left.column_names().into_iter().collect();
    if let Some(column) = right
        .column_names()
        .into_iter()
        .find(|name| name != TIME_COLUMN && left_names.contains(name))
    {
        return Err(JoinError::ColumnConflict {
            left: left.name.clone(),
            right: right.name.clone(),
            column,
        });
    }

    // Join on the physical nanosecond value; cast back to Time afterwards.
    let as_key = |df: &DataFrame| {
        df.clone()
            .lazy()
            .with_column(col(TIME_COLUMN).cast(DataType::Int64))
    };

    let joined = as_key(&left.df)
        .join(
            as_key(&right.df),
            [col(TIME_COLUMN)],
            [col(TIME_COLUMN)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([TIME_COLUMN], SortMultipleOptions::default())
        .with_column(col(TIME_COLUMN).cast(DataType::Time))
        .collect()?;

    let mut sources = left.sources.clone();
    sources.extend(right.sources.iter().cloned());

    Ok(InstrumentDataset::new(
        format!("{}+{}", left.name, right.name),
        sources,
        joined,
    ))
}

/// Left fold of [`join_on_time`] over `datasets`.
pub fn join_all(datasets: &[InstrumentDataset]) -> Result<InstrumentDataset> {
    let (first, rest) = datasets.split_first().ok_or(JoinError::NoInputs)?;
    rest.iter()
        .try_fold(first.clone(), |acc, next| join_on_time(&acc, next))
}

/// Joins temperature and IR/RH readings. Unlike [`join_on_time`], an empty
/// result is an error naming both inputs.
pub fn merge_sensors(
    temperature: &InstrumentDataset,
    irrh: &InstrumentDataset,
) -> Result<InstrumentDataset> {
    let merged = join_on_time(temperature, irrh)?;
    if merged.is_empty() {
        return Err(JoinError::ProducedEmpty {
            left: temperature.describe(),
            right: irrh.describe(),
            key: TIME_COLUMN,
        });
    }

    info!(
        rows = merged.height(),
        left_rows = temperature.height(),
        right_rows = irrh.height(),
        "Merged temperature and IR/RH readings"
    );
    Ok(merged)
}

pub mod carts;
pub mod channels;
pub mod conversions;
pub mod dataset;
pub mod error;
pub mod join;
pub mod loaders;
pub mod outputs;
pub mod pipeline;
pub mod settings;
pub mod smoothing;
pub mod spatial;

pub use dataset::{InstrumentDataset, InstrumentKind, SourceFile, TIME_COLUMN};
pub use error::{PipelineError, Result};
pub use pipeline::{run, FieldTest, PipelineOptions, PipelineReport};
pub use settings::Settings;

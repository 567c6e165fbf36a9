pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{DaqFile, FileMetadata, GpsFile};
pub use registry::{parse_daq_file, parse_gps_file, parse_with_parsers, DaqParser};

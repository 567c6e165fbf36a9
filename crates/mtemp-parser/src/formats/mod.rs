mod common;
mod daq_export;
mod daq_log;
mod gps_csv;
pub mod schema;

pub use daq_export::DaqExportParser;
pub use daq_log::DaqLogParser;
pub use gps_csv::GpsCsvParser;

pub(crate) use common::{
    build_daq_dataframe, build_gps_dataframe, classify_daq_header, parse_gps_timestamp,
    parse_metadata_line, parse_optional_f64, read_daq_rows, strip_bom,
};

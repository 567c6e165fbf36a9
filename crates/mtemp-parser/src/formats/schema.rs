pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const SAMPLE_COLUMN: &str = "sample";
pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";

/// Raw header labels as written by the DAQ software.
pub const RAW_DATE_TIME: &str = "Date/Time";
pub const RAW_SAMPLE: &str = "Sample";
pub const RAW_GPS_TIMESTAMP: &str = "Timestamp";

pub const DEFAULT_DAQ_HEADER_LINES: usize = 6;

use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{DaqExportParser, DaqLogParser, GpsCsvParser};
use crate::model::{DaqFile, GpsFile};

pub trait DaqParser {
    fn name(&self) -> &'static str;
    fn parse(&self, content: &str) -> Result<DaqFile, ParserError>;
}

/// Parses a temperature or IR/RH DAQ file using the default 6-line metadata
/// block, falling back to a header-less export.
pub fn parse_daq_file(content: &str) -> Result<DaqFile, ParserError> {
    let daq_log = DaqLogParser::default();
    let daq_export = DaqExportParser;
    let parsers: [&dyn DaqParser; 2] = [&daq_log, &daq_export];
    parse_with_parsers(content, &parsers)
}

pub fn parse_with_parsers(
    content: &str,
    parsers: &[&dyn DaqParser],
) -> Result<DaqFile, ParserError> {
    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(content) {
            Ok(parsed) => return Ok(parsed),
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser { attempts })
}

pub fn parse_gps_file(content: &str) -> Result<GpsFile, ParserError> {
    GpsCsvParser.parse(content)
}

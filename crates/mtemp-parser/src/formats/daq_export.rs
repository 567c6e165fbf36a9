use crate::errors::ParserError;
use crate::model::{DaqFile, FileMetadata};
use crate::registry::DaqParser;

use super::{build_daq_dataframe, classify_daq_header, read_daq_rows, strip_bom};

/// DAQ table re-exported without its metadata block; the column header is
/// the first line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaqExportParser;

impl DaqExportParser {
    const NAME: &'static str = "DAQ_EXPORT";
}

impl DaqParser for DaqExportParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<DaqFile, ParserError> {
        let content = strip_bom(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut records = reader.records();

        let header = records
            .next()
            .ok_or(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "file is empty".to_string(),
            })?
            .map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?;

        let roles = classify_daq_header(Self::NAME, &header, 1)?;
        let columns = read_daq_rows(Self::NAME, &roles, records, 0)?;
        let df = build_daq_dataframe(Self::NAME, columns)?;

        Ok(DaqFile {
            parser: Self::NAME,
            file_metadata: FileMetadata::new(),
            first_data_line: 2,
            df,
        })
    }
}

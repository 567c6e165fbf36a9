use crate::errors::ParserError;
use crate::model::{DaqFile, FileMetadata};
use crate::registry::DaqParser;

use super::schema::DEFAULT_DAQ_HEADER_LINES;
use super::{build_daq_dataframe, classify_daq_header, parse_metadata_line, read_daq_rows, strip_bom};

/// DAQ log with a fixed-size `Key: Value` metadata block above the table.
#[derive(Debug, Clone, Copy)]
pub struct DaqLogParser {
    header_lines: usize,
}

impl Default for DaqLogParser {
    fn default() -> Self {
        Self {
            header_lines: DEFAULT_DAQ_HEADER_LINES,
        }
    }
}

impl DaqLogParser {
    const NAME: &'static str = "DAQ_LOG";

    pub fn new(header_lines: usize) -> Self {
        Self { header_lines }
    }

    fn split_metadata<'a>(&self, content: &'a str) -> Result<(FileMetadata, &'a str), ParserError> {
        let mut metadata = FileMetadata::new();
        let mut offset = 0usize;
        let mut lines = content.split_inclusive('\n');

        for idx in 0..self.header_lines {
            let line = lines.next().ok_or_else(|| ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!(
                    "file ended after {idx} lines, expected {} metadata lines",
                    self.header_lines
                ),
            })?;
            offset += line.len();

            let (key, value) =
                parse_metadata_line(line).ok_or_else(|| ParserError::FormatMismatch {
                    parser: Self::NAME,
                    reason: format!("metadata line {} is not a 'Key: Value' pair", idx + 1),
                })?;
            metadata.insert(key, value);
        }

        Ok((metadata, &content[offset..]))
    }
}

impl DaqParser for DaqLogParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<DaqFile, ParserError> {
        let content = strip_bom(content);
        let (file_metadata, table) = self.split_metadata(content)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(table.as_bytes());
        let mut records = reader.records();

        let header = records
            .next()
            .ok_or(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "file missing column header row".to_string(),
            })?
            .map_err(|err| ParserError::Csv {
                parser: Self::NAME,
                source: err,
            })?;

        let roles = classify_daq_header(Self::NAME, &header, self.header_lines + 1)?;
        let columns = read_daq_rows(Self::NAME, &roles, records, self.header_lines)?;
        let df = build_daq_dataframe(Self::NAME, columns)?;

        Ok(DaqFile {
            parser: Self::NAME,
            file_metadata,
            first_data_line: self.header_lines + 2,
            df,
        })
    }
}

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_from_rs, Reader, Xls, Xlsx};
use serde::Serialize;

use super::utils::{cell_to_string, is_blank_record};
use crate::error::AppError;
use crate::models::Table;

/// Candidate field separators for delimited text, in preference order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];
const DELIMITER_SAMPLE_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Delimited,
    Xlsx,
    Xls,
}

impl FileKind {
    /// Picks the parse path from the file extension alone.
    pub fn from_file_name(file_name: &str) -> Result<Self, AppError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") | Some("txt") => Ok(FileKind::Delimited),
            Some("xlsx") => Ok(FileKind::Xlsx),
            Some("xls") => Ok(FileKind::Xls),
            Some(other) => Err(AppError::UnsupportedFormat(format!(".{}", other))),
            None => Err(AppError::UnsupportedFormat(file_name.to_string())),
        }
    }
}

/// Turns uploaded bytes into a [`Table`].
#[derive(Debug, Clone)]
pub struct TableParser {
    max_file_size: usize,
}

impl TableParser {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn check_size(&self, size: usize) -> Result<(), AppError> {
        if size > self.max_file_size {
            return Err(AppError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn parse_upload(&self, file_name: &str, data: &[u8]) -> Result<Table, AppError> {
        self.check_size(data.len())?;
        let kind = FileKind::from_file_name(file_name)?;

        let start = std::time::Instant::now();
        let table = parse_bytes(data, kind)?;
        tracing::info!(
            "Parsed {} ({:?}): {} columns, {} rows in {:?}",
            file_name,
            kind,
            table.column_count(),
            table.row_count(),
            start.elapsed()
        );
        Ok(table)
    }
}

pub fn parse_bytes(data: &[u8], kind: FileKind) -> Result<Table, AppError> {
    match kind {
        FileKind::Delimited => parse_delimited(data),
        FileKind::Xlsx => {
            let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data)).map_err(|e| {
                tracing::error!("Failed to open Excel file: {}", e);
                AppError::ReadError(format!("Excel parse error: {}", e))
            })?;
            parse_first_sheet(workbook)
        }
        FileKind::Xls => {
            let workbook: Xls<_> = open_workbook_from_rs(Cursor::new(data)).map_err(|e| {
                tracing::error!("Failed to open Excel file: {}", e);
                AppError::ReadError(format!("Excel parse error: {}", e))
            })?;
            parse_first_sheet(workbook)
        }
    }
}

fn parse_delimited(data: &[u8]) -> Result<Table, AppError> {
    let decoded = String::from_utf8_lossy(data);
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&*decoded);
    let delimiter = detect_delimiter(text);
    tracing::debug!("Using delimiter {:?}", delimiter as char);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        records.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    into_table(records, "CSV file appears to be empty or invalid.")
}

fn parse_first_sheet<RS, R>(mut workbook: R) -> Result<Table, AppError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names().to_vec();
    tracing::debug!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::EmptyOrInvalidInput("Excel file appears to be empty.".to_string()))?
        .map_err(|e| AppError::ReadError(format!("Failed to read worksheet: {}", e)))?;

    let records = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect::<Vec<Vec<String>>>();

    into_table(records, "Excel file appears to be empty.")
}

/// First non-blank record becomes the header; remaining non-blank records
/// become rows, padded or truncated to the header width.
fn into_table(records: Vec<Vec<String>>, empty_message: &str) -> Result<Table, AppError> {
    let mut usable = records.into_iter().filter(|r| !is_blank_record(r));

    let headers = usable
        .next()
        .ok_or_else(|| AppError::EmptyOrInvalidInput(empty_message.to_string()))?;
    let rows: Vec<Vec<String>> = usable.collect();
    if rows.is_empty() {
        return Err(AppError::EmptyOrInvalidInput(empty_message.to_string()));
    }

    Ok(Table::new(headers, rows))
}

/// Guesses the separator from the first lines: the candidate that appears the
/// same non-zero number of times on every sampled line, most occurrences
/// first. Falls back to a comma.
fn detect_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    let mut best = (b',', 0usize);
    for &candidate in DELIMITERS.iter() {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.bytes().filter(|b| *b == candidate).count())
            .collect();
        let first = counts.first().copied().unwrap_or(0);
        if first > best.1 && counts.iter().all(|c| *c == first) {
            best = (candidate, first);
        }
    }
    best.0
}

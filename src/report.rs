//! CSV reports.
//!
//! Every command writes one CSV file: a fixed header followed by one row per
//! record or outcome. Plain fields are written verbatim; a field holding a
//! comma, a double quote or a line break is quoted with inner quotes doubled,
//! so host names or process names with commas no longer shift columns.
//!
//! The inactive-device report is also an input: `deregister` and
//! `bulk-deregister` read it back with [`read_inactive_list`].

use std::io::{BufRead, Write};

use crate::devices::Device;
use crate::error::{CbcError, Result};
use crate::inactivity::Cutoff;

pub const INACTIVE_HEADER: &[&str] = &[
    "Device_Id",
    "Device_Name",
    "Inactive_date",
    "Last_communication_date",
    "Sensor_Version",
];

pub const DEREGISTER_HEADER: &[&str] = &[
    "Device_Id",
    "Device_Name",
    "Inactive_date",
    "Last_communication_date",
    "Sensor_Version",
    "Result",
];

pub const BULK_HEADER: &[&str] = &["Batch", "Device_Id", "Device_Name", "Result"];

/// Quotes a field only when it would otherwise break the row.
pub fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        std::borrow::Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}

/// Splits one CSV line into fields, honoring double-quoted fields.
pub fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Row-at-a-time CSV writer.
pub struct CsvWriter<W: Write> {
    out: W,
    rows: usize,
}

impl<W: Write> CsvWriter<W> {
    /// Wraps `out` and writes the header row.
    pub fn new(mut out: W, header: &[&str]) -> Result<Self> {
        writeln!(out, "{}", header.join(","))?;
        Ok(CsvWriter { out, rows: 0 })
    }

    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let line: Vec<_> = fields.iter().map(|f| escape_field(f.as_ref())).collect();
        writeln!(self.out, "{}", line.join(","))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// One row of the inactive-device report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactiveEntry {
    pub device_id: String,
    pub name: String,
    /// Cutoff label (`YYYYMMDD`) of the scan that listed the device.
    pub cutoff: String,
    /// Last contact time exactly as the API reported it at scan time.
    pub last_contact: String,
    pub sensor_version: String,
}

impl InactiveEntry {
    pub fn from_device(device: &Device, cutoff: &Cutoff) -> Self {
        InactiveEntry {
            device_id: device.id.clone(),
            name: device.name.clone().unwrap_or_default(),
            cutoff: cutoff.label(),
            last_contact: device.last_contact_time.clone().unwrap_or_default(),
            sensor_version: device.sensor_version.clone().unwrap_or_default(),
        }
    }

    pub fn fields(&self) -> [&str; 5] {
        [
            &self.device_id,
            &self.name,
            &self.cutoff,
            &self.last_contact,
            &self.sensor_version,
        ]
    }
}

/// Byte order mark some spreadsheet tools put in front of a saved CSV.
const BOM: char = '\u{feff}';

/// True while `record` ends inside a quoted field. Doubled quotes inside a
/// field keep the count even, so plain parity is enough.
fn quote_open(record: &str) -> bool {
    record.matches('"').count() % 2 == 1
}

/// Reads an inactive-device report.
///
/// The header row is optional; blank lines are skipped. A quoted field may
/// span several physical lines, as [`CsvWriter`] writes them. Columns beyond
/// the fifth (e.g. a `Result` column from an earlier run) are ignored.
pub fn read_inactive_list<R: BufRead>(reader: R) -> Result<Vec<InactiveEntry>> {
    let mut entries = Vec::new();
    let mut lines = reader.lines().enumerate();

    while let Some((idx, line)) = lines.next() {
        let first_line = idx + 1;
        let mut record = line?.trim_end_matches('\r').to_string();
        if idx == 0 {
            record = record.trim_start_matches(BOM).to_string();
        }
        while quote_open(&record) {
            match lines.next() {
                Some((_, line)) => {
                    record.push('\n');
                    record.push_str(line?.trim_end_matches('\r'));
                }
                None => {
                    return Err(CbcError::Input {
                        line: first_line,
                        message: "unterminated quoted field".to_string(),
                    });
                }
            }
        }
        if record.trim().is_empty() {
            continue;
        }

        let fields = split_line(&record);
        if idx == 0 && fields[0] == INACTIVE_HEADER[0] {
            continue;
        }
        if fields.len() < INACTIVE_HEADER.len() {
            return Err(CbcError::Input {
                line: first_line,
                message: format!(
                    "expected {} fields, found {}",
                    INACTIVE_HEADER.len(),
                    fields.len()
                ),
            });
        }
        if fields[0].trim().is_empty() {
            return Err(CbcError::Input {
                line: first_line,
                message: "empty device id".to_string(),
            });
        }
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();
        entries.push(InactiveEntry {
            device_id: next().trim().to_string(),
            name: next(),
            cutoff: next(),
            last_contact: next(),
            sensor_version: next(),
        });
    }
    Ok(entries)
}

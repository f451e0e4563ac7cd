//! Inactivity cutoff and per-device classification.
//!
//! A device is inactive when the calendar date of its last contact is
//! strictly earlier than "today minus threshold days". Both sides are
//! reduced to a `YYYYMMDD` integer, so time of day never matters.

use std::io::Write;

use chrono::{Datelike, Days, NaiveDate};

use crate::client::CbcClient;
use crate::devices::{Device, DeviceCriteria, search_path};
use crate::error::{CbcError, Result};
use crate::report::{CsvWriter, InactiveEntry};
use crate::scan::scan;

/// Thresholds below this many days trigger a warning: the list may then
/// contain endpoints that are merely switched off or in storage.
pub const LOW_THRESHOLD_DAYS: u32 = 30;

/// Reduces an ISO 8601 timestamp (or plain date) to its `YYYYMMDD` key.
///
/// Returns `None` when fewer than eight digits precede the time part.
pub fn date_key(timestamp: &str) -> Option<u32> {
    let digits: String = timestamp.chars().filter(|c| *c != '-').take(8).collect();
    if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Parses the inactivity threshold argument.
pub fn parse_threshold(arg: &str) -> Result<u32> {
    let value: i64 = arg.trim().parse().map_err(|_| {
        CbcError::InvalidArgument(format!("threshold is not a number: >{arg}<"))
    })?;
    if value < 0 {
        return Err(CbcError::InvalidArgument(format!(
            "threshold is negative: {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| CbcError::InvalidArgument(format!("threshold is too large: {value}")))
}

/// Result of classifying one device against the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inactivity {
    /// Last contact is strictly before the cutoff date.
    Inactive,
    /// Last contact is on or after the cutoff date.
    Active,
    /// No usable last-contact timestamp; the device is neither listed nor
    /// silently dropped.
    Unknown,
}

/// The cutoff date, computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoff {
    date: NaiveDate,
}

impl Cutoff {
    /// `today - days`.
    pub fn from_threshold(today: NaiveDate, days: u32) -> Result<Self> {
        let date = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| {
                CbcError::InvalidArgument(format!("threshold of {days} days is out of range"))
            })?;
        Ok(Cutoff { date })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The cutoff as a `YYYYMMDD` integer.
    pub fn key(&self) -> u32 {
        self.date.year().unsigned_abs() * 10_000 + self.date.month() * 100 + self.date.day()
    }

    /// The cutoff as written into reports, e.g. `20240503`.
    pub fn label(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn classify_timestamp(&self, last_contact: Option<&str>) -> Inactivity {
        match last_contact.and_then(date_key) {
            Some(key) if key < self.key() => Inactivity::Inactive,
            Some(_) => Inactivity::Active,
            None => Inactivity::Unknown,
        }
    }

    pub fn classify(&self, device: &Device) -> Inactivity {
        self.classify_timestamp(device.last_contact_time.as_deref())
    }
}

/// Devices partitioned by [`Cutoff::classify`], each list in input order.
#[derive(Debug, Default)]
pub struct Partition {
    pub inactive: Vec<Device>,
    pub unknown: Vec<Device>,
    pub active: usize,
}

/// Splits scanned devices into inactive and unknown lists.
pub fn partition(devices: Vec<Device>, cutoff: &Cutoff) -> Partition {
    let mut out = Partition::default();
    for device in devices {
        match cutoff.classify(&device) {
            Inactivity::Inactive => out.inactive.push(device),
            Inactivity::Active => out.active += 1,
            Inactivity::Unknown => {
                tracing::warn!(
                    device_id = %device.id,
                    name = device.name.as_deref().unwrap_or(""),
                    "device has no usable last contact time"
                );
                out.unknown.push(device);
            }
        }
    }
    out
}

/// Scans all registered devices and partitions them against `cutoff`.
pub async fn find_inactive(
    client: &CbcClient,
    cutoff: &Cutoff,
    page_size: u64,
) -> Result<Partition> {
    let devices: Vec<Device> = scan(
        client,
        &search_path(client),
        &DeviceCriteria::registered(),
        page_size,
    )
    .await?;
    Ok(partition(devices, cutoff))
}

/// Writes one report row per inactive device; returns the row count.
pub fn write_inactive_report<W: Write>(
    inactive: &[Device],
    cutoff: &Cutoff,
    report: &mut CsvWriter<W>,
) -> Result<usize> {
    for device in inactive {
        report.write_row(&InactiveEntry::from_device(device, cutoff).fields())?;
    }
    Ok(inactive.len())
}

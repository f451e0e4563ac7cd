//! Device endpoints of the CBC Devices API (`appservices/v6`).
//!
//! - [`search_path`] / [`DeviceCriteria`] — the `devices/_search` endpoint,
//!   driven page by page through [`crate::scan`].
//! - [`get_device`] — fetch a single device by id.
//! - [`export_devices`] — the `devices/_search/download` CSV export.
//!
//! Reference: <https://developer.carbonblack.com/reference/carbon-black-cloud/platform/latest/devices-api/>

use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::CbcClient;
use crate::error::{CbcError, Result};

// ── Response types ─────────────────────────────────────────────────────

/// Sensor/device status as reported by CBC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Pending,
    Registered,
    Uninstalled,
    Deregistered,
    Active,
    Inactive,
    Error,
    BypassOn,
    Bypass,
    Quarantine,
    #[serde(rename = "SENSOR_OUTOFDATE")]
    SensorOutOfDate,
    Deleted,
    Live,
    /// Any status string this crate does not know about yet.
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    /// Every status the API documents, in the order the export keyword list
    /// is printed.
    pub const ALL: [DeviceStatus; 13] = [
        DeviceStatus::Pending,
        DeviceStatus::Registered,
        DeviceStatus::Uninstalled,
        DeviceStatus::Deregistered,
        DeviceStatus::Active,
        DeviceStatus::Inactive,
        DeviceStatus::Error,
        DeviceStatus::BypassOn,
        DeviceStatus::Bypass,
        DeviceStatus::Quarantine,
        DeviceStatus::SensorOutOfDate,
        DeviceStatus::Deleted,
        DeviceStatus::Live,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Pending => "PENDING",
            DeviceStatus::Registered => "REGISTERED",
            DeviceStatus::Uninstalled => "UNINSTALLED",
            DeviceStatus::Deregistered => "DEREGISTERED",
            DeviceStatus::Active => "ACTIVE",
            DeviceStatus::Inactive => "INACTIVE",
            DeviceStatus::Error => "ERROR",
            DeviceStatus::BypassOn => "BYPASS_ON",
            DeviceStatus::Bypass => "BYPASS",
            DeviceStatus::Quarantine => "QUARANTINE",
            DeviceStatus::SensorOutOfDate => "SENSOR_OUTOFDATE",
            DeviceStatus::Deleted => "DELETED",
            DeviceStatus::Live => "LIVE",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device as returned by `devices/_search` and `devices/{id}`.
///
/// Only the fields the reports use are modelled; serde ignores the rest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    /// CBC returns ids as JSON numbers; they are kept as strings because
    /// they are only ever echoed back.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// ISO 8601 timestamp, e.g. `"2024-05-01T00:00:00.000Z"`. Absent for
    /// devices that never checked in.
    #[serde(default)]
    pub last_contact_time: Option<String>,

    #[serde(default)]
    pub sensor_version: Option<String>,

    #[serde(default = "unknown_status")]
    pub status: DeviceStatus,

    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub policy_name: Option<String>,
}

fn unknown_status() -> DeviceStatus {
    DeviceStatus::Unknown
}

fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, found {other}"
        ))),
    }
}

/// Like `string_or_number`, for optional fields; `null` and absence are both
/// `None`.
pub(crate) fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

/// Search reply shared by the device and alert search endpoints.
#[derive(Debug, Deserialize)]
pub struct SearchResponse<T> {
    pub num_found: u64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

// ── Request types ──────────────────────────────────────────────────────

/// Search body: `{"criteria": {...}, "start": n, "rows": n}`.
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a, C> {
    pub criteria: &'a C,
    pub start: u64,
    pub rows: u64,
}

/// Criteria for `devices/_search`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCriteria {
    pub status: Vec<DeviceStatus>,
}

impl DeviceCriteria {
    pub fn registered() -> Self {
        DeviceCriteria {
            status: vec![DeviceStatus::Registered],
        }
    }
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Path of the device search endpoint for the client's org.
pub fn search_path(client: &CbcClient) -> String {
    client.org_path("devices/_search")
}

/// Fetches a single device. Returns `Ok(None)` when CBC answers 404.
///
/// # Errors
///
/// - `CbcError::Api` — any other non-success status (401 for a bad key).
/// - `CbcError::Network` / `CbcError::Parse` — transport or body failure.
pub async fn get_device(client: &CbcClient, device_id: &str) -> Result<Option<Device>> {
    let path = client.org_path(&format!("devices/{device_id}"));
    match client.get::<Device>(&path).await {
        Ok(device) => Ok(Some(device)),
        Err(CbcError::Api {
            status: StatusCode::NOT_FOUND,
            ..
        }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Keywords accepted by the inventory export: `ALL` plus every device
/// status.
pub fn export_keywords() -> Vec<&'static str> {
    std::iter::once("ALL")
        .chain(DeviceStatus::ALL.iter().map(|s| s.as_str()))
        .collect()
}

/// Normalizes an export keyword (case-insensitive) to the lowercase form
/// the download endpoint takes.
pub fn parse_export_keyword(keyword: &str) -> Result<String> {
    let upper = keyword.to_ascii_uppercase();
    if export_keywords().contains(&upper.as_str()) {
        Ok(upper.to_ascii_lowercase())
    } else {
        Err(CbcError::InvalidArgument(format!(
            "invalid device status >{keyword}<, valid values: {}",
            export_keywords().join(" | ")
        )))
    }
}

/// Downloads the device inventory for a status keyword as CSV text.
///
/// `status` must already be normalized by [`parse_export_keyword`].
pub async fn export_devices(client: &CbcClient, status: &str) -> Result<String> {
    let path = client.org_path(&format!("devices/_search/download?status={status}"));
    client.get_text(&path).await
}

/// Number of device rows in an inventory export: non-blank lines after the
/// header.
pub fn export_row_count(csv: &str) -> usize {
    csv.lines()
        .filter(|l| !l.trim().is_empty())
        .count()
        .saturating_sub(1)
}

//! Alert retrieval from the CBC Alerts API (`alerts/cbanalytics/_search`).
//!
//! Alerts are selected by a date window (inclusive, whole days, UTC) and
//! the `policy_applied = APPLIED` criterion, then fetched through the
//! paginated scanner and flattened into one CSV row each.
//!
//! Reference: <https://developer.carbonblack.com/reference/carbon-black-cloud/platform/latest/alerts-api/>

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::client::CbcClient;
use crate::devices::opt_string_or_number;
use crate::error::{CbcError, Result};
use crate::scan::scan;

/// Days covered when only a start date is given.
pub const DEFAULT_WINDOW_DAYS: u64 = 30;

pub const ALERT_HEADER: &[&str] = &[
    "device_name",
    "device_username",
    "policy_name",
    "create_date",
    "create_time_utc",
    "severity",
    "process_name",
    "reason",
    "threat_cause_threat_category",
    "blocked_threat_category",
    "sensor_action",
    "run_state",
    "TTPS",
    "device_id",
    "legacy_alert_id",
    "id",
];

// ── Date window ────────────────────────────────────────────────────────

/// Parses a strict `YYYY-MM-DD` date.
///
/// Unpadded forms like `2020-1-5` are rejected along with impossible dates
/// like `2020-13-01`.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let well_formed = text.len() == 10
        && text.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    let invalid = || {
        CbcError::InvalidArgument(format!(
            "invalid date >{text}<, expected YYYY-MM-DD"
        ))
    };
    if !well_formed {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())
}

/// Inclusive range of calendar days to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AlertWindow {
    /// The whole calendar month before `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_month = today.with_day(1).unwrap_or(today);
        let end = first_of_month.pred_opt().unwrap_or(first_of_month);
        let start = end.with_day(1).unwrap_or(end);
        AlertWindow { start, end }
    }

    /// `start` plus [`DEFAULT_WINDOW_DAYS`].
    pub fn from_start(start: NaiveDate) -> Result<Self> {
        let end = start
            .checked_add_days(Days::new(DEFAULT_WINDOW_DAYS))
            .ok_or_else(|| CbcError::InvalidArgument(format!("start date {start} out of range")))?;
        Ok(AlertWindow { start, end })
    }

    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(CbcError::InvalidArgument(format!(
                "start date ({start}) is later than end date ({end})"
            )));
        }
        Ok(AlertWindow { start, end })
    }

    /// Builds the window from zero, one or two positional date arguments.
    pub fn from_args(today: NaiveDate, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        match (start, end) {
            (None, _) => Ok(Self::previous_month(today)),
            (Some(s), None) => Self::from_start(parse_date(s)?),
            (Some(s), Some(e)) => Self::new(parse_date(s)?, parse_date(e)?),
        }
    }

    pub fn criteria(&self) -> AlertCriteria {
        AlertCriteria {
            policy_applied: vec!["APPLIED".to_string()],
            create_time: TimeRange {
                start: format!("{}T00:00:00.000Z", self.start.format("%Y-%m-%d")),
                end: format!("{}T23:59:59.999Z", self.end.format("%Y-%m-%d")),
            },
        }
    }
}

// ── Request / response types ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Criteria for the alert search.
#[derive(Debug, Clone, Serialize)]
pub struct AlertCriteria {
    pub policy_applied: Vec<String>,
    pub create_time: TimeRange,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreatIndicator {
    #[serde(default)]
    pub ttps: Vec<String>,
}

/// An alert as returned by the cbanalytics search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Alert {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub legacy_alert_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_username: Option<String>,
    #[serde(default)]
    pub policy_name: Option<String>,
    /// ISO 8601 UTC timestamp, e.g. `"2024-05-01T13:45:10.123Z"`.
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub severity: Option<String>,
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub threat_cause_threat_category: Option<String>,
    #[serde(default)]
    pub blocked_threat_category: Option<String>,
    #[serde(default)]
    pub sensor_action: Option<String>,
    #[serde(default)]
    pub run_state: Option<String>,
    #[serde(default)]
    pub threat_indicators: Vec<ThreatIndicator>,
}

impl Alert {
    /// `YYYY-MM-DD` part of `create_time`.
    pub fn create_date(&self) -> &str {
        self.create_time
            .as_deref()
            .and_then(|t| t.get(0..10))
            .unwrap_or("")
    }

    /// Time part of `create_time` without the trailing `Z`.
    pub fn create_time_utc(&self) -> &str {
        self.create_time
            .as_deref()
            .and_then(|t| t.get(11..))
            .map(|t| t.trim_end_matches('Z'))
            .unwrap_or("")
    }

    /// First TTP of each threat indicator, joined with `|`.
    pub fn ttps(&self) -> String {
        self.threat_indicators
            .iter()
            .filter_map(|ti| ti.ttps.first())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Report row in [`ALERT_HEADER`] order.
    pub fn row(&self) -> Vec<String> {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            text(&self.device_name),
            text(&self.device_username),
            text(&self.policy_name),
            self.create_date().to_string(),
            self.create_time_utc().to_string(),
            text(&self.severity),
            text(&self.process_name),
            text(&self.reason),
            text(&self.threat_cause_threat_category),
            text(&self.blocked_threat_category),
            text(&self.sensor_action),
            text(&self.run_state),
            self.ttps(),
            text(&self.device_id),
            text(&self.legacy_alert_id),
            text(&self.id),
        ]
    }
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Fetches every alert created inside `window`.
///
/// # Errors
///
/// - `CbcError::Api` — 400 for a malformed query, 401/404 for key or org
///   problems; the scan stops at the first failure.
/// - `CbcError::Network` / `CbcError::Parse` — transport or body failure.
pub async fn search_alerts(
    client: &CbcClient,
    window: &AlertWindow,
    page_size: u64,
) -> Result<Vec<Alert>> {
    let path = client.org_path("alerts/cbanalytics/_search");
    let criteria = window.criteria();
    tracing::info!(
        start = %criteria.create_time.start,
        end = %criteria.create_time.end,
        "searching alerts with policy applied"
    );
    scan(client, &path, &criteria, page_size).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn parse_date_accepts_valid_dates() {
        assert_eq!(d("2020-01-05"), NaiveDate::from_ymd_opt(2020, 1, 5).unwrap());
        assert!(parse_date("2024-02-29").is_ok());
    }

    #[test]
    fn parse_date_rejects_invalid_dates() {
        for bad in [
            "2020-13-01",
            "2023-02-29",
            "2020-1-5",
            "2020/01/05",
            "20200105",
            "2020-01-05T00:00:00",
            "",
            "yyyy-mm-dd",
        ] {
            assert!(parse_date(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn previous_month_spans_first_to_last_day() {
        let w = AlertWindow::previous_month(d("2024-03-15"));
        assert_eq!(w.start, d("2024-02-01"));
        assert_eq!(w.end, d("2024-02-29"));
    }

    #[test]
    fn previous_month_wraps_year() {
        let w = AlertWindow::previous_month(d("2024-01-01"));
        assert_eq!(w.start, d("2023-12-01"));
        assert_eq!(w.end, d("2023-12-31"));
    }

    #[test]
    fn single_start_date_covers_thirty_days() {
        let w = AlertWindow::from_args(d("2024-06-01"), Some("2019-10-01"), None).unwrap();
        assert_eq!(w.start, d("2019-10-01"));
        assert_eq!(w.end, d("2019-10-31"));
    }

    #[test]
    fn start_after_end_is_rejected() {
        let err = AlertWindow::from_args(d("2024-06-01"), Some("2019-11-10"), Some("2019-11-01"))
            .unwrap_err();
        assert!(err.to_string().contains("later than"));
    }

    #[test]
    fn same_day_window_is_allowed() {
        let w = AlertWindow::from_args(d("2024-06-01"), Some("2019-11-01"), Some("2019-11-01"))
            .unwrap();
        assert_eq!(w.start, w.end);
    }

    #[test]
    fn criteria_cover_whole_days() {
        let w = AlertWindow::new(d("2019-11-01"), d("2019-11-10")).unwrap();
        let json = serde_json::to_value(w.criteria()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "policy_applied": ["APPLIED"],
                "create_time": {
                    "start": "2019-11-01T00:00:00.000Z",
                    "end": "2019-11-10T23:59:59.999Z"
                }
            })
        );
    }

    #[test]
    fn alert_row_flattens_fields() {
        let alert: Alert = serde_json::from_value(serde_json::json!({
            "id": "a1b2c3",
            "legacy_alert_id": "LEG123",
            "device_id": 4455,
            "device_name": "HOST-1",
            "device_username": "jdoe",
            "policy_name": "Standard",
            "create_time": "2024-05-01T13:45:10.123Z",
            "severity": 5,
            "process_name": "powershell.exe",
            "reason": "Ran a script",
            "threat_cause_threat_category": "NON_MALWARE",
            "blocked_threat_category": "UNKNOWN",
            "sensor_action": "DENY",
            "run_state": "RAN",
            "threat_indicators": [
                {"process_name": "powershell.exe", "ttps": ["FILELESS", "RUN_CMD_SHELL"]},
                {"process_name": "cmd.exe", "ttps": ["POLICY_DENY"]},
                {"process_name": "x.exe", "ttps": []}
            ]
        }))
        .unwrap();
        assert_eq!(alert.create_date(), "2024-05-01");
        assert_eq!(alert.create_time_utc(), "13:45:10.123");
        assert_eq!(alert.ttps(), "FILELESS|POLICY_DENY");

        let row = alert.row();
        assert_eq!(row.len(), ALERT_HEADER.len());
        assert_eq!(row[0], "HOST-1");
        assert_eq!(row[5], "5");
        assert_eq!(row[13], "4455");
        assert_eq!(row[15], "a1b2c3");
    }

    #[test]
    fn sparse_alert_produces_empty_fields() {
        let alert: Alert = serde_json::from_str(r#"{"id": "x", "device_id": null}"#).unwrap();
        let row = alert.row();
        assert_eq!(row[3], "");
        assert_eq!(row[12], "");
        assert_eq!(row[13], "");
    }
}

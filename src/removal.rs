//! Two-phase sensor removal through the CBC device actions endpoint.
//!
//! A device can only be deleted after its sensor has been uninstalled, so
//! every removal is two POSTs to `device_actions`:
//!
//! 1. `UNINSTALL_SENSOR` for the unit of work (one device or a batch).
//!    Anything but `204 No Content` ends the unit as `uninstall_failed`
//!    and no delete is attempted.
//! 2. After a fixed settle interval, `DELETE_SENSOR` for the same ids.
//!    `204` is `success`, anything else `delete_failed`.
//!
//! The settle interval is a blind wait; the API offers no way to observe the
//! uninstall completing. There are no retries and nothing is rolled back.
//! Both actions are irreversible.
//!
//! The single-device path runs a [`precheck`] first so that a device which
//! came back online after the inactive report was generated is left alone.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use crate::client::CbcClient;
use crate::devices::{DeviceStatus, get_device};
use crate::error::{CbcError, Result};
use crate::report::{CsvWriter, InactiveEntry};

// ── Request types ──────────────────────────────────────────────────────

/// Device action verbs used by the removal workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    UninstallSensor,
    DeleteSensor,
}

/// Body of `POST .../device_actions`.
#[derive(Debug, Serialize)]
pub struct DeviceActionRequest<'a> {
    pub action_type: ActionType,
    pub device_id: &'a [String],
}

// ── Outcomes ───────────────────────────────────────────────────────────

/// Final result for one device (or one batch) of a removal run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemovalOutcome {
    Success,
    UninstallFailed,
    DeleteFailed,
    /// The request never produced an HTTP status (transport failure).
    UnknownError,
    AlreadyDeleted,
    /// The device checked in after the inactive report was generated.
    LastContactChanged,
    NotFound,
}

impl RemovalOutcome {
    /// Spelling used in the result CSV files.
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalOutcome::Success => "success",
            RemovalOutcome::UninstallFailed => "uninstall_failed",
            RemovalOutcome::DeleteFailed => "delete_failed",
            RemovalOutcome::UnknownError => "unknown_error",
            RemovalOutcome::AlreadyDeleted => "already_deleted",
            RemovalOutcome::LastContactChanged => "last_contact_date_changed",
            RemovalOutcome::NotFound => "not_found",
        }
    }
}

impl fmt::Display for RemovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of devices per outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutcomeTally(BTreeMap<RemovalOutcome, usize>);

impl OutcomeTally {
    pub fn record(&mut self, outcome: RemovalOutcome, devices: usize) {
        *self.0.entry(outcome).or_insert(0) += devices;
    }

    pub fn get(&self, outcome: RemovalOutcome) -> usize {
        self.0.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RemovalOutcome, usize)> + '_ {
        self.0.iter().map(|(o, n)| (*o, *n))
    }
}

// ── Configuration ──────────────────────────────────────────────────────

/// Waits used by the removal workflow.
#[derive(Debug, Clone)]
pub struct RemovalConfig {
    /// Blind wait between a successful uninstall and the delete.
    pub settle: Duration,
    /// Pause between consecutive bulk batches; throttling hygiene, not
    /// error recovery.
    pub batch_pause: Duration,
}

impl RemovalConfig {
    pub fn new(settle: Duration, batch_pause: Duration) -> Self {
        RemovalConfig {
            settle,
            batch_pause,
        }
    }
}

impl Default for RemovalConfig {
    fn default() -> Self {
        RemovalConfig {
            settle: Duration::from_secs(5),
            batch_pause: Duration::from_secs(10),
        }
    }
}

// ── Two-phase remover ──────────────────────────────────────────────────

async fn send_action(
    client: &CbcClient,
    action_type: ActionType,
    device_ids: &[String],
) -> Result<StatusCode> {
    let path = client.org_path("device_actions");
    let body = DeviceActionRequest {
        action_type,
        device_id: device_ids,
    };
    client.post_status(&path, &body).await
}

/// Uninstalls and then deletes the sensors of `device_ids` as one unit.
///
/// Never fails: every HTTP or transport problem maps to an outcome.
pub async fn remove_devices(
    client: &CbcClient,
    device_ids: &[String],
    config: &RemovalConfig,
) -> RemovalOutcome {
    match send_action(client, ActionType::UninstallSensor, device_ids).await {
        Ok(StatusCode::NO_CONTENT) => {}
        Ok(status) => {
            tracing::warn!(%status, devices = device_ids.len(), "uninstall rejected");
            return RemovalOutcome::UninstallFailed;
        }
        Err(e) => {
            tracing::warn!(error = %e, devices = device_ids.len(), "uninstall request failed");
            return RemovalOutcome::UnknownError;
        }
    }

    tokio::time::sleep(config.settle).await;

    match send_action(client, ActionType::DeleteSensor, device_ids).await {
        Ok(StatusCode::NO_CONTENT) => RemovalOutcome::Success,
        Ok(status) => {
            tracing::warn!(%status, devices = device_ids.len(), "delete rejected");
            RemovalOutcome::DeleteFailed
        }
        Err(e) => {
            tracing::warn!(error = %e, devices = device_ids.len(), "delete request failed");
            RemovalOutcome::UnknownError
        }
    }
}

// ── Single-device path ─────────────────────────────────────────────────

/// Result of checking a device before removing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    Ready,
    AlreadyDeleted,
    LastContactChanged,
    NotFound,
}

impl Precheck {
    /// The outcome to record when the removal is skipped.
    pub fn skip_outcome(self) -> Option<RemovalOutcome> {
        match self {
            Precheck::Ready => None,
            Precheck::AlreadyDeleted => Some(RemovalOutcome::AlreadyDeleted),
            Precheck::LastContactChanged => Some(RemovalOutcome::LastContactChanged),
            Precheck::NotFound => Some(RemovalOutcome::NotFound),
        }
    }
}

/// Looks the device up and compares it with what the inactive report
/// recorded.
///
/// # Errors
///
/// - `CbcError::Api` with 401 — the API key is rejected; every later call
///   would fail the same way.
/// - `CbcError::Network` / `CbcError::Parse` — transport or body failure.
pub async fn precheck(
    client: &CbcClient,
    device_id: &str,
    recorded_last_contact: &str,
) -> Result<Precheck> {
    let device = match get_device(client, device_id).await {
        Ok(Some(device)) => device,
        Ok(None) => return Ok(Precheck::NotFound),
        Err(CbcError::Api { status, body }) if status != StatusCode::UNAUTHORIZED => {
            tracing::warn!(device_id, %status, %body, "device lookup failed");
            return Ok(Precheck::NotFound);
        }
        Err(e) => return Err(e),
    };

    if device.status == DeviceStatus::Deleted {
        return Ok(Precheck::AlreadyDeleted);
    }
    if device.last_contact_time.as_deref().unwrap_or("") != recorded_last_contact {
        return Ok(Precheck::LastContactChanged);
    }
    Ok(Precheck::Ready)
}

/// Removes the devices of an inactive report one at a time.
///
/// Each entry gets a precheck, then (if ready) a one-device two-phase
/// removal. One result row per entry is appended to `report`.
///
/// # Errors
///
/// Only fatal conditions end the run early: a 401 during the precheck, or
/// a failure writing the report. Everything else is a per-device outcome.
pub async fn deregister_each<W: Write>(
    client: &CbcClient,
    entries: &[InactiveEntry],
    config: &RemovalConfig,
    report: &mut CsvWriter<W>,
) -> Result<OutcomeTally> {
    let mut tally = OutcomeTally::default();

    for entry in entries {
        let outcome = match precheck(client, &entry.device_id, &entry.last_contact).await {
            Ok(check) => match check.skip_outcome() {
                Some(skipped) => skipped,
                None => {
                    let ids = std::slice::from_ref(&entry.device_id);
                    remove_devices(client, ids, config).await
                }
            },
            Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => return Err(e),
            Err(e) => {
                tracing::warn!(device_id = %entry.device_id, error = %e, "precheck failed");
                RemovalOutcome::UnknownError
            }
        };

        tracing::info!(
            device_id = %entry.device_id,
            hostname = %entry.name,
            %outcome,
            "device processed"
        );

        let [id, name, cutoff, last_contact, version] = entry.fields();
        report.write_row(&[id, name, cutoff, last_contact, version, outcome.as_str()])?;
        tally.record(outcome, 1);
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_request_serializes_api_shape() {
        let ids = vec!["101".to_string(), "102".to_string()];
        let body = DeviceActionRequest {
            action_type: ActionType::UninstallSensor,
            device_id: &ids,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"action_type": "UNINSTALL_SENSOR", "device_id": ["101", "102"]})
        );
    }

    #[test]
    fn delete_action_spelling() {
        assert_eq!(
            serde_json::to_string(&ActionType::DeleteSensor).unwrap(),
            r#""DELETE_SENSOR""#
        );
    }

    #[test]
    fn outcome_strings_match_report_format() {
        let all = [
            (RemovalOutcome::Success, "success"),
            (RemovalOutcome::UninstallFailed, "uninstall_failed"),
            (RemovalOutcome::DeleteFailed, "delete_failed"),
            (RemovalOutcome::UnknownError, "unknown_error"),
            (RemovalOutcome::AlreadyDeleted, "already_deleted"),
            (RemovalOutcome::LastContactChanged, "last_contact_date_changed"),
            (RemovalOutcome::NotFound, "not_found"),
        ];
        for (outcome, text) in all {
            assert_eq!(outcome.to_string(), text);
        }
    }

    #[test]
    fn precheck_skip_outcomes() {
        assert_eq!(Precheck::Ready.skip_outcome(), None);
        assert_eq!(
            Precheck::AlreadyDeleted.skip_outcome(),
            Some(RemovalOutcome::AlreadyDeleted)
        );
        assert_eq!(
            Precheck::LastContactChanged.skip_outcome(),
            Some(RemovalOutcome::LastContactChanged)
        );
        assert_eq!(Precheck::NotFound.skip_outcome(), Some(RemovalOutcome::NotFound));
    }

    #[test]
    fn tally_counts_per_outcome() {
        let mut t = OutcomeTally::default();
        t.record(RemovalOutcome::Success, 50);
        t.record(RemovalOutcome::Success, 20);
        t.record(RemovalOutcome::DeleteFailed, 50);
        assert_eq!(t.get(RemovalOutcome::Success), 70);
        assert_eq!(t.get(RemovalOutcome::NotFound), 0);
        assert_eq!(t.total(), 120);
        assert_eq!(t.iter().count(), 2);
    }

    #[test]
    fn removal_config_defaults() {
        let c = RemovalConfig::default();
        assert_eq!(c.settle, Duration::from_secs(5));
        assert_eq!(c.batch_pause, Duration::from_secs(10));
    }
}

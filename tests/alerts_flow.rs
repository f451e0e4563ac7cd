//! Integration tests for the alert search using wiremock.
//!
//! These tests mock the CBC alert search to verify the request criteria
//! built from a date window and the flattening of alerts into report rows.

use cbc_devices::alerts::*;
use cbc_devices::client::CbcClient;
use cbc_devices::credentials::Credentials;
use cbc_devices::report::CsvWriter;
use chrono::NaiveDate;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALERTS_PATH: &str = "appservices/v6/orgs/ORGKEY/alerts/cbanalytics/_search";

/// Helper: creates a CbcClient pointed at the given wiremock server.
fn mock_client(server: &MockServer) -> CbcClient {
    let creds = Credentials::new("ABTOKEN", "ORGKEY", "1234");
    CbcClient::new(creds, &format!("{}/", server.uri())).unwrap()
}

fn sample_alert() -> serde_json::Value {
    serde_json::json!({
        "id": "a1b2c3",
        "legacy_alert_id": "LEGACY1",
        "device_id": 101,
        "device_name": "HOST-A",
        "device_username": "alice@example.com",
        "policy_name": "Standard",
        "create_time": "2019-11-05T13:45:10.123Z",
        "severity": 6,
        "process_name": "powershell.exe",
        "reason": "Ran a script, with arguments",
        "threat_cause_threat_category": "NON_MALWARE",
        "blocked_threat_category": "UNKNOWN",
        "sensor_action": "DENY",
        "run_state": "RAN",
        "threat_indicators": [
            {"ttps": ["POLICY_DENY", "FILELESS"]},
            {"ttps": ["RUN_UNKNOWN_APP"]},
            {"ttps": []}
        ]
    })
}

#[tokio::test]
async fn search_sends_window_criteria() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(ALERTS_PATH))
        .and(body_partial_json(serde_json::json!({
            "criteria": {
                "policy_applied": ["APPLIED"],
                "create_time": {
                    "start": "2019-11-01T00:00:00.000Z",
                    "end": "2019-11-10T23:59:59.999Z"
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "num_found": 1,
            "results": [sample_alert()]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let today = NaiveDate::from_ymd_opt(2019, 12, 15).unwrap();
    let window = AlertWindow::from_args(today, Some("2019-11-01"), Some("2019-11-10")).unwrap();
    let alerts = search_alerts(&client, &window, 30_000).await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].device_name.as_deref(), Some("HOST-A"));
    assert_eq!(alerts[0].device_id.as_deref(), Some("101"));
    assert_eq!(alerts[0].severity.as_deref(), Some("6"));
}

#[tokio::test]
async fn default_window_is_previous_month() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(ALERTS_PATH))
        .and(body_partial_json(serde_json::json!({
            "criteria": {
                "create_time": {
                    "start": "2024-02-01T00:00:00.000Z",
                    "end": "2024-02-29T23:59:59.999Z"
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "num_found": 0,
            "results": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let today = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();
    let window = AlertWindow::from_args(today, None, None).unwrap();
    let alerts = search_alerts(&client, &window, 30_000).await.unwrap();
    assert!(alerts.is_empty());
}

#[tokio::test]
async fn alert_rows_follow_report_columns() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(ALERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "num_found": 1,
            "results": [sample_alert()]
        })))
        .mount(&server)
        .await;

    let start = NaiveDate::from_ymd_opt(2019, 11, 1).unwrap();
    let window = AlertWindow::from_start(start).unwrap();
    let alerts = search_alerts(&client, &window, 30_000).await.unwrap();

    let mut report = CsvWriter::new(Vec::new(), ALERT_HEADER).unwrap();
    for alert in &alerts {
        report.write_row(&alert.row()).unwrap();
    }
    let csv = String::from_utf8(report.finish().unwrap()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("device_name,device_username,policy_name,create_date"));
    assert_eq!(
        lines[1],
        "HOST-A,alice@example.com,Standard,2019-11-05,13:45:10.123,6,powershell.exe,\
         \"Ran a script, with arguments\",NON_MALWARE,UNKNOWN,DENY,RAN,\
         POLICY_DENY|RUN_UNKNOWN_APP,101,LEGACY1,a1b2c3"
    );
}

#[tokio::test]
async fn failed_search_reports_status() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path(ALERTS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad criteria"))
        .mount(&server)
        .await;

    let window = AlertWindow::from_start(NaiveDate::from_ymd_opt(2019, 11, 1).unwrap()).unwrap();
    let err = search_alerts(&client, &window, 30_000).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
}

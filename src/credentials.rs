//! API credential loading for the Carbon Black Cloud API.
//!
//! Credentials live in a small text file (by default `apikey.txt`) that
//! holds the API token, the org key and the org id. Two layouts are
//! accepted:
//!
//! - a single comma-separated line: `<token>,<org_key>,<org_id>`
//! - one value per line
//!
//! Values may be wrapped in double quotes. The token is sent verbatim as the
//! `X-Auth-Token` header value.

use std::fmt;
use std::path::Path;

use crate::error::{CbcError, Result};

/// Default credential file name, resolved against the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = "apikey.txt";

/// Credentials for one CBC organization.
///
/// Loaded once per run and handed to [`CbcClient::new`](crate::client::CbcClient::new);
/// nothing else reads them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Value of the `X-Auth-Token` header.
    pub auth_token: String,
    /// Tenant identifier used in every API path.
    pub org_key: String,
    /// Numeric organization id. Not used in API paths, kept for reporting.
    pub org_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"<redacted>")
            .field("org_key", &self.org_key)
            .field("org_id", &self.org_id)
            .finish()
    }
}

impl Credentials {
    pub fn new(auth_token: &str, org_key: &str, org_id: &str) -> Self {
        Credentials {
            auth_token: auth_token.to_string(),
            org_key: org_key.to_string(),
            org_id: org_id.to_string(),
        }
    }

    /// Reads and parses a credential file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CbcError::Credentials {
            path: path.display().to_string(),
            message: "cannot read file".to_string(),
            source: Some(e),
        })?;

        Self::parse(&content).map_err(|message| CbcError::Credentials {
            path: path.display().to_string(),
            message,
            source: None,
        })
    }

    /// Parses credential file content. Returns a description of the problem
    /// on failure so that [`load`](Self::load) can attach the file path.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let values: Vec<&str> = content
            .split([',', '\n'])
            .map(|v| v.trim().trim_matches('"').trim())
            .filter(|v| !v.is_empty())
            .collect();

        match values.as_slice() {
            [token, org_key, org_id, ..] => Ok(Credentials::new(token, org_key, org_id)),
            _ => Err(format!(
                "expected <token>,<org_key>,<org_id>, found {} value(s)",
                values.len()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_comma_separated_line() {
        let creds = Credentials::parse("ABTOKEN,ORGKEY,1234\n").unwrap();
        assert_eq!(creds.auth_token, "ABTOKEN");
        assert_eq!(creds.org_key, "ORGKEY");
        assert_eq!(creds.org_id, "1234");
    }

    #[test]
    fn parses_quoted_values() {
        let creds = Credentials::parse(r#""SECRET/APIID","ORGKEY","1234""#).unwrap();
        assert_eq!(creds.auth_token, "SECRET/APIID");
        assert_eq!(creds.org_key, "ORGKEY");
        assert_eq!(creds.org_id, "1234");
    }

    #[test]
    fn parses_line_delimited_values() {
        let creds = Credentials::parse("SECRET/APIID\r\nORGKEY\r\n1234\r\n").unwrap();
        assert_eq!(creds.auth_token, "SECRET/APIID");
        assert_eq!(creds.org_key, "ORGKEY");
        assert_eq!(creds.org_id, "1234");
    }

    #[test]
    fn rejects_too_few_values() {
        let err = Credentials::parse("ONLYTOKEN,ORGKEY").unwrap_err();
        assert!(err.contains("found 2"), "got: {err}");
    }

    #[test]
    fn rejects_empty_file() {
        assert!(Credentials::parse("   \n").is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let creds = Credentials::new("TOPSECRET", "ORGKEY", "1");
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("TOPSECRET"));
        assert!(dbg.contains("ORGKEY"));
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join("cbc-devices-no-such-credentials.txt");
        let err = Credentials::load(&path).unwrap_err();
        assert!(matches!(err, CbcError::Credentials { source: Some(_), .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "cbc-devices-credentials-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "ABTOKEN,ORGKEY,1234").unwrap();
        let creds = Credentials::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(creds, Credentials::new("ABTOKEN", "ORGKEY", "1234"));
    }
}

//! Authenticated HTTP client for the Carbon Black Cloud API.
//!
//! `CbcClient` wraps a `reqwest::Client` together with the run's
//! [`Credentials`]. Every request carries the `X-Auth-Token` header, and all
//! org-scoped paths are built through [`CbcClient::org_path`] so no other
//! module touches the credentials directly.
//!
//! Three request styles are offered:
//! - `get` / `post` — JSON in, JSON out. Non-2xx replies become
//!   `CbcError::Api` with the response body preserved.
//! - `post_status` — for device actions, which signal success with
//!   `204 No Content`. The caller interprets the status itself.
//! - `get_text` — for the CSV inventory export.
//!
//! There is no retry anywhere: an API key is static, so a 401 will not go
//! away by asking again.

use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{CbcError, Result};

/// Header CBC reads the API key from.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Covers TCP + TLS handshake only.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full round trip. A 30000-row device search or an inventory export of a
/// large org can take well over a minute.
pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn build_api_client(request_timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()?)
}

/// Authenticated HTTP client for the CBC REST API.
///
/// `base_url` is stored as a `String` so tests can point it at a wiremock
/// server. It must end with `/`.
pub struct CbcClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl CbcClient {
    pub fn new(credentials: Credentials, base_url: &str) -> Result<Self> {
        Self::with_timeout(credentials, base_url, API_REQUEST_TIMEOUT)
    }

    /// Like [`CbcClient::new`] with a custom round-trip timeout.
    pub fn with_timeout(
        credentials: Credentials,
        base_url: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(CbcClient {
            client: build_api_client(request_timeout)?,
            base_url: base_url.to_string(),
            credentials,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Builds an org-scoped path: `appservices/v6/orgs/{org_key}/{suffix}`.
    pub fn org_path(&self, suffix: &str) -> String {
        format!("appservices/v6/orgs/{}/{}", self.credentials.org_key, suffix)
    }

    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .header(AUTH_HEADER, &self.credentials.auth_token);
        if let Some(payload) = body {
            req = req.json(payload);
        }
        req
    }

    /// Sends a request and returns the body text of a 2xx reply.
    ///
    /// The body is read before the status check so a failure keeps CBC's
    /// error message.
    async fn send_text<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String> {
        tracing::debug!(%method, path, "sending request");
        let resp = self.build_request(method, path, body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(CbcError::Api { status, body: text });
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let text = self.send_text(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Sends a GET request and deserializes the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json::<T, ()>(Method::GET, path, None).await
    }

    /// Sends a POST request with a JSON body and deserializes the response.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    /// Sends a POST request and returns only the status code.
    ///
    /// Transport failures are still errors; any HTTP status, including
    /// 4xx/5xx, is returned as `Ok`.
    pub async fn post_status<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<StatusCode> {
        tracing::debug!(path, "sending action request");
        let resp = self.build_request(Method::POST, path, Some(body)).send().await?;
        Ok(resp.status())
    }

    /// Sends a GET request and returns the raw body text.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        self.send_text::<()>(Method::GET, path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CbcClient {
        CbcClient::new(
            Credentials::new("ABTOKEN", "ORGKEY", "1234"),
            "https://example.test/",
        )
        .unwrap()
    }

    #[test]
    fn org_path_embeds_org_key() {
        assert_eq!(
            client().org_path("devices/_search"),
            "appservices/v6/orgs/ORGKEY/devices/_search"
        );
    }

    #[test]
    fn request_carries_auth_header() {
        let c = client();
        let req = c
            .build_request::<()>(Method::GET, "appservices/v6/orgs/ORGKEY/devices/1", None)
            .build()
            .unwrap();
        assert_eq!(req.headers()[AUTH_HEADER], "ABTOKEN");
        assert_eq!(
            req.url().as_str(),
            "https://example.test/appservices/v6/orgs/ORGKEY/devices/1"
        );
    }

    #[test]
    fn request_attaches_json_body() {
        let c = client();
        let body = serde_json::json!({"rows": 0});
        let req = c
            .build_request(Method::POST, "x", Some(&body))
            .build()
            .unwrap();
        assert_eq!(req.headers()["content-type"], "application/json");
        assert!(req.body().is_some());
    }
}

//! Read-only client for the BBS API.
//!
//! The cache only needs two list calls, expressed by [`RemoteStateClient`].
//! [`BbsHttpClient`] talks to a real BBS over HTTP(S); tests and the fixture
//! mode plug in other implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lrp::{RawActualLrp, RawDesiredLrp};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRIES: usize = 10;

const ACTUAL_LRPS_PATH: &str = "/v1/actual_lrps/list";
const DESIRED_LRPS_PATH: &str = "/v1/desired_lrps/list";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("bbs endpoint is missing")]
    EndpointMissing,
    #[error("invalid bbs endpoint {endpoint:?}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
    #[error("cannot build http client: {message}")]
    Build { message: String },
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("cannot read response: {message}")]
    Read { message: String },
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("cannot decode response: {message}")]
    Decode { message: String },
    #[error("bbs error {kind}: {message}")]
    Bbs { kind: String, message: String },
    #[error("fixture error: {message}")]
    Fixture { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActualLrpFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredLrpFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub process_guids: Vec<String>,
}

/// The two read-only queries the state cache issues every cycle.
#[async_trait]
pub trait RemoteStateClient: Send + Sync {
    async fn list_actual_lrps(
        &self,
        filter: &ActualLrpFilter,
    ) -> Result<Vec<RawActualLrp>, ClientError>;

    async fn list_desired_lrps(
        &self,
        filter: &DesiredLrpFilter,
    ) -> Result<Vec<RawDesiredLrp>, ClientError>;
}

/// Connection settings for [`BbsHttpClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    /// Accept any server certificate. Only meant for test foundations.
    pub skip_tls_verify: bool,
    /// Extra PEM root certificate for the BBS server.
    pub ca_file: Option<PathBuf>,
    pub request_timeout: Duration,
    /// Attempts after the first failed one. Only transport failures
    /// (connect, reset, timeout) are retried; an HTTP error status or a BBS
    /// error body fails the request at once and the next poll is the retry.
    pub retries: usize,
    pub max_idle_conns_per_host: usize,
}

impl ClientSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            skip_tls_verify: false,
            ca_file: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: DEFAULT_RETRIES,
            max_idle_conns_per_host: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BbsHttpClient {
    base_url: String,
    attempts: usize,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BbsError {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ActualLrpsResponse {
    #[serde(default)]
    error: Option<BbsError>,
    #[serde(default)]
    actual_lrps: Vec<RawActualLrp>,
}

#[derive(Debug, Deserialize)]
struct DesiredLrpsResponse {
    #[serde(default)]
    error: Option<BbsError>,
    #[serde(default)]
    desired_lrps: Vec<RawDesiredLrp>,
}

impl BbsHttpClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = normalize_endpoint(&settings.endpoint)?;

        let mut builder = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(settings.max_idle_conns_per_host)
            .danger_accept_invalid_certs(settings.skip_tls_verify);

        if let Some(path) = &settings.ca_file {
            let pem = std::fs::read(path).map_err(|e| ClientError::Build {
                message: format!("cannot read CA file {}: {e}", path.display()),
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| ClientError::Build {
                message: format!("invalid CA file {}: {e}", path.display()),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|e| ClientError::Build {
            message: e.to_string(),
        })?;

        Ok(Self {
            base_url,
            attempts: settings.retries.saturating_add(1),
            http,
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ClientError>
    where
        Req: Serialize + ?Sized + Sync,
        Res: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        let mut last_error: Option<String> = None;

        for attempt in 0..self.attempts {
            match self.http.post(url.as_str()).json(payload).send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    debug!("POST {} attempt {} failed: {}", url, attempt + 1, error);
                    last_error = Some(error.to_string());
                }
            }
        }

        warn!("POST {} failed after {} attempt(s)", url, self.attempts);
        Err(ClientError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl RemoteStateClient for BbsHttpClient {
    async fn list_actual_lrps(
        &self,
        filter: &ActualLrpFilter,
    ) -> Result<Vec<RawActualLrp>, ClientError> {
        let response: ActualLrpsResponse = self.post_json(ACTUAL_LRPS_PATH, filter).await?;
        match response.error {
            Some(error) => Err(bbs_error(error)),
            None => Ok(response.actual_lrps),
        }
    }

    async fn list_desired_lrps(
        &self,
        filter: &DesiredLrpFilter,
    ) -> Result<Vec<RawDesiredLrp>, ClientError> {
        let response: DesiredLrpsResponse = self.post_json(DESIRED_LRPS_PATH, filter).await?;
        match response.error {
            Some(error) => Err(bbs_error(error)),
            None => Ok(response.desired_lrps),
        }
    }
}

fn bbs_error(error: BbsError) -> ClientError {
    ClientError::Bbs {
        kind: error.kind,
        message: error.message,
    }
}

fn normalize_endpoint(endpoint: &str) -> Result<String, ClientError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(ClientError::EndpointMissing);
    }

    let url = reqwest::Url::parse(trimmed).map_err(|e| ClientError::InvalidEndpoint {
        endpoint: trimmed.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ClientError::InvalidEndpoint {
            endpoint: trimmed.to_string(),
            message: "expected an http(s) URL with a host".to_string(),
        });
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ClientError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| ClientError::Read {
        message: e.to_string(),
    })?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).trim().to_string();
        return Err(ClientError::Http {
            status: status.as_u16(),
            body: if body.is_empty() { "<empty>".into() } else { body },
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(|e| ClientError::Decode {
        message: e.to_string(),
    })
}

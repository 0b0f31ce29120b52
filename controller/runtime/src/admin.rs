//! A client for the proxy's admin API.

use crate::core::Plugin;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Certificate, StatusCode, Url,
};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// The admin API operations needed to validate resources.
#[async_trait::async_trait]
pub trait AdminApi: Send + Sync {
    /// Looks up a consumer by its username. Returns `None` if no such consumer
    /// exists.
    async fn get_consumer(&self, username: &str) -> Result<Option<Consumer>, Error>;

    /// Submits `plugin` to the plugin schema validation endpoint.
    ///
    /// Nothing is created. Returns the status of a successful reply.
    async fn validate_plugin(&self, plugin: &Plugin) -> Result<StatusCode, Error>;
}

#[derive(Clone, Debug)]
pub struct AdminClient {
    base_url: Url,
    client: reqwest::Client,
}

/// Connection options for [`AdminClient`].
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    /// Headers added to every request, formatted as `name:value`.
    pub headers: Vec<String>,

    pub tls_skip_verify: bool,

    /// Path to a PEM-encoded CA certificate used to verify the admin API.
    pub ca_cert_path: Option<PathBuf>,

    /// A PEM-encoded CA certificate used to verify the admin API.
    pub ca_cert: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Consumer {
    pub id: Option<String>,
    pub username: Option<String>,
    pub custom_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid admin API client configuration: {0}")]
    Config(String),

    #[error("admin API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} (message: {message:?})")]
    Status { status: StatusCode, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// === impl AdminClient ===

impl AdminClient {
    pub fn new(base_url: &str, opts: &ClientOptions) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|error| Error::Config(format!("invalid URL {base_url:?}: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid base URL {base_url}")));
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(parse_headers(&opts.headers)?)
            .danger_accept_invalid_certs(opts.tls_skip_verify);

        if let Some(path) = opts.ca_cert_path.as_ref() {
            let pem = std::fs::read(path).map_err(|error| {
                Error::Config(format!("failed to read CA certificate {}: {error}", path.display()))
            })?;
            builder = builder.add_root_certificate(parse_certificate(&pem)?);
        }
        if let Some(pem) = opts.ca_cert.as_ref() {
            builder = builder.add_root_certificate(parse_certificate(pem.as_bytes())?);
        }

        let client = builder
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    fn url(&self, segments: &[&str]) -> Url {
        join(&self.base_url, segments)
    }
}

#[async_trait::async_trait]
impl AdminApi for AdminClient {
    async fn get_consumer(&self, username: &str) -> Result<Option<Consumer>, Error> {
        let rsp = self
            .client
            .get(self.url(&["consumers", username]))
            .send()
            .await?;
        if rsp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let consumer = check_status(rsp).await?.json().await?;
        Ok(Some(consumer))
    }

    async fn validate_plugin(&self, plugin: &Plugin) -> Result<StatusCode, Error> {
        let rsp = self
            .client
            .post(self.url(&["schemas", "plugins", "validate"]))
            .json(plugin)
            .send()
            .await?;
        let rsp = check_status(rsp).await?;
        Ok(rsp.status())
    }
}

/// Turns unsuccessful replies into [`Error::Status`], keeping the admin API's
/// error message when one is present.
async fn check_status(rsp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = rsp.status();
    if status.is_success() {
        return Ok(rsp);
    }

    let body = rsp.bytes().await?;
    let message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
    Err(Error::Status { status, message })
}

fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn parse_certificate(pem: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_pem(pem)
        .map_err(|error| Error::Config(format!("invalid CA certificate: {error}")))
}

fn parse_headers(headers: &[String]) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::new();
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("invalid header {header:?}: expected name:value")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|error| Error::Config(format!("invalid header name {name:?}: {error}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|error| Error::Config(format!("invalid header value for {name}: {error}")))?;
        map.append(name, value);
    }
    Ok(map)
}

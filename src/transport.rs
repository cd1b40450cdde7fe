use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::Method;

use crate::{ClientConfig, MongoHttpError, Result, TransportError};

/// A fully-formed HTTP request. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL (base URL + path).
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &redacted_headers(&self.headers))
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn is_sensitive_header(name: &str) -> bool {
    ["x-api-key", "authorization", "cookie"]
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

/// Header pairs for `Debug` output, with credential values masked.
pub(crate) fn redacted_headers(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name) {
                (name.as_str(), "<redacted>")
            } else {
                (name.as_str(), value.as_str())
            }
        })
        .collect()
}

/// Status code and raw body of any response that reached the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the network I/O for one request.
///
/// Any response, whatever its status, is `Ok`; only failures where no
/// response was received are `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
    ) -> std::result::Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Builds the transport with pool and keep-alive settings from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(Duration::from_secs(config.keep_alive_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| {
                MongoHttpError::Config(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { http })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &HttpRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        if request.timeout.is_zero() {
            return Err(TransportError::terminal("timeout must be positive"));
        }

        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::Method;

    use super::{HttpRequest, RawResponse};

    #[test]
    fn debug_redacts_api_key_header() {
        let request = HttpRequest {
            method: Method::GET,
            url: "http://127.0.0.1:3300/api/v1/connections/c1/ping".to_owned(),
            headers: vec![
                ("X-API-Key".to_owned(), "secret-key".to_owned()),
                ("Accept".to_owned(), "application/json".to_owned()),
            ],
            body: None,
            timeout: Duration::from_secs(1),
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("application/json"));
        assert_eq!(request.header("x-api-key"), Some("secret-key"));
    }

    #[test]
    fn success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(302, "").is_success());
        assert!(!RawResponse::new(500, "").is_success());
    }
}

// HTTP client for device status, configuration, and relay control.
//
// Wraps `reqwest::Client` with generation-aware URL construction. Gen1
// devices expose a flat REST surface; Gen2+ devices expose JSON-RPC
// methods over plain GET requests under `/rpc/`.

use futures_util::future::BoxFuture;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{EventStream, Generation, Transport, TransportConfig};
use crate::websocket;

/// reqwest-backed [`Transport`] implementation.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a transport from a `TransportConfig`.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self { http, config })
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: TransportConfig) -> Self {
        Self { http, config }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Device root URL. Bare `host[:port]` addresses are treated as plain HTTP.
    pub(crate) fn base_url(address: &str) -> Result<Url, Error> {
        let address = address.trim().trim_end_matches('/');
        if address.contains("://") {
            Ok(Url::parse(&format!("{address}/"))?)
        } else {
            Ok(Url::parse(&format!("http://{address}/"))?)
        }
    }

    fn status_url(address: &str, generation: Generation) -> Result<Url, Error> {
        let path = if generation.uses_rpc() {
            "rpc/Shelly.GetStatus"
        } else {
            "status"
        };
        Ok(Self::base_url(address)?.join(path)?)
    }

    fn config_url(address: &str, generation: Generation) -> Result<Url, Error> {
        let path = if generation.uses_rpc() {
            "rpc/Shelly.GetConfig"
        } else {
            "settings"
        };
        Ok(Self::base_url(address)?.join(path)?)
    }

    fn switch_url(
        address: &str,
        generation: Generation,
        channel: u8,
        on: bool,
    ) -> Result<Url, Error> {
        let base = Self::base_url(address)?;
        let url = if generation.uses_rpc() {
            let mut url = base.join("rpc/Switch.Set")?;
            url.query_pairs_mut()
                .append_pair("id", &channel.to_string())
                .append_pair("on", if on { "true" } else { "false" });
            url
        } else {
            let mut url = base.join(&format!("relay/{channel}"))?;
            url.query_pairs_mut()
                .append_pair("turn", if on { "on" } else { "off" });
            url
        };
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    async fn get_json(&self, url: Url) -> Result<serde_json::Value, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await.map_err(|e| self.map_reqwest(e))?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    fn map_reqwest(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Full status document (`/status` or `Shelly.GetStatus`).
    pub async fn get_status(
        &self,
        address: &str,
        generation: Generation,
    ) -> Result<serde_json::Value, Error> {
        let value = self.get_json(Self::status_url(address, generation)?).await?;
        require_object(value)
    }

    /// Configuration document (`/settings` or `Shelly.GetConfig`).
    pub async fn get_config(
        &self,
        address: &str,
        generation: Generation,
    ) -> Result<serde_json::Value, Error> {
        let value = self.get_json(Self::config_url(address, generation)?).await?;
        require_object(value)
    }

    /// Turn a relay channel on or off.
    pub async fn switch(
        &self,
        address: &str,
        generation: Generation,
        channel: u8,
        on: bool,
    ) -> Result<(), Error> {
        self.get_json(Self::switch_url(address, generation, channel, on)?)
            .await
            .map(|_| ())
    }
}

/// Status and config documents are always JSON objects; anything else is
/// a protocol error rather than an empty device.
fn require_object(value: serde_json::Value) -> Result<serde_json::Value, Error> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(Error::Deserialization {
            message: "expected a JSON object".into(),
            body: value.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn fetch_status<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, Error>> {
        Box::pin(self.get_status(address, generation))
    }

    fn fetch_config<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, Error>> {
        Box::pin(self.get_config(address, generation))
    }

    fn subscribe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<EventStream, Error>> {
        Box::pin(websocket::subscribe(address, &self.config.client_id))
    }

    fn set_switch<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
        channel: u8,
        on: bool,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.switch(address, generation, channel, on))
    }
}

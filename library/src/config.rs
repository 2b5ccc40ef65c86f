use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::DEFAULT_RESTART_DELAY_MS;

/// Address of a media server: `ws`/`wss` for the WebSocket control channel,
/// `http`/`https` for WHEP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parse and validate an endpoint address.
    ///
    /// # Errors
    /// Fails for empty addresses, malformed URLs and schemes other than
    /// `ws`, `wss`, `http` and `https`.
    pub fn parse(address: &str) -> crate::Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            bail!("endpoint address is empty");
        }
        let url =
            Url::parse(address).with_context(|| format!("invalid endpoint address {address:?}"))?;
        match url.scheme() {
            "ws" | "wss" | "http" | "https" => Ok(Self(url)),
            other => bail!("unsupported endpoint scheme {other:?} in {address:?}"),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }

    /// `true` for `ws`/`wss` endpoints
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        matches!(self.0.scheme(), "ws" | "wss")
    }
}

impl FromStr for Endpoint {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0.into()
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of the video transceiver added to each peer connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    #[default]
    Sendrecv,
    Sendonly,
    Recvonly,
    Inactive,
}

impl TransceiverDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sendrecv => "sendrecv",
            Self::Sendonly => "sendonly",
            Self::Recvonly => "recvonly",
            Self::Inactive => "inactive",
        }
    }
}

/// Per-viewer settings the supervisor is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub restart_delay: Duration,
    pub direction: TransceiverDirection,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MS),
            direction: TransceiverDirection::default(),
        }
    }
}

/// Everything a camera view needs: where to connect and how to recover.
///
/// Deserializes from e.g. `{"endpoint": "wss://cam.local/ws", "restartDelayMs": 2000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamViewConfig {
    pub endpoint: Endpoint,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default)]
    pub direction: TransceiverDirection,
}

const fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}

impl CamViewConfig {
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            direction: TransceiverDirection::Sendrecv,
        }
    }

    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub const fn with_direction(mut self, direction: TransceiverDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    #[must_use]
    pub const fn options(&self) -> SessionOptions {
        SessionOptions {
            restart_delay: self.restart_delay(),
            direction: self.direction,
        }
    }
}

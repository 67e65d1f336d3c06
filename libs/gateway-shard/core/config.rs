use crate::protocol::{Identify, IdentifyProperties, Intents, UpdatePresence, API_VERSION};
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default capacity of the event and failure streams
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

/// Default number of consecutive identify rejections tolerated
pub const DEFAULT_MAX_IDENTIFY_ATTEMPTS: u32 = 5;

/// Configuration for one gateway shard
///
/// Built by [`GatewayBuilder`](crate::GatewayBuilder); immutable once the
/// manager exists.
pub struct ShardConfig {
    /// Bot token sent in identify and resume
    pub(crate) token: String,

    /// Supplies the URL for fresh connections
    pub(crate) resolver: Arc<dyn GatewayUrlResolver>,

    /// Opens the transport for each connection attempt
    pub(crate) connector: Arc<dyn Connector>,

    pub(crate) intents: Intents,

    /// `[shard_id, shard_count]`
    pub(crate) shard: Option<[u32; 2]>,

    pub(crate) properties: IdentifyProperties,

    /// Presence announced in identify
    pub(crate) presence: Option<UpdatePresence>,

    pub(crate) large_threshold: Option<u8>,

    /// Backoff between connection attempts and identify retries
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Commands allowed per `command_window`
    pub(crate) command_capacity: u32,
    pub(crate) command_window: Duration,

    /// How long a command may wait for a rate limit token
    pub(crate) command_timeout: Duration,

    /// Buffered items per stream subscriber before it lags
    pub(crate) stream_capacity: usize,

    /// Consecutive non-resumable invalid sessions before giving up
    pub(crate) max_identify_attempts: u32,

    /// Upper bound for opening a transport
    pub(crate) connect_timeout: Duration,
}

impl ShardConfig {
    /// Shard id used in log fields
    pub fn shard_id(&self) -> u32 {
        self.shard.map_or(0, |[id, _]| id)
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    pub fn command_capacity(&self) -> u32 {
        self.command_capacity
    }

    pub fn command_window(&self) -> Duration {
        self.command_window
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn stream_capacity(&self) -> usize {
        self.stream_capacity
    }

    pub fn max_identify_attempts(&self) -> u32 {
        self.max_identify_attempts
    }

    /// The identify payload for a fresh session
    pub(crate) fn identify(&self) -> Identify {
        Identify {
            token: self.token.clone(),
            intents: self.intents,
            properties: self.properties.clone(),
            shard: self.shard,
            presence: self.presence.clone(),
            large_threshold: self.large_threshold,
            compress: false,
        }
    }
}

impl std::fmt::Debug for ShardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("shard", &self.shard)
            .field("command_capacity", &self.command_capacity)
            .field("command_window", &self.command_window)
            .field("command_timeout", &self.command_timeout)
            .field("stream_capacity", &self.stream_capacity)
            .field("max_identify_attempts", &self.max_identify_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Connection URL for `base` with the version and encoding query parameters
///
/// Existing `v` or `encoding` parameters are kept as they are.
pub(crate) fn connection_url(base: &str) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| GatewayError::Configuration(format!("invalid gateway URL {base:?}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(GatewayError::Configuration(format!(
            "gateway URL must use ws or wss, got {base:?}"
        )));
    }
    if url.path().is_empty() {
        url.set_path("/");
    }

    let has_version = url.query_pairs().any(|(key, _)| key == "v");
    let has_encoding = url.query_pairs().any(|(key, _)| key == "encoding");
    if !has_version || !has_encoding {
        let mut pairs = url.query_pairs_mut();
        if !has_version {
            pairs.append_pair("v", &API_VERSION.to_string());
        }
        if !has_encoding {
            pairs.append_pair("encoding", "json");
        }
    }

    Ok(url.to_string())
}

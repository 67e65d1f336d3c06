pub mod states;

use crate::config::{ShardConfig, DEFAULT_MAX_IDENTIFY_ATTEMPTS, DEFAULT_STREAM_CAPACITY};
use crate::manager::GatewayManager;
use crate::protocol::{IdentifyProperties, Intents, UpdatePresence};
use crate::rate_limiter::{DEFAULT_COMMAND_CAPACITY, DEFAULT_COMMAND_WINDOW};
use crate::traits::*;
use crate::websocket::TungsteniteConnector;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Default bound for opening a transport
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for a command token
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional settings, carried unchanged across type-state transitions
struct Options {
    connector: Option<Arc<dyn Connector>>,
    intents: Intents,
    shard: Option<[u32; 2]>,
    properties: IdentifyProperties,
    presence: Option<UpdatePresence>,
    large_threshold: Option<u8>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    command_capacity: u32,
    command_window: Duration,
    command_timeout: Duration,
    stream_capacity: usize,
    max_identify_attempts: u32,
    connect_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            connector: None,
            intents: Intents::default(),
            shard: None,
            properties: IdentifyProperties::new(),
            presence: None,
            large_threshold: None,
            reconnect_strategy: None,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            command_window: DEFAULT_COMMAND_WINDOW,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            max_identify_attempts: DEFAULT_MAX_IDENTIFY_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Type-state builder for [`GatewayManager`]
///
/// The token and the gateway endpoint are required; `build()` only exists
/// once both are set. The decoder defaults to [`JsonEventDecoder`].
///
/// ```ignore
/// let manager = gateway_shard::builder()
///     .token(std::env::var("GATEWAY_TOKEN")?)
///     .url("wss://gateway.discord.gg")
///     .intents(Intents::GUILDS | Intents::GUILD_MESSAGES)
///     .reconnect_strategy(ExponentialBackoff::default())
///     .build()?;
///
/// manager.connect().await?;
/// ```
pub struct GatewayBuilder<T, U, D>
where
    T: TokenState,
    U: UrlState,
{
    _state: TypeState<T, U>,
    token: Option<String>,
    resolver: Option<Arc<dyn GatewayUrlResolver>>,
    decoder: D,
    options: Options,
}

impl GatewayBuilder<NoToken, NoUrl, JsonEventDecoder> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            token: None,
            resolver: None,
            decoder: JsonEventDecoder,
            options: Options::default(),
        }
    }
}

impl Default for GatewayBuilder<NoToken, NoUrl, JsonEventDecoder> {
    fn default() -> Self {
        Self::new()
    }
}

// Token setting
impl<U: UrlState, D> GatewayBuilder<NoToken, U, D> {
    pub fn token(self, token: impl Into<String>) -> GatewayBuilder<HasToken, U, D> {
        GatewayBuilder {
            _state: TypeState::new(),
            token: Some(token.into()),
            resolver: self.resolver,
            decoder: self.decoder,
            options: self.options,
        }
    }
}

// Endpoint setting
impl<T: TokenState, D> GatewayBuilder<T, NoUrl, D> {
    /// Connect to a fixed gateway URL
    pub fn url(self, url: impl Into<String>) -> GatewayBuilder<T, HasUrl, D> {
        self.url_resolver(StaticGatewayUrl::new(url))
    }

    /// Ask `resolver` for the URL before every fresh connection
    pub fn url_resolver(self, resolver: impl GatewayUrlResolver + 'static) -> GatewayBuilder<T, HasUrl, D> {
        GatewayBuilder {
            _state: TypeState::new(),
            token: self.token,
            resolver: Some(Arc::new(resolver)),
            decoder: self.decoder,
            options: self.options,
        }
    }
}

// Optional configuration methods
impl<T: TokenState, U: UrlState, D> GatewayBuilder<T, U, D> {
    /// Replace the event decoder
    pub fn decoder<D2: EventDecoder>(self, decoder: D2) -> GatewayBuilder<T, U, D2> {
        GatewayBuilder {
            _state: TypeState::new(),
            token: self.token,
            resolver: self.resolver,
            decoder,
            options: self.options,
        }
    }

    /// Replace the transport (defaults to tokio-tungstenite)
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.options.connector = Some(Arc::new(connector));
        self
    }

    pub fn intents(mut self, intents: Intents) -> Self {
        self.options.intents = intents;
        self
    }

    /// Identify as shard `id` of `count`
    pub fn shard(mut self, id: u32, count: u32) -> Self {
        self.options.shard = Some([id, count]);
        self
    }

    pub fn properties(mut self, properties: IdentifyProperties) -> Self {
        self.options.properties = properties;
        self
    }

    /// Presence announced in identify
    pub fn presence(mut self, presence: UpdatePresence) -> Self {
        self.options.presence = Some(presence);
        self
    }

    pub fn large_threshold(mut self, threshold: u8) -> Self {
        self.options.large_threshold = Some(threshold);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.options.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Commands allowed per rolling `window`
    ///
    /// Keep this below the server limit; control frames share the same
    /// server-side budget.
    pub fn command_rate_limit(mut self, capacity: u32, window: Duration) -> Self {
        self.options.command_capacity = capacity;
        self.options.command_window = window;
        self
    }

    /// How long a command may wait for a rate limit token
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Items buffered per stream subscriber before it starts lagging
    pub fn stream_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_capacity = capacity;
        self
    }

    pub fn max_identify_attempts(mut self, attempts: u32) -> Self {
        self.options.max_identify_attempts = attempts;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }
}

// Build method - only available when all required fields are set
impl<D: EventDecoder> GatewayBuilder<HasToken, HasUrl, D> {
    pub fn build(self) -> Result<GatewayManager<D>> {
        let token = self
            .token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| GatewayError::Configuration("token must not be empty".into()))?;
        let resolver = self
            .resolver
            .ok_or_else(|| GatewayError::Configuration("gateway endpoint is not set".into()))?;

        let options = self.options;
        validate(&options)?;

        let config = ShardConfig {
            token,
            resolver,
            connector: options.connector.unwrap_or_else(|| Arc::new(TungsteniteConnector)),
            intents: options.intents,
            shard: options.shard,
            properties: options.properties,
            presence: options.presence,
            large_threshold: options.large_threshold,
            reconnect_strategy: options
                .reconnect_strategy
                .unwrap_or_else(|| Box::new(ExponentialBackoff::default())),
            command_capacity: options.command_capacity,
            command_window: options.command_window,
            command_timeout: options.command_timeout,
            stream_capacity: options.stream_capacity,
            max_identify_attempts: options.max_identify_attempts,
            connect_timeout: options.connect_timeout,
        };

        Ok(GatewayManager::new(config, self.decoder))
    }
}

fn validate(options: &Options) -> Result<()> {
    if options.command_capacity == 0 {
        return Err(GatewayError::Configuration("command capacity must be at least 1".into()));
    }
    if options.command_window.is_zero() {
        return Err(GatewayError::Configuration("command window must be non-zero".into()));
    }
    if options.stream_capacity == 0 {
        return Err(GatewayError::Configuration("stream capacity must be at least 1".into()));
    }
    if options.max_identify_attempts == 0 {
        return Err(GatewayError::Configuration("max identify attempts must be at least 1".into()));
    }
    if let Some([id, count]) = options.shard {
        if count == 0 || id >= count {
            return Err(GatewayError::Configuration(format!(
                "invalid shard [{id}, {count}]: id must be below count"
            )));
        }
    }
    Ok(())
}

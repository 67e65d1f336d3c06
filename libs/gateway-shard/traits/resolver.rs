use crate::error::Result;
use async_trait::async_trait;

/// Supplies the gateway URL to open a fresh connection against
///
/// Called before every connection attempt that will identify. Resume
/// attempts use the `resume_gateway_url` learned from READY instead, and
/// only fall back to the resolver when none is known.
///
/// # Example
/// ```ignore
/// struct FromRest { client: RestClient }
///
/// #[async_trait::async_trait]
/// impl GatewayUrlResolver for FromRest {
///     async fn gateway_url(&self) -> Result<String> {
///         Ok(self.client.get_gateway_bot().await?.url)
///     }
/// }
/// ```
#[async_trait]
pub trait GatewayUrlResolver: Send + Sync {
    async fn gateway_url(&self) -> Result<String>;
}

/// A resolver that always returns the same URL
#[derive(Debug, Clone)]
pub struct StaticGatewayUrl(String);

impl StaticGatewayUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }
}

#[async_trait]
impl GatewayUrlResolver for StaticGatewayUrl {
    async fn gateway_url(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

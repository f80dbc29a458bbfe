use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};

use crate::error::LlmError;

fn builder() -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
}

/// HTTP client for an adapter, routed through `proxy_url` when one is set
///
/// Clients without a proxy share one connection pool.
pub(crate) fn http_client(proxy_url: Option<&str>) -> Result<Client, LlmError> {
    static SHARED: OnceLock<Client> = OnceLock::new();

    let Some(proxy_url) = proxy_url.filter(|p| !p.is_empty()) else {
        if let Some(client) = SHARED.get() {
            return Ok(client.clone());
        }
        let client = builder()
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build http client: {e}")))?;
        return Ok(SHARED.get_or_init(|| client).clone());
    };

    let proxy = Proxy::all(proxy_url).map_err(|e| LlmError::Config(format!("invalid proxy url `{proxy_url}`: {e}")))?;

    builder()
        .proxy(proxy)
        .build()
        .map_err(|e| LlmError::Config(format!("failed to build http client: {e}")))
}

use anyhow::{Context, Result};
use core_logic::{NetworkError, ProxyConfig};
use ethers::providers::{Http, Provider};
use reqwest::Client;
use std::time::Duration;

/// HTTP client, optionally routed through a proxy with basic auth.
pub fn build_http_client(proxy: Option<&ProxyConfig>, timeout: Duration) -> Result<Client> {
    let mut client_builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy_conf) = proxy {
        let mut proxy = reqwest::Proxy::all(&proxy_conf.url)
            .with_context(|| format!("Invalid proxy URL {}", proxy_conf.url))?;
        if let (Some(u), Some(p)) = (&proxy_conf.username, &proxy_conf.password) {
            proxy = proxy.basic_auth(u, p);
        }
        client_builder = client_builder.proxy(proxy);
    }

    client_builder.build().context("Failed to build HTTP client")
}

pub fn build_provider(rpc_url: &str, proxy: Option<&ProxyConfig>) -> Result<Provider<Http>> {
    let client = build_http_client(proxy, Duration::from_secs(30))?;
    let url = reqwest::Url::parse(rpc_url).context("Invalid RPC URL")?;
    Ok(Provider::new(Http::new_with_client(url, client)))
}

/// Maps a failed send onto the shared network error kinds; other failures
/// keep the reqwest error.
pub fn request_error(error: reqwest::Error, endpoint: &str, timeout: Duration) -> anyhow::Error {
    if error.is_timeout() {
        NetworkError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            endpoint: endpoint.to_string(),
        }
        .into()
    } else if error.is_connect() {
        NetworkError::ConnectionRefused {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        }
        .into()
    } else {
        anyhow::Error::new(error).context(format!("Request to {} failed", endpoint))
    }
}

/// Non-2xx reply; the body is kept as context for the report.
pub fn http_error(status_code: u16, endpoint: &str, body: &str) -> anyhow::Error {
    anyhow::Error::new(NetworkError::HttpError {
        status_code,
        endpoint: endpoint.to_string(),
    })
    .context(body.to_string())
}

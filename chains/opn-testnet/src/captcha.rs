use crate::client::{build_http_client, http_error, request_error};
use crate::config::FaucetSettings;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Returns a fresh captcha token. Tokens are single-use.
    async fn solve(&self) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct SolveRequest<'a> {
    sitekey: &'a str,
    referer: &'a str,
    size: &'a str,
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// reCAPTCHA solver backed by the nocaptcha.io universal endpoint.
pub struct NoCaptchaSolver {
    client: reqwest::Client,
    timeout: Duration,
    api_url: String,
    user_token: String,
    site_key: String,
    referer: String,
    title: String,
}

impl NoCaptchaSolver {
    pub fn new(settings: &FaucetSettings, user_token: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(settings.captcha_timeout_secs);
        let client = build_http_client(None, timeout)?;
        Ok(Self {
            client,
            timeout,
            api_url: settings.captcha_api_url.clone(),
            user_token: user_token.into(),
            site_key: settings.site_key.clone(),
            referer: settings.referer.trim_end_matches('/').to_string(),
            title: settings.page_title.clone(),
        })
    }
}

/// Extracts `data.token` from a solver reply; `status` must be 1.
pub fn parse_solution(body: &str) -> Result<String> {
    let reply: SolveResponse = serde_json::from_str(body).context("Malformed captcha response")?;

    if reply.status != 1 {
        bail!(
            "Captcha solver refused: {}",
            reply.msg.unwrap_or_else(|| format!("status {}", reply.status))
        );
    }

    match reply
        .data
        .as_ref()
        .and_then(|d| d.get("token"))
        .and_then(Value::as_str)
    {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => bail!("Captcha response has no token"),
    }
}

#[async_trait]
impl CaptchaSolver for NoCaptchaSolver {
    async fn solve(&self) -> Result<String> {
        let request = SolveRequest {
            sitekey: &self.site_key,
            referer: &self.referer,
            size: "normal",
            title: &self.title,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("User-Token", &self.user_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(e, &self.api_url, self.timeout))?;

        let status = response.status();
        let body = response.text().await.context("Failed to read captcha response")?;
        if !status.is_success() {
            return Err(http_error(status.as_u16(), &self.api_url, &body));
        }

        parse_solution(&body)
    }
}

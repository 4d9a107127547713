use crate::captcha::CaptchaSolver;
use crate::client::{build_http_client, request_error};
use crate::config::FaucetSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{Entity, Operation, Outcome, ProxyManager};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Requests testnet funds from the HTTP faucet, one captcha per attempt.
pub struct FaucetOperation {
    solver: Arc<dyn CaptchaSolver>,
    proxies: ProxyManager,
    url: String,
    referer: String,
    already_claimed_marker: String,
    request_timeout: Duration,
}

impl FaucetOperation {
    pub fn new(settings: &FaucetSettings, solver: Arc<dyn CaptchaSolver>, proxies: ProxyManager) -> Self {
        Self {
            solver,
            proxies,
            url: settings.url.clone(),
            referer: settings.referer.clone(),
            already_claimed_marker: settings.already_claimed_marker.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("pragma", HeaderValue::from_static("no-cache"));
        headers.insert(
            "sec-ch-ua",
            HeaderValue::from_static(
                "\"Google Chrome\";v=\"141\", \"Not?A_Brand\";v=\"8\", \"Chromium\";v=\"141\"",
            ),
        );
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"macOS\""));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        if let Ok(referer) = HeaderValue::from_str(&self.referer) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    async fn request(&self, address: &str, captcha_token: &str) -> Result<(u16, String)> {
        let proxy = self.proxies.pick();
        if let Some((idx, p)) = proxy {
            debug!("Using proxy #{} ({})", idx, p.url);
        }

        let client = build_http_client(proxy.map(|(_, p)| p), self.request_timeout)?;
        let response = client
            .post(&self.url)
            .headers(self.headers())
            .json(&json!({
                "address": address,
                "captchaToken": captcha_token,
            }))
            .send()
            .await
            .map_err(|e| request_error(e, &self.url, self.request_timeout))?;

        let status = response.status().as_u16();
        let body = response.text().await.context("Failed to read faucet response")?;
        Ok((status, body))
    }
}

/// HTTP 200 is a success; a body carrying `already_claimed_marker` is final;
/// anything else may clear up on a later attempt.
pub fn classify_response(status: u16, body: &str, already_claimed_marker: &str) -> Outcome {
    if status == 200 {
        let response = serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::from(body));
        return Outcome::success().with_field("response", response);
    }

    let marker = already_claimed_marker.to_lowercase();
    let outcome = if !marker.is_empty() && body.to_lowercase().contains(&marker) {
        Outcome::terminal(format!("HTTP {}: {}", status, already_claimed_marker))
    } else {
        Outcome::retryable(format!("HTTP {}", status))
    };
    outcome.with_field("response", body)
}

#[async_trait]
impl Operation for FaucetOperation {
    fn name(&self) -> &str {
        "faucet"
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("faucet_url".to_string(), Value::from(self.url.clone()));
        meta
    }

    async fn attempt(&self, entity: &Entity, attempt: u32) -> Outcome {
        let captcha_token = match self.solver.solve().await {
            Ok(t) => t,
            Err(e) => return Outcome::retryable(format!("captcha: {:#}", e)),
        };
        debug!(
            "[{}] Captcha solved: {}...",
            entity.index() + 1,
            captcha_token.chars().take(20).collect::<String>()
        );

        match self.request(entity.address(), &captcha_token).await {
            Ok((status, body)) => {
                info!(
                    "[{}] Faucet replied HTTP {} (attempt {})",
                    entity.index() + 1,
                    status,
                    attempt
                );
                classify_response(status, &body, &self.already_claimed_marker)
            }
            Err(e) => Outcome::retryable(format!("{:#}", e)),
        }
    }
}

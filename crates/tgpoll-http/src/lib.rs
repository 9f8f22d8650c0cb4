//! Bot API adapter over HTTPS (reqwest).
//!
//! Implements the `tgpoll-core` `BotApi` port: every method is a JSON `POST` to
//! `{base}/bot{token}/{method}` answered with the `{ok, result}` envelope.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use tgpoll_core::{
    config::DEFAULT_API_URL,
    methods::{GetUpdates, Method},
    BotApi, Error, Result, Update,
};

/// Budget for ordinary (non long-poll) calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Slack on top of the long-poll hold so the client never cuts a poll short.
const LONG_POLL_SLACK: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HttpBotApi {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

impl fmt::Debug for HttpBotApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBotApi")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpBotApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn post(&self, method: &str, params: &Value, timeout: Duration) -> Result<Value> {
        // reqwest errors carry the URL, and the URL carries the token.
        let transport = |e: reqwest::Error| Error::Transport(format!("{method}: {}", e.without_url()));

        let resp = self
            .http
            .post(self.url(method))
            .json(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(transport)?;
        parse_response(method, status, &body)
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn call_raw(&self, method: &str, params: Value) -> Result<Value> {
        self.post(method, &params, REQUEST_TIMEOUT).await
    }

    async fn get_updates(&self, req: &GetUpdates) -> Result<Vec<Update>> {
        let params = serde_json::to_value(req)?;
        let raw = self
            .post(GetUpdates::NAME, &params, req.hold_duration() + LONG_POLL_SLACK)
            .await?;
        let batch: Vec<Update> = serde_json::from_value(raw)
            .map_err(|e| Error::Decode(format!("getUpdates result: {e}")))?;
        debug!(offset = req.offset, count = batch.len(), "getUpdates returned");
        Ok(batch)
    }
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    result: Option<Value>,
    error_code: Option<i32>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Unwrap the `{ok, result}` envelope, classifying failures.
fn parse_response(method: &str, status: u16, body: &[u8]) -> Result<Value> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            let preview = String::from_utf8_lossy(body).chars().take(200).collect::<String>();
            // Gateways answer 5xx with HTML; that is the server being unwell, not bad data.
            if status >= 500 {
                return Err(Error::Api {
                    code: i32::from(status),
                    description: format!("{method}: http {status}: {preview}"),
                    retry_after: None,
                });
            }
            return Err(Error::Decode(format!(
                "{method}: unreadable response (http {status}): {e}: {preview}"
            )));
        }
    };

    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| Error::Decode(format!("{method}: response without result")));
    }

    Err(Error::Api {
        code: envelope.error_code.unwrap_or(i32::from(status)),
        description: envelope
            .description
            .unwrap_or_else(|| format!("{method} failed with http {status}")),
        retry_after: envelope
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs),
    })
}

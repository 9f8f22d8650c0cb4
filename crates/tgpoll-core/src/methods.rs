//! Typed Bot API methods used by the receiver and the `tgpoll` binary.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    domain::{UpdateCategory, User},
    ports::BotApi,
    Result,
};

/// A Bot API method: its wire name, parameters (`Self`) and result type.
pub trait Method: Serialize + Send + Sync {
    const NAME: &'static str;
    type Response: DeserializeOwned;
}

/// Execute a typed method through any `BotApi`.
pub async fn call<M: Method>(api: &dyn BotApi, req: &M) -> Result<M::Response> {
    let params = serde_json::to_value(req)?;
    let raw = api.call_raw(M::NAME, params).await?;
    Ok(serde_json::from_value(raw)?)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GetUpdates {
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u8>,
    /// Whole seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<UpdateCategory>>,
}

impl GetUpdates {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(0))
    }
}

impl Method for GetUpdates {
    const NAME: &'static str = "getUpdates";
    type Response = Vec<crate::domain::Update>;
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GetMe {}

impl Method for GetMe {
    const NAME: &'static str = "getMe";
    type Response = User;
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GetWebhookInfo {}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookInfo {
    pub url: String,
    #[serde(default)]
    pub pending_update_count: i64,
    pub last_error_message: Option<String>,
}

impl Method for GetWebhookInfo {
    const NAME: &'static str = "getWebhookInfo";
    type Response = WebhookInfo;
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DeleteWebhook {
    pub drop_pending_updates: bool,
}

impl Method for DeleteWebhook {
    const NAME: &'static str = "deleteWebhook";
    type Response = bool;
}

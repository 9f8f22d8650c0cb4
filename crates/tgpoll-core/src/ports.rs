use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::Update,
    errors::Error,
    methods::{GetUpdates, Method},
    Result,
};

/// Port to the remote Bot API.
///
/// `call_raw` executes any method and returns the already unwrapped `result`
/// field. `get_updates` is the long-poll fetch the receiver drives; adapters
/// override it when the transport needs to know about the hold duration.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn call_raw(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value>;

    async fn get_updates(&self, req: &GetUpdates) -> Result<Vec<Update>> {
        let params = serde_json::to_value(req)?;
        let raw = self.call_raw(GetUpdates::NAME, params).await?;
        Ok(serde_json::from_value(raw)?)
    }
}

/// Consumer of received updates. Built and owned by the caller.
///
/// Calls are strictly sequential: the receiver never invokes either method
/// while another call is still running.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, update: Update, cancel: &CancellationToken) -> anyhow::Result<()>;

    /// Loop-level error sink. A failure here ends the session; it is never
    /// routed back into this method by the loop itself.
    async fn handle_error(&self, error: &Error, cancel: &CancellationToken) -> anyhow::Result<()>;
}

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tgpoll_core::{
    config::Config,
    methods::{call, DeleteWebhook, GetMe, GetWebhookInfo},
    BotApi, Error, Update, UpdateHandler, UpdateKind,
};
use tgpoll_http::HttpBotApi;

/// Logs every update it receives.
struct LogHandler;

#[async_trait]
impl UpdateHandler for LogHandler {
    async fn handle_update(&self, update: Update, _cancel: &CancellationToken) -> anyhow::Result<()> {
        let update_id = update.id;
        match &update.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => info!(
                %update_id,
                category = ?update.category(),
                chat_id = m.chat.id,
                text = m.text_or_caption().unwrap_or(""),
                "message"
            ),
            UpdateKind::CallbackQuery(q) => info!(
                %update_id,
                from = q.from.id,
                data = q.data.as_deref().unwrap_or(""),
                "callback query"
            ),
            UpdateKind::InlineQuery(q) => {
                info!(%update_id, from = q.from.id, query = %q.query, "inline query")
            }
            UpdateKind::Unknown(raw) => warn!(%update_id, "update of unknown category: {raw}"),
            _ => info!(%update_id, category = ?update.category(), "update"),
        }
        Ok(())
    }

    async fn handle_error(&self, error: &Error, _cancel: &CancellationToken) -> anyhow::Result<()> {
        if error.is_recoverable() {
            warn!(error = %error, "receive error");
        } else {
            error!(error = %error, "receive failed");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tgpoll_core::logging::init("tgpoll")?;

    let cfg = Config::load()?;
    let api: Arc<dyn BotApi> = Arc::new(HttpBotApi::with_base_url(
        cfg.bot_token.clone(),
        cfg.api_url.clone(),
    )?);

    let me = call(api.as_ref(), &GetMe {}).await?;
    info!(
        "tgpoll started: @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    // getUpdates is refused while a webhook is set.
    let hook = call(api.as_ref(), &GetWebhookInfo {}).await?;
    if !hook.url.is_empty() {
        if !cfg.delete_webhook {
            return Err(Error::Config(
                "a webhook is set for this bot; set TGPOLL_DELETE_WEBHOOK=1 to switch to polling"
                    .to_string(),
            ));
        }
        call(
            api.as_ref(),
            &DeleteWebhook {
                drop_pending_updates: false,
            },
        )
        .await?;
        info!(pending = hook.pending_update_count, "webhook removed");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            on_signal.cancel();
        }
    });

    tgpoll_core::receive(api, &LogHandler, Some(cfg.receive), Some(cancel)).await
}

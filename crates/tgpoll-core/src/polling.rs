//! Entry points: a detached background loop and an awaitable one.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    config::ReceiveOptions,
    errors::Error,
    ports::{BotApi, UpdateHandler},
    receiver::{panic_message, UpdateReceiver},
    Result,
};

/// Start receiving updates on a background task and return immediately.
///
/// Bad options, or no tokio runtime to spawn on, are returned right away
/// instead of going through `handle_error`. The task is only stopped through
/// `cancel`; a `None` token means it runs until a fatal error.
///
/// If the handler's error sink fails inside the loop, that failure is handed
/// to `handle_error` once more here. A second failure is logged and dropped,
/// as is a panic escaping the loop (handler panics are contained inside it).
pub fn start_receiving(
    api: Arc<dyn BotApi>,
    handler: Arc<dyn UpdateHandler>,
    options: Option<ReceiveOptions>,
    cancel: Option<CancellationToken>,
) -> Result<()> {
    let options = options.unwrap_or_default();
    options.validate()?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Config(format!("start_receiving needs a tokio runtime: {e}")))?;
    let cancel = cancel.unwrap_or_else(CancellationToken::new);

    runtime.spawn(async move {
        let mut receiver = UpdateReceiver::new(api, Some(options));
        let outcome = AssertUnwindSafe(receiver.receive(handler.as_ref(), &cancel))
            .catch_unwind()
            .await;
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "background receive loop panicked"
                );
                return;
            }
        };

        match &err {
            Error::ErrorHandler { .. } => {
                if let Err(e) = handler.handle_error(&err, &cancel).await {
                    error!(error = %e, escaped = %err, "error handler failed at the outer boundary");
                }
            }
            // Already reported by the loop.
            _ => debug!(error = %err, "background receive loop stopped"),
        }
    });

    Ok(())
}

/// Receive updates until `cancel` fires (`Ok`) or a fatal error ends the
/// session (`Err`). Fatal fetch errors have already been passed to
/// `handle_error` when this returns.
pub async fn receive(
    api: Arc<dyn BotApi>,
    handler: &dyn UpdateHandler,
    options: Option<ReceiveOptions>,
    cancel: Option<CancellationToken>,
) -> Result<()> {
    let cancel = cancel.unwrap_or_else(CancellationToken::new);
    UpdateReceiver::new(api, options)
        .receive(handler, &cancel)
        .await
}

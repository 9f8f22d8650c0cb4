//! Long-poll receive loop.
//!
//! The loop owns the watermark (`offset`): the next update id it expects. It is
//! advanced to `id + 1` right before the handler sees an update, so the server
//! never resends anything the handler has started on (at-most-once delivery).
//! Handler calls are awaited one at a time, which also throttles fetching to the
//! handler's pace. A handler that panics is treated like one that returned
//! `Err`.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    config::ReceiveOptions,
    domain::Update,
    errors::{Error, ErrorClass},
    methods::GetUpdates,
    ports::{BotApi, UpdateHandler},
    Result,
};

/// Offset convention for "only the most recent update".
const LATEST_OFFSET: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct UpdateReceiver {
    api: Arc<dyn BotApi>,
    options: ReceiveOptions,
    offset: i64,
}

impl UpdateReceiver {
    pub fn new(api: Arc<dyn BotApi>, options: Option<ReceiveOptions>) -> Self {
        let options = options.unwrap_or_default();
        let offset = options.offset.unwrap_or(0);
        Self {
            api,
            options,
            offset,
        }
    }

    pub fn options(&self) -> &ReceiveOptions {
        &self.options
    }

    /// Current watermark.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Run until `cancel` fires (`Ok`) or a fatal error was reported (`Err`).
    ///
    /// `Err(Error::ErrorHandler)` means the handler's error sink itself failed;
    /// that error has not been reported anywhere.
    pub async fn receive(
        &mut self,
        handler: &dyn UpdateHandler,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.options.validate()?;

        if self.options.throw_pending_updates
            && self.skip_backlog(handler, cancel).await? == Flow::Stop
        {
            return Ok(());
        }

        let mut failures = 0u32;
        while !cancel.is_cancelled() {
            let req = self.request();
            debug!(offset = req.offset, "fetching updates");

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.api.get_updates(&req) => res,
            };

            match fetched {
                Ok(batch) => {
                    failures = 0;
                    if batch.is_empty() {
                        continue;
                    }
                    self.dispatch(batch, handler, cancel).await?;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if self.recover(e, failures, handler, cancel).await? == Flow::Stop {
                        break;
                    }
                }
            }
        }

        debug!(offset = self.offset, "receive loop cancelled");
        Ok(())
    }

    fn request(&self) -> GetUpdates {
        GetUpdates {
            offset: self.offset,
            limit: self.options.limit,
            timeout: self.options.timeout.map(|t| t.as_secs()),
            allowed_updates: self.options.allowed_updates.clone(),
        }
    }

    /// Move the watermark past whatever is queued without dispatching it.
    async fn skip_backlog(
        &mut self,
        handler: &dyn UpdateHandler,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        let req = GetUpdates {
            offset: LATEST_OFFSET,
            limit: Some(1),
            timeout: Some(0),
            allowed_updates: self.options.allowed_updates.clone(),
        };

        let mut failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(Flow::Stop);
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Flow::Stop),
                res = self.api.get_updates(&req) => res,
            };

            match fetched {
                Ok(batch) => {
                    if let Some(last) = batch.iter().map(|u| u.id).max() {
                        self.offset = last.0 + 1;
                    }
                    debug!(offset = self.offset, "pending updates discarded");
                    return Ok(Flow::Continue);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if self.recover(e, failures, handler, cancel).await? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        mut batch: Vec<Update>,
        handler: &dyn UpdateHandler,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // The server sends ascending ids; don't rely on it.
        batch.sort_by_key(|u| u.id);

        for update in batch {
            if cancel.is_cancelled() {
                debug!(offset = self.offset, "cancelled mid-batch");
                break;
            }

            let update_id = update.id;
            if update_id.0 < self.offset {
                warn!(%update_id, offset = self.offset, "skipping already consumed update");
                continue;
            }

            self.offset = update_id.0 + 1;
            debug!(%update_id, "dispatching update");

            let outcome = AssertUnwindSafe(handler.handle_update(update, cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("handler panicked: {}", panic_message(payload.as_ref())))
                });
            if let Err(source) = outcome {
                let err = Error::Handler { update_id, source };
                warn!(error = %err, "update handler failed");
                report(handler, &err, cancel).await?;
            }
        }

        Ok(())
    }

    /// Report a fetch failure, then either back off or give up.
    async fn recover(
        &self,
        err: Error,
        failures: u32,
        handler: &dyn UpdateHandler,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        let class = err.class();
        match class {
            ErrorClass::Recoverable => warn!(error = %err, failures, "fetching updates failed"),
            ErrorClass::Fatal => error!(error = %err, "fetching updates rejected, stopping"),
        }

        report(handler, &err, cancel).await?;

        if class == ErrorClass::Fatal {
            return Err(err);
        }

        let delay = self
            .options
            .retry
            .delay_for(failures)
            .max(err.retry_after().unwrap_or_default());
        if delay.is_zero() {
            return Ok(Flow::Continue);
        }

        debug!(?delay, "backing off");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Flow::Stop),
            _ = sleep(delay) => Ok(Flow::Continue),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn report(handler: &dyn UpdateHandler, err: &Error, cancel: &CancellationToken) -> Result<()> {
    AssertUnwindSafe(handler.handle_error(err, cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!("error handler panicked: {}", panic_message(payload.as_ref())))
        })
        .map_err(|source| {
            error!(error = %source, reported = %err, "error handler failed");
            Error::ErrorHandler {
                reported: err.to_string(),
                source,
            }
        })
}

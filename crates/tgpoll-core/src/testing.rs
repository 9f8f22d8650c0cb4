//! Scripted fakes shared by the receiver and polling tests.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::Update,
    errors::Error,
    methods::GetUpdates,
    ports::{BotApi, UpdateHandler},
    Result,
};

pub(crate) enum Step {
    Batch(Vec<Update>),
    Fail(Error),
    /// Cancel the session, then still resolve with the batch.
    CancelThen(Vec<Update>),
    /// Never resolve.
    Hang,
}

/// Replays `steps` in order. Once exhausted it cancels the session and
/// returns an empty batch so the loop winds down.
pub(crate) struct ScriptedApi {
    steps: Mutex<VecDeque<Step>>,
    pub requests: Mutex<Vec<GetUpdates>>,
    cancel: CancellationToken,
}

impl ScriptedApi {
    pub fn new(cancel: &CancellationToken, steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            cancel: cancel.clone(),
        }
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.requests.lock().unwrap().iter().map(|r| r.offset).collect()
    }
}

#[async_trait]
impl BotApi for ScriptedApi {
    async fn call_raw(&self, method: &str, _params: Value) -> Result<Value> {
        Err(Error::Transport(format!("{method} is not scripted")))
    }

    async fn get_updates(&self, req: &GetUpdates) -> Result<Vec<Update>> {
        self.requests.lock().unwrap().push(req.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Batch(batch)) => Ok(batch),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::CancelThen(batch)) => {
                self.cancel.cancel();
                Ok(batch)
            }
            Some(Step::Hang) => std::future::pending().await,
            None => {
                self.cancel.cancel();
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub seen: Mutex<Vec<i64>>,
    pub errors: Mutex<Vec<String>>,
    pub fail_on: Vec<i64>,
    pub panic_on: Vec<i64>,
    pub cancel_on: Option<(i64, CancellationToken)>,
    pub error_handler_fails: bool,
    pub error_events: Option<mpsc::UnboundedSender<String>>,
}

impl RecordingHandler {
    pub fn seen(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateHandler for RecordingHandler {
    async fn handle_update(&self, update: Update, _cancel: &CancellationToken) -> anyhow::Result<()> {
        let id = update.id.0;
        self.seen.lock().unwrap().push(id);
        if let Some((at, token)) = &self.cancel_on {
            if *at == id {
                token.cancel();
            }
        }
        if self.panic_on.contains(&id) {
            panic!("handler blew up on {id}");
        }
        if self.fail_on.contains(&id) {
            anyhow::bail!("cannot handle {id}");
        }
        Ok(())
    }

    async fn handle_error(&self, error: &Error, _cancel: &CancellationToken) -> anyhow::Result<()> {
        let text = error.to_string();
        self.errors.lock().unwrap().push(text.clone());
        if let Some(tx) = &self.error_events {
            let _ = tx.send(text);
        }
        if self.error_handler_fails {
            anyhow::bail!("error sink unavailable");
        }
        Ok(())
    }
}

pub(crate) fn message(id: i64) -> Update {
    Update::try_from(json!({
        "update_id": id,
        "message": {
            "message_id": id,
            "date": 1_700_000_000,
            "chat": { "id": 1, "type": "private" },
            "text": format!("m{id}")
        }
    }))
    .unwrap()
}

pub(crate) fn messages(ids: impl IntoIterator<Item = i64>) -> Vec<Update> {
    ids.into_iter().map(message).collect()
}

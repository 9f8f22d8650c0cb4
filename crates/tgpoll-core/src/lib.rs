//! Long-poll update receiver for the Telegram Bot API.
//!
//! This crate is transport-agnostic. The HTTP client lives behind the `BotApi`
//! port (implemented in `tgpoll-http`); update consumers implement
//! `UpdateHandler` and are injected by the caller.

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod methods;
pub mod polling;
pub mod ports;
pub mod receiver;

pub use config::{ReceiveOptions, RetryPolicy};
pub use domain::{Update, UpdateCategory, UpdateId, UpdateKind};
pub use errors::{Error, ErrorClass, Result};
pub use polling::{receive, start_receiving};
pub use ports::{BotApi, UpdateHandler};
pub use receiver::UpdateReceiver;

#[cfg(test)]
mod testing;

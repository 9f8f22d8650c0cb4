use std::time::Duration;

use crate::domain::UpdateId;

/// Core error type for the receiver.
///
/// Adapter crates map their transport-specific failures into this type so the
/// receive loop can classify them consistently (keep polling vs stop).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error {code}: {description}")]
    Api {
        code: i32,
        description: String,
        retry_after: Option<Duration>,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("update {update_id} handler failed: {source}")]
    Handler {
        update_id: UpdateId,
        #[source]
        source: anyhow::Error,
    },

    #[error("error handler failed while reporting `{reported}`: {source}")]
    ErrorHandler {
        reported: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the receive loop does after reporting an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Report and keep polling.
    Recoverable,
    /// Report and end the session.
    Fatal,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Transport(_) | Error::Decode(_) | Error::Json(_) | Error::Handler { .. } => {
                ErrorClass::Recoverable
            }
            // 429 and server-side hiccups clear up on their own; anything else
            // (409 conflict, 401 bad token, ...) would be rejected again forever.
            Error::Api {
                code, retry_after, ..
            } => {
                if retry_after.is_some() || *code >= 500 {
                    ErrorClass::Recoverable
                } else {
                    ErrorClass::Fatal
                }
            }
            Error::Config(_) | Error::ErrorHandler { .. } => ErrorClass::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// Server-provided wait hint (flood control).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i32, retry_after: Option<u64>) -> Error {
        Error::Api {
            code,
            description: "x".to_string(),
            retry_after: retry_after.map(Duration::from_secs),
        }
    }

    #[test]
    fn transport_and_decode_are_recoverable() {
        assert!(Error::Transport("reset".into()).is_recoverable());
        assert!(Error::Decode("bad".into()).is_recoverable());
        assert!(Error::Handler {
            update_id: UpdateId(1),
            source: anyhow::anyhow!("boom"),
        }
        .is_recoverable());
    }

    #[test]
    fn api_rejections_are_fatal_unless_transient() {
        assert_eq!(api(409, None).class(), ErrorClass::Fatal);
        assert_eq!(api(401, None).class(), ErrorClass::Fatal);
        assert_eq!(api(429, Some(3)).class(), ErrorClass::Recoverable);
        assert_eq!(api(502, None).class(), ErrorClass::Recoverable);
        assert_eq!(api(429, Some(3)).retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn error_handler_failure_is_fatal() {
        let e = Error::ErrorHandler {
            reported: "transport error: x".to_string(),
            source: anyhow::anyhow!("handler down"),
        };
        assert_eq!(e.class(), ErrorClass::Fatal);
        assert!(e.to_string().contains("handler down"));
    }
}

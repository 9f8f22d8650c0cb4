use std::{env, fs, path::Path, str::FromStr, time::Duration};

use crate::{domain::UpdateCategory, errors::Error, Result};

/// Remote ceiling for `getUpdates.limit`.
pub const MAX_LIMIT: u8 = 100;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Long-poll hold used unless the caller picks one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one receive session. Immutable once the loop starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiveOptions {
    /// Max updates per fetch (1..=100). `None` lets the server decide.
    pub limit: Option<u8>,
    /// Long-poll hold duration. Defaults to [`DEFAULT_TIMEOUT`]; `None` or zero
    /// means short polling.
    pub timeout: Option<Duration>,
    /// Subscription filter. `None` keeps whatever the bot subscribed to last.
    pub allowed_updates: Option<Vec<UpdateCategory>>,
    /// Skip everything queued before the loop starts.
    pub throw_pending_updates: bool,
    /// Resume watermark. Ignored when `throw_pending_updates` is set.
    pub offset: Option<i64>,
    pub retry: RetryPolicy,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timeout: Some(DEFAULT_TIMEOUT),
            allowed_updates: None,
            throw_pending_updates: false,
            offset: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReceiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u8) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_allowed_updates(mut self, categories: impl IntoIterator<Item = UpdateCategory>) -> Self {
        self.allowed_updates = Some(categories.into_iter().collect());
        self
    }

    pub fn throw_pending_updates(mut self, throw: bool) -> Self {
        self.throw_pending_updates = throw;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_LIMIT {
                return Err(Error::Config(format!(
                    "limit must be within 1..={MAX_LIMIT}, got {limit}"
                )));
            }
        }
        self.retry.validate()
    }

    /// Reads `TGPOLL_*` variables; anything unset keeps its default, anything
    /// set but unparsable is an error.
    pub fn from_env() -> Result<Self> {
        let mut opts = Self::default();

        if let Some(limit) = env_parse::<u8>("TGPOLL_LIMIT")? {
            opts.limit = Some(limit);
        }
        if let Some(secs) = env_parse::<u64>("TGPOLL_TIMEOUT_SECS")? {
            opts.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = env_str("TGPOLL_ALLOWED_UPDATES") {
            opts.allowed_updates = Some(parse_categories(&raw)?);
        }
        opts.throw_pending_updates = env_bool("TGPOLL_THROW_PENDING_UPDATES")?.unwrap_or(false);
        opts.offset = env_parse::<i64>("TGPOLL_OFFSET")?;

        if let Some(ms) = env_parse::<u64>("TGPOLL_RETRY_INITIAL_MS")? {
            opts.retry.initial = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("TGPOLL_RETRY_MAX_MS")? {
            opts.retry.max = Duration::from_millis(ms);
        }

        opts.validate()?;
        Ok(opts)
    }
}

/// Bounded exponential backoff between recoverable fetch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// No waiting at all. Mostly useful in tests.
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.multiplier == 0 {
            return Err(Error::Config("retry multiplier must be > 0".to_string()));
        }
        // A zero start never grows, so the cap would be unreachable.
        if self.initial.is_zero() && !self.max.is_zero() {
            return Err(Error::Config(format!(
                "retry initial delay must be > 0 when max is {:?}",
                self.max
            )));
        }
        if self.initial > self.max {
            return Err(Error::Config(format!(
                "retry initial delay {:?} exceeds max {:?}",
                self.initial, self.max
            )));
        }
        Ok(())
    }

    /// Delay before the retry following `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let mut delay = self.initial;
        for _ in 1..failures {
            delay = delay.saturating_mul(self.multiplier);
            if delay >= self.max {
                return self.max;
            }
        }
        delay.min(self.max)
    }
}

/// Settings of the `tgpoll` binary.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub api_url: String,
    pub delete_webhook: bool,
    pub receive: ReceiveOptions,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("TGPOLL_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TGPOLL_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let api_url = env_str("TGPOLL_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let delete_webhook = env_bool("TGPOLL_DELETE_WEBHOOK")?.unwrap_or(false);
        let receive = ReceiveOptions::from_env()?;

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            delete_webhook,
            receive,
        })
    }
}

fn parse_categories(raw: &str) -> Result<Vec<UpdateCategory>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<UpdateCategory>())
        .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    let Some(raw) = env_str(key) else {
        return Ok(None);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        _ => Err(Error::Config(format!("{key} is not a boolean: {raw}"))),
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    let Some(raw) = env_str(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        let opts = ReceiveOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.limit, None);
        assert_eq!(opts.timeout, Some(DEFAULT_TIMEOUT));
        assert!(DEFAULT_TIMEOUT > Duration::ZERO);
        assert!(!opts.throw_pending_updates);
    }

    #[test]
    fn limit_outside_remote_ceiling_is_rejected() {
        assert!(ReceiveOptions::new().with_limit(0).validate().is_err());
        assert!(ReceiveOptions::new().with_limit(101).validate().is_err());
        assert!(ReceiveOptions::new().with_limit(100).validate().is_ok());
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let p = RetryPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            multiplier: 2,
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(500));
        assert_eq!(p.delay_for(40), Duration::from_millis(500));
        assert_eq!(RetryPolicy::immediate().delay_for(7), Duration::ZERO);
    }

    #[test]
    fn retry_policy_rejects_zero_multiplier() {
        let p = RetryPolicy {
            multiplier: 0,
            ..RetryPolicy::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn retry_policy_rejects_zero_start_with_nonzero_cap() {
        let p = RetryPolicy {
            initial: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.validate(), Err(Error::Config(_))));
        assert!(ReceiveOptions::new().with_retry(p).validate().is_err());
        assert!(RetryPolicy::immediate().validate().is_ok());
    }

    #[test]
    fn parses_category_csv() {
        let cats = parse_categories("message, callback_query,,inline_query").unwrap();
        assert_eq!(
            cats,
            vec![
                UpdateCategory::Message,
                UpdateCategory::CallbackQuery,
                UpdateCategory::InlineQuery
            ]
        );
        assert!(parse_categories("message,bogus").is_err());
        assert!(parse_categories("").unwrap().is_empty());
    }

    const ENV_KEYS: &[&str] = &[
        "TGPOLL_BOT_TOKEN",
        "TGPOLL_API_URL",
        "TGPOLL_DELETE_WEBHOOK",
        "TGPOLL_LIMIT",
        "TGPOLL_TIMEOUT_SECS",
        "TGPOLL_ALLOWED_UPDATES",
        "TGPOLL_THROW_PENDING_UPDATES",
        "TGPOLL_OFFSET",
        "TGPOLL_RETRY_INITIAL_MS",
        "TGPOLL_RETRY_MAX_MS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    fn assert_rejected(key: &str, value: &str) {
        clear_env();
        env::set_var(key, value);
        let err = ReceiveOptions::from_env().unwrap_err();
        assert!(
            matches!(&err, Error::Config(msg) if msg.contains(key)),
            "{key}={value} gave {err}"
        );
    }

    // Process environment is shared across test threads, so every case that
    // touches TGPOLL_* lives in this one test.
    #[test]
    fn environment_is_parsed_strictly() {
        clear_env();
        assert_eq!(ReceiveOptions::from_env().unwrap(), ReceiveOptions::default());

        env::set_var("TGPOLL_LIMIT", "50");
        env::set_var("TGPOLL_TIMEOUT_SECS", "5");
        env::set_var("TGPOLL_ALLOWED_UPDATES", "message,callback_query");
        env::set_var("TGPOLL_THROW_PENDING_UPDATES", "yes");
        env::set_var("TGPOLL_OFFSET", "-3");
        env::set_var("TGPOLL_RETRY_INITIAL_MS", "250");
        env::set_var("TGPOLL_RETRY_MAX_MS", "4000");
        let opts = ReceiveOptions::from_env().unwrap();
        assert_eq!(opts.limit, Some(50));
        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            opts.allowed_updates,
            Some(vec![UpdateCategory::Message, UpdateCategory::CallbackQuery])
        );
        assert!(opts.throw_pending_updates);
        assert_eq!(opts.offset, Some(-3));
        assert_eq!(opts.retry.initial, Duration::from_millis(250));
        assert_eq!(opts.retry.max, Duration::from_millis(4000));

        assert_rejected("TGPOLL_LIMIT", "lots");
        assert_rejected("TGPOLL_LIMIT", "300");
        assert_rejected("TGPOLL_TIMEOUT_SECS", "thirty");
        assert_rejected("TGPOLL_TIMEOUT_SECS", "-1");
        assert_rejected("TGPOLL_OFFSET", "1.5");
        assert_rejected("TGPOLL_RETRY_INITIAL_MS", "soon");
        assert_rejected("TGPOLL_RETRY_MAX_MS", "never");
        assert_rejected("TGPOLL_THROW_PENDING_UPDATES", "maybe");

        clear_env();
        env::set_var("TGPOLL_RETRY_INITIAL_MS", "0");
        assert!(ReceiveOptions::from_env().is_err());

        clear_env();
        assert!(matches!(Config::load(), Err(Error::Config(msg)) if msg.contains("TGPOLL_BOT_TOKEN")));

        env::set_var("TGPOLL_BOT_TOKEN", " 123:abc ");
        env::set_var("TGPOLL_API_URL", "http://localhost:8081/");
        env::set_var("TGPOLL_DELETE_WEBHOOK", "1");
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.bot_token, "123:abc");
        assert_eq!(cfg.api_url, "http://localhost:8081");
        assert!(cfg.delete_webhook);
        assert_eq!(cfg.receive, ReceiveOptions::default());

        env::set_var("TGPOLL_DELETE_WEBHOOK", "sure");
        assert!(Config::load().is_err());

        clear_env();
    }
}

//! Environment-driven configuration shared by every embedding of the monitor.

use std::{env, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::model::{EventName, EventNameError};

const DEFAULT_RELAY_WAIT_SECS: u64 = 120;
const DEFAULT_DESTINATION_WAIT_SECS: u64 = 600;
const DEFAULT_BALANCE_GRACE_SECS: u64 = 30;
const DEFAULT_SOURCE_POLL_MS: u64 = 6_000;
const DEFAULT_DESTINATION_POLL_MS: u64 = 12_000;

/// Names of the relay protocol events the orchestrator correlates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    /// Source side: the triggering transaction executed.
    pub executed: EventName,
    /// Source side: sibling of `executed` carrying the outgoing message id.
    pub message_sent: EventName,
    /// Destination side: the message was processed successfully.
    pub success: EventName,
    /// Destination side: the message was processed and failed.
    pub fail: EventName,
    /// Destination side: sibling of `success` crediting the beneficiary.
    pub deposited: EventName,
}

impl EventNames {
    fn load_from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            executed: event_name_var("RELAY_EXECUTED_EVENT", "ethereum.Executed")?,
            message_sent: event_name_var("RELAY_MESSAGE_SENT_EVENT", "xcmpQueue.XcmpMessageSent")?,
            success: event_name_var("DESTINATION_SUCCESS_EVENT", "xcmpQueue.Success")?,
            fail: event_name_var("DESTINATION_FAIL_EVENT", "xcmpQueue.Fail")?,
            deposited: event_name_var("DESTINATION_DEPOSIT_EVENT", "currencies.Deposited")?,
        })
    }
}

impl Default for EventNames {
    fn default() -> Self {
        let parse = |raw: &str| EventName::parse(raw).expect("built-in event names are valid");
        Self {
            executed: parse("ethereum.Executed"),
            message_sent: parse("xcmpQueue.XcmpMessageSent"),
            success: parse("xcmpQueue.Success"),
            fail: parse("xcmpQueue.Fail"),
            deposited: parse("currencies.Deposited"),
        }
    }
}

/// Deadlines and polling cadence for one monitor process. Every wait is
/// bounded: zero durations are rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    relay_wait_timeout: Duration,
    destination_wait_timeout: Duration,
    balance_grace: Duration,
    source_poll_interval: Duration,
    destination_poll_interval: Duration,
    event_names: EventNames,
}

impl WatchConfig {
    /// Hydrates `.env` (if present) and reads the optional process
    /// variables, falling back to defaults for anything unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            relay_wait_timeout: Duration::from_secs(positive_var(
                "RELAY_WAIT_TIMEOUT_SECS",
                DEFAULT_RELAY_WAIT_SECS,
            )?),
            destination_wait_timeout: Duration::from_secs(positive_var(
                "DESTINATION_WAIT_TIMEOUT_SECS",
                DEFAULT_DESTINATION_WAIT_SECS,
            )?),
            balance_grace: Duration::from_secs(positive_var(
                "BALANCE_GRACE_SECS",
                DEFAULT_BALANCE_GRACE_SECS,
            )?),
            source_poll_interval: Duration::from_millis(positive_var(
                "SOURCE_POLL_INTERVAL_MS",
                DEFAULT_SOURCE_POLL_MS,
            )?),
            destination_poll_interval: Duration::from_millis(positive_var(
                "DESTINATION_POLL_INTERVAL_MS",
                DEFAULT_DESTINATION_POLL_MS,
            )?),
            event_names: EventNames::load_from_env()?,
        })
    }

    pub fn relay_wait_timeout(&self) -> Duration {
        self.relay_wait_timeout
    }

    pub fn destination_wait_timeout(&self) -> Duration {
        self.destination_wait_timeout
    }

    pub fn balance_grace(&self) -> Duration {
        self.balance_grace
    }

    pub fn source_poll_interval(&self) -> Duration {
        self.source_poll_interval
    }

    pub fn destination_poll_interval(&self) -> Duration {
        self.destination_poll_interval
    }

    pub fn event_names(&self) -> &EventNames {
        &self.event_names
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            relay_wait_timeout: Duration::from_secs(DEFAULT_RELAY_WAIT_SECS),
            destination_wait_timeout: Duration::from_secs(DEFAULT_DESTINATION_WAIT_SECS),
            balance_grace: Duration::from_secs(DEFAULT_BALANCE_GRACE_SECS),
            source_poll_interval: Duration::from_millis(DEFAULT_SOURCE_POLL_MS),
            destination_poll_interval: Duration::from_millis(DEFAULT_DESTINATION_POLL_MS),
            event_names: EventNames::default(),
        }
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn positive_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = get_optional_var(key) else {
        return Ok(default);
    };
    let value: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if value == 0 {
        return Err(ConfigError::ZeroDuration { key });
    }
    Ok(value)
}

fn event_name_var(key: &'static str, default: &str) -> Result<EventName, ConfigError> {
    let raw = get_optional_var(key).unwrap_or_else(|| default.to_string());
    EventName::parse(&raw).map_err(|source| ConfigError::InvalidEventName { key, source })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("RELAY_WATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    ZeroDuration { key: &'static str },
    #[error("invalid event name in `{key}`: {source}")]
    InvalidEventName {
        key: &'static str,
        #[source]
        source: EventNameError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

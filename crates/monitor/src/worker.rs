use std::time::Duration;

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};

use relay_watch_domain::{
    config::ConfigError,
    services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard},
    AccountId, CurrencyId, WatchConfig,
};

use crate::{
    balance::BalanceHub,
    feed::EventHub,
    rpc::{BalanceQuery, BlockSource},
    waiter::WaitError,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("submission failed: {0}")]
    Submission(String),
    #[error("wait failed: {0}")]
    Wait(#[from] WaitError),
}

/// Loads the watch configuration and installs logging and metrics.
pub fn bootstrap_from_env(prefix: &str) -> Result<(WatchConfig, TelemetryGuard), MonitorError> {
    let config = WatchConfig::load_from_env()?;
    let telemetry = init_telemetry(&TelemetryConfig::from_env(prefix))?;
    info!(
        relay_wait = ?config.relay_wait_timeout(),
        destination_wait = ?config.destination_wait_timeout(),
        "relay watch configured"
    );
    Ok((config, telemetry))
}

/// Publishes every finalized batch of `source` to `hub` in height order until
/// `shutdown` flips to `true`. Starts at `start`, or at the current head
/// when `None`. Returns the next height that would have been published.
pub async fn run_event_pump<S>(
    source: &S,
    hub: &EventHub,
    start: Option<u64>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Option<u64>, MonitorError>
where
    S: BlockSource + ?Sized,
{
    let mut next = start;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match pump_once(source, hub, &mut next).await {
            Ok(published) => {
                if published > 0 {
                    debug!(published, next = ?next, "published finalized batches");
                }
            }
            Err(err) => {
                warn!(?err, next = ?next, "block fetch failed");
            }
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = sleep(interval) => {}
        }
    }

    info!(next = ?next, "event pump stopped");
    Ok(next)
}

async fn pump_once<S>(
    source: &S,
    hub: &EventHub,
    next: &mut Option<u64>,
) -> Result<usize, MonitorError>
where
    S: BlockSource + ?Sized,
{
    let head = rpc_call("finalized_height", source.finalized_height().await)?;
    let mut height = next.unwrap_or(head);
    let mut published = 0;

    while height <= head {
        let batch = rpc_call("events_at", source.events_at(height).await)?;
        hub.publish(&batch);
        published += 1;
        gauge!("relay_watch_pump_height").set(height as f64);
        height += 1;
        *next = Some(height);
    }

    Ok(published)
}

fn rpc_call<T>(method: &'static str, result: Result<T, MonitorError>) -> Result<T, MonitorError> {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    counter!("relay_watch_pump_rpc_calls_total", "method" => method, "result" => outcome)
        .increment(1);
    result
}

/// Publishes the free balance of `(account, currency)` every `interval` until
/// `shutdown` flips to `true`.
pub async fn run_balance_poller<Q>(
    query: &Q,
    hub: &BalanceHub,
    account: AccountId,
    currency: CurrencyId,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError>
where
    Q: BalanceQuery + ?Sized,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        match query.free_balance(&account, currency).await {
            Ok(value) => {
                counter!("relay_watch_balance_polls_total", "result" => "ok").increment(1);
                hub.publish(&account, currency, value);
            }
            Err(err) => {
                counter!("relay_watch_balance_polls_total", "result" => "error").increment(1);
                warn!(?err, %account, currency, "balance fetch failed");
            }
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = sleep(interval) => {}
        }
    }

    Ok(())
}

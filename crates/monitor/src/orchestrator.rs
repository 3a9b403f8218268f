//! Drives one transfer from submission to a confirmed, failed or unconfirmed
//! outcome by chaining one-shot waits across the two ledgers.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::counter;
use relay_watch_domain::{
    encode_destination, MessageId, TransferOutcome, TransferRequest, TransferStage, TxHash,
    UnconfirmedReason, WatchConfig,
};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    balance::{ArmedBalanceWatch, BalanceChange, BalanceWatch},
    feed::EventFeed,
    filter::EventFilter,
    pipeline::{classify_destination, extract_message_id, RelaySchema},
    rpc::TransferSubmitter,
    waiter::{once_event, WaitError},
    worker::MonitorError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitDeadlines {
    pub relay: Duration,
    pub destination: Duration,
    /// Extra time the balance watch gets once the event chain has completed.
    pub balance_grace: Duration,
}

impl Default for WaitDeadlines {
    fn default() -> Self {
        Self {
            relay: Duration::from_secs(120),
            destination: Duration::from_secs(600),
            balance_grace: Duration::from_secs(30),
        }
    }
}

impl WaitDeadlines {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            relay: config.relay_wait_timeout(),
            destination: config.destination_wait_timeout(),
            balance_grace: config.balance_grace(),
        }
    }
}

/// What the redundant balance check saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceSignal {
    Observed(BalanceChange),
    NotObserved,
    Disabled,
    /// The baseline could not be captured.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub tx_hash: TxHash,
    pub message_id: Option<MessageId>,
    pub outcome: TransferOutcome,
    pub balance: BalanceSignal,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TransferReport {
    /// `None` when the balance signal is missing; otherwise whether the
    /// observed increase equals the deposited amount.
    pub fn signals_agree(&self) -> Option<bool> {
        let BalanceSignal::Observed(change) = &self.balance else {
            return None;
        };
        Some(
            self.outcome
                .deposited_amount()
                .is_some_and(|deposited| change.increase() == Some(deposited)),
        )
    }
}

pub struct TransferOrchestrator<S> {
    submitter: S,
    source: Arc<dyn EventFeed>,
    destination: Arc<dyn EventFeed>,
    schema: RelaySchema,
    deadlines: WaitDeadlines,
    balance: Option<BalanceWatch>,
}

impl<S> TransferOrchestrator<S>
where
    S: TransferSubmitter,
{
    pub fn new(
        submitter: S,
        source: Arc<dyn EventFeed>,
        destination: Arc<dyn EventFeed>,
    ) -> Self {
        Self {
            submitter,
            source,
            destination,
            schema: RelaySchema::default(),
            deadlines: WaitDeadlines::default(),
            balance: None,
        }
    }

    pub fn from_config(
        config: &WatchConfig,
        submitter: S,
        source: Arc<dyn EventFeed>,
        destination: Arc<dyn EventFeed>,
    ) -> Self {
        Self::new(submitter, source, destination)
            .with_schema(RelaySchema::from_config(config))
            .with_deadlines(WaitDeadlines::from_config(config))
    }

    pub fn with_schema(mut self, schema: RelaySchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_deadlines(mut self, deadlines: WaitDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_balance_watch(mut self, watch: BalanceWatch) -> Self {
        self.balance = Some(watch);
        self
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn schema(&self) -> &RelaySchema {
        &self.schema
    }

    pub fn deadlines(&self) -> WaitDeadlines {
        self.deadlines
    }

    /// Submits `request` and follows it across both ledgers.
    ///
    /// Only submission errors are returned as `Err`; every post-submission
    /// result, including timeouts, is reported through the outcome.
    pub async fn execute(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReport, MonitorError> {
        let started_at = Utc::now();
        let descriptor = encode_destination(&request.destination);
        let account = request.destination.account;
        let currency = request.asset.destination_currency;

        let (armed, mut balance) = match &self.balance {
            None => (None, BalanceSignal::Disabled),
            Some(watch) => match watch.arm(account, currency).await {
                Ok(armed) => (Some(armed), BalanceSignal::NotObserved),
                Err(err) => {
                    warn!(?err, %account, currency, "balance watch unavailable");
                    (None, BalanceSignal::Unavailable(err.to_string()))
                }
            },
        };

        info!(
            asset = %request.asset.symbol,
            amount = request.amount,
            chain_id = request.destination.chain_id,
            stage = %TransferStage::Submitting,
            "submitting transfer"
        );
        let tx_hash = self
            .submitter
            .submit(request, &descriptor)
            .await
            .map_err(|err| match err {
                MonitorError::Submission(_) => err,
                other => MonitorError::Submission(other.to_string()),
            })?;

        let chain = self.follow(&tx_hash, request);
        let (outcome, message_id) = match armed {
            None => chain.await,
            Some(armed) => {
                let (result, signal) = self.race_balance(chain, armed).await;
                balance = signal;
                result
            }
        };

        counter!("relay_watch_transfers_total", "outcome" => outcome.label()).increment(1);
        info!(%tx_hash, outcome = outcome.label(), ?balance, "transfer finished");

        Ok(TransferReport {
            tx_hash,
            message_id,
            outcome,
            balance,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Runs the event chain with the balance watch alongside it. The balance
    /// never decides the outcome; after a completion it gets the grace period.
    async fn race_balance<F>(
        &self,
        chain: F,
        armed: ArmedBalanceWatch,
    ) -> ((TransferOutcome, Option<MessageId>), BalanceSignal)
    where
        F: std::future::Future<Output = (TransferOutcome, Option<MessageId>)>,
    {
        let balance = armed.wait(None);
        tokio::pin!(chain);
        tokio::pin!(balance);

        tokio::select! {
            result = &mut chain => {
                let signal = match &result.0 {
                    TransferOutcome::Completed { .. } => {
                        match timeout(self.deadlines.balance_grace, &mut balance).await {
                            Ok(Ok(change)) => BalanceSignal::Observed(change),
                            Ok(Err(_)) | Err(_) => BalanceSignal::NotObserved,
                        }
                    }
                    _ => BalanceSignal::NotObserved,
                };
                (result, signal)
            }
            observed = &mut balance => {
                let signal = match observed {
                    Ok(change) => BalanceSignal::Observed(change),
                    Err(_) => BalanceSignal::NotObserved,
                };
                (chain.await, signal)
            }
        }
    }

    async fn follow(
        &self,
        tx_hash: &TxHash,
        request: &TransferRequest,
    ) -> (TransferOutcome, Option<MessageId>) {
        let schema = &self.schema;

        let stage = TransferStage::AwaitingRelayEvent;
        info!(%tx_hash, %stage, "waiting for execution on source ledger");
        let executed = match once_event(
            self.source.as_ref(),
            EventFilter::named(schema.executed.clone()),
            schema.executed_by(tx_hash),
            Some(self.deadlines.relay),
        )
        .await
        {
            Ok(matched) => matched,
            Err(err) => return (unconfirmed(err, stage), None),
        };

        let message_id = match extract_message_id(&executed, schema) {
            Ok(message_id) => message_id,
            Err(rejection) => {
                warn!(%tx_hash, block = executed.block, %rejection, "relay rejected");
                return (rejection.into_outcome(), None);
            }
        };

        let stage = TransferStage::AwaitingDestinationEvent;
        info!(%tx_hash, %message_id, %stage, "waiting for destination verdict");
        let verdict = match once_event(
            self.destination.as_ref(),
            EventFilter::named(schema.success.clone()).or(schema.fail.clone()),
            schema.carries_message(&message_id),
            Some(self.deadlines.destination),
        )
        .await
        {
            Ok(matched) => matched,
            Err(err) => return (unconfirmed(err, stage), Some(message_id)),
        };

        let outcome = classify_destination(&verdict, schema, &request.destination.account);
        (outcome, Some(message_id))
    }
}

fn unconfirmed(err: WaitError, stage: TransferStage) -> TransferOutcome {
    let reason = match err {
        WaitError::Timeout(_) => UnconfirmedReason::WaitTimeout { stage },
        WaitError::Cancelled => UnconfirmedReason::Cancelled { stage },
    };
    TransferOutcome::Unconfirmed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_watch_domain::{EventName, FailureReason, Phase, RawEvent};

    fn report(outcome: TransferOutcome, balance: BalanceSignal) -> TransferReport {
        let now = Utc::now();
        TransferReport {
            tx_hash: TxHash::new(vec![1]),
            message_id: None,
            outcome,
            balance,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn signals_agree_only_on_matching_increase() {
        let completed = TransferOutcome::Completed {
            deposited_amount: 50,
        };
        let change = |current| {
            BalanceSignal::Observed(BalanceChange {
                baseline: 100,
                current,
            })
        };

        assert_eq!(report(completed.clone(), change(150)).signals_agree(), Some(true));
        assert_eq!(report(completed.clone(), change(149)).signals_agree(), Some(false));
        assert_eq!(report(completed.clone(), BalanceSignal::Disabled).signals_agree(), None);

        let failed = TransferOutcome::Failed {
            reason: FailureReason::DestinationFailure,
            diagnostic: RawEvent::new(
                EventName::parse("xcmpQueue.Fail").unwrap(),
                Default::default(),
                Phase::Other,
            ),
        };
        assert_eq!(report(failed, change(150)).signals_agree(), Some(false));
    }

    #[test]
    fn wait_errors_map_to_unconfirmed_stage() {
        assert_eq!(
            unconfirmed(
                WaitError::Timeout(Duration::from_secs(1)),
                TransferStage::AwaitingRelayEvent
            ),
            TransferOutcome::Unconfirmed {
                reason: UnconfirmedReason::WaitTimeout {
                    stage: TransferStage::AwaitingRelayEvent
                }
            }
        );
        assert_eq!(
            unconfirmed(WaitError::Cancelled, TransferStage::AwaitingDestinationEvent),
            TransferOutcome::Unconfirmed {
                reason: UnconfirmedReason::Cancelled {
                    stage: TransferStage::AwaitingDestinationEvent
                }
            }
        );
    }

    #[test]
    fn deadlines_follow_config() {
        let deadlines = WaitDeadlines::from_config(&WatchConfig::default());
        assert_eq!(deadlines, WaitDeadlines::default());
    }
}

//! Redundant confirmation: wait for a destination balance to move away from
//! a captured baseline.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use relay_watch_domain::{AccountId, CurrencyId};
use tokio::{sync::oneshot, time::timeout};
use tracing::{debug, info};

use crate::{
    feed::{Broadcaster, Delivery, Handler, ReleaseHandle, Subscription},
    rpc::BalanceQuery,
    waiter::WaitError,
    worker::MonitorError,
};

/// Pushes balance values for one `(account, currency)` pair.
pub trait BalanceFeed: Send + Sync {
    fn subscribe_balance(
        &self,
        account: &AccountId,
        currency: CurrencyId,
        handler: Handler<u128>,
    ) -> Subscription;
}

/// In-process balance feed keyed by account and currency.
///
/// A pair is tracked only while it has a live subscription; releasing the
/// last one forgets the pair.
#[derive(Clone, Default)]
pub struct BalanceHub {
    channels: Arc<Mutex<HashMap<(AccountId, CurrencyId), Broadcaster<u128>>>>,
}

impl BalanceHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, account: &AccountId, currency: CurrencyId) -> Option<Broadcaster<u128>> {
        self.channels
            .lock()
            .expect("balance hub mutex poisoned")
            .get(&(*account, currency))
            .cloned()
    }

    pub fn publish(&self, account: &AccountId, currency: CurrencyId, value: u128) -> usize {
        self.existing(account, currency)
            .map_or(0, |channel| channel.publish(&value))
    }

    pub fn subscriber_count(&self, account: &AccountId, currency: CurrencyId) -> usize {
        self.existing(account, currency)
            .map_or(0, |channel| channel.subscriber_count())
    }

    /// Number of `(account, currency)` pairs currently tracked.
    pub fn tracked_pairs(&self) -> usize {
        self.channels
            .lock()
            .expect("balance hub mutex poisoned")
            .len()
    }
}

impl BalanceFeed for BalanceHub {
    fn subscribe_balance(
        &self,
        account: &AccountId,
        currency: CurrencyId,
        handler: Handler<u128>,
    ) -> Subscription {
        let key = (*account, currency);
        let inner = self
            .channels
            .lock()
            .expect("balance hub mutex poisoned")
            .entry(key)
            .or_default()
            .subscribe(handler);

        let channels = Arc::downgrade(&self.channels);
        Subscription::new(move || {
            inner.release();
            let Some(channels) = channels.upgrade() else {
                return;
            };
            let mut channels = channels.lock().expect("balance hub mutex poisoned");
            // Handlers that returned `Done` already left the registry.
            if channels
                .get(&key)
                .is_some_and(|channel| channel.subscriber_count() == 0)
            {
                channels.remove(&key);
            }
        })
    }
}

/// Observed move away from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub baseline: u128,
    pub current: u128,
}

impl BalanceChange {
    /// Signed difference; `None` if it does not fit in `i128`.
    pub fn delta(&self) -> Option<i128> {
        if self.current >= self.baseline {
            i128::try_from(self.current - self.baseline).ok()
        } else {
            i128::try_from(self.baseline - self.current)
                .ok()
                .map(|decrease| -decrease)
        }
    }

    /// Amount credited, when the balance went up.
    pub fn increase(&self) -> Option<u128> {
        self.current
            .checked_sub(self.baseline)
            .filter(|increase| *increase > 0)
    }
}

#[derive(Clone)]
pub struct BalanceWatch {
    query: Arc<dyn BalanceQuery>,
    feed: Arc<dyn BalanceFeed>,
}

impl BalanceWatch {
    pub fn new(query: Arc<dyn BalanceQuery>, feed: Arc<dyn BalanceFeed>) -> Self {
        Self { query, feed }
    }

    /// Captures the baseline, then subscribes. Values pushed after this
    /// returns are compared against that baseline.
    pub async fn arm(
        &self,
        account: AccountId,
        currency: CurrencyId,
    ) -> Result<ArmedBalanceWatch, MonitorError> {
        let baseline = self.query.free_balance(&account, currency).await?;
        info!(%account, currency, baseline, "balance baseline captured");

        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);
        let subscription = self.feed.subscribe_balance(
            &account,
            currency,
            Box::new(move |value: &u128| {
                let Some(pending) = sender.as_ref() else {
                    return Delivery::Done;
                };
                if pending.is_closed() {
                    sender = None;
                    return Delivery::Done;
                }
                if *value == baseline {
                    return Delivery::Continue;
                }
                if let Some(sender) = sender.take() {
                    let _ = sender.send(*value);
                }
                Delivery::Done
            }),
        );

        Ok(ArmedBalanceWatch {
            account,
            currency,
            baseline,
            subscription,
            receiver,
        })
    }

    /// Arm-then-wait.
    pub async fn watch(
        &self,
        account: AccountId,
        currency: CurrencyId,
        deadline: Option<Duration>,
    ) -> Result<BalanceChange, MonitorError> {
        let armed = self.arm(account, currency).await?;
        Ok(armed.wait(deadline).await?)
    }
}

pub struct ArmedBalanceWatch {
    account: AccountId,
    currency: CurrencyId,
    baseline: u128,
    subscription: Subscription,
    receiver: oneshot::Receiver<u128>,
}

impl ArmedBalanceWatch {
    pub fn baseline(&self) -> u128 {
        self.baseline
    }

    pub fn handle(&self) -> ReleaseHandle {
        self.subscription.handle()
    }

    pub async fn wait(self, deadline: Option<Duration>) -> Result<BalanceChange, WaitError> {
        let Self {
            account,
            currency,
            baseline,
            subscription,
            receiver,
        } = self;

        let result = match deadline {
            Some(limit) => match timeout(limit, receiver).await {
                Ok(received) => received.map_err(|_| WaitError::Cancelled),
                Err(_) => Err(WaitError::Timeout(limit)),
            },
            None => receiver.await.map_err(|_| WaitError::Cancelled),
        };
        subscription.release();

        let change = result.map(|current| BalanceChange { baseline, current })?;
        debug!(%account, currency, baseline, current = change.current, "balance changed");
        Ok(change)
    }
}

//! Turns "filter a feed and call back on a match" into a single future that
//! resolves once and always gives its subscription back.

use std::time::Duration;

use metrics::counter;
use relay_watch_domain::{EventBatch, Payload, RawEvent};
use thiserror::Error;
use tokio::{sync::oneshot, time::timeout};
use tracing::{debug, warn};

use crate::{
    feed::{Delivery, EventFeed, ReleaseHandle, Subscription},
    filter::{siblings_of, EventFilter},
};

/// The first event that passed the filter and predicate, with its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedEvent {
    pub block: u64,
    pub event: RawEvent,
    pub siblings: Vec<RawEvent>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("no matching event within {0:?}")]
    Timeout(Duration),
    #[error("wait cancelled before a match")]
    Cancelled,
}

/// A wait that is subscribed but not yet resolved.
///
/// The subscription exists from [`PendingWait::arm`] until the wait resolves,
/// times out, is cancelled through its [`ReleaseHandle`], or is dropped.
pub struct PendingWait {
    filter: EventFilter,
    subscription: Subscription,
    receiver: oneshot::Receiver<MatchedEvent>,
}

impl PendingWait {
    pub fn arm<F, P>(feed: &F, filter: EventFilter, predicate: P) -> Self
    where
        F: EventFeed + ?Sized,
        P: Fn(&Payload) -> bool + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);
        let handler_filter = filter.clone();

        let subscription = feed.subscribe(Box::new(move |batch: &EventBatch| {
            let Some(pending) = sender.as_ref() else {
                return Delivery::Done;
            };
            if pending.is_closed() {
                sender = None;
                return Delivery::Done;
            }

            let Some(event) = batch
                .events()
                .iter()
                .find(|event| handler_filter.matches(event) && predicate(&event.payload))
            else {
                return Delivery::Continue;
            };

            let matched = MatchedEvent {
                block: batch.block(),
                siblings: siblings_of(event, batch),
                event: event.clone(),
            };
            if let Some(sender) = sender.take() {
                let _ = sender.send(matched);
            }
            Delivery::Done
        }));

        Self {
            filter,
            subscription,
            receiver,
        }
    }

    pub fn handle(&self) -> ReleaseHandle {
        self.subscription.handle()
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Resolves with the first match, or fails once `deadline` elapses or the
    /// subscription is released from outside. The subscription is released
    /// on every path.
    pub async fn wait(self, deadline: Option<Duration>) -> Result<MatchedEvent, WaitError> {
        let Self {
            filter,
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

        let names = filter
            .names()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        match &result {
            Ok(matched) => {
                debug!(events = %names, block = matched.block, "wait matched");
                counter!("relay_watch_waits_total", "result" => "matched").increment(1);
            }
            Err(WaitError::Timeout(limit)) => {
                warn!(events = %names, ?limit, "wait timed out");
                counter!("relay_watch_waits_total", "result" => "timeout").increment(1);
            }
            Err(WaitError::Cancelled) => {
                debug!(events = %names, "wait cancelled");
                counter!("relay_watch_waits_total", "result" => "cancelled").increment(1);
            }
        }

        result
    }
}

/// Arms a wait on `feed` and awaits it.
pub async fn once_event<F, P>(
    feed: &F,
    filter: EventFilter,
    predicate: P,
    deadline: Option<Duration>,
) -> Result<MatchedEvent, WaitError>
where
    F: EventFeed + ?Sized,
    P: Fn(&Payload) -> bool + Send + 'static,
{
    PendingWait::arm(feed, filter, predicate).wait(deadline).await
}

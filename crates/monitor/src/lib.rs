//! Correlates events across the two ledgers of a relay transfer. Ledger
//! clients push finalized batches into an [`EventHub`] (see
//! [`run_event_pump`]); the [`TransferOrchestrator`] chains one-shot waits on
//! those feeds to turn a submitted transaction into a final outcome.

pub mod balance;
pub mod feed;
pub mod filter;
pub mod orchestrator;
pub mod pipeline;
pub mod rpc;
pub mod waiter;
pub mod worker;


pub use balance::{ArmedBalanceWatch, BalanceChange, BalanceFeed, BalanceHub, BalanceWatch};
pub use feed::{
    BatchHandler, Broadcaster, Delivery, EventFeed, EventHub, Handler, ReleaseHandle, Subscription,
};
pub use filter::{find_sibling, matches, siblings_of, EventFilter};
pub use orchestrator::{BalanceSignal, TransferOrchestrator, TransferReport, WaitDeadlines};
pub use pipeline::{
    classify_destination, extract_deposit, extract_message_id, RelayRejection, RelaySchema,
};
pub use rpc::{BalanceQuery, BlockSource, TransferSubmitter};
pub use waiter::{once_event, MatchedEvent, PendingWait, WaitError};
pub use worker::{bootstrap_from_env, run_balance_poller, run_event_pump, MonitorError};

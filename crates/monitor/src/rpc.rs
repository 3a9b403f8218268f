//! Capabilities the monitor consumes from ledger clients. Connecting,
//! authenticating and signing live behind these traits.

use async_trait::async_trait;
use relay_watch_domain::{
    AccountId, CurrencyId, DestinationDescriptor, EventBatch, TransferRequest, TxHash,
};

use crate::worker::MonitorError;

/// Finalized blocks of one ledger, addressed by height.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn finalized_height(&self) -> Result<u64, MonitorError>;
    async fn events_at(&self, height: u64) -> Result<EventBatch, MonitorError>;
}

/// Signs and sends the transaction that starts a transfer.
#[async_trait]
pub trait TransferSubmitter: Send + Sync {
    async fn submit(
        &self,
        request: &TransferRequest,
        destination: &DestinationDescriptor,
    ) -> Result<TxHash, MonitorError>;
}

/// Point-in-time balance lookup on the destination ledger.
#[async_trait]
pub trait BalanceQuery: Send + Sync {
    async fn free_balance(
        &self,
        account: &AccountId,
        currency: CurrencyId,
    ) -> Result<u128, MonitorError>;
}

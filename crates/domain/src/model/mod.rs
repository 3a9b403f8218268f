//! Data structures shared by the destination encoder and the monitor crate.

mod event;

use std::fmt;

use hex::{decode as hex_decode, encode as hex_encode};
use thiserror::Error;

pub use event::{
    EventBatch, EventName, EventNameError, Field, FieldRef, Payload, Phase, RawEvent, Value,
};

/// Byte length of a destination-ledger account.
pub const ACCOUNT_ID_LENGTH: usize = 32;

/// Errors emitted when hex identifiers fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier contains non-hex characters")]
    NonHex,
    #[error("account id must be exactly {ACCOUNT_ID_LENGTH} bytes, got {0}")]
    WrongLength(usize),
}

fn decode_hex(value: &str) -> Result<Vec<u8>, IdentifierError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(IdentifierError::Empty);
    }
    hex_decode(digits).map_err(|_| IdentifierError::NonHex)
}

macro_rules! opaque_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            /// Parses `0x`-prefixed or bare hex.
            pub fn parse(value: &str) -> Result<Self, IdentifierError> {
                decode_hex(value).map(Self)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_inner(self) -> Vec<u8> {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex_encode(&self.0))
            }
        }
    };
}

opaque_identifier!(
    /// Hash of the triggering transaction on the source ledger.
    TxHash
);

opaque_identifier!(
    /// Correlation key linking the outgoing relay message to its processing
    /// on the destination ledger. Only equality is meaningful.
    MessageId
);

/// Account on the destination ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    pub fn new(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let bytes = decode_hex(value)?;
        let len = bytes.len();
        let bytes: [u8; ACCOUNT_ID_LENGTH] = bytes
            .try_into()
            .map_err(|_| IdentifierError::WrongLength(len))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex_encode(self.0))
    }
}

/// Numeric currency id on the destination ledger.
pub type CurrencyId = u32;

/// A transferable asset as each side of the relay addresses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub symbol: String,
    /// Contract/precompile address on the source ledger.
    pub source_contract: Vec<u8>,
    pub destination_currency: CurrencyId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub chain_id: u32,
    pub account: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub asset: Asset,
    pub amount: u128,
    pub destination: Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStage {
    Submitting,
    AwaitingRelayEvent,
    AwaitingDestinationEvent,
    Completed,
    Failed,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Submitting => "submitting",
            TransferStage::AwaitingRelayEvent => "awaiting_relay_event",
            TransferStage::AwaitingDestinationEvent => "awaiting_destination_event",
            TransferStage::Completed => "completed",
            TransferStage::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transfer is known to have failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The source transaction executed but queued no outgoing message.
    RelayRejection,
    /// The destination ledger processed the message and reported failure.
    DestinationFailure,
    /// The destination reported success but credited nothing to the
    /// beneficiary.
    DepositMissing,
}

/// Why a transfer could not be confirmed either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnconfirmedReason {
    WaitTimeout { stage: TransferStage },
    Cancelled { stage: TransferStage },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed {
        deposited_amount: u128,
    },
    Failed {
        reason: FailureReason,
        diagnostic: RawEvent,
    },
    Unconfirmed {
        reason: UnconfirmedReason,
    },
}

impl TransferOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Completed { .. } => "completed",
            TransferOutcome::Failed { .. } => "failed",
            TransferOutcome::Unconfirmed { .. } => "unconfirmed",
        }
    }

    pub fn deposited_amount(&self) -> Option<u128> {
        match self {
            TransferOutcome::Completed { deposited_amount } => Some(*deposited_amount),
            _ => None,
        }
    }
}

use hex::encode as hex_encode;
use thiserror::Error;

use crate::model::{AccountId, Destination, IdentifierError};

/// Junction selector for a sibling chain identified by its numeric id.
const PARACHAIN_JUNCTION: u8 = 0x00;
/// Junction selector for a 32-byte account.
const ACCOUNT_JUNCTION: u8 = 0x01;
/// Network selector meaning "any network".
const NETWORK_ANY: u8 = 0x00;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DestinationError {
    #[error("invalid chain id `{0}`")]
    InvalidChainId(String),
    #[error("invalid destination account: {0}")]
    InvalidAccount(#[from] IdentifierError),
}

/// Multi-location handed to the source ledger's transfer call: climb
/// `parents` levels, then descend through `interior` junctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDescriptor {
    pub parents: u8,
    pub interior: Vec<Vec<u8>>,
}

impl DestinationDescriptor {
    /// `0x`-prefixed hex of each junction, in order.
    pub fn interior_hex(&self) -> Vec<String> {
        self.interior
            .iter()
            .map(|junction| format!("0x{}", hex_encode(junction)))
            .collect()
    }
}

/// Encodes a destination as `(parents: 1, [chain junction, account junction])`.
///
/// The chain junction is the selector byte followed by the big-endian chain
/// id; the account junction wraps the raw account bytes with the selector and
/// a trailing "any network" byte.
pub fn encode_destination(destination: &Destination) -> DestinationDescriptor {
    let mut chain = Vec::with_capacity(5);
    chain.push(PARACHAIN_JUNCTION);
    chain.extend_from_slice(&destination.chain_id.to_be_bytes());

    let mut account = Vec::with_capacity(34);
    account.push(ACCOUNT_JUNCTION);
    account.extend_from_slice(destination.account.as_bytes());
    account.push(NETWORK_ANY);

    DestinationDescriptor {
        parents: 1,
        interior: vec![chain, account],
    }
}

/// Parses textual inputs (decimal chain id, hex account) into a
/// [`Destination`].
pub fn parse_destination(chain_id: &str, account: &str) -> Result<Destination, DestinationError> {
    let chain_id = chain_id
        .trim()
        .parse::<u32>()
        .map_err(|_| DestinationError::InvalidChainId(chain_id.to_string()))?;
    let account = AccountId::parse(account)?;
    Ok(Destination { chain_id, account })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT_HEX: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn encodes_chain_and_account_junctions() {
        let destination = parse_destination("2090", ACCOUNT_HEX).expect("valid destination");
        let descriptor = encode_destination(&destination);

        assert_eq!(descriptor.parents, 1);
        let hex = descriptor.interior_hex();
        assert_eq!(hex[0], "0x000000082a");
        assert_eq!(
            hex[1],
            format!("0x01{}00", ACCOUNT_HEX.trim_start_matches("0x"))
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            parse_destination("para", ACCOUNT_HEX).unwrap_err(),
            DestinationError::InvalidChainId("para".to_string())
        );
        assert_eq!(
            parse_destination("2090", "0x01").unwrap_err(),
            DestinationError::InvalidAccount(IdentifierError::WrongLength(1))
        );
    }
}

//! Reads identifiers and amounts out of matched events and classifies the
//! destination verdict.

use relay_watch_domain::{
    AccountId, EventName, EventNames, FailureReason, FieldRef, MessageId, Payload, RawEvent,
    TransferOutcome, TxHash, Value, WatchConfig,
};
use thiserror::Error;
use tracing::warn;

use crate::{filter::find_sibling, waiter::MatchedEvent};

/// Which events carry each step of a relay and where their fields live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySchema {
    pub executed: EventName,
    pub message_sent: EventName,
    pub success: EventName,
    pub fail: EventName,
    pub deposited: EventName,
    /// On `executed`: hash of the submitted transaction.
    pub transaction_hash: FieldRef,
    /// On `message_sent`: id of the queued outgoing message.
    pub sent_message_hash: FieldRef,
    /// On `success` and `fail`: id of the processed message.
    pub received_message_hash: FieldRef,
    /// On `deposited`: credited amount.
    pub deposit_amount: FieldRef,
    /// On `deposited`: credited account. `None` accepts any deposit sibling.
    pub deposit_beneficiary: Option<FieldRef>,
}

impl Default for RelaySchema {
    fn default() -> Self {
        Self::from_names(&EventNames::default())
    }
}

impl RelaySchema {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::from_names(config.event_names())
    }

    fn from_names(names: &EventNames) -> Self {
        Self {
            executed: names.executed.clone(),
            message_sent: names.message_sent.clone(),
            success: names.success.clone(),
            fail: names.fail.clone(),
            deposited: names.deposited.clone(),
            transaction_hash: FieldRef::name("transaction_hash"),
            sent_message_hash: FieldRef::name("message_hash"),
            received_message_hash: FieldRef::name("message_hash"),
            deposit_amount: FieldRef::name("amount"),
            deposit_beneficiary: Some(FieldRef::name("who")),
        }
    }

    /// Predicate for the `executed` event of `tx_hash`.
    pub fn executed_by(&self, tx_hash: &TxHash) -> impl Fn(&Payload) -> bool + Send + 'static {
        let field = self.transaction_hash.clone();
        let expected = tx_hash.as_bytes().to_vec();
        move |payload: &Payload| bytes_at(payload, &field) == Some(expected.as_slice())
    }

    /// Predicate for a destination verdict about `message_id`.
    pub fn carries_message(
        &self,
        message_id: &MessageId,
    ) -> impl Fn(&Payload) -> bool + Send + 'static {
        let field = self.received_message_hash.clone();
        let expected = message_id.as_bytes().to_vec();
        move |payload: &Payload| bytes_at(payload, &field) == Some(expected.as_slice())
    }
}

fn bytes_at<'a>(payload: &'a Payload, field: &FieldRef) -> Option<&'a [u8]> {
    payload.lookup(field).and_then(Value::as_bytes)
}

/// The source transaction executed but did not relay anything usable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayRejection {
    #[error("transaction executed without queuing an outgoing message")]
    NoMessageSent { executed: RawEvent },
    #[error("outgoing message event has no readable `{field}`")]
    MalformedMessageSent { field: FieldRef, event: RawEvent },
}

impl RelayRejection {
    /// Event to attach to the failed outcome.
    pub fn diagnostic(&self) -> &RawEvent {
        match self {
            RelayRejection::NoMessageSent { executed } => executed,
            RelayRejection::MalformedMessageSent { event, .. } => event,
        }
    }

    pub fn into_outcome(self) -> TransferOutcome {
        let diagnostic = match self {
            RelayRejection::NoMessageSent { executed } => executed,
            RelayRejection::MalformedMessageSent { event, .. } => event,
        };
        TransferOutcome::Failed {
            reason: FailureReason::RelayRejection,
            diagnostic,
        }
    }
}

/// Reads the outgoing message id from the `message_sent` sibling of a matched
/// `executed` event.
pub fn extract_message_id(
    matched: &MatchedEvent,
    schema: &RelaySchema,
) -> Result<MessageId, RelayRejection> {
    let Some(sent) = find_sibling(&matched.siblings, &schema.message_sent) else {
        return Err(RelayRejection::NoMessageSent {
            executed: matched.event.clone(),
        });
    };

    match bytes_at(&sent.payload, &schema.sent_message_hash) {
        Some(bytes) if !bytes.is_empty() => Ok(MessageId::new(bytes)),
        _ => Err(RelayRejection::MalformedMessageSent {
            field: schema.sent_message_hash.clone(),
            event: sent.clone(),
        }),
    }
}

/// Amount of the first `deposited` sibling crediting `beneficiary`.
///
/// When no deposit sibling carries a readable beneficiary field, the first
/// deposit with a readable amount is taken instead. A deposit that names a
/// different account never counts.
pub fn extract_deposit(
    matched: &MatchedEvent,
    schema: &RelaySchema,
    beneficiary: &AccountId,
) -> Option<u128> {
    let deposits: Vec<&RawEvent> = matched
        .siblings
        .iter()
        .filter(|event| event.name == schema.deposited)
        .collect();

    let credited: Vec<&RawEvent> = match &schema.deposit_beneficiary {
        Some(field) if deposits.iter().any(|event| bytes_at(&event.payload, field).is_some()) => {
            deposits
                .into_iter()
                .filter(|event| {
                    bytes_at(&event.payload, field) == Some(&beneficiary.as_bytes()[..])
                })
                .collect()
        }
        _ => deposits,
    };

    credited.into_iter().find_map(|event| {
        let amount = event
            .payload
            .lookup(&schema.deposit_amount)
            .and_then(Value::as_uint);
        if amount.is_none() {
            warn!(field = %schema.deposit_amount, event = %event.name, "deposit without readable amount");
        }
        amount
    })
}

/// Turns the destination verdict for one message into a final outcome.
pub fn classify_destination(
    matched: &MatchedEvent,
    schema: &RelaySchema,
    beneficiary: &AccountId,
) -> TransferOutcome {
    // Step 1: an explicit failure verdict wins regardless of siblings.
    if matched.event.name == schema.fail {
        return TransferOutcome::Failed {
            reason: FailureReason::DestinationFailure,
            diagnostic: matched.event.clone(),
        };
    }

    // Step 2: success must come with a credit to the beneficiary.
    match extract_deposit(matched, schema, beneficiary) {
        Some(deposited_amount) => TransferOutcome::Completed { deposited_amount },
        None => TransferOutcome::Failed {
            reason: FailureReason::DepositMissing,
            diagnostic: matched.event.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_watch_domain::{Field, Phase};

    fn name(raw: &str) -> EventName {
        EventName::parse(raw).unwrap()
    }

    fn at(index: u32, raw: &str, fields: Vec<Field>) -> RawEvent {
        RawEvent::new(name(raw), Payload::new(fields), Phase::AppliedByTransaction(index))
    }

    fn beneficiary() -> AccountId {
        AccountId::new([0xd4; 32])
    }

    fn deposit(who: AccountId, amount: u128) -> RawEvent {
        at(
            0,
            "currencies.Deposited",
            vec![
                Field::new("currency_id", Value::Uint(1)),
                Field::new("who", Value::Address(who.as_bytes().to_vec())),
                Field::new("amount", Value::Uint(amount)),
            ],
        )
    }

    fn success(message: u8) -> RawEvent {
        at(
            0,
            "xcmpQueue.Success",
            vec![Field::new("message_hash", Value::Hash(vec![message]))],
        )
    }

    fn matched(event: RawEvent, siblings: Vec<RawEvent>) -> MatchedEvent {
        MatchedEvent {
            block: 1,
            event,
            siblings,
        }
    }

    #[test]
    fn reads_message_id_from_sibling() {
        let executed = at(
            3,
            "ethereum.Executed",
            vec![Field::new("transaction_hash", Value::Hash(vec![0xaa]))],
        );
        let sent = at(
            3,
            "xcmpQueue.XcmpMessageSent",
            vec![Field::new("message_hash", Value::Hash(vec![0x01]))],
        );
        let found = extract_message_id(
            &matched(executed.clone(), vec![executed, sent]),
            &RelaySchema::default(),
        )
        .expect("message id");
        assert_eq!(found, MessageId::new(vec![0x01]));
    }

    #[test]
    fn missing_message_sent_is_rejection() {
        let executed = at(
            3,
            "ethereum.Executed",
            vec![Field::new("transaction_hash", Value::Hash(vec![0xbb]))],
        );
        let err = extract_message_id(
            &matched(executed.clone(), vec![executed.clone()]),
            &RelaySchema::default(),
        )
        .unwrap_err();
        assert_eq!(err.diagnostic(), &executed);
        assert!(matches!(
            err.into_outcome(),
            TransferOutcome::Failed {
                reason: FailureReason::RelayRejection,
                ..
            }
        ));
    }

    #[test]
    fn unreadable_message_hash_is_rejection() {
        let executed = at(3, "ethereum.Executed", Vec::new());
        let sent = at(
            3,
            "xcmpQueue.XcmpMessageSent",
            vec![Field::new("message_hash", Value::Uint(1))],
        );
        let err = extract_message_id(
            &matched(executed.clone(), vec![executed, sent.clone()]),
            &RelaySchema::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RelayRejection::MalformedMessageSent { .. }));
        assert_eq!(err.diagnostic(), &sent);
    }

    #[test]
    fn positional_fields_are_supported() {
        let schema = RelaySchema {
            sent_message_hash: FieldRef::Position(0),
            ..RelaySchema::default()
        };
        let executed = at(0, "ethereum.Executed", Vec::new());
        let sent = at(
            0,
            "xcmpQueue.XcmpMessageSent",
            vec![Field::new("anything", Value::Bytes(vec![9, 9]))],
        );
        let found =
            extract_message_id(&matched(executed.clone(), vec![executed, sent]), &schema).unwrap();
        assert_eq!(found.as_bytes(), &[9, 9]);
    }

    #[test]
    fn deposit_must_credit_beneficiary() {
        let other = AccountId::new([1; 32]);
        let event = success(1);
        let siblings = vec![event.clone(), deposit(other, 5), deposit(beneficiary(), 10)];

        let schema = RelaySchema::default();
        assert_eq!(
            extract_deposit(&matched(event.clone(), siblings.clone()), &schema, &beneficiary()),
            Some(10)
        );

        let any = RelaySchema {
            deposit_beneficiary: None,
            ..RelaySchema::default()
        };
        assert_eq!(
            extract_deposit(&matched(event, siblings), &any, &beneficiary()),
            Some(5)
        );
    }

    #[test]
    fn deposit_without_beneficiary_field_is_accepted() {
        let event = success(1);
        let amount_only = at(
            0,
            "currencies.Deposited",
            vec![Field::new("amount", Value::Uint(10))],
        );
        let text_who = at(
            0,
            "currencies.Deposited",
            vec![
                Field::new("who", Value::Text("5Grw".to_string())),
                Field::new("amount", Value::Uint(11)),
            ],
        );
        let schema = RelaySchema::default();

        assert_eq!(
            extract_deposit(
                &matched(event.clone(), vec![event.clone(), amount_only]),
                &schema,
                &beneficiary()
            ),
            Some(10)
        );
        assert_eq!(
            extract_deposit(
                &matched(event.clone(), vec![event.clone(), text_who]),
                &schema,
                &beneficiary()
            ),
            Some(11)
        );

        let elsewhere = vec![event.clone(), deposit(AccountId::new([1; 32]), 5)];
        assert_eq!(
            extract_deposit(&matched(event, elsewhere), &schema, &beneficiary()),
            None
        );
    }

    #[test]
    fn classifies_destination_verdicts() {
        let schema = RelaySchema::default();

        let completed = classify_destination(
            &matched(success(1), vec![success(1), deposit(beneficiary(), 7)]),
            &schema,
            &beneficiary(),
        );
        assert_eq!(completed.deposited_amount(), Some(7));

        let missing =
            classify_destination(&matched(success(1), vec![success(1)]), &schema, &beneficiary());
        assert!(matches!(
            missing,
            TransferOutcome::Failed {
                reason: FailureReason::DepositMissing,
                ..
            }
        ));

        let fail = at(
            0,
            "xcmpQueue.Fail",
            vec![Field::new("message_hash", Value::Hash(vec![1]))],
        );
        let failed = classify_destination(
            &matched(fail.clone(), vec![fail.clone(), deposit(beneficiary(), 7)]),
            &schema,
            &beneficiary(),
        );
        assert_eq!(
            failed,
            TransferOutcome::Failed {
                reason: FailureReason::DestinationFailure,
                diagnostic: fail,
            }
        );
    }

    #[test]
    fn predicates_compare_exact_bytes() {
        let schema = RelaySchema::default();
        let executed_by = schema.executed_by(&TxHash::new(vec![0xaa]));
        let payload = |bytes: Vec<u8>| {
            Payload::new(vec![Field::new("transaction_hash", Value::Hash(bytes))])
        };
        assert!(executed_by(&payload(vec![0xaa])));
        assert!(!executed_by(&payload(vec![0xaa, 0x00])));
        assert!(!executed_by(&Payload::default()));

        let carries = schema.carries_message(&MessageId::new(vec![1]));
        assert!(carries(&success(1).payload));
        assert!(!carries(&success(2).payload));
    }
}

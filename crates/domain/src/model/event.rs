use std::fmt;

use thiserror::Error;

/// Errors emitted when an event name does not follow `<domain>.<kind>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventNameError {
    #[error("event name `{0}` must look like `<domain>.<kind>`")]
    Malformed(String),
}

/// Namespaced event name, e.g. `xcmpQueue.Success`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName {
    domain: String,
    kind: String,
}

impl EventName {
    pub fn parse(value: &str) -> Result<Self, EventNameError> {
        let malformed = || EventNameError::Malformed(value.to_string());
        let (domain, kind) = value.split_once('.').ok_or_else(malformed)?;
        if domain.is_empty() || kind.is_empty() || kind.contains('.') {
            return Err(malformed());
        }

        Ok(Self {
            domain: domain.to_string(),
            kind: kind.to_string(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.kind)
    }
}

/// Opaque payload value. Only callers that know an event's shape interpret
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint(u128),
    Hash(Vec<u8>),
    Address(Vec<u8>),
    Bytes(Vec<u8>),
    Text(String),
}

impl Value {
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Value::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Hash(bytes) | Value::Address(bytes) | Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// How a caller addresses a payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Name(String),
    Position(usize),
}

impl FieldRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Name(name) => f.write_str(name),
            FieldRef::Position(index) => write!(f, "#{index}"),
        }
    }
}

/// Ordered event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<Field>);

impl Payload {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.0.get(index).map(|field| &field.value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn lookup(&self, field: &FieldRef) -> Option<&Value> {
        match field {
            FieldRef::Name(name) => self.get(name),
            FieldRef::Position(index) => self.at(*index),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Field> for Payload {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What caused an event inside its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Effect of the transaction at this index in the block.
    AppliedByTransaction(u32),
    /// Block initialization/finalization and other non-transactional effects.
    Other,
}

impl Phase {
    pub fn transaction_index(&self) -> Option<u32> {
        match self {
            Phase::AppliedByTransaction(index) => Some(*index),
            Phase::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: EventName,
    pub payload: Payload,
    pub phase: Phase,
}

impl RawEvent {
    pub fn new(name: EventName, payload: Payload, phase: Phase) -> Self {
        Self {
            name,
            payload,
            phase,
        }
    }
}

/// Events of one finalized block on one ledger. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    block: u64,
    events: Vec<RawEvent>,
}

impl EventBatch {
    pub fn new(block: u64, events: Vec<RawEvent>) -> Self {
        Self { block, events }
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

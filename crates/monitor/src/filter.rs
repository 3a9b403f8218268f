use relay_watch_domain::{EventBatch, EventName, Phase, RawEvent};

/// Exact name match. No wildcard or prefix semantics.
pub fn matches(name: &EventName, event: &RawEvent) -> bool {
    event.name == *name
}

/// A set of exact event names; an event passes when it equals any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    names: Vec<EventName>,
}

impl EventFilter {
    pub fn named(name: EventName) -> Self {
        Self { names: vec![name] }
    }

    pub fn or(mut self, name: EventName) -> Self {
        if !self.names.contains(&name) {
            self.names.push(name);
        }
        self
    }

    pub fn matches(&self, event: &RawEvent) -> bool {
        self.names.iter().any(|name| matches(name, event))
    }

    pub fn names(&self) -> &[EventName] {
        &self.names
    }
}

/// Every event in `batch` applied by the same transaction as `event`,
/// `event` included, in batch order. Non-transactional events have no
/// siblings.
pub fn siblings_of(event: &RawEvent, batch: &EventBatch) -> Vec<RawEvent> {
    let Phase::AppliedByTransaction(index) = event.phase else {
        return Vec::new();
    };

    batch
        .events()
        .iter()
        .filter(|candidate| candidate.phase == Phase::AppliedByTransaction(index))
        .cloned()
        .collect()
}

/// First event in `siblings` carrying `name`.
pub fn find_sibling<'a>(siblings: &'a [RawEvent], name: &EventName) -> Option<&'a RawEvent> {
    siblings.iter().find(|event| matches(name, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_watch_domain::{Field, Payload, Value};

    fn event(name: &str, phase: Phase, tag: u128) -> RawEvent {
        RawEvent::new(
            EventName::parse(name).unwrap(),
            Payload::new(vec![Field::new("tag", Value::Uint(tag))]),
            phase,
        )
    }

    fn mixed_batch() -> EventBatch {
        EventBatch::new(
            7,
            vec![
                event("system.Initialized", Phase::Other, 0),
                event("balances.Withdraw", Phase::AppliedByTransaction(1), 1),
                event("ethereum.Executed", Phase::AppliedByTransaction(2), 2),
                event("xcmpQueue.XcmpMessageSent", Phase::AppliedByTransaction(2), 3),
                event("balances.Deposit", Phase::AppliedByTransaction(1), 4),
                event("system.Finalized", Phase::Other, 5),
            ],
        )
    }

    #[test]
    fn name_match_is_exact() {
        let name = EventName::parse("xcmpQueue.Success").unwrap();
        assert!(matches(
            &name,
            &event("xcmpQueue.Success", Phase::Other, 0)
        ));
        assert!(!matches(
            &name,
            &event("xcmpQueue.SuccessExtra", Phase::Other, 0)
        ));
        assert!(!matches(&name, &event("xcmpqueue.Success", Phase::Other, 0)));
    }

    #[test]
    fn composed_filter_accepts_any_listed_name() {
        let filter = EventFilter::named(EventName::parse("xcmpQueue.Success").unwrap())
            .or(EventName::parse("xcmpQueue.Fail").unwrap())
            .or(EventName::parse("xcmpQueue.Fail").unwrap());

        assert_eq!(filter.names().len(), 2);
        assert!(filter.matches(&event("xcmpQueue.Fail", Phase::Other, 0)));
        assert!(filter.matches(&event("xcmpQueue.Success", Phase::Other, 0)));
        assert!(!filter.matches(&event("xcmpQueue.Overweight", Phase::Other, 0)));
    }

    #[test]
    fn non_transactional_events_have_no_siblings() {
        let batch = mixed_batch();
        for candidate in batch.events().iter().filter(|e| e.phase == Phase::Other) {
            assert!(siblings_of(candidate, &batch).is_empty());
        }
    }

    #[test]
    fn siblings_share_transaction_index_in_batch_order() {
        let batch = mixed_batch();
        let siblings = siblings_of(&batch.events()[1], &batch);
        let tags: Vec<u128> = siblings
            .iter()
            .map(|e| e.payload.get("tag").and_then(Value::as_uint).unwrap())
            .collect();
        assert_eq!(tags, vec![1, 4]);
    }

    #[test]
    fn sibling_relation_is_symmetric() {
        let batch = mixed_batch();
        for a in batch.events() {
            for b in siblings_of(a, &batch) {
                assert!(siblings_of(&b, &batch).contains(a), "{} / {}", a.name, b.name);
            }
        }
    }

    #[test]
    fn finds_named_sibling() {
        let batch = mixed_batch();
        let siblings = siblings_of(&batch.events()[2], &batch);
        let sent = EventName::parse("xcmpQueue.XcmpMessageSent").unwrap();
        let found = find_sibling(&siblings, &sent).expect("message sent sibling");
        assert_eq!(found.payload.get("tag"), Some(&Value::Uint(3)));
        let missing = EventName::parse("balances.Deposit").unwrap();
        assert!(find_sibling(&siblings, &missing).is_none());
    }
}

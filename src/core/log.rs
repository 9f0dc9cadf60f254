//! The per-node decision log.

use std::collections::BTreeMap;

use super::proposal::SlotId;

/// Append-only map from slot numbers to decided values.
///
/// Two cursors track progress through the decided slots:
/// - the *frontier* ([`next_unknown_slot`](Self::next_unknown_slot)): the
///   smallest slot with no decided value yet, which is where a proposer
///   should attempt its next proposal;
/// - the *read cursor*: the smallest slot not yet handed to the application,
///   advanced one contiguous slot at a time so delivery is gap-free and in
///   slot order.
///
/// Inserts are idempotent - the first value written for a slot wins and
/// later inserts for the same slot are silently ignored. Entries are never
/// removed: a prepare targeting an already decided slot is answered out of
/// this map, which is how a lagging peer learns old decisions.
#[derive(Clone, Debug)]
pub struct DecisionLog<V> {
    slots: BTreeMap<SlotId, V>,
    next_unknown: SlotId,
    next_unread: SlotId,
}

impl<V> Default for DecisionLog<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DecisionLog<V> {
    /// Create an empty log with both cursors at slot 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next_unknown: 0,
            next_unread: 0,
        }
    }

    /// Record `value` as decided for `slot`.
    ///
    /// Returns `true` if the slot was newly filled, `false` if it already
    /// held a value (which is kept). Advances the frontier past any newly
    /// contiguous run of decided slots.
    pub fn add(&mut self, slot: SlotId, value: V) -> bool {
        if self.slots.contains_key(&slot) {
            return false;
        }
        self.slots.insert(slot, value);
        while self.slots.contains_key(&self.next_unknown) {
            self.next_unknown += 1;
        }
        true
    }

    /// Look up the decided value for `slot`, if any.
    #[must_use]
    pub fn get(&self, slot: SlotId) -> Option<&V> {
        self.slots.get(&slot)
    }

    /// The smallest slot with no decided value yet.
    #[must_use]
    pub fn next_unknown_slot(&self) -> SlotId {
        self.next_unknown
    }

    /// Hand out the value at the read cursor if that slot is decided.
    ///
    /// Advances the cursor on success. Returns `None` without advancing when
    /// the next slot in order is still undecided, so a gap always pauses
    /// delivery until it is filled. Calling repeatedly drains every
    /// currently deliverable slot in increasing order.
    pub fn take_next_unread(&mut self) -> Option<V>
    where
        V: Clone,
    {
        let value = self.slots.get(&self.next_unread)?.clone();
        self.next_unread += 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontier_starts_at_zero() {
        let log: DecisionLog<&str> = DecisionLog::new();
        assert_eq!(log.next_unknown_slot(), 0);
        assert!(log.get(0).is_none());
    }

    #[test]
    fn test_frontier_advances_over_contiguous_run() {
        let mut log = DecisionLog::new();
        assert!(log.add(0, "a"));
        assert_eq!(log.next_unknown_slot(), 1);

        // Slot 2 fills out of order; the frontier waits on slot 1.
        assert!(log.add(2, "c"));
        assert_eq!(log.next_unknown_slot(), 1);

        // Filling the gap fast-forwards past both.
        assert!(log.add(1, "b"));
        assert_eq!(log.next_unknown_slot(), 3);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut log = DecisionLog::new();
        assert!(log.add(0, "first"));
        assert!(!log.add(0, "second"));
        assert_eq!(log.get(0), Some(&"first"));
        assert_eq!(log.next_unknown_slot(), 1);
    }

    #[test]
    fn test_take_drains_in_order() {
        let mut log = DecisionLog::new();
        log.add(1, "b");
        log.add(0, "a");
        assert_eq!(log.take_next_unread(), Some("a"));
        assert_eq!(log.take_next_unread(), Some("b"));
        assert_eq!(log.take_next_unread(), None);
    }

    #[test]
    fn test_take_stops_at_gap() {
        let mut log = DecisionLog::new();
        log.add(0, "a");
        log.add(2, "c");
        assert_eq!(log.take_next_unread(), Some("a"));
        assert_eq!(log.take_next_unread(), None);

        log.add(1, "b");
        assert_eq!(log.take_next_unread(), Some("b"));
        assert_eq!(log.take_next_unread(), Some("c"));
        assert_eq!(log.take_next_unread(), None);
    }

    #[test]
    fn test_take_does_not_remove_entries() {
        let mut log = DecisionLog::new();
        log.add(0, "a");
        assert_eq!(log.take_next_unread(), Some("a"));
        // Still answerable for late peers.
        assert_eq!(log.get(0), Some(&"a"));
    }
}

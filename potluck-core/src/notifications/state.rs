use std::collections::HashSet;

use potluck_common::{ReceivedRecord, ReceivedRecordId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Establishing,
    Live,
}

#[derive(Debug, Default)]
enum Inner {
    #[default]
    Stopped,
    Establishing,
    Live {
        previous: HashSet<ReceivedRecordId>,
    },
}

/// Decides which deliveries of a received-recipe feed contain new shares.
///
/// The first delivery after [`SubscriptionState::establish`] is the baseline and never counts as
/// new. After that, a record is new when its id was absent from the delivery just before it.
#[derive(Debug, Default)]
pub struct SubscriptionState {
    inner: Inner,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.inner {
            Inner::Stopped => Phase::Stopped,
            Inner::Establishing => Phase::Establishing,
            Inner::Live { .. } => Phase::Live,
        }
    }

    /// Starts over: the next delivery becomes the new baseline.
    pub fn establish(&mut self) {
        self.inner = Inner::Establishing;
    }

    pub fn stop(&mut self) {
        self.inner = Inner::Stopped;
    }

    /// Feeds one delivery through the state machine and returns the records that are new.
    pub fn observe<'a>(&mut self, delivery: &'a [ReceivedRecord]) -> Vec<&'a ReceivedRecord> {
        let ids = || delivery.iter().map(|record| record.id.clone()).collect::<HashSet<_>>();
        if let Inner::Establishing = self.inner {
            self.inner = Inner::Live { previous: ids() };
            return Vec::new();
        }
        match &mut self.inner {
            Inner::Stopped | Inner::Establishing => Vec::new(),
            Inner::Live { previous } => {
                let added = delivery
                    .iter()
                    .filter(|record| !previous.contains(&record.id))
                    .collect();
                *previous = ids();
                added
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use potluck_common::{RecipeId, Timestamp, UserId};

    use super::*;

    fn record(id: &str) -> ReceivedRecord {
        ReceivedRecord {
            id: ReceivedRecordId::from(id),
            from_user_id: UserId::from("alice"),
            recipe_id: RecipeId(1),
            reaction: None,
            timestamp: Timestamp(0),
            counterpart_sent_id: None,
        }
    }

    fn ids(records: Vec<&ReceivedRecord>) -> Vec<&str> {
        records.into_iter().map(|record| record.id.as_ref()).collect()
    }

    #[test]
    fn first_delivery_is_the_baseline() {
        let mut state = SubscriptionState::new();
        state.establish();
        assert_eq!(state.phase(), Phase::Establishing);

        let existing = [record("a"), record("b"), record("c")];
        assert!(state.observe(&existing).is_empty());
        assert_eq!(state.phase(), Phase::Live);
    }

    #[test]
    fn later_deliveries_report_added_records() {
        let mut state = SubscriptionState::new();
        state.establish();
        state.observe(&[record("a")]);

        let next = [record("c"), record("b"), record("a")];
        assert_eq!(ids(state.observe(&next)), ["c", "b"]);
        // unchanged ids, e.g. a backfilled counterpart field
        assert!(state.observe(&next).is_empty());
    }

    #[test]
    fn compares_against_the_previous_delivery_only() {
        let mut state = SubscriptionState::new();
        state.establish();
        state.observe(&[record("a")]);
        state.observe(&[]);
        assert_eq!(ids(state.observe(&[record("a")])), ["a"]);
    }

    #[test]
    fn stopped_state_ignores_deliveries() {
        let mut state = SubscriptionState::new();
        assert!(state.observe(&[record("a")]).is_empty());
        assert_eq!(state.phase(), Phase::Stopped);
    }

    #[test]
    fn re_establishing_takes_a_fresh_baseline() {
        let mut state = SubscriptionState::new();
        state.establish();
        state.observe(&[record("a")]);
        state.stop();
        state.establish();
        assert!(state.observe(&[record("a"), record("b")]).is_empty());
        assert_eq!(ids(state.observe(&[record("c")])), ["c"]);
    }
}

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::watch;

use parley_types::api::ErrorBody;
use parley_types::events::{LiveQuery, QueryValue};

use crate::reactive::{Dependency, ReadSet, WriteSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One delivery to a subscriber: a fresh result, or the terminal failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub subscription: SubscriptionId,
    pub outcome: Result<QueryValue, ErrorBody>,
}

pub type UpdateSink = watch::Sender<Option<LiveUpdate>>;
pub type UpdateStream = watch::Receiver<Option<LiveUpdate>>;

/// Delivery slot for one subscription. It holds only the newest update, so a
/// subscriber that reads slowly skips intermediate results instead of queueing them.
pub fn update_channel() -> (UpdateSink, UpdateStream) {
    watch::channel(None)
}

/// Unseen update, if any, while the subscription is still registered.
#[cfg(test)]
pub(crate) fn take_update(rx: &mut UpdateStream) -> Option<LiveUpdate> {
    match rx.has_changed() {
        Ok(true) => rx.borrow_and_update().clone(),
        _ => None,
    }
}

pub(crate) struct Entry {
    pub query: LiveQuery,
    pub reads: ReadSet,
    pub last: Option<QueryValue>,
    pub sink: UpdateSink,
}

/// Outstanding subscriptions and the inverted index from dependency to
/// subscription. Evaluation and delivery live in [`crate::live`].
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    next_id: u64,
    entries: HashMap<SubscriptionId, Entry>,
    index: HashMap<Dependency, HashSet<SubscriptionId>>,
}

impl SubscriptionRegistry {
    pub fn insert(&mut self, query: LiveQuery, reads: ReadSet, sink: UpdateSink) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        self.index_reads(id, &reads);
        self.entries.insert(
            id,
            Entry {
                query,
                reads,
                last: None,
                sink,
            },
        );
        id
    }

    pub fn get_mut(&mut self, id: SubscriptionId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Subscriptions whose read-set intersects `writes`, in subscription order.
    pub fn affected(&self, writes: &WriteSet) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = writes
            .iter()
            .filter_map(|dep| self.index.get(dep))
            .flatten()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    /// Replace a subscription's read-set after re-evaluation.
    pub fn set_reads(&mut self, id: SubscriptionId, reads: ReadSet) {
        let Some(old) = self.entries.get(&id).map(|e| e.reads.clone()) else {
            return;
        };
        if old == reads {
            return;
        }
        self.unindex_reads(id, &old);
        self.index_reads(id, &reads);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.reads = reads;
        }
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        self.unindex_reads(id, &entry.reads);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn index_reads(&mut self, id: SubscriptionId, reads: &ReadSet) {
        for dep in reads.iter() {
            self.index.entry(*dep).or_default().insert(id);
        }
    }

    fn unindex_reads(&mut self, id: SubscriptionId, reads: &ReadSet) {
        for dep in reads.iter() {
            if let Some(ids) = self.index.get_mut(dep) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.index.remove(dep);
                }
            }
        }
    }
}

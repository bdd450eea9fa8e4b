//! Live queries: evaluate, remember the read-set, re-deliver on overlapping writes.
//!
//! Subscribing, re-evaluating and delivering all happen under the registry
//! lock. Two invalidations therefore never interleave their deliveries to the
//! same sink, and the last value a subscriber sees reflects the newest commit.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, trace};

use parley_types::events::{LiveQuery, QueryValue};

use crate::error::{ChatError, Result};
use crate::reactive::{ReadSet, WriteSet};
use crate::registry::{LiveUpdate, SubscriptionId, SubscriptionRegistry, UpdateSink};

/// Evaluates a [`LiveQuery`], recording every record and range it reads.
pub trait QueryExecutor {
    fn execute(&self, query: &LiveQuery, reads: &mut ReadSet) -> Result<QueryValue>;
}

#[derive(Default)]
pub struct LiveQueries {
    registry: Mutex<SubscriptionRegistry>,
}

impl LiveQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `query` and register it. The initial result is the first
    /// update pushed into `sink`. An evaluation error is returned directly and
    /// nothing is registered.
    pub fn subscribe(
        &self,
        exec: &dyn QueryExecutor,
        query: LiveQuery,
        sink: UpdateSink,
    ) -> Result<SubscriptionId> {
        let mut registry = self.lock()?;

        let mut reads = ReadSet::new();
        let value = exec.execute(&query, &mut reads)?;

        let id = registry.insert(query, reads, sink);
        let Some(entry) = registry.get_mut(id) else {
            return Err(ChatError::Storage(anyhow::anyhow!("subscription {} vanished", id)));
        };

        let update = LiveUpdate {
            subscription: id,
            outcome: Ok(value.clone()),
        };
        if entry.sink.send(Some(update)).is_err() {
            registry.remove(id);
            debug!("Subscriber for {} went away before the first delivery", id);
        } else {
            entry.last = Some(value);
            debug!("Registered live query {} ({} active)", id, registry.len());
        }

        Ok(id)
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.lock() {
            Ok(mut registry) => registry.remove(id).is_some(),
            Err(e) => {
                error!("Failed to unsubscribe {}: {}", id, e);
                false
            }
        }
    }

    /// Re-run every subscription whose read-set intersects `writes` and push
    /// changed results. Failed evaluations are delivered once and torn down.
    pub fn invalidate(&self, exec: &dyn QueryExecutor, writes: &WriteSet) {
        if writes.is_empty() {
            return;
        }

        let mut registry = match self.lock() {
            Ok(registry) => registry,
            Err(e) => {
                error!("Dropping invalidation: {}", e);
                return;
            }
        };

        let affected = registry.affected(writes);
        trace!("{} live queries affected by commit", affected.len());

        for id in affected {
            let Some(query) = registry.get_mut(id).map(|entry| entry.query.clone()) else {
                continue;
            };

            let mut reads = ReadSet::new();
            match exec.execute(&query, &mut reads) {
                Ok(value) => {
                    let Some(entry) = registry.get_mut(id) else {
                        continue;
                    };

                    if entry.last.as_ref() == Some(&value) {
                        trace!("{} unchanged, skipping delivery", id);
                    } else {
                        let update = LiveUpdate {
                            subscription: id,
                            outcome: Ok(value.clone()),
                        };
                        if entry.sink.send(Some(update)).is_err() {
                            registry.remove(id);
                            debug!("Pruned {}: subscriber went away", id);
                            continue;
                        }
                        entry.last = Some(value);
                    }

                    registry.set_reads(id, reads);
                }
                Err(e) => {
                    if let ChatError::Storage(inner) = &e {
                        error!("Re-evaluating {} failed: {:#}", id, inner);
                    } else {
                        debug!("Tearing down {}: {}", id, e);
                    }

                    if let Some(entry) = registry.remove(id) {
                        let _ = entry.sink.send(Some(LiveUpdate {
                            subscription: id,
                            outcome: Err(e.to_body()),
                        }));
                    }
                }
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().map(|registry| registry.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SubscriptionRegistry>> {
        self.registry
            .lock()
            .map_err(|e| ChatError::Storage(anyhow::anyhow!("live registry lock poisoned: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use parley_types::api::ErrorKind;
    use parley_types::models::Channel;
    use uuid::Uuid;

    use crate::reactive::Dependency;
    use crate::registry::{take_update, update_channel};

    /// Serves `ListChannels` from an in-memory list.
    #[derive(Default)]
    struct FakeDirectory {
        channels: Mutex<Vec<Channel>>,
        broken: AtomicBool,
    }

    impl FakeDirectory {
        fn add(&self, name: &str) -> WriteSet {
            let id = Uuid::new_v4();
            self.channels.lock().unwrap().push(Channel {
                id,
                name: name.to_string(),
                created_at: Utc::now(),
            });
            [Dependency::Directory, Dependency::Channel(id)].into_iter().collect()
        }
    }

    impl QueryExecutor for FakeDirectory {
        fn execute(&self, _query: &LiveQuery, reads: &mut ReadSet) -> Result<QueryValue> {
            reads.record(Dependency::Directory);
            if self.broken.load(Ordering::SeqCst) {
                return Err(ChatError::NotFound("Directory".into()));
            }
            Ok(QueryValue::Channels(self.channels.lock().unwrap().clone()))
        }
    }

    fn names(update: &LiveUpdate) -> Vec<String> {
        match &update.outcome {
            Ok(QueryValue::Channels(channels)) => channels.iter().map(|c| c.name.clone()).collect(),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn initial_result_then_changes() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();
        let (tx, mut rx) = update_channel();

        let id = live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        let first = take_update(&mut rx).unwrap();
        assert_eq!(first.subscription, id);
        assert!(names(&first).is_empty());

        let writes = exec.add("general");
        live.invalidate(&exec, &writes);
        assert_eq!(names(&take_update(&mut rx).unwrap()), vec!["general"]);
    }

    #[test]
    fn unchanged_results_are_not_redelivered() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();
        let (tx, mut rx) = update_channel();

        live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        take_update(&mut rx).unwrap();

        live.invalidate(&exec, &[Dependency::Directory].into_iter().collect());
        assert!(take_update(&mut rx).is_none());
    }

    #[test]
    fn unrelated_writes_do_not_reevaluate() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();
        let (tx, mut rx) = update_channel();

        live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        take_update(&mut rx).unwrap();

        exec.channels.lock().unwrap().push(Channel {
            id: Uuid::new_v4(),
            name: "sneaky".into(),
            created_at: Utc::now(),
        });
        live.invalidate(&exec, &[Dependency::ChannelMessages(Uuid::new_v4())].into_iter().collect());
        assert!(take_update(&mut rx).is_none());
    }

    #[test]
    fn failed_reevaluation_tears_down() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();
        let (tx, mut rx) = update_channel();

        let id = live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        take_update(&mut rx).unwrap();

        exec.broken.store(true, Ordering::SeqCst);
        live.invalidate(&exec, &[Dependency::Directory].into_iter().collect());

        // Sink was dropped with the subscription, leaving the failure as its final value
        assert!(rx.has_changed().is_err());
        let failure = rx.borrow_and_update().clone().unwrap();
        assert_eq!(failure.subscription, id);
        assert_eq!(failure.outcome.unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(live.subscription_count(), 0);
    }

    #[test]
    fn dropped_sink_is_pruned_and_unsubscribe_stops_delivery() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();

        let (tx, rx) = update_channel();
        live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        drop(rx);
        live.invalidate(&exec, &exec.add("general"));
        assert_eq!(live.subscription_count(), 0);

        let (tx, mut rx) = update_channel();
        let id = live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();
        take_update(&mut rx).unwrap();
        assert!(live.unsubscribe(id));
        assert!(!live.unsubscribe(id));
        live.invalidate(&exec, &exec.add("random"));
        assert!(rx.has_changed().is_err());
        assert_eq!(names(&rx.borrow().clone().unwrap()), vec!["general"]);
    }

    #[test]
    fn failing_initial_evaluation_registers_nothing() {
        let exec = FakeDirectory::default();
        exec.broken.store(true, Ordering::SeqCst);
        let live = LiveQueries::new();
        let (tx, _rx) = update_channel();

        assert!(matches!(
            live.subscribe(&exec, LiveQuery::ListChannels, tx),
            Err(ChatError::NotFound(_))
        ));
        assert_eq!(live.subscription_count(), 0);
    }

    #[test]
    fn unread_updates_collapse_to_newest() {
        let exec = FakeDirectory::default();
        let live = LiveQueries::new();
        let (tx, mut rx) = update_channel();
        live.subscribe(&exec, LiveQuery::ListChannels, tx).unwrap();

        for i in 0..100 {
            live.invalidate(&exec, &exec.add(&format!("room-{}", i)));
        }

        let latest = take_update(&mut rx).unwrap();
        assert_eq!(names(&latest).len(), 100);
        assert_eq!(names(&latest).last().map(String::as_str), Some("room-99"));
        assert!(take_update(&mut rx).is_none());
    }
}

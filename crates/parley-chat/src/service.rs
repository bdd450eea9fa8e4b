use std::sync::Arc;

use uuid::Uuid;

use parley_db::Database;
use parley_types::events::{LiveQuery, QueryValue};
use parley_types::models::{Channel, Message};

use crate::directory::ChannelDirectory;
use crate::error::Result;
use crate::identity::Caller;
use crate::ledger::MessageLedger;
use crate::live::{LiveQueries, QueryExecutor};
use crate::reactive::{Committed, ReadSet};
use crate::registry::{SubscriptionId, UpdateSink};

/// The query/mutation contract exposed to transports.
///
/// Every operation requires a resolved caller. Mutations commit first and
/// then invalidate the live queries that read what they wrote. All methods
/// block on the store; call them from `spawn_blocking` in async code.
pub struct Chat {
    directory: ChannelDirectory,
    ledger: MessageLedger,
    live: LiveQueries,
}

impl Chat {
    pub fn new(db: Arc<Database>, default_message_limit: u32) -> Self {
        Self {
            directory: ChannelDirectory::new(db.clone()),
            ledger: MessageLedger::new(db, default_message_limit),
            live: LiveQueries::new(),
        }
    }

    // -- Queries --

    pub fn list_channels(&self, caller: &Caller) -> Result<Vec<Channel>> {
        caller.require()?;
        self.directory.list(&mut ReadSet::new())
    }

    pub fn get_channel(&self, caller: &Caller, id: Uuid) -> Result<Channel> {
        caller.require()?;
        self.directory.get(id, &mut ReadSet::new())
    }

    pub fn list_messages(&self, caller: &Caller, channel_id: Uuid, limit: Option<u32>) -> Result<Vec<Message>> {
        caller.require()?;
        self.ledger.list(channel_id, limit, &mut ReadSet::new())
    }

    // -- Mutations --

    pub fn create_channel(&self, caller: &Caller, name: &str) -> Result<Channel> {
        let committed = self.directory.create(caller, name)?;
        Ok(self.publish(committed))
    }

    pub fn ensure_default_channels(&self, caller: &Caller) -> Result<Vec<Channel>> {
        let committed = self.directory.ensure_defaults(caller)?;
        Ok(self.publish(committed))
    }

    pub fn send_message(&self, caller: &Caller, channel_id: Uuid, body: &str) -> Result<Message> {
        let committed = self.ledger.send(caller, channel_id, body)?;
        Ok(self.publish(committed))
    }

    /// Label the caller's messages would carry if sent now.
    pub fn label_for(&self, caller: &Caller) -> Result<String> {
        self.ledger.resolve_label(caller.require()?)
    }

    // -- Live queries --

    /// Open a live query. The current result is pushed into `sink` before
    /// this returns, followed by every changed result.
    pub fn subscribe(&self, caller: &Caller, query: LiveQuery, sink: UpdateSink) -> Result<SubscriptionId> {
        caller.require()?;
        self.live.subscribe(self, query, sink)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.live.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.live.subscription_count()
    }

    fn publish<T>(&self, committed: Committed<T>) -> T {
        self.live.invalidate(self, &committed.writes);
        committed.value
    }
}

impl QueryExecutor for Chat {
    fn execute(&self, query: &LiveQuery, reads: &mut ReadSet) -> Result<QueryValue> {
        match query {
            LiveQuery::ListChannels => self.directory.list(reads).map(QueryValue::Channels),
            LiveQuery::GetChannel { channel_id } => {
                self.directory.get(*channel_id, reads).map(QueryValue::Channel)
            }
            LiveQuery::ListMessages { channel_id, limit } => {
                self.ledger.list(*channel_id, *limit, reads).map(QueryValue::Messages)
            }
        }
    }
}

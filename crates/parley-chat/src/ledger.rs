use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{MessageRow, NewMessage};
use parley_types::models::Message;

use crate::directory::{parse_millis, parse_uuid};
use crate::error::{ChatError, Result};
use crate::identity::{Actor, Caller, Profile, author_label};
use crate::reactive::{Committed, Dependency, ReadSet};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;
pub const MAX_BODY_LEN: usize = 4000;

/// Per-channel, append-only message history.
pub struct MessageLedger {
    db: Arc<Database>,
    default_limit: u32,
}

impl MessageLedger {
    pub fn new(db: Arc<Database>, default_limit: u32) -> Self {
        Self {
            db,
            default_limit: default_limit.min(MAX_LIST_LIMIT),
        }
    }

    /// Empty and whitespace-only bodies are stored as given.
    pub fn send(&self, caller: &Caller, channel_id: Uuid, body: &str) -> Result<Committed<Message>> {
        let actor = caller.require()?;
        if body.chars().count() > MAX_BODY_LEN {
            return Err(ChatError::InvalidInput(format!(
                "Message body must be at most {} characters",
                MAX_BODY_LEN
            )));
        }

        let author_id = actor.user_id.to_string();
        let label = self.resolve_label(actor)?;

        let id = Uuid::new_v4().to_string();
        let cid = channel_id.to_string();
        let row = self
            .db
            .append_message(&NewMessage {
                id: &id,
                channel_id: &cid,
                author_id: &author_id,
                author_label: &label,
                body,
                now: Utc::now().timestamp_millis(),
            })?
            .ok_or_else(|| ChatError::NotFound(format!("Channel {}", channel_id)))?;

        debug!("Message {} (seq {}) appended to {}", row.id, row.seq, channel_id);
        Ok(Committed {
            value: message_from_row(row)?,
            writes: [Dependency::ChannelMessages(channel_id)].into_iter().collect(),
        })
    }

    /// Current label for `actor`, read from their profile.
    pub fn resolve_label(&self, actor: Actor) -> Result<String> {
        let profile = self
            .db
            .get_user_by_id(&actor.user_id.to_string())?
            .map(|user| Profile {
                name: user.name,
                email: Some(user.email),
            });
        Ok(author_label(profile.as_ref()))
    }

    /// Up to `limit` of the channel's most recent messages, oldest first.
    pub fn list(&self, channel_id: Uuid, limit: Option<u32>, reads: &mut ReadSet) -> Result<Vec<Message>> {
        let cid = channel_id.to_string();

        reads.record(Dependency::Channel(channel_id));
        if self.db.get_channel(&cid)?.is_none() {
            return Err(ChatError::NotFound(format!("Channel {}", channel_id)));
        }

        reads.record(Dependency::ChannelMessages(channel_id));
        let limit = limit.unwrap_or(self.default_limit).min(MAX_LIST_LIMIT);
        self.db
            .list_messages(&cid, limit)?
            .into_iter()
            .map(message_from_row)
            .collect()
    }
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: parse_uuid(&row.id, "message id")?,
        channel_id: parse_uuid(&row.channel_id, "channel_id")?,
        author_id: parse_uuid(&row.author_id, "author_id")?,
        created_at: parse_millis(row.created_at, "created_at", &row.id)?,
        author_label: row.author_label,
        body: row.body,
    })
}

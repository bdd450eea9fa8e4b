use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{ChannelInsert, ChannelRow};
use parley_types::models::Channel;

use crate::error::{ChatError, Result};
use crate::identity::Caller;
use crate::reactive::{Committed, Dependency, ReadSet, WriteSet};

/// Channels seeded into an empty directory, in creation order.
pub const DEFAULT_CHANNELS: &[&str] = &["general", "random"];

pub const MAX_CHANNEL_NAME_LEN: usize = 80;

/// Owns channel identity and the name-uniqueness invariant.
pub struct ChannelDirectory {
    db: Arc<Database>,
}

impl ChannelDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, caller: &Caller, name: &str) -> Result<Committed<Channel>> {
        let actor = caller.require()?;
        validate_name(name)?;

        let id = Uuid::new_v4();
        let now = Utc::now().timestamp_millis();

        match self.db.insert_channel(&id.to_string(), name, now)? {
            ChannelInsert::NameTaken => Err(ChatError::AlreadyExists(format!("Channel \"{}\"", name))),
            ChannelInsert::Created(row) => {
                info!("Channel \"{}\" ({}) created by {}", name, id, actor.user_id);
                let writes = [Dependency::Directory, Dependency::Channel(id)].into_iter().collect();
                Ok(Committed {
                    value: channel_from_row(row)?,
                    writes,
                })
            }
        }
    }

    pub fn get(&self, id: Uuid, reads: &mut ReadSet) -> Result<Channel> {
        reads.record(Dependency::Channel(id));
        self.db
            .get_channel(&id.to_string())?
            .map(channel_from_row)
            .transpose()?
            .ok_or_else(|| ChatError::NotFound(format!("Channel {}", id)))
    }

    pub fn list(&self, reads: &mut ReadSet) -> Result<Vec<Channel>> {
        reads.record(Dependency::Directory);
        self.db.list_channels()?.into_iter().map(channel_from_row).collect()
    }

    /// Seed [`DEFAULT_CHANNELS`] if, and only if, the directory is empty.
    pub fn ensure_defaults(&self, caller: &Caller) -> Result<Committed<Vec<Channel>>> {
        caller.require()?;

        let seeds: Vec<(String, &str)> = DEFAULT_CHANNELS
            .iter()
            .map(|name| (Uuid::new_v4().to_string(), *name))
            .collect();
        let created = self.db.seed_channels_if_empty(&seeds, Utc::now().timestamp_millis())?;

        let channels = created.into_iter().map(channel_from_row).collect::<Result<Vec<_>>>()?;
        let mut writes = WriteSet::new();
        if !channels.is_empty() {
            info!("Seeded {} default channels", channels.len());
            writes.record(Dependency::Directory);
            for channel in &channels {
                writes.record(Dependency::Channel(channel.id));
            }
        }

        Ok(Committed {
            value: channels,
            writes,
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ChatError::InvalidInput("Channel name must not be empty".into()));
    }
    if name.trim() != name {
        return Err(ChatError::InvalidInput(
            "Channel name must not start or end with whitespace".into(),
        ));
    }
    if name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(ChatError::InvalidInput(format!(
            "Channel name must be at most {} characters",
            MAX_CHANNEL_NAME_LEN
        )));
    }
    Ok(())
}

/// Stored values that don't decode are reported as storage failures.
pub(crate) fn parse_millis(ms: i64, what: &str, id: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ChatError::Storage(anyhow::anyhow!("corrupt {} '{}' on '{}'", what, ms, id)))
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("corrupt {} '{}': {}", what, raw, e)))
}

fn channel_from_row(row: ChannelRow) -> Result<Channel> {
    Ok(Channel {
        id: parse_uuid(&row.id, "channel id")?,
        created_at: parse_millis(row.created_at, "created_at", &row.id)?,
        name: row.name,
    })
}

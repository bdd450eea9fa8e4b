use crate::Database;
use crate::models::{ChannelInsert, ChannelRow, MessageRow, NewMessage, UserRow};
use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior};

impl Database {
    // -- Users --

    /// Inserts a user unless the email is already registered.
    /// Returns false when the email is taken.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        now: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let taken: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| row.get(0))
                .optional()?;
            if taken.is_some() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO users (id, email, name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, email, name, password_hash, now],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false when no such user exists.
    pub fn update_user_name(&self, id: &str, name: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?1 WHERE id = ?2",
                rusqlite::params![name, id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Channels --

    /// Insert a channel if no channel already carries `name`.
    ///
    /// The name lookup and the insert share one IMMEDIATE transaction, so two
    /// concurrent inserts of the same name cannot both succeed.
    pub fn insert_channel(&self, id: &str, name: &str, now: i64) -> Result<ChannelInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row("SELECT id FROM channels WHERE name = ?1", [name], |row| row.get(0))
                .optional()?;
            if existing.is_some() {
                return Ok(ChannelInsert::NameTaken);
            }

            tx.execute(
                "INSERT INTO channels (id, name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, now],
            )?;
            tx.commit()?;

            Ok(ChannelInsert::Created(ChannelRow {
                id: id.to_string(),
                name: name.to_string(),
                created_at: now,
            }))
        })
    }

    /// Insert every `(id, name)` seed, but only when the channel table is empty.
    /// Returns the rows inserted; empty when the table already had channels.
    pub fn seed_channels_if_empty(&self, seeds: &[(String, &str)], now: i64) -> Result<Vec<ChannelRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let any: bool = tx.query_row("SELECT EXISTS(SELECT 1 FROM channels)", [], |row| row.get(0))?;
            if any {
                return Ok(vec![]);
            }

            let mut created = Vec::with_capacity(seeds.len());
            for (id, name) in seeds {
                tx.execute(
                    "INSERT INTO channels (id, name, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, name, now],
                )?;
                created.push(ChannelRow {
                    id: id.clone(),
                    name: name.to_string(),
                    created_at: now,
                });
            }
            tx.commit()?;

            Ok(created)
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_at FROM channels WHERE id = ?1",
                    [id],
                    map_channel,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All channels in creation order.
    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at FROM channels ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message to an existing channel.
    ///
    /// Returns `None` (and writes nothing) if the channel does not exist.
    /// `seq` is one past the highest sequence in the store, and `created_at`
    /// is never earlier than the channel's latest message, so
    /// `(created_at, seq)` follows arrival order even if the wall clock steps back.
    pub fn append_message(&self, msg: &NewMessage<'_>) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let channel: Option<String> = tx
                .query_row("SELECT id FROM channels WHERE id = ?1", [msg.channel_id], |row| row.get(0))
                .optional()?;
            if channel.is_none() {
                return Ok(None);
            }

            let seq: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages", [], |row| {
                row.get(0)
            })?;
            let last: Option<i64> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE channel_id = ?1",
                [msg.channel_id],
                |row| row.get(0),
            )?;
            let created_at = last.map_or(msg.now, |last| last.max(msg.now));

            tx.execute(
                "INSERT INTO messages (id, seq, channel_id, author_id, author_label, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    seq,
                    msg.channel_id,
                    msg.author_id,
                    msg.author_label,
                    msg.body,
                    created_at
                ],
            )?;
            tx.commit()?;

            Ok(Some(MessageRow {
                id: msg.id.to_string(),
                seq,
                channel_id: msg.channel_id.to_string(),
                author_id: msg.author_id.to_string(),
                author_label: msg.author_label.to_string(),
                body: msg.body.to_string(),
                created_at,
            }))
        })
    }

    /// The most recent `limit` messages of a channel, oldest first.
    pub fn list_messages(&self, channel_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, channel_id, limit))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, name, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn query_messages(conn: &Connection, channel_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
    // Walk the (channel_id, created_at, seq) index backwards for the newest page
    let mut stmt = conn.prepare(
        "SELECT id, seq, channel_id, author_id, author_label, body, created_at
         FROM messages
         WHERE channel_id = ?1
         ORDER BY created_at DESC, seq DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![channel_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                seq: row.get(1)?,
                channel_id: row.get(2)?,
                author_id: row.get(3)?,
                author_label: row.get(4)?,
                body: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn message<'a>(id: &'a str, channel_id: &'a str, body: &'a str, now: i64) -> NewMessage<'a> {
        NewMessage {
            id,
            channel_id,
            author_id: "u1",
            author_label: "ada",
            body,
            now,
        }
    }

    #[test]
    fn channel_name_is_unique() {
        let db = db();
        assert!(matches!(db.insert_channel("c1", "general", 1).unwrap(), ChannelInsert::Created(_)));
        assert_eq!(db.insert_channel("c2", "general", 2).unwrap(), ChannelInsert::NameTaken);
        // Case-sensitive
        assert!(matches!(db.insert_channel("c3", "General", 3).unwrap(), ChannelInsert::Created(_)));
        assert_eq!(db.list_channels().unwrap().len(), 2);
    }

    #[test]
    fn seeding_only_happens_on_empty_table() {
        let db = db();
        let seeds = vec![("a".to_string(), "general"), ("b".to_string(), "random")];
        assert_eq!(db.seed_channels_if_empty(&seeds, 10).unwrap().len(), 2);

        let again = vec![("x".to_string(), "general"), ("y".to_string(), "random")];
        assert!(db.seed_channels_if_empty(&again, 20).unwrap().is_empty());

        let names: Vec<String> = db.list_channels().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["general", "random"]);
    }

    #[test]
    fn append_to_missing_channel_writes_nothing() {
        let db = db();
        assert!(db.append_message(&message("m1", "nope", "hi", 1)).unwrap().is_none());
        db.insert_channel("nope", "late", 2).unwrap();
        assert!(db.list_messages("nope", 50).unwrap().is_empty());
    }

    #[test]
    fn created_at_never_goes_backwards_within_channel() {
        let db = db();
        db.insert_channel("c", "general", 0).unwrap();
        let first = db.append_message(&message("m1", "c", "first", 100)).unwrap().unwrap();
        let second = db.append_message(&message("m2", "c", "second", 40)).unwrap().unwrap();

        assert_eq!(first.created_at, 100);
        assert_eq!(second.created_at, 100);
        assert!(second.seq > first.seq);

        let bodies: Vec<String> = db.list_messages("c", 50).unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[test]
    fn list_returns_newest_page_oldest_first() {
        let db = db();
        db.insert_channel("c", "general", 0).unwrap();
        db.insert_channel("d", "random", 0).unwrap();
        for i in 0..5 {
            let id = format!("m{}", i);
            let body = format!("{}", i);
            db.append_message(&message(&id, "c", &body, i)).unwrap();
        }
        db.append_message(&message("other", "d", "elsewhere", 3)).unwrap();

        let bodies: Vec<String> = db.list_messages("c", 3).unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["2", "3", "4"]);
    }

    #[test]
    fn user_email_is_unique() {
        let db = db();
        assert!(db.create_user("u1", "ada@example.com", Some("Ada"), "hash", 1).unwrap());
        assert!(!db.create_user("u2", "ada@example.com", None, "hash", 2).unwrap());

        assert!(db.update_user_name("u1", None).unwrap());
        let user = db.get_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, None);
        assert!(!db.update_user_name("missing", Some("x")).unwrap());
    }
}

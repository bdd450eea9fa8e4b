/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.
/// Timestamps are Unix milliseconds.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub password: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub seq: i64,
    pub channel_id: String,
    pub author_id: String,
    pub author_label: String,
    pub body: String,
    pub created_at: i64,
}

/// Outcome of a uniqueness-checked channel insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInsert {
    Created(ChannelRow),
    NameTaken,
}

/// Fields of a message supplied by the caller; `seq` and the final
/// `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub channel_id: &'a str,
    pub author_id: &'a str,
    pub author_label: &'a str,
    pub body: &'a str,
    pub now: i64,
}

//! Read-set and write-set bookkeeping shared by queries and mutations.

use std::collections::HashSet;

use uuid::Uuid;

/// A record or index range a query can read and a mutation can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// The channel table as a whole (membership and order).
    Directory,
    /// One channel record, including the fact that it does not exist.
    Channel(Uuid),
    /// The `(channel_id, created_at)` index range of one channel's messages.
    ChannelMessages(Uuid),
}

/// Everything a single query execution touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSet(HashSet<Dependency>);

impl ReadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dep: Dependency) {
        self.0.insert(dep);
    }

    pub fn contains(&self, dep: &Dependency) -> bool {
        self.0.contains(dep)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a committed mutation wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet(HashSet<Dependency>);

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dep: Dependency) {
        self.0.insert(dep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersects(&self, reads: &ReadSet) -> bool {
        self.0.iter().any(|dep| reads.contains(dep))
    }
}

impl FromIterator<Dependency> for WriteSet {
    fn from_iter<I: IntoIterator<Item = Dependency>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of a committed mutation together with the records it wrote.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub writes: WriteSet,
}

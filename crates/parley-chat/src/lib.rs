//! Channel-scoped messaging core: the channel directory, the message ledger,
//! and the live-query layer that re-delivers results when either changes.

pub mod directory;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod live;
pub mod reactive;
mod registry;
mod service;

pub use error::{ChatError, Result};
pub use identity::{Actor, Caller, JwtIdentity};
pub use registry::{LiveUpdate, SubscriptionId, UpdateSink, UpdateStream, update_channel};
pub use service::Chat;

use std::sync::Arc;

use parley_chat::{Chat, JwtIdentity};
use parley_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub chat: Arc<Chat>,
    pub identity: JwtIdentity,
}

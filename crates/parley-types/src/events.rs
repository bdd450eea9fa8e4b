use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ErrorBody;
use crate::models::{Channel, Message};

/// A read operation a client can hold open as a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveQuery {
    ListChannels,
    GetChannel {
        channel_id: Uuid,
    },
    ListMessages {
        channel_id: Uuid,
        #[serde(default)]
        limit: Option<u32>,
    },
}

/// Result of evaluating a [`LiveQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryValue {
    Channels(Vec<Channel>),
    Channel(Channel),
    Messages(Vec<Message>),
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, label: String },

    /// Current result of the subscription the client registered under `id`
    QueryResult { id: String, result: QueryValue },

    /// The subscription under `id` failed and has been torn down
    QueryFailed { id: String, error: ErrorBody },

    /// A command could not be processed
    Error { error: ErrorBody },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Open a live query. `id` is chosen by the client and echoed on every
    /// delivery; reusing an id replaces the previous subscription.
    Subscribe { id: String, query: LiveQuery },

    /// Close a live query.
    Unsubscribe { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_wire_shape() {
        let raw = r#"{"type":"Subscribe","data":{"id":"msgs","query":{"kind":"list_messages","channel_id":"00000000-0000-0000-0000-000000000007"}}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            GatewayCommand::Subscribe { id, query } => {
                assert_eq!(id, "msgs");
                assert_eq!(
                    query,
                    LiveQuery::ListMessages {
                        channel_id: Uuid::from_u128(7),
                        limit: None,
                    }
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn query_failed_event_wire_shape() {
        let event = GatewayEvent::QueryFailed {
            id: "c".into(),
            error: ErrorBody {
                kind: crate::api::ErrorKind::NotFound,
                message: "Channel not found".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "QueryFailed");
        assert_eq!(json["data"]["error"]["error"], "not_found");
    }
}

//! Per-connection gateway state: who the caller is and which live queries
//! they hold open. Independent of the WebSocket framing in `connection`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_chat::{Caller, Chat, ChatError, JwtIdentity, SubscriptionId, UpdateStream, update_channel};
use parley_types::api::{ErrorBody, ErrorKind};
use parley_types::events::{GatewayCommand, GatewayEvent, LiveQuery};

/// A subscription whose forwarder stopped after delivering its failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ended {
    pub client_id: String,
    pub subscription: SubscriptionId,
}

struct ClientSubscription {
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

pub struct Session {
    chat: Arc<Chat>,
    identity: JwtIdentity,
    caller: Caller,
    subscriptions: HashMap<String, ClientSubscription>,
    outbound: mpsc::Sender<GatewayEvent>,
    ended: mpsc::UnboundedSender<Ended>,
}

impl Session {
    /// Forwarders report failed subscriptions on `ended`; feed those back
    /// through [`Session::reap`].
    pub fn new(
        chat: Arc<Chat>,
        identity: JwtIdentity,
        outbound: mpsc::Sender<GatewayEvent>,
        ended: mpsc::UnboundedSender<Ended>,
    ) -> Self {
        Self {
            chat,
            identity,
            caller: Caller::Anonymous,
            subscriptions: HashMap::new(),
            outbound,
            ended,
        }
    }

    pub fn caller(&self) -> Caller {
        self.caller
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Identify { token } => {
                let caller = self.identity.resolve_caller(Some(&token));
                if caller == Caller::Anonymous {
                    warn!("Gateway client presented an invalid token");
                    self.send_error(ChatError::Unauthenticated.to_body()).await;
                    return;
                }
                self.identify_as(caller).await;
            }
            GatewayCommand::Subscribe { id, query } => self.subscribe(id, query).await,
            GatewayCommand::Unsubscribe { id } => self.unsubscribe(&id).await,
        }
    }

    /// Adopt an already-resolved caller and announce it with `Ready`.
    pub async fn identify_as(&mut self, caller: Caller) {
        let Ok(actor) = caller.require() else {
            return;
        };
        self.caller = caller;

        let chat = self.chat.clone();
        match blocking(move || chat.label_for(&caller)).await {
            Ok(label) => {
                info!("{} ({}) identified on gateway", label, actor.user_id);
                let _ = self
                    .outbound
                    .send(GatewayEvent::Ready {
                        user_id: actor.user_id,
                        label,
                    })
                    .await;
            }
            Err(e) => self.send_error(log_failure(&e)).await,
        }
    }

    async fn subscribe(&mut self, client_id: String, query: LiveQuery) {
        // Reusing an id replaces the old subscription
        self.unsubscribe(&client_id).await;

        let (tx, rx) = update_channel();
        let chat = self.chat.clone();
        let caller = self.caller;
        let result = blocking(move || chat.subscribe(&caller, query, tx)).await;

        match result {
            Ok(id) => {
                debug!("Client subscription '{}' registered as {}", client_id, id);
                let forwarder = tokio::spawn(forward_updates(
                    rx,
                    client_id.clone(),
                    self.outbound.clone(),
                    self.ended.clone(),
                ));
                self.subscriptions.insert(client_id, ClientSubscription { id, forwarder });
            }
            Err(e) => {
                let _ = self
                    .outbound
                    .send(GatewayEvent::QueryFailed {
                        id: client_id,
                        error: log_failure(&e),
                    })
                    .await;
            }
        }
    }

    async fn unsubscribe(&mut self, client_id: &str) {
        let Some(sub) = self.subscriptions.remove(client_id) else {
            return;
        };
        sub.forwarder.abort();

        let chat = self.chat.clone();
        let _ = tokio::task::spawn_blocking(move || chat.unsubscribe(sub.id)).await;
    }

    /// Forget a subscription the live layer already tore down. A stale report
    /// for an id the client has since reused is ignored.
    pub fn reap(&mut self, ended: Ended) {
        let current = self
            .subscriptions
            .get(&ended.client_id)
            .is_some_and(|sub| sub.id == ended.subscription);
        if current {
            self.subscriptions.remove(&ended.client_id);
            debug!("Client subscription '{}' ended after a failure", ended.client_id);
        }
    }

    /// Tear down every live query this connection holds.
    pub async fn close(&mut self) {
        let ids: Vec<String> = self.subscriptions.keys().cloned().collect();
        for id in ids {
            self.unsubscribe(&id).await;
        }
    }

    pub async fn send_error(&self, error: ErrorBody) {
        let _ = self.outbound.send(GatewayEvent::Error { error }).await;
    }
}

/// Relay one subscription's newest result to the connection until it fails
/// or closes. While the socket is backed up, intermediate results are skipped.
async fn forward_updates(
    mut rx: UpdateStream,
    client_id: String,
    outbound: mpsc::Sender<GatewayEvent>,
    ended: mpsc::UnboundedSender<Ended>,
) {
    while rx.changed().await.is_ok() {
        let Some(update) = rx.borrow_and_update().clone() else {
            continue;
        };

        match update.outcome {
            Ok(result) => {
                let event = GatewayEvent::QueryResult {
                    id: client_id.clone(),
                    result,
                };
                if outbound.send(event).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                let event = GatewayEvent::QueryFailed {
                    id: client_id.clone(),
                    error,
                };
                let _ = outbound.send(event).await;
                let _ = ended.send(Ended {
                    client_id,
                    subscription: update.subscription,
                });
                break;
            }
        }
    }
}

async fn blocking<F, T>(f: F) -> Result<T, ChatError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
}

fn log_failure(e: &ChatError) -> ErrorBody {
    let body = e.to_body();
    if body.kind == ErrorKind::Internal {
        error!("Gateway operation failed: {:#}", e);
    }
    body
}

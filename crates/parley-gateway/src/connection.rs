use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use parley_chat::{Caller, Chat, JwtIdentity};
use parley_types::api::{ErrorBody, ErrorKind};
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::session::Session;

/// Events queued for the socket. Live results wait behind this bound and
/// coalesce per subscription while it is full.
const OUTBOUND_BUFFER: usize = 64;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket connection until either side goes away.
///
/// `caller` is whatever the upgrade request authenticated as. An anonymous
/// connection can still send `Identify` later; until then every live query
/// it asks for fails with `unauthenticated`.
pub async fn handle_connection(socket: WebSocket, chat: Arc<Chat>, identity: JwtIdentity, caller: Caller) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<GatewayEvent>(OUTBOUND_BUFFER);
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();

    let mut session = Session::new(chat, identity, outbound_tx, ended_tx);
    if caller != Caller::Anonymous {
        session.identify_as(caller).await;
    } else {
        info!("Anonymous client connected to gateway");
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    // Outbound events + heartbeat -> client
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Commands are handled inline so they apply in the order the client sent them
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            Some(ended) = ended_rx.recv() => session.reap(ended),
            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                        Ok(cmd) => {
                            trace!("Gateway command from {:?}: {:?}", session.caller(), cmd);
                            session.handle(cmd).await;
                        }
                        Err(e) => {
                            let raw: String = text.as_str().chars().take(200).collect();
                            warn!("{:?} bad command: {} -- raw: {}", session.caller(), e, raw);
                            session
                                .send_error(ErrorBody {
                                    kind: ErrorKind::InvalidInput,
                                    message: format!("Malformed command: {}", e),
                                })
                                .await;
                        }
                    },
                    Message::Pong(_) => pong_received.store(true, Ordering::Release),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    session.close().await;
    info!("{:?} disconnected from gateway", session.caller());
}

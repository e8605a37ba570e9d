// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! WebSocket broadcast hub: admission, fan-out, heartbeats, and
//! connect-time snapshots.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use beacon_types::{ClientRequest, Envelope, Event};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::security;

/// Maximum concurrent accepted clients.
pub const MAX_CLIENTS: usize = 10;
/// Maximum inbound frames per client per rolling window.
const INBOUND_RATE_LIMIT: u32 = 100;
const INBOUND_RATE_WINDOW: Duration = Duration::from_secs(1);
/// Maximum size of a single inbound frame.
const MAX_INBOUND_FRAME: usize = 100 * 1024;
/// Invalid-JSON frames tolerated before the connection is dropped.
const MAX_INVALID_MESSAGES: u32 = 5;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_TOO_MANY_INVALID: u16 = 1003;
const CLOSE_RATE_LIMITED: u16 = 1008;
const CLOSE_TOO_LARGE: u16 = 1009;
const CLOSE_TOO_MANY_CLIENTS: u16 = 1013;

/// Serves one client's registered plan-content request and the
/// connect-time snapshot of current materialized state. Implemented by the
/// process wiring that owns the watchers and correlation state.
pub trait RequestDispatcher: Send + Sync {
    /// Events to replay to a newly connected client, in order (after the
    /// hub's own `connection_status`).
    fn connect_snapshot(&self) -> Vec<Event>;
    /// Answer a client request, if recognized.
    fn handle_request(&self, request: ClientRequest) -> Option<Event>;
}

struct ClientHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Accepts WebSocket clients, applies admission policy, and fans out
/// broadcast events assigned a monotonically increasing `seq`.
///
/// Every message bound for a client — the connect-time `connection_status`
/// and snapshot, broadcast events, and `plan_request` replies — is enqueued
/// onto that client's own channel, with `seq` assigned at the moment of
/// enqueue. A client's connection task does nothing but drain its channel
/// in order, so `seq` reflects true per-client delivery order regardless of
/// which kind of message produced it.
pub struct Hub {
    seq: AtomicU64,
    clients: Mutex<HashMap<u64, ClientHandle>>,
    next_client_id: AtomicU64,
    static_port: u16,
    server_version: &'static str,
}

impl Hub {
    pub fn new(static_port: u16) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            seq: AtomicU64::new(0),
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            static_port,
            server_version: crate::health::VERSION,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("hub mutex poisoned").len()
    }

    /// Assign `seq` and fan out to every registered client. Per-client send
    /// failures (a disconnected client whose task hasn't deregistered yet)
    /// never affect others.
    pub fn broadcast(&self, event: Event) {
        let envelope = Envelope {
            event,
            seq: self.next_seq(),
        };
        let clients = self.clients.lock().expect("hub mutex poisoned");
        for handle in clients.values() {
            let _ = handle.tx.send(envelope.clone());
        }
    }

    /// Assign `seq` and send `event` to exactly one client's channel — used
    /// for `plan_request` responses and the connect-time snapshot.
    pub fn send_to_client(&self, client_id: u64, event: Event) {
        let envelope = Envelope {
            event,
            seq: self.next_seq(),
        };
        let clients = self.clients.lock().expect("hub mutex poisoned");
        if let Some(handle) = clients.get(&client_id) {
            let _ = handle.tx.send(envelope);
        }
    }

    fn register(&self, id: u64, tx: mpsc::UnboundedSender<Envelope>) {
        self.clients
            .lock()
            .expect("hub mutex poisoned")
            .insert(id, ClientHandle { tx });
    }

    fn remove(&self, id: u64) {
        self.clients.lock().expect("hub mutex poisoned").remove(&id);
    }
}

/// Pre-upgrade admission check: run from the axum handler before calling
/// `ws.on_upgrade`. Forbidden origins and non-loopback originless peers are
/// rejected at handshake with 403, never reaching a WebSocket at all.
pub fn admit_handshake(origin: Option<&str>, peer: SocketAddr, hub: &Hub) -> bool {
    security::admit(origin, peer, hub.static_port)
}

/// Drive one accepted client connection until it closes or `shutdown`
/// fires. Capacity is checked as the very first action so the 11th client
/// is closed with 1013 before anything else is sent.
pub async fn handle_socket(
    socket: WebSocket,
    hub: std::sync::Arc<Hub>,
    dispatcher: std::sync::Arc<dyn RequestDispatcher>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if hub.client_count() >= MAX_CLIENTS {
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TOO_MANY_CLIENTS,
                reason: "too many connections".into(),
            })))
            .await;
        return;
    }

    let client_id = hub.next_client_id.fetch_add(1, Ordering::SeqCst);
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    hub.register(client_id, tx);

    // Enqueued through the same per-client channel as broadcasts and
    // plan_request replies, so connect_snapshot is interleaved correctly
    // with anything that arrives concurrently.
    hub.send_to_client(
        client_id,
        Event::ConnectionStatus {
            timestamp: chrono::Utc::now(),
            status: beacon_types::ConnStatus::Connected,
            server_version: hub.server_version.to_string(),
            client_count: hub.client_count(),
        },
    );
    for event in dispatcher.connect_snapshot() {
        hub.send_to_client(client_id, event);
    }

    let mut invalid_count: u32 = 0;
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;
    let mut is_alive = true;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_NORMAL,
                    reason: "Server shutting down".into(),
                }))).await;
                break;
            }
            _ = heartbeat.tick() => {
                if !is_alive {
                    tracing::debug!(client_id, "missed heartbeat; dropping client");
                    break;
                }
                is_alive = false;
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            Some(envelope) = rx.recv() => {
                if send_envelope(&mut ws_tx, &envelope).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(msg) = msg else { break };
                let msg = match msg {
                    Ok(m) => m,
                    Err(_) => break,
                };
                match msg {
                    Message::Pong(_) => is_alive = true,
                    Message::Close(_) => break,
                    Message::Text(text) => {
                        if text.len() > MAX_INBOUND_FRAME {
                            let _ = ws_tx.send(Message::Close(Some(CloseFrame {
                                code: CLOSE_TOO_LARGE,
                                reason: "Message too large".into(),
                            }))).await;
                            break;
                        }
                        let now = Instant::now();
                        if now.duration_since(window_start) >= INBOUND_RATE_WINDOW {
                            window_start = now;
                            window_count = 0;
                        }
                        window_count += 1;
                        if window_count > INBOUND_RATE_LIMIT {
                            let _ = ws_tx.send(Message::Close(Some(CloseFrame {
                                code: CLOSE_RATE_LIMITED,
                                reason: "Rate limit exceeded".into(),
                            }))).await;
                            break;
                        }
                        match serde_json::from_str::<ClientRequest>(&text) {
                            Ok(request) => {
                                if let Some(event) = dispatcher.handle_request(request) {
                                    hub.send_to_client(client_id, event);
                                }
                            }
                            Err(_) => {
                                invalid_count += 1;
                                tracing::debug!(client_id, invalid_count, "unrecognized inbound message");
                                if invalid_count > MAX_INVALID_MESSAGES {
                                    let _ = ws_tx.send(Message::Close(Some(CloseFrame {
                                        code: CLOSE_TOO_MANY_INVALID,
                                        reason: "Too many invalid messages".into(),
                                    }))).await;
                                    break;
                                }
                            }
                        }
                    }
                    Message::Binary(bin) if bin.len() > MAX_INBOUND_FRAME => {
                        let _ = ws_tx.send(Message::Close(Some(CloseFrame {
                            code: CLOSE_TOO_LARGE,
                            reason: "Message too large".into(),
                        }))).await;
                        break;
                    }
                    Message::Binary(_) | Message::Ping(_) => {}
                }
            }
        }
    }

    hub.remove(client_id);
    tracing::debug!(client_id, "client disconnected");
}

async fn send_envelope(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).expect("Envelope serialization cannot fail");
    ws_tx.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDispatcher;
    impl RequestDispatcher for NoopDispatcher {
        fn connect_snapshot(&self) -> Vec<Event> {
            Vec::new()
        }
        fn handle_request(&self, _request: ClientRequest) -> Option<Event> {
            None
        }
    }

    #[test]
    fn seq_is_monotonically_increasing() {
        let hub = Hub::new(3356);
        let a = hub.next_seq();
        let b = hub.next_seq();
        let c = hub.next_seq();
        assert!(a < b && b < c);
    }

    #[test]
    fn broadcast_assigns_increasing_seq_to_registered_client() {
        let hub = Hub::new(3356);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, tx);
        hub.broadcast(Event::SessionStop {
            timestamp: chrono::Utc::now(),
            session_id: "s1".into(),
        });
        hub.broadcast(Event::SessionStop {
            timestamp: chrono::Utc::now(),
            session_id: "s2".into(),
        });
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.seq < second.seq);
    }

    #[test]
    fn send_to_client_and_broadcast_share_one_ordered_channel() {
        let hub = Hub::new(3356);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, tx);
        hub.send_to_client(
            1,
            Event::SessionStop {
                timestamp: chrono::Utc::now(),
                session_id: "s1".into(),
            },
        );
        hub.broadcast(Event::SessionStop {
            timestamp: chrono::Utc::now(),
            session_id: "s2".into(),
        });
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.seq < second.seq);
    }

    #[test]
    fn client_count_reflects_registration() {
        let hub = Hub::new(3356);
        assert_eq!(hub.client_count(), 0);
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register(1, tx);
        assert_eq!(hub.client_count(), 1);
        hub.remove(1);
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn admit_handshake_rejects_non_loopback_originless_peer() {
        let hub = Hub::new(3356);
        let peer: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        assert!(!admit_handshake(None, peer, &hub));
    }

    #[allow(dead_code)]
    fn _dispatcher_is_object_safe(_d: &dyn RequestDispatcher) {}

    #[test]
    fn noop_dispatcher_compiles_as_trait_object() {
        let d: std::sync::Arc<dyn RequestDispatcher> = std::sync::Arc::new(NoopDispatcher);
        assert!(d.connect_snapshot().is_empty());
    }
}

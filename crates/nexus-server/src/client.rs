use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

use nexus_core::ConnectionId;

use crate::orchestrator::ConversationOrchestrator;

/// Frames read from one socket but not yet handed to the pipeline.
const INBOUND_QUEUE: usize = 32;

/// One live client channel. Owned by the registry; the socket tasks only hold
/// the receiving end of `tx` and a clone of `closed`.
pub struct ConnectionNode {
    pub id: ConnectionId,
    /// The `{client_id}` path segment. A label for logs, nothing more.
    pub client_token: String,
    tx: mpsc::Sender<String>,
    /// Cancelled when the node leaves the registry, for any reason.
    closed: CancellationToken,
    last_pong: AtomicU64,
}

impl ConnectionNode {
    fn new(id: ConnectionId, client_token: String, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            client_token,
            tx,
            closed: CancellationToken::new(),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Every live connection, keyed by a per-socket id.
pub struct ConnectionRegistry {
    nodes: DashMap<ConnectionId, Arc<ConnectionNode>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            nodes: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            client_timeout,
        }
    }

    /// Add a node. Tokens are not deduplicated: the same token twice yields
    /// two independent connections.
    pub fn register(&self, client_token: &str) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let node = ConnectionNode::new(id.clone(), client_token.to_string(), tx);
        self.nodes.insert(id.clone(), Arc::new(node));
        (id, rx)
    }

    /// Remove a node and close its socket tasks. Returns false, and does
    /// nothing else, when it is already gone.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        match self.nodes.remove(id) {
            Some((_, node)) => {
                node.closed.cancel();
                true
            }
            None => false,
        }
    }

    /// Token cancelled once `id` is unregistered. `None` if it already is.
    pub fn closed_token(&self, id: &ConnectionId) -> Option<CancellationToken> {
        self.nodes.get(id).map(|node| node.closed.clone())
    }

    /// Queue `message` for every registered node.
    ///
    /// Works on a snapshot of the node set, so nodes added or removed while
    /// this runs are neither double-served nor a problem. A full or closed
    /// queue only costs that node the message.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let snapshot: Vec<Arc<ConnectionNode>> =
            self.nodes.iter().map(|entry| Arc::clone(entry.value())).collect();

        let mut report = BroadcastReport::default();
        for node in snapshot {
            match node.tx.try_send(message.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.failed += 1;
                    warn!(
                        connection_id = %node.id,
                        client_id = %node.client_token,
                        msg_len = message.len(),
                        "send queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.failed += 1;
                    debug!(connection_id = %node.id, "connection closed before delivery");
                }
            }
        }
        report
    }

    pub fn record_pong(&self, id: &ConnectionId) {
        if let Some(node) = self.nodes.get(id) {
            node.record_pong();
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Remove nodes that have not answered a ping within the client timeout.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .nodes
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                info!(connection_id = %id, "removed silent connection");
            }
        }
        removed
    }

    #[cfg(test)]
    fn expire(&self, id: &ConnectionId) {
        if let Some(node) = self.nodes.get(id) {
            node.last_pong.store(0, Ordering::Relaxed);
        }
    }
}

/// Drive one socket until either side goes away or the node is unregistered.
///
/// Three tasks share the connection. The writer forwards queued messages and
/// pings on `heartbeat`. The reader queues text frames and records pongs.
/// The pipeline task hands queued frames to the orchestrator one at a time,
/// so a connection's messages are processed in arrival order.
///
/// The node is unregistered as soon as the reader or writer stops. A
/// pipeline already running at that point still completes and broadcasts to
/// the remaining nodes; frames queued behind it are dropped.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    orchestrator: Arc<ConversationOrchestrator>,
    heartbeat: Duration,
) {
    let Some(closed) = registry.closed_token(&connection_id) else {
        debug!("connection removed before its socket tasks started");
        return;
    };
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE);

    let writer_closed = closed.clone();
    let mut writer = tokio::spawn(
        async move {
            let mut ping_interval = tokio::time::interval(heartbeat);
            ping_interval.tick().await;

            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                    msg = rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_interval.tick() => {
                        if ws_tx.send(WsMessage::Ping(axum::body::Bytes::new())).await.is_err() {
                            break;
                        }
                        trace!("sent ping");
                    }
                }
            }
        }
        .in_current_span(),
    );

    let reader_id = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader_closed = closed.clone();
    let mut reader = tokio::spawn(
        async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    frame = ws_rx.next() => frame,
                };
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        tokio::select! {
                            _ = reader_closed.cancelled() => break,
                            sent = inbound_tx.send(text.as_str().to_owned()) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => reader_registry.record_pong(&reader_id),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    );

    let pipeline_closed = closed.clone();
    tokio::spawn(
        async move {
            loop {
                let text = tokio::select! {
                    biased;
                    _ = pipeline_closed.cancelled() => break,
                    text = inbound_rx.recv() => text,
                };
                let Some(text) = text else { break };
                orchestrator.handle(&text).await;
            }
        }
        .in_current_span(),
    );

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        _ = closed.cancelled() => {
            // Let the writer send its close frame before tearing down.
            let _ = tokio::time::timeout(Duration::from_secs(1), &mut writer).await;
            writer.abort();
            reader.abort();
        }
    }

    if registry.unregister(&connection_id) {
        info!("client disconnected");
    } else {
        info!("connection closed after removal");
    }
}

/// Periodically unregister connections that stopped answering pings.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.cleanup_dead_connections();
                if removed > 0 {
                    info!(removed, "dead connection cleanup");
                }
            }
        }
        .instrument(tracing::info_span!("connection_cleanup")),
    )
}

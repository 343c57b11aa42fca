//! Client registry and broadcast fan-out.
//!
//! The registry is the only state shared between the HTTP ingress domain and
//! the WebSocket domain. Connections are keyed by a random id; each entry holds
//! the bounded channel feeding that client's socket writer task.
//!
//! A broadcast works from a point-in-time snapshot of the membership: senders
//! are cloned under the read lock, delivery runs against the snapshot with no
//! lock held, and failed members are reconciled out under the write lock after
//! the pass. Connections registered mid-pass are untouched and pick up the next
//! broadcast; connections removed mid-pass fail their delivery harmlessly.

use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BroadcastConfig;

/// Handle returned to the WebSocket task that owns one client.
pub struct ClientHandle {
    pub id: Uuid,
    /// Outbound message stream for this client; the socket writer task drains it.
    pub outbound: mpsc::Receiver<String>,
}

/// The set of currently connected broadcast subscribers.
///
/// Lives for the process lifetime; initialized empty, never torn down.
pub struct ClientRegistry {
    clients: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
    config: BroadcastConfig,
}

impl ClientRegistry {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Admit a new subscriber. No cap on concurrent clients.
    pub async fn register(&self) -> ClientHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let count = {
            let mut clients = self.clients.write().await;
            clients.insert(id, tx);
            clients.len()
        };

        counter!("lbmon_ws_connections_total").increment(1);
        gauge!("lbmon_ws_connections_active").set(count as f64);
        info!("Client {} registered ({} connected)", id, count);

        ClientHandle { id, outbound: rx }
    }

    /// Remove a subscriber. Idempotent: removing an absent id is a no-op.
    pub async fn unregister(&self, id: Uuid) {
        let (removed, count) = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };

        if removed {
            gauge!("lbmon_ws_connections_active").set(count as f64);
            info!("Client {} unregistered ({} connected)", id, count);
        }
    }

    /// Number of currently registered clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Deliver `payload` to every client registered at the start of the pass.
    ///
    /// Deliveries run concurrently and independently; each is bounded by the
    /// configured send timeout. A failed delivery drops that client from the
    /// registry and never aborts the rest of the pass or surfaces to the
    /// caller. Returns the number of successful deliveries.
    pub async fn broadcast(&self, payload: &str) -> usize {
        let snapshot: Vec<(Uuid, mpsc::Sender<String>)> = {
            let clients = self.clients.read().await;
            clients.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        if snapshot.is_empty() {
            return 0;
        }

        counter!("lbmon_broadcasts_total").increment(1);
        debug!("Broadcasting to {} clients: {}", snapshot.len(), payload);

        let send_timeout = self.config.send_timeout;
        let attempts = snapshot.into_iter().map(|(id, tx)| {
            let message = payload.to_owned();
            async move {
                match timeout(send_timeout, tx.send(message)).await {
                    Ok(Ok(())) => Ok(id),
                    // Receiver dropped or client too slow to drain its channel.
                    Ok(Err(_)) | Err(_) => Err(id),
                }
            }
        });

        let results = futures_util::future::join_all(attempts).await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(_) => delivered += 1,
                Err(id) => failed.push(id),
            }
        }

        if !failed.is_empty() {
            counter!("lbmon_broadcast_failures_total").increment(failed.len() as u64);
            let mut clients = self.clients.write().await;
            for id in failed {
                if clients.remove(&id).is_some() {
                    debug!("Client {} dropped after failed delivery", id);
                }
            }
            gauge!("lbmon_ws_connections_active").set(clients.len() as f64);
        }

        delivered
    }
}

/// Registry shared across the HTTP and WebSocket servers.
pub type SharedRegistry = Arc<ClientRegistry>;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// The push-channel registry the message pipeline delivers through.
///
/// Delivery is best-effort relative to persistence: a `false`/zero result
/// means nobody was connected to receive the event live, which is never an
/// error — history remains retrievable through the conversation query.
pub trait DeliveryRegistry: Send + Sync {
    /// Register a live session for `user_id`. Returns the connection id and
    /// the receiving end of the session's targeted channel.
    fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>);

    /// Unregister a live session, but only if `conn_id` still owns it.
    fn unregister(&self, user_id: Uuid, conn_id: Uuid);

    /// Fan an event out to every connected session. Returns the number of
    /// live subscribers it reached.
    fn broadcast(&self, event: GatewayEvent) -> usize;

    /// Deliver an event to the live session of one user. Returns `false`
    /// when that user has no session connected.
    fn send_to(&self, user_id: Uuid, event: GatewayEvent) -> bool;
}

/// Manages all connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for global events — every connected client's send
    /// loop holds a receiver, so fan-out never iterates a mutable set.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the global event stream. Connection send loops use this,
    /// and so can any operator task auditing deliveries out-of-band.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Mark a user online and announce it.
    pub fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .expect("online_users lock poisoned")
            .insert(user_id, username.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: true,
        });
    }

    /// Mark a user offline. Only cleans up if `conn_id` still owns the
    /// session — a newer connection for the same user must not be evicted
    /// by the old one's teardown.
    pub fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().expect("user_channels lock poisoned");
            channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id)
        };

        if !is_current {
            return;
        }

        let username = self
            .inner
            .online_users
            .write()
            .expect("online_users lock poisoned")
            .remove(&user_id)
            .unwrap_or_default();

        self.unregister(user_id, conn_id);

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: false,
        });
    }

    /// Current presence snapshot.
    pub fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .expect("online_users lock poisoned")
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryRegistry for Dispatcher {
    fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .expect("user_channels lock poisoned")
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().expect("user_channels lock poisoned");
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    fn broadcast(&self, event: GatewayEvent) -> usize {
        // Err means zero receivers, which is fine: nobody is connected.
        self.inner.broadcast_tx.send(event).unwrap_or(0)
    }

    fn send_to(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().expect("user_channels lock poisoned");
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => {
                debug!("no live session for {}, skipping targeted push", user_id);
                false
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

pub const ITEM_CREATED: &str = "item-created";
pub const ITEM_DELETED: &str = "item-deleted";
pub const ITEMS_REORDERED: &str = "items-reordered";

/// Outbound queue depth per client. A consumer that falls this far behind is
/// treated as stalled and dropped.
const CLIENT_QUEUE_DEPTH: usize = 64;

/// One named event with its payload already serialized; shared across all
/// client queues so a broadcast serializes exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct EventFrame {
    pub name: String,
    pub data: String,
}

pub type EventSink = mpsc::Sender<Arc<EventFrame>>;

/// Fan-out broadcaster for server-side mutations. Constructed once at startup
/// and handed to whoever needs to publish; there is no global instance.
///
/// Each registered client owns an independent bounded queue, so one stalled
/// connection never delays delivery to the rest or the mutation that
/// triggered the broadcast. Failed delivery unregisters the client; errors
/// never reach the caller.
#[derive(Default)]
pub struct EventHub {
    clients: Mutex<HashMap<String, EventSink>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and hand back the receiving end of its queue.
    pub fn subscribe(&self, client_id: &str) -> mpsc::Receiver<Arc<EventFrame>> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        self.register(client_id, tx);
        rx
    }

    pub fn register(&self, client_id: &str, sink: EventSink) {
        self.lock_clients().insert(client_id.to_string(), sink);
        tracing::debug!("event client {} registered", client_id);
    }

    /// Idempotent; dropping the sink closes the client's queue.
    pub fn unregister(&self, client_id: &str) {
        if self.lock_clients().remove(client_id).is_some() {
            tracing::debug!("event client {} unregistered", client_id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Serialize once, deliver to every registered client. Clients whose
    /// queue is closed or full are unregistered on the spot.
    pub fn broadcast(&self, name: &str, payload: serde_json::Value) {
        let frame = Arc::new(EventFrame {
            name: name.to_string(),
            data: payload.to_string(),
        });

        let mut clients = self.lock_clients();
        let mut dead: Vec<String> = Vec::new();
        for (id, sink) in clients.iter() {
            if sink.try_send(frame.clone()).is_err() {
                dead.push(id.clone());
            }
        }
        for id in dead {
            clients.remove(&id);
            tracing::debug!("event client {} dropped during broadcast", id);
        }
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<String, EventSink>> {
        // A panic while holding the lock leaves the map intact; keep going
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

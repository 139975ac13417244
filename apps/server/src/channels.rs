use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use shared_proto::events::ServerEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type Tx = mpsc::UnboundedSender<Message>;
pub type Rx = mpsc::UnboundedReceiver<Message>;

/// A live channel's handle: its id within the registry and the queue it drains.
pub struct ChannelHandle {
    pub user_id: Uuid,
    pub conn_id: Uuid,
    pub rx: Rx,
}

/// Identity id -> live channels of that identity (one per device/tab).
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<DashMap<Uuid, HashMap<Uuid, Tx>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid) -> ChannelHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        self.channels.entry(user_id).or_default().insert(conn_id, tx);

        tracing::debug!(component = "channels", %user_id, %conn_id, "channel registered");
        ChannelHandle {
            user_id,
            conn_id,
            rx,
        }
    }

    pub fn deregister(&self, user_id: Uuid, conn_id: Uuid) {
        let now_empty = match self.channels.get_mut(&user_id) {
            Some(mut conns) => {
                conns.remove(&conn_id);
                conns.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.channels.remove_if(&user_id, |_, conns| conns.is_empty());
        }
        tracing::debug!(component = "channels", %user_id, %conn_id, "channel deregistered");
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.channels
            .get(&user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    pub fn channel_count(&self, user_id: Uuid) -> usize {
        self.channels.get(&user_id).map(|conns| conns.len()).unwrap_or(0)
    }

    /// Best-effort push of `event` to every live channel of each target.
    /// Targets with no channel are skipped; nothing is queued for later.
    /// Returns the number of channels the event was handed to.
    pub fn emit<I>(&self, event: &ServerEvent, targets: I) -> usize
    where
        I: IntoIterator<Item = Uuid>,
    {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(component = "fanout", event = event.name(), error = %e, "failed to encode event");
                return 0;
            }
        };

        let mut seen = HashSet::new();
        let mut delivered = 0;
        for user_id in targets {
            if !seen.insert(user_id) {
                continue;
            }
            let Some(conns) = self.channels.get(&user_id) else {
                continue;
            };
            for tx in conns.values() {
                if tx.send(Message::Text(text.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }

        tracing::debug!(
            component = "fanout",
            event = event.name(),
            targets = seen.len(),
            delivered,
            "event dispatched"
        );
        delivered
    }
}

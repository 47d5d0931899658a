//! Best-effort live audio fan-out.
//!
//! The pipeline pushes every filtered chunk here before it touches any
//! recording state. Each client owns a small bounded queue; a send that would
//! block (queue full) or fails (receiver gone) deregisters that client and
//! nothing else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Maximum simultaneous live clients.
pub const MAX_LIVE_CLIENTS: usize = 4;

/// Queue depth per client, in chunks.
pub const CLIENT_QUEUE_CHUNKS: usize = 32;

/// One broadcast payload: little-endian 16-bit PCM.
pub type LivePayload = Arc<Vec<u8>>;

struct LiveClient {
    id: u64,
    tx: mpsc::Sender<LivePayload>,
}

/// Receiving half handed to a registered client.
pub struct LiveSubscription {
    pub id: u64,
    pub rx: mpsc::Receiver<LivePayload>,
}

pub struct LiveBroadcaster {
    clients: Mutex<Vec<LiveClient>>,
    max_clients: usize,
    next_id: AtomicU64,
}

impl Default for LiveBroadcaster {
    fn default() -> Self {
        Self::new(MAX_LIVE_CLIENTS)
    }
}

impl LiveBroadcaster {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Mutex::new(Vec::with_capacity(max_clients)),
            max_clients,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a client, or `None` if every slot is taken.
    pub fn subscribe(&self, queue_chunks: usize) -> Option<LiveSubscription> {
        let mut clients = self.clients.lock();
        if clients.len() >= self.max_clients {
            warn!("Live client rejected: {} slots in use", clients.len());
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(queue_chunks.max(1));
        clients.push(LiveClient { id, tx });
        info!("Live client {} registered ({} active)", id, clients.len());

        Some(LiveSubscription { id, rx })
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut clients = self.clients.lock();
        clients.retain(|c| c.id != id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Push one chunk to every client without blocking. Returns the number of
    /// clients that accepted it.
    pub fn broadcast(&self, samples: &[i16]) -> usize {
        let mut clients = self.clients.lock();
        if clients.is_empty() || samples.is_empty() {
            return 0;
        }

        let payload: LivePayload =
            Arc::new(samples.iter().flat_map(|s| s.to_le_bytes()).collect());

        let mut delivered = 0;
        clients.retain(|client| match client.tx.try_send(Arc::clone(&payload)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Live client {} fell behind; dropping it", client.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Live client {} disconnected", client.id);
                false
            }
        });

        delivered
    }
}

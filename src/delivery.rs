//! Peer set and outbound fan-out
//!
//! Each connected peer is represented by the sending half of a short bounded
//! queue drained by that peer's socket writer. A peer whose queue is full or
//! whose writer has gone away is skipped; frames are never held back for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::protocol::Outbound;

pub type PeerId = u64;

/// Frames a peer may have in flight before new ones are dropped for it
pub const PEER_QUEUE_DEPTH: usize = 4;

/// A frame queued for one peer's socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Default)]
pub struct DeliveryChannel {
    peers: RwLock<HashMap<PeerId, mpsc::Sender<Outgoing>>>,
    next_id: AtomicU64,
}

impl DeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. The receiver must be drained by the peer's writer.
    pub fn on_connect(&self) -> (PeerId, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(PEER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.peers.write().insert(id, tx);
        info!(peer = id, "peer connected");
        (id, rx)
    }

    pub fn on_disconnect(&self, peer: PeerId) {
        if self.peers.write().remove(&peer).is_some() {
            info!(peer, "peer disconnected");
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Send `bytes` to every writable peer. Returns how many accepted the frame.
    pub fn broadcast(&self, bytes: &[u8]) -> usize {
        let targets: Vec<(PeerId, mpsc::Sender<Outgoing>)> = self
            .peers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.is_closed() {
                debug!(peer = id, "peer closing, skipped");
                continue;
            }
            match try_deliver(id, &tx, Outgoing::Binary(bytes.to_vec())) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(peer = id, error = %e, "broadcast skipped"),
            }
        }
        info!(bytes = bytes.len(), delivered, "archive broadcast");
        delivered
    }

    /// Send a status message to one peer
    pub fn reply(&self, peer: PeerId, message: &Outbound) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(message)?;
        let tx = self
            .peers
            .read()
            .get(&peer)
            .cloned()
            .ok_or(DeliveryError::UnknownPeer(peer))?;
        try_deliver(peer, &tx, Outgoing::Text(text))
    }
}

fn try_deliver(
    peer: PeerId,
    tx: &mpsc::Sender<Outgoing>,
    frame: Outgoing,
) -> Result<(), DeliveryError> {
    tx.try_send(frame).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Busy(peer),
        TrySendError::Closed(_) => DeliveryError::Closed(peer),
    })
}

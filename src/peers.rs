// src/peers.rs - Latest pose per remote peer
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::identity::PeerIdentity;
use crate::pose::PosePayload;
use crate::wire::WireMessage;

/// Point-in-time copy of the table in first-appearance order.
pub type PeerSnapshot = Vec<(PeerIdentity, PosePayload)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Updated,
    /// Our own broadcast echoed back by the transport.
    LocalEcho,
    Malformed,
}

struct Slot {
    identity: PeerIdentity,
    payload: PosePayload,
    last_seen: Instant,
}

#[derive(Default)]
struct TableInner {
    slots: Vec<Slot>,
    index: HashMap<PeerIdentity, usize>,
}

impl TableInner {
    fn reindex(&mut self) {
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.identity.clone(), i))
            .collect();
    }
}

/// Mapping from peer identity to the most recently *arrived* payload.
///
/// Writes come only from the subscription handler and reads only from the
/// render tick, so a handle is cloned into each side. Updates overwrite
/// unconditionally; there is no ordering or staleness check between
/// messages from the same peer.
#[derive(Clone, Default)]
pub struct PeerStateTable {
    inner: Arc<Mutex<TableInner>>,
}

impl PeerStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, identity: PeerIdentity, payload: PosePayload) {
        self.update_at(identity, payload, Instant::now());
    }

    pub fn update_at(&self, identity: PeerIdentity, payload: PosePayload, now: Instant) {
        let mut inner = self.lock();
        let existing = inner.index.get(&identity).copied();
        match existing {
            Some(i) => {
                let slot = &mut inner.slots[i];
                slot.payload = payload;
                slot.last_seen = now;
            }
            None => {
                info!(peer = %identity, "peer joined");
                let i = inner.slots.len();
                inner.index.insert(identity.clone(), i);
                inner.slots.push(Slot {
                    identity,
                    payload,
                    last_seen: now,
                });
            }
        }
    }

    /// Subscription handler body: drop our own echo, validate, then overwrite.
    pub fn ingest(&self, local: &PeerIdentity, message: WireMessage) -> IngestOutcome {
        if message.user == *local {
            return IngestOutcome::LocalEcho;
        }

        let user = message.user.clone();
        match message.into_payload() {
            Ok(payload) => {
                self.update(user, payload);
                IngestOutcome::Updated
            }
            Err(e) => {
                warn!(peer = %user, error = %e, "dropping malformed pose message");
                IngestOutcome::Malformed
            }
        }
    }

    pub fn snapshot_all(&self) -> PeerSnapshot {
        self.lock()
            .slots
            .iter()
            .map(|slot| (slot.identity.clone(), slot.payload.clone()))
            .collect()
    }

    pub fn get(&self, identity: &PeerIdentity) -> Option<PosePayload> {
        let inner = self.lock();
        let &i = inner.index.get(identity)?;
        Some(inner.slots[i].payload.clone())
    }

    pub fn remove(&self, identity: &PeerIdentity) -> Option<PosePayload> {
        let mut inner = self.lock();
        let i = inner.index.remove(identity)?;
        let slot = inner.slots.remove(i);
        inner.reindex();
        info!(peer = %identity, "peer removed");
        Some(slot.payload)
    }

    /// Drops every peer not heard from within `ttl` of `now`.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> Vec<PeerIdentity> {
        let mut inner = self.lock();
        let before = inner.slots.len();

        let mut evicted = Vec::new();
        inner.slots.retain(|slot| {
            let fresh = now.saturating_duration_since(slot.last_seen) <= ttl;
            if !fresh {
                evicted.push(slot.identity.clone());
            }
            fresh
        });

        if inner.slots.len() != before {
            inner.reindex();
            debug!(evicted = evicted.len(), remaining = inner.slots.len(), "evicted stale peers");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Single-flight coordination for cold-store fetches.
//!
//! For any cache key, at most one warehouse fetch is active process-wide.
//! The first caller to join becomes the leader and receives a completion
//! handle; everyone else subscribes to the same broadcast channel and
//! observes the identical outcome — result or error — without re-fetching.
//!
//! The flight is a shared resource, not owned by any caller: the leader is
//! expected to drive the fetch from a spawned task, so an abandoned request
//! never cancels a fetch other callers are joined to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::cache::entry::CacheEntry;
use crate::query::CacheKey;
use crate::store::warehouse::ColdStoreError;

/// What a flight resolves to. `Arc`d on both sides so every joined caller
/// shares one payload and one error.
pub type FlightOutcome = Result<Arc<CacheEntry>, Arc<ColdStoreError>>;

type FlightMap = Arc<Mutex<HashMap<CacheKey, broadcast::Sender<FlightOutcome>>>>;

/// Result of joining a flight.
pub enum Flight {
    /// No flight existed; the caller must run the fetch and complete the
    /// handle.
    Leader(FlightLeader),
    /// A flight is in progress; await the receiver.
    Follower(broadcast::Receiver<FlightOutcome>),
}

/// Completion handle held by the flight leader.
///
/// Dropping it without calling [`complete`](FlightLeader::complete) closes
/// the channel; waiters observe the closure and surface it as an aborted
/// fetch rather than silently re-fetching.
pub struct FlightLeader {
    key: CacheKey,
    map: FlightMap,
    tx: broadcast::Sender<FlightOutcome>,
    completed: bool,
}

impl FlightLeader {
    /// Subscribe to this flight's outcome. The leader itself awaits the
    /// outcome this way after handing the fetch to a task.
    pub fn subscribe(&self) -> broadcast::Receiver<FlightOutcome> {
        self.tx.subscribe()
    }

    /// Resolve the flight: unregister the key, then publish the outcome to
    /// every subscriber. Unregistering first means a caller arriving after
    /// completion starts a fresh flight instead of waiting on a dead one.
    pub fn complete(mut self, outcome: FlightOutcome) {
        self.completed = true;
        self.map.lock().unwrap().remove(&self.key);
        // No receivers left is fine; the outcome also lives in the cache.
        let _ = self.tx.send(outcome);
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if !self.completed {
            self.map.lock().unwrap().remove(&self.key);
            warn!(key = %self.key, "Flight leader dropped without completing");
        }
    }
}

/// The per-key in-flight fetch registry.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: FlightMap,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, creating it if none exists.
    pub fn join(&self, key: CacheKey) -> Flight {
        let mut map = self.inflight.lock().unwrap();
        if let Some(tx) = map.get(&key) {
            return Flight::Follower(tx.subscribe());
        }
        let (tx, _) = broadcast::channel(1);
        map.insert(key, tx.clone());
        Flight::Leader(FlightLeader {
            key,
            map: self.inflight.clone(),
            tx,
            completed: false,
        })
    }

    /// Number of flights currently in progress.
    pub fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PeerQueueError {
    #[error("no live peer available")]
    Empty,
    #[error("actor type mismatch: queue tracks {expected}, got {got}")]
    ActorTypeMismatch { expected: String, got: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Live,
    Dead,
}

/// A required actor definition: what the leader wants running, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorStart {
    pub actor_type: String,
    pub name: String,
    pub target_peer: String,
    pub config: Vec<u8>,
}

#[derive(Debug, Clone)]
struct PeerInfo {
    name: String,
    state: PeerState,
    optimistic_state: PeerState,
    registered: HashSet<String>,
    optimistic_registered: HashMap<String, DateTime<Utc>>,
}

impl PeerInfo {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PeerState::Dead,
            optimistic_state: PeerState::Dead,
            registered: HashSet::new(),
            optimistic_registered: HashMap::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.state == PeerState::Live && self.optimistic_state == PeerState::Live
    }

    fn assigned_count(&self) -> usize {
        self.registered.len() + self.optimistic_registered.len()
    }
}

/// Plan produced by `relocate`: advisory only, the caller reassigns by
/// unregistering and re-placing via `min_assigned`.
#[derive(Debug, Clone)]
pub struct RelocationPlan {
    pub actor_type: String,
    pub peers: Vec<String>,
    pub count: HashMap<String, usize>,
    pub burden: HashMap<String, usize>,
    pub relocations: Vec<String>,
}

#[derive(Debug, Default)]
struct PeerQueueState {
    peers: HashMap<String, PeerInfo>,
    required: HashMap<String, ActorStart>,
    // actor -> peer it's really registered under.
    registered: HashMap<String, String>,
    // actor -> (peer, optimistic registration time).
    optimistic_registered: HashMap<String, (String, DateTime<Utc>)>,
    actor_type: Option<String>,
}

impl PeerQueueState {
    fn peer_mut(&mut self, name: &str) -> &mut PeerInfo {
        self.peers
            .entry(name.to_string())
            .or_insert_with(|| PeerInfo::new(name))
    }
}

/// Tracks cluster membership and actor placement: which peers are alive,
/// which actors are required, and where they are (really or optimistically)
/// registered. All public methods hold a single mutex.
#[derive(Default)]
pub struct PeerQueue {
    inner: Mutex<PeerQueueState>,
}

impl PeerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self, peer: &str) {
        let mut s = self.inner.lock().unwrap();
        let p = s.peer_mut(peer);
        p.state = PeerState::Live;
        p.optimistic_state = PeerState::Live;
    }

    pub fn dead(&self, peer: &str) {
        let mut s = self.inner.lock().unwrap();
        let p = s.peer_mut(peer);
        p.state = PeerState::Dead;
        p.optimistic_state = PeerState::Dead;
    }

    pub fn set_required(&self, def: ActorStart) -> Result<(), PeerQueueError> {
        let mut s = self.inner.lock().unwrap();
        match &s.actor_type {
            Some(t) if *t != def.actor_type => {
                return Err(PeerQueueError::ActorTypeMismatch {
                    expected: t.clone(),
                    got: def.actor_type,
                });
            }
            Some(_) => {}
            None => s.actor_type = Some(def.actor_type.clone()),
        }
        s.required.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn unset_required(&self, name: &str) {
        let mut s = self.inner.lock().unwrap();
        s.required.remove(name);
        if s.required.is_empty() {
            s.actor_type = None;
        }
    }

    /// Required actors absent from the *real* registered set. Optimistic
    /// entries do not satisfy a requirement.
    pub fn missing(&self) -> Vec<ActorStart> {
        let s = self.inner.lock().unwrap();
        s.required
            .values()
            .filter(|def| !s.registered.contains_key(&def.name))
            .cloned()
            .collect()
    }

    pub fn register(&self, actor: &str, peer: &str) {
        let mut s = self.inner.lock().unwrap();
        if let Some(prior_peer) = s.registered.get(actor).cloned() {
            if prior_peer != peer {
                if let Some(p) = s.peers.get_mut(&prior_peer) {
                    p.registered.remove(actor);
                }
            }
        }
        s.optimistic_registered.remove(actor);
        if let Some(p) = s.peers.get_mut(peer) {
            p.optimistic_registered.remove(actor);
        }
        s.registered.insert(actor.to_string(), peer.to_string());
        s.peer_mut(peer).registered.insert(actor.to_string());
    }

    pub fn unregister(&self, actor: &str) {
        let mut s = self.inner.lock().unwrap();
        if let Some(peer) = s.registered.remove(actor) {
            if let Some(p) = s.peers.get_mut(&peer) {
                p.registered.remove(actor);
            }
        }
        if let Some((peer, _)) = s.optimistic_registered.remove(actor) {
            if let Some(p) = s.peers.get_mut(&peer) {
                p.optimistic_registered.remove(actor);
            }
        }
    }

    pub fn optimistically_register(&self, actor: &str, peer: &str) {
        let mut s = self.inner.lock().unwrap();
        let now = Utc::now();
        s.optimistic_registered
            .insert(actor.to_string(), (peer.to_string(), now));
        s.peer_mut(peer)
            .optimistic_registered
            .insert(actor.to_string(), now);
    }

    pub fn optimistically_unregister(&self, actor: &str) {
        let mut s = self.inner.lock().unwrap();
        if let Some((peer, _)) = s.optimistic_registered.remove(actor) {
            if let Some(p) = s.peers.get_mut(&peer) {
                p.optimistic_registered.remove(actor);
            }
        }
    }

    /// The current live-peer roster, sorted for deterministic output. Used
    /// by the leader's term watcher to answer `Term` requests.
    pub fn live_peers(&self) -> Vec<String> {
        let s = self.inner.lock().unwrap();
        let mut names: Vec<String> = s
            .peers
            .values()
            .filter(|p| p.is_live())
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn min_assigned(&self) -> Result<String, PeerQueueError> {
        let s = self.inner.lock().unwrap();
        s.peers
            .values()
            .filter(|p| p.is_live())
            .min_by_key(|p| p.assigned_count())
            .map(|p| p.name.clone())
            .ok_or(PeerQueueError::Empty)
    }

    pub fn max_assigned(&self) -> Result<String, PeerQueueError> {
        let s = self.inner.lock().unwrap();
        s.peers
            .values()
            .filter(|p| p.is_live())
            .max_by_key(|p| p.assigned_count())
            .map(|p| p.name.clone())
            .ok_or(PeerQueueError::Empty)
    }

    /// Computes an advisory relocation plan: with `L` live peers and `T`
    /// required actors, each peer's fair share is `ceil(T/L)`; peers
    /// exceeding it contribute their surplus to `relocations`.
    pub fn relocate(&self) -> RelocationPlan {
        let s = self.inner.lock().unwrap();
        let actor_type = s.actor_type.clone().unwrap_or_default();
        let live_peers: Vec<&PeerInfo> = s.peers.values().filter(|p| p.is_live()).collect();
        let total_required = s.required.len();
        let share = if live_peers.is_empty() {
            0
        } else {
            total_required.div_ceil(live_peers.len())
        };

        let mut count = HashMap::new();
        let mut burden = HashMap::new();
        let mut relocations = Vec::new();
        let mut peers = Vec::new();

        for p in &live_peers {
            let n = p.registered.len();
            count.insert(p.name.clone(), n);
            let surplus = n.saturating_sub(share);
            burden.insert(p.name.clone(), surplus);
            peers.push(p.name.clone());
            if surplus > 0 {
                relocations.extend(p.registered.iter().take(surplus).cloned());
            }
        }

        if !relocations.is_empty() {
            common_metrics::inc(
                "floe_peerqueue_relocations_total",
                &[],
                relocations.len() as u64,
            );
        }

        RelocationPlan {
            actor_type,
            peers,
            count,
            burden,
            relocations,
        }
    }
}

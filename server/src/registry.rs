//! Fixed-capacity table of session slots.
//!
//! Slots are created once and never move, so a session index stays valid for
//! the whole life of the server. Each slot has its own lock; the registry lock
//! only serialises allocation.

use crate::game;
use crate::lifecycle::{self, JoinOutcome};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use snake_shared::{PlayerId, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Shared handle to one session slot. Only touch the state while locked.
pub type SessionHandle = Arc<Mutex<Session>>;

/// One session slot: the wire-visible state plus server bookkeeping.
#[derive(Debug)]
pub struct Session {
    pub state: SessionState,
    elapsed: Duration,
    /// Set from allocation until the worker resets the slot and exits.
    worker_active: bool,
    /// Bumped on every reset, so bindings can tell a reused slot apart.
    generation: u64,
    rng: StdRng,
}

impl Session {
    pub fn new(index: usize) -> Self {
        Self::with_rng(index, StdRng::from_entropy())
    }

    pub fn with_rng(index: usize, rng: StdRng) -> Self {
        Self {
            state: SessionState::new(index as i32),
            elapsed: Duration::ZERO,
            worker_active: false,
            generation: 0,
            rng,
        }
    }

    pub fn index(&self) -> usize {
        self.state.session_id as usize
    }

    /// Free for a new session: not running, nobody alive, no worker attached.
    pub fn is_reusable(&self) -> bool {
        !self.state.running && self.state.player_count == 0 && !self.worker_active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn join(&mut self, player_id: PlayerId) -> JoinOutcome {
        lifecycle::join(&mut self.state, player_id, &mut self.rng)
    }

    /// Runs one simulation step and advances the clock by `period`.
    pub fn tick(&mut self, period: Duration) -> bool {
        let running = game::tick(&mut self.state, &mut self.rng);
        self.elapsed += period;
        self.state.elapsed_secs = self.elapsed.as_secs() as u32;
        running
    }

    /// Clears all players and food and detaches the worker.
    pub fn reset(&mut self) {
        self.state = SessionState::new(self.state.session_id);
        self.elapsed = Duration::ZERO;
        self.worker_active = false;
        self.generation += 1;
    }

    /// Gives back a slot that was allocated but never started.
    pub fn release(&mut self) {
        if self.state.occupied_slots() == 0 {
            self.reset();
        }
    }
}

pub struct SessionRegistry {
    sessions: Vec<SessionHandle>,
    allocation: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self::from_sessions((0..capacity).map(Session::new).collect())
    }

    /// Builds sessions with deterministic random sources derived from `seed`.
    pub fn seeded(capacity: usize, seed: u64) -> Self {
        Self::from_sessions(
            (0..capacity)
                .map(|i| Session::with_rng(i, StdRng::seed_from_u64(seed.wrapping_add(i as u64))))
                .collect(),
        )
    }

    fn from_sessions(sessions: Vec<Session>) -> Self {
        Self {
            sessions: sessions
                .into_iter()
                .map(|s| Arc::new(Mutex::new(s)))
                .collect(),
            allocation: Mutex::new(()),
        }
    }

    /// Reserves the first reusable slot and returns its index.
    ///
    /// The reservation marks the slot as owned by a worker-to-be, so two
    /// concurrent callers never receive the same index.
    pub async fn allocate(&self) -> Option<usize> {
        let _guard = self.allocation.lock().await;
        for (index, handle) in self.sessions.iter().enumerate() {
            let mut session = handle.lock().await;
            if session.is_reusable() {
                session.worker_active = true;
                info!("Allocated session {}", index);
                return Some(index);
            }
        }
        None
    }

    pub fn get(&self, index: usize) -> Option<&SessionHandle> {
        self.sessions.get(index)
    }

    pub fn capacity(&self) -> usize {
        self.sessions.len()
    }
}

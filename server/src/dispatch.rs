//! Routes decoded commands and disconnects to sessions.
//!
//! Unbound connections may only create or join a session. Bound connections
//! steer, pause or quit their own slot. The binding is always copied out of
//! the connection table before a session lock is taken, and the two locks are
//! never held together.

use crate::connections::{Binding, ConnectionId, ConnectionTable};
use crate::lifecycle::{self, JoinOutcome};
use crate::publisher;
use crate::registry::SessionRegistry;
use crate::worker::SessionWorker;
use log::{debug, info, warn};
use snake_shared::{Action, Command, PlayerId, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// What a bound connection's command does to its slot.
enum Route {
    /// The slot no longer belongs to this connection's player.
    Stale,
    /// Quit, or any command from a dead player: vacate the slot.
    Leave,
    Forward,
}

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    connections: Arc<RwLock<ConnectionTable>>,
    tick: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        connections: Arc<RwLock<ConnectionTable>>,
        tick: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            connections,
            tick,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn connections(&self) -> &Arc<RwLock<ConnectionTable>> {
        &self.connections
    }

    pub async fn handle_command(&self, id: ConnectionId, command: Command) {
        let binding = {
            let table = self.connections.read().await;
            table.binding(id)
        };
        let Some(binding) = binding else {
            debug!("Dropping command from closed connection {}", id);
            return;
        };

        match (binding.session, binding.slot) {
            (Some(session), Some(slot)) => self.handle_bound(id, binding, session, slot, command).await,
            _ => self.handle_unbound(id, command).await,
        }
    }

    async fn handle_unbound(&self, id: ConnectionId, command: Command) {
        match command.action {
            Action::CreateSession => self.create_session(id, command.player_id).await,
            Action::JoinSession => self.join_session(id, command).await,
            action => debug!("Ignoring {:?} from unbound connection {}", action, id),
        }
    }

    async fn create_session(&self, id: ConnectionId, player_id: PlayerId) {
        let Some(index) = self.registry.allocate().await else {
            warn!("No free session for player {} on connection {}", player_id, id);
            self.reject(id).await;
            return;
        };
        let Some(handle) = self.registry.get(index) else {
            return;
        };

        let (outcome, generation) = {
            let mut session = handle.lock().await;
            let outcome = session.join(player_id);
            let generation = session.generation();
            if outcome.slot().is_none() {
                session.release();
            }
            (outcome, generation)
        };

        match outcome.slot() {
            Some(slot) => {
                self.bind(id, Binding::new(player_id, index, slot, generation)).await;
                SessionWorker::new(
                    index,
                    Arc::clone(handle),
                    Arc::clone(&self.connections),
                    self.tick,
                    self.shutdown.clone(),
                )
                .spawn();
                self.publish(index).await;
            }
            None => {
                warn!("Player {} could not start session {}: {:?}", player_id, index, outcome);
                self.reject(id).await;
            }
        }
    }

    async fn join_session(&self, id: ConnectionId, command: Command) {
        let handle = command
            .target_session()
            .and_then(|index| self.registry.get(index).map(|h| (index, h)));
        let Some((index, handle)) = handle else {
            warn!("Player {} asked for unknown session {}", command.player_id, command.session_id);
            self.reject(id).await;
            return;
        };

        let outcome = {
            let mut session = handle.lock().await;
            if session.state.running {
                Some((session.join(command.player_id), session.generation()))
            } else {
                None
            }
        };

        let Some((outcome, generation)) = outcome else {
            warn!("Player {} asked to join idle session {}", command.player_id, index);
            self.reject(id).await;
            return;
        };

        match outcome {
            JoinOutcome::Joined(slot) | JoinOutcome::AlreadyPresent(slot) => {
                if outcome == JoinOutcome::AlreadyPresent(slot) {
                    info!("Player {} reconnected to session {}", command.player_id, index);
                }
                self.bind(id, Binding::new(command.player_id, index, slot, generation))
                    .await;
                self.publish(index).await;
            }
            JoinOutcome::Dead => {
                info!(
                    "Player {} died in session {} and may not rejoin",
                    command.player_id, index
                );
                self.reject(id).await;
            }
            outcome => {
                warn!("Player {} could not join session {}: {:?}", command.player_id, index, outcome);
                self.reject(id).await;
            }
        }
    }

    async fn handle_bound(
        &self,
        id: ConnectionId,
        binding: Binding,
        index: usize,
        slot: usize,
        command: Command,
    ) {
        let Some(handle) = self.registry.get(index) else {
            self.unbind(id).await;
            return;
        };

        let leave = {
            let mut session = handle.lock().await;
            let generation = session.generation();
            let state = &mut session.state;
            let route = match state.slots.get(slot) {
                Some(s) if binding.owns(s.player_id, generation) => {
                    if !s.alive || command.action == Action::Quit {
                        Route::Leave
                    } else {
                        Route::Forward
                    }
                }
                // The session ended and was reused underneath this binding.
                _ => Route::Stale,
            };

            match route {
                Route::Stale => true,
                Route::Leave => {
                    lifecycle::vacate(state, slot);
                    true
                }
                Route::Forward => {
                    match command.action {
                        Action::Move | Action::Pause => {
                            lifecycle::apply(state, binding.player_id, &command);
                        }
                        action => debug!(
                            "Player {} already in session {}, ignoring {:?}",
                            binding.player_id, index, action
                        ),
                    }
                    false
                }
            }
        };

        if leave {
            self.unbind(id).await;
        }
    }

    /// A dropped connection kills its player but keeps the slot, so the id
    /// cannot come back to the same session.
    pub async fn handle_disconnect(&self, id: ConnectionId) {
        let removed = {
            let mut table = self.connections.write().await;
            table.remove(id)
        };
        let Some(connection) = removed else {
            return;
        };
        let (Some(index), Some(slot)) = (connection.binding.session, connection.binding.slot) else {
            return;
        };
        let Some(handle) = self.registry.get(index) else {
            return;
        };

        let mut session = handle.lock().await;
        let generation = session.generation();
        let owned = session
            .state
            .slots
            .get(slot)
            .is_some_and(|s| connection.binding.owns(s.player_id, generation));
        if owned {
            lifecycle::retire(&mut session.state, slot);
        }
    }

    async fn bind(&self, id: ConnectionId, binding: Binding) {
        let bound = self.connections.write().await.bind(id, binding);
        if !bound {
            debug!("Connection {} closed before binding", id);
        }
    }

    async fn unbind(&self, id: ConnectionId) {
        self.connections.write().await.unbind(id);
    }

    async fn publish(&self, index: usize) {
        let Some(handle) = self.registry.get(index) else {
            return;
        };
        let snapshot = handle.lock().await.state.clone();
        publisher::publish(&self.connections, &snapshot).await;
    }

    async fn reject(&self, id: ConnectionId) {
        publisher::send_to(&self.connections, id, &SessionState::rejection()).await;
    }
}

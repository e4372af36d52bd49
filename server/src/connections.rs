//! Connection table: which socket belongs to which player and session.
//!
//! This module handles the server-side bookkeeping for connected clients:
//! - Fixed-capacity slot allocation for accepted sockets
//! - The binding of a connection to a player id, a session and a player slot
//! - Queuing outbound snapshots without ever waiting on a slow socket
//!
//! The table lives behind its own lock, independent of every session lock.
//! Callers copy a [`Binding`] out, release the table, and only then lock a
//! session.

use bytes::Bytes;
use log::{debug, info, warn};
use snake_shared::{PlayerId, EMPTY_PLAYER};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Index of a connection slot.
pub type ConnectionId = usize;

/// Copy of a connection's routing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub player_id: PlayerId,
    pub session: Option<usize>,
    pub slot: Option<usize>,
    /// Generation of the session when the binding was made. A binding from an
    /// earlier generation refers to a session that has since been reset.
    pub generation: u64,
}

impl Binding {
    pub fn new(player_id: PlayerId, session: usize, slot: usize, generation: u64) -> Self {
        Self {
            player_id,
            session: Some(session),
            slot: Some(slot),
            generation,
        }
    }

    pub fn unbound() -> Self {
        Self {
            player_id: EMPTY_PLAYER,
            session: None,
            slot: None,
            generation: 0,
        }
    }

    /// True if this binding belongs to `player_id` in the given session generation.
    pub fn owns(&self, player_id: PlayerId, generation: u64) -> bool {
        self.is_bound() && self.player_id == player_id && self.generation == generation
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }
}

/// A connected client.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub binding: Binding,
    outbound: mpsc::Sender<Bytes>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            addr,
            binding: Binding::unbound(),
            outbound,
        }
    }

    /// Queues `payload` for the writer task. Returns false if the queue was
    /// full or the writer is gone.
    pub fn send(&self, payload: &Bytes) -> bool {
        match self.outbound.try_send(payload.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}, dropping snapshot", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Writer for connection {} already closed", self.id);
                false
            }
        }
    }
}

pub struct ConnectionTable {
    slots: Vec<Option<Connection>>,
}

impl ConnectionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Places a connection into the first free slot.
    ///
    /// Returns None if every slot is taken.
    pub fn add(&mut self, addr: SocketAddr, outbound: mpsc::Sender<Bytes>) -> Option<ConnectionId> {
        let id = self.slots.iter().position(Option::is_none)?;
        self.slots[id] = Some(Connection::new(id, addr, outbound));
        info!("Connection {} accepted from {}", id, addr);
        Some(id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.slots.get_mut(id)?.take()?;
        info!("Connection {} from {} closed", id, connection.addr);
        Some(connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.slots.get(id)?.as_ref()
    }

    pub fn binding(&self, id: ConnectionId) -> Option<Binding> {
        self.get(id).map(|c| c.binding)
    }

    pub fn bind(&mut self, id: ConnectionId, binding: Binding) -> bool {
        let Some(connection) = self.slots.get_mut(id).and_then(Option::as_mut) else {
            return false;
        };
        connection.binding = binding;
        info!(
            "Connection {} bound to session {:?} slot {:?} as player {} (generation {})",
            id, binding.session, binding.slot, binding.player_id, binding.generation
        );
        true
    }

    /// Clears the session and slot. The player id is kept so logs stay useful.
    pub fn unbind(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.slots.get_mut(id).and_then(Option::as_mut) else {
            return false;
        };
        if !connection.binding.is_bound() {
            return false;
        }
        connection.binding.session = None;
        connection.binding.slot = None;
        debug!("Connection {} unbound", id);
        true
    }

    pub fn send(&self, id: ConnectionId, payload: &Bytes) -> bool {
        self.get(id).is_some_and(|c| c.send(payload))
    }

    /// Queues `payload` for every connection bound to `session`.
    pub fn send_to_session(&self, session: usize, payload: &Bytes) -> usize {
        self.iter()
            .filter(|c| c.binding.session == Some(session))
            .filter(|c| c.send(payload))
            .count()
    }

    /// Unbinds every connection attached to `session`.
    pub fn unbind_session(&mut self, session: usize) -> usize {
        let mut count = 0;
        for connection in self.slots.iter_mut().flatten() {
            if connection.binding.session == Some(session) {
                connection.binding.session = None;
                connection.binding.slot = None;
                count += 1;
            }
        }
        count
    }

    /// Drops every connection, which closes their writer tasks.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.take();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

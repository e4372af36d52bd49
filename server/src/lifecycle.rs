//! Player lifecycle inside a session.
//!
//! A durable player id moves through these states within one session:
//!
//! - **Absent**: no slot carries the id. [`join`] makes it **Active**.
//! - **Active**: alive, optionally paused. Collisions, disconnects and
//!   [`retire`] make it **Dead**.
//! - **Dead**: the slot keeps the id and the frozen body so scores stay
//!   visible. A dead id can never rejoin the same session; only [`vacate`]
//!   returns the slot to **Absent**.
//!
//! All functions expect the caller to hold the session lock.

use crate::game;
use log::{debug, info};
use rand::Rng;
use snake_shared::{
    Action, Command, Heading, PlayerId, PlayerSlot, SessionState, EMPTY_PLAYER, INITIAL_LENGTH,
};

/// Result of adding a player to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A fresh slot was seeded for the player.
    Joined(usize),
    /// The player was already alive in this slot; nothing changed.
    AlreadyPresent(usize),
    /// The player died in this session and may not come back.
    Dead,
    /// No empty slot or no free spawn site.
    Full,
    /// The id is the empty-slot sentinel.
    InvalidIdentity,
}

impl JoinOutcome {
    pub fn slot(&self) -> Option<usize> {
        match self {
            JoinOutcome::Joined(slot) | JoinOutcome::AlreadyPresent(slot) => Some(*slot),
            _ => None,
        }
    }
}

pub fn join<R: Rng + ?Sized>(state: &mut SessionState, player_id: PlayerId, rng: &mut R) -> JoinOutcome {
    if player_id == EMPTY_PLAYER {
        return JoinOutcome::InvalidIdentity;
    }
    if let Some(index) = state.find_player(player_id) {
        return if state.slots[index].alive {
            JoinOutcome::AlreadyPresent(index)
        } else {
            JoinOutcome::Dead
        };
    }

    let Some(index) = state.slots.iter().position(PlayerSlot::is_empty) else {
        return JoinOutcome::Full;
    };
    let Some(head) = game::spawn_position(state, rng) else {
        return JoinOutcome::Full;
    };

    let slot = &mut state.slots[index];
    *slot = PlayerSlot::empty();
    slot.player_id = player_id;
    slot.body[..INITIAL_LENGTH].copy_from_slice(&game::spawn_body(head));
    slot.length = INITIAL_LENGTH as u32;
    slot.heading = Heading::Right;
    slot.alive = true;

    state.player_count += 1;
    state.running = true;
    game::replenish_food(state, rng);

    info!(
        "Player {} joined session {} in slot {} at ({}, {})",
        player_id, state.session_id, index, head.x, head.y
    );
    JoinOutcome::Joined(index)
}

/// Marks an alive player dead, keeping the slot and its frozen body.
///
/// Returns false if the slot was empty or already dead.
pub fn retire(state: &mut SessionState, index: usize) -> bool {
    let Some(slot) = state.slots.get_mut(index) else {
        return false;
    };
    if slot.is_empty() || !slot.alive {
        return false;
    }
    slot.alive = false;
    slot.paused = false;
    state.player_count = state.player_count.saturating_sub(1);
    info!(
        "Player {} retired from session {}",
        state.slots[index].player_id, state.session_id
    );
    true
}

/// Clears a slot entirely so a new player can take it.
///
/// Returns false if the slot was already empty.
pub fn vacate(state: &mut SessionState, index: usize) -> bool {
    let Some(slot) = state.slots.get_mut(index) else {
        return false;
    };
    if slot.is_empty() {
        return false;
    }
    let player_id = slot.player_id;
    if slot.alive {
        state.player_count = state.player_count.saturating_sub(1);
    }
    *slot = PlayerSlot::empty();
    info!("Player {} left session {}", player_id, state.session_id);
    true
}

/// Applies a move, pause or quit from an alive player.
///
/// Returns true if the command changed the slot.
pub fn apply(state: &mut SessionState, player_id: PlayerId, command: &Command) -> bool {
    let Some(index) = state.find_player(player_id) else {
        return false;
    };
    if !state.slots[index].alive {
        return false;
    }

    match command.action {
        Action::Move => {
            let slot = &mut state.slots[index];
            let before = (slot.heading, slot.paused);
            if slot.heading.is_reverse_of(command.heading) {
                debug!(
                    "Player {} reversal {:?} -> {:?} rejected",
                    player_id, slot.heading, command.heading
                );
            } else if command.heading != Heading::None {
                slot.heading = command.heading;
            }
            slot.paused = false;
            before != (slot.heading, slot.paused)
        }
        Action::Pause => {
            let slot = &mut state.slots[index];
            slot.paused = !slot.paused;
            true
        }
        Action::Quit => retire(state, index),
        Action::CreateSession | Action::JoinSession => false,
    }
}

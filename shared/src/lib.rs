//! Shared protocol definitions for the snake server and its clients.
//!
//! Every message on the wire is a fixed-size binary record. There are no
//! delimiters and no length prefixes: both ends know [`COMMAND_SIZE`] and
//! [`SNAPSHOT_SIZE`] at compile time. Records are produced by serde + bincode
//! with its default options (fixed-width little-endian integers, enums as a
//! `u32` variant index, `bool` as one byte, arrays as tuples).

mod error;
pub mod fixed_array;

pub use error::ProtocolError;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 12345;
pub const MAX_PLAYERS: usize = 10;
pub const MAX_SNAKE_LENGTH: usize = 500;
pub const WORLD_WIDTH: i32 = 40;
pub const WORLD_HEIGHT: i32 = 20;
pub const TICK_MS: u64 = 500;
pub const MAX_FOOD: usize = MAX_PLAYERS * 2;
pub const MAX_SESSIONS: usize = 5;
pub const MAX_CONNECTIONS: usize = MAX_SESSIONS * MAX_PLAYERS;
pub const INITIAL_LENGTH: usize = 3;
pub const FOOD_SCORE: u32 = 10;

/// Player id stored in a slot nobody occupies.
pub const EMPTY_PLAYER: PlayerId = -1;
/// Session id carried by commands that target no session, and by rejections.
pub const NO_SESSION: i32 = -1;

pub const POSITION_SIZE: usize = 4 + 4;
pub const PLAYER_SLOT_SIZE: usize = 4 + MAX_SNAKE_LENGTH * POSITION_SIZE + 4 + 4 + 4 + 1 + 1;
pub const COMMAND_SIZE: usize = 4 + 4 + 4 + 4;
pub const SNAPSHOT_SIZE: usize =
    4 + 4 + MAX_PLAYERS * PLAYER_SLOT_SIZE + 4 + MAX_FOOD * POSITION_SIZE + 4 + 1;

/// Durable identity chosen by the client, stable across reconnects.
pub type PlayerId = i32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// One cell in `heading`, wrapping around the world edges.
    pub fn step(self, heading: Heading) -> Self {
        let (dx, dy) = match heading {
            Heading::Up => (0, -1),
            Heading::Down => (0, 1),
            Heading::Left => (-1, 0),
            Heading::Right => (1, 0),
            Heading::None => (0, 0),
        };
        Self {
            x: (self.x + dx).rem_euclid(WORLD_WIDTH),
            y: (self.y + dy).rem_euclid(WORLD_HEIGHT),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Heading {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

impl Heading {
    pub fn opposite(self) -> Heading {
        match self {
            Heading::Up => Heading::Down,
            Heading::Down => Heading::Up,
            Heading::Left => Heading::Right,
            Heading::Right => Heading::Left,
            Heading::None => Heading::None,
        }
    }

    /// True when turning from `self` to `other` would reverse into the body.
    pub fn is_reverse_of(self, other: Heading) -> bool {
        self != Heading::None && self.opposite() == other
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateSession,
    JoinSession,
    Move,
    Pause,
    Quit,
}

/// Client to server record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub player_id: PlayerId,
    pub session_id: i32,
    pub action: Action,
    /// Only meaningful for [`Action::Move`].
    pub heading: Heading,
}

impl Command {
    pub fn new(player_id: PlayerId, session_id: i32, action: Action, heading: Heading) -> Self {
        Self {
            player_id,
            session_id,
            action,
            heading,
        }
    }

    pub fn create(player_id: PlayerId) -> Self {
        Self::new(player_id, NO_SESSION, Action::CreateSession, Heading::None)
    }

    pub fn join(player_id: PlayerId, session_id: i32) -> Self {
        Self::new(player_id, session_id, Action::JoinSession, Heading::None)
    }

    pub fn steer(player_id: PlayerId, session_id: i32, heading: Heading) -> Self {
        Self::new(player_id, session_id, Action::Move, heading)
    }

    pub fn pause(player_id: PlayerId, session_id: i32) -> Self {
        Self::new(player_id, session_id, Action::Pause, Heading::None)
    }

    pub fn quit(player_id: PlayerId, session_id: i32) -> Self {
        Self::new(player_id, session_id, Action::Quit, Heading::None)
    }

    /// The targeted session index, if the id is non-negative.
    pub fn target_session(&self) -> Option<usize> {
        usize::try_from(self.session_id).ok()
    }
}

/// One player's snake inside a session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    pub player_id: PlayerId,
    /// Head first. Only the first `length` entries are meaningful.
    #[serde(with = "crate::fixed_array")]
    pub body: [Position; MAX_SNAKE_LENGTH],
    pub length: u32,
    pub heading: Heading,
    pub score: u32,
    pub alive: bool,
    pub paused: bool,
}

impl PlayerSlot {
    pub fn empty() -> Self {
        Self {
            player_id: EMPTY_PLAYER,
            body: [Position::default(); MAX_SNAKE_LENGTH],
            length: 0,
            heading: Heading::None,
            score: 0,
            alive: false,
            paused: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.player_id == EMPTY_PLAYER
    }

    pub fn segments(&self) -> &[Position] {
        let len = (self.length as usize).min(MAX_SNAKE_LENGTH);
        &self.body[..len]
    }

    pub fn head(&self) -> Option<Position> {
        self.segments().first().copied()
    }

    pub fn occupies(&self, position: Position) -> bool {
        self.segments().contains(&position)
    }
}

impl Default for PlayerSlot {
    fn default() -> Self {
        Self::empty()
    }
}

/// The complete state of one session. It is also the server to client
/// snapshot record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: i32,
    pub elapsed_secs: u32,
    pub slots: [PlayerSlot; MAX_PLAYERS],
    /// Number of alive players.
    pub player_count: u32,
    pub food: [Position; MAX_FOOD],
    pub food_count: u32,
    pub running: bool,
}

impl SessionState {
    pub fn new(session_id: i32) -> Self {
        Self {
            session_id,
            elapsed_secs: 0,
            slots: std::array::from_fn(|_| PlayerSlot::empty()),
            player_count: 0,
            food: [Position::default(); MAX_FOOD],
            food_count: 0,
            running: false,
        }
    }

    /// Snapshot sent to a requester whose create or join was refused.
    pub fn rejection() -> Self {
        Self::new(NO_SESSION)
    }

    pub fn is_rejection(&self) -> bool {
        self.session_id == NO_SESSION
    }

    pub fn food_items(&self) -> &[Position] {
        let len = (self.food_count as usize).min(MAX_FOOD);
        &self.food[..len]
    }

    pub fn find_player(&self, player_id: PlayerId) -> Option<usize> {
        if player_id == EMPTY_PLAYER {
            return None;
        }
        self.slots.iter().position(|s| s.player_id == player_id)
    }

    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    pub fn alive_players(&self) -> usize {
        self.slots.iter().filter(|s| s.alive).count()
    }
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(command).map_err(ProtocolError::Encode)
}

pub fn decode_command(data: &[u8]) -> Result<Command, ProtocolError> {
    check_len(data, COMMAND_SIZE)?;
    bincode::deserialize(data).map_err(ProtocolError::Decode)
}

pub fn encode_snapshot(state: &SessionState) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(state).map_err(ProtocolError::Encode)
}

pub fn decode_snapshot(data: &[u8]) -> Result<SessionState, ProtocolError> {
    check_len(data, SNAPSHOT_SIZE)?;
    bincode::deserialize(data).map_err(ProtocolError::Decode)
}

fn check_len(data: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if data.len() != expected {
        return Err(ProtocolError::ShortRecord {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

//! Integration tests for the snake session server
//!
//! These tests run a real server on an ephemeral port and talk to it over TCP
//! with the shared codec.

use bincode::{deserialize, serialize};
use snake_server::config::ServerConfig;
use snake_server::network::Server;
use snake_server::registry::SessionRegistry;
use snake_shared::{
    decode_command, decode_snapshot, encode_command, encode_snapshot, Action, Command, Heading,
    PlayerId, Position, SessionState, COMMAND_SIZE, MAX_PLAYERS, NO_SESSION, PLAYER_SLOT_SIZE,
    SNAPSHOT_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const TICK: Duration = Duration::from_millis(40);
const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    _shutdown: watch::Sender<bool>,
}

async fn start_server(config: ServerConfig) -> TestServer {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tick: TICK,
        seed: Some(1234),
        ..config
    };
    let server = tokio_test::assert_ok!(Server::bind(config, shutdown_rx).await);
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    TestServer {
        addr,
        registry,
        _shutdown: shutdown_tx,
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    async fn send(&mut self, command: Command) {
        let data = encode_command(&command).unwrap();
        self.stream.write_all(&data).await.unwrap();
    }

    async fn recv(&mut self) -> SessionState {
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        timeout(WAIT, self.stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for snapshot")
            .expect("connection closed");
        decode_snapshot(&buf).unwrap()
    }

    async fn recv_until<F>(&mut self, mut done: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        timeout(WAIT, async {
            loop {
                let state = self.recv().await;
                if done(&state) {
                    return state;
                }
            }
        })
        .await
        .expect("condition not reached")
    }

    /// True if no snapshot arrives within a few ticks.
    async fn is_quiet(&mut self) -> bool {
        let mut byte = [0u8; 1];
        timeout(TICK * 5, self.stream.read(&mut byte)).await.is_err()
    }

    /// True once the server has closed the socket. Buffered snapshots are
    /// skipped.
    async fn is_closed(&mut self) -> bool {
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        timeout(WAIT, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => continue,
                }
            }
        })
        .await
        .is_ok()
    }
}

fn slot_of(state: &SessionState, player_id: PlayerId) -> usize {
    state.find_player(player_id).expect("player not in session")
}

/// Creates a session for `player_id` and pauses its snake so nothing moves.
async fn create_paused(addr: SocketAddr, player_id: PlayerId) -> (TestClient, i32) {
    let mut client = TestClient::connect(addr).await;
    client.send(Command::create(player_id)).await;
    let state = client.recv().await;
    client.send(Command::pause(player_id, state.session_id)).await;
    (client, state.session_id)
}

async fn join_paused(addr: SocketAddr, player_id: PlayerId, session: i32) -> TestClient {
    let mut client = TestClient::connect(addr).await;
    client.send(Command::join(player_id, session)).await;
    let state = client.recv().await;
    assert_eq!(state.session_id, session);
    client.send(Command::pause(player_id, session)).await;
    client
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests the raw command layout against bincode's default encoding
    #[test]
    fn command_layout_matches_bincode() {
        let command = Command::steer(7, 2, Heading::Left);
        let raw = serialize(&command).unwrap();
        assert_eq!(raw.len(), COMMAND_SIZE);
        assert_eq!(raw, encode_command(&command).unwrap());

        let mut expected = Vec::new();
        expected.extend_from_slice(&7i32.to_le_bytes());
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        assert_eq!(raw, expected);

        let decoded: Command = deserialize(&raw).unwrap();
        assert_eq!(decoded.action, Action::Move);
        assert_eq!(decode_command(&raw).unwrap(), command);
    }

    /// Tests that snapshot fields sit at fixed offsets
    #[test]
    fn snapshot_layout_is_fixed() {
        let mut state = SessionState::new(3);
        state.slots[1].player_id = 9;
        state.slots[1].body[0] = Position::new(4, 5);
        state.food[0] = Position::new(11, 12);
        state.food_count = 1;
        state.running = true;

        let raw = serialize(&state).unwrap();
        assert_eq!(raw.len(), SNAPSHOT_SIZE);
        assert_eq!(raw, encode_snapshot(&state).unwrap());
        assert_eq!(&raw[0..4], &3i32.to_le_bytes());

        let slot = 8 + PLAYER_SLOT_SIZE;
        assert_eq!(&raw[slot..slot + 4], &9i32.to_le_bytes());
        assert_eq!(&raw[slot + 4..slot + 8], &4i32.to_le_bytes());
        assert_eq!(&raw[slot + 8..slot + 12], &5i32.to_le_bytes());

        let food = 8 + MAX_PLAYERS * PLAYER_SLOT_SIZE + 4;
        assert_eq!(&raw[food..food + 4], &11i32.to_le_bytes());
        assert_eq!(raw[SNAPSHOT_SIZE - 1], 1);

        let rejection = serialize(&SessionState::rejection()).unwrap();
        assert_eq!(&rejection[0..4], &NO_SESSION.to_le_bytes());
        assert_eq!(decode_snapshot(&raw).unwrap(), state);
    }
}

/// SESSION CREATION AND STEERING
mod session_tests {
    use super::*;

    /// Tests that a create request starts session 0 with one three-segment snake
    #[tokio::test]
    async fn create_spawns_three_segment_snake() {
        let server = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(server.addr).await;

        client.send(Command::create(7)).await;
        let state = client.recv().await;

        assert_eq!(state.session_id, 0);
        assert_eq!(state.player_count, 1);
        assert!(state.running);
        let slot = &state.slots[slot_of(&state, 7)];
        assert_eq!(slot.length, 3);
        assert!(slot.alive);
        assert!(state.food_count >= 1);
    }

    /// Tests that a direct reversal never changes the heading
    #[tokio::test]
    async fn reversal_is_rejected() {
        let server = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(server.addr).await;
        client.send(Command::create(7)).await;
        let state = client.recv().await;

        client.send(Command::steer(7, state.session_id, Heading::Up)).await;
        client.send(Command::steer(7, state.session_id, Heading::Down)).await;

        let state = client
            .recv_until(|s| s.slots[0].heading != Heading::Right)
            .await;
        assert_eq!(state.slots[0].heading, Heading::Up);
        for _ in 0..3 {
            let state = client.recv().await;
            assert_eq!(state.slots[0].heading, Heading::Up);
            assert!(state.slots[0].alive);
        }
    }

    /// Tests periodic snapshots carrying elapsed time and food
    #[tokio::test]
    async fn snapshots_arrive_every_tick_with_food() {
        let server = start_server(ServerConfig::default()).await;
        let (mut client, _) = create_paused(server.addr, 1).await;

        let first = client.recv().await;
        let later = client.recv_until(|s| s.elapsed_secs >= 1).await;
        assert!(later.elapsed_secs > first.elapsed_secs);
        assert!(later.food_count >= 1);
        assert!(later.running);
    }

    /// Tests that two sessions never see each other's players
    #[tokio::test]
    async fn sessions_are_independent() {
        let server = start_server(ServerConfig::default()).await;
        let (mut a, session_a) = create_paused(server.addr, 1).await;
        let (mut b, session_b) = create_paused(server.addr, 2).await;
        assert_ne!(session_a, session_b);

        let state_a = a.recv_until(|s| s.slots.iter().any(|p| p.paused)).await;
        let state_b = b.recv_until(|s| s.slots.iter().any(|p| p.paused)).await;
        assert_eq!(state_a.session_id, session_a);
        assert_eq!(state_b.session_id, session_b);
        assert_eq!(state_a.find_player(2), None);
        assert_eq!(state_b.find_player(1), None);
    }
}

/// PLAYER LIFECYCLE OVER THE WIRE
mod lifecycle_tests {
    use super::*;

    /// Tests quitting while alive without disturbing the other snake
    #[tokio::test]
    async fn quit_leaves_other_player_untouched() {
        let server = start_server(ServerConfig::default()).await;
        let (mut a, session) = create_paused(server.addr, 1).await;
        let mut b = join_paused(server.addr, 2, session).await;

        let before = b
            .recv_until(|s| s.player_count == 2 && s.slots.iter().filter(|p| p.paused).count() == 2)
            .await;
        let b_slot = before.slots[slot_of(&before, 2)].clone();

        a.send(Command::quit(1, session)).await;

        let after = b.recv_until(|s| s.player_count == 1).await;
        assert!(after.slots.iter().all(|s| s.player_id != 1 || !s.alive));
        assert_eq!(after.slots[slot_of(&after, 2)], b_slot);
        assert!(after.running);

        // The quitting client is unbound and may start a new session.
        a.send(Command::create(1)).await;
        let fresh = a.recv_until(|s| s.session_id != session).await;
        assert_eq!(fresh.player_count, 1);
        assert!(fresh.running);
    }

    /// Tests that a dropped player stays dead and may not rejoin
    #[tokio::test]
    async fn disconnected_player_stays_dead_and_cannot_rejoin() {
        let server = start_server(ServerConfig::default()).await;
        let (a, session) = create_paused(server.addr, 1).await;
        let mut b = join_paused(server.addr, 2, session).await;

        drop(a);
        let state = b
            .recv_until(|s| s.player_count == 1 && s.find_player(1).is_some())
            .await;
        assert!(!state.slots[slot_of(&state, 1)].alive);

        let mut again = TestClient::connect(server.addr).await;
        again.send(Command::join(1, session)).await;
        assert!(again.recv().await.is_rejection());

        let state = b.recv().await;
        assert!(!state.slots[slot_of(&state, 1)].alive);
        assert_eq!(state.player_count, 1);
    }

    /// Tests that a live id joining again from a new socket keeps its slot
    #[tokio::test]
    async fn live_player_reconnect_reuses_slot() {
        let server = start_server(ServerConfig::default()).await;
        let (_a, session) = create_paused(server.addr, 1).await;

        let mut second = TestClient::connect(server.addr).await;
        second.send(Command::join(1, session)).await;
        let state = second.recv().await;
        assert_eq!(state.session_id, session);
        assert_eq!(state.player_count, 1);
        assert_eq!(state.occupied_slots(), 1);
    }

    /// Tests that a session with nobody alive is reset and handed out again
    #[tokio::test]
    async fn ended_session_is_reused() {
        let server = start_server(ServerConfig {
            max_sessions: 1,
            ..ServerConfig::default()
        })
        .await;
        let (a, session) = create_paused(server.addr, 1).await;
        let mut b = join_paused(server.addr, 2, session).await;

        // One player dies by disconnecting, the other leaves.
        drop(a);
        b.recv_until(|s| s.player_count == 1).await;
        b.send(Command::quit(2, session)).await;

        // The worker resets the slot once a tick sees nobody alive.
        timeout(WAIT, async {
            loop {
                let reusable = server
                    .registry
                    .get(0)
                    .unwrap()
                    .lock()
                    .await
                    .is_reusable();
                if reusable {
                    break;
                }
                sleep(TICK).await;
            }
        })
        .await
        .expect("session was never reset");

        let mut c = TestClient::connect(server.addr).await;
        c.send(Command::create(1)).await;
        let state = c.recv().await;
        assert_eq!(state.session_id, 0);
        assert_eq!(state.player_count, 1);
        assert_eq!(state.occupied_slots(), 1);
    }
}

/// CAPACITY AND PROTOCOL FAULTS
mod fault_tests {
    use super::*;

    /// Tests the rejection snapshot when every session is busy
    #[tokio::test]
    async fn create_rejected_when_all_sessions_busy() {
        let server = start_server(ServerConfig {
            max_sessions: 1,
            ..ServerConfig::default()
        })
        .await;
        let (_a, _) = create_paused(server.addr, 1).await;

        let mut b = TestClient::connect(server.addr).await;
        b.send(Command::create(2)).await;
        assert!(b.recv().await.is_rejection());
    }

    /// Tests that sockets beyond the connection table are closed
    #[tokio::test]
    async fn connection_rejected_when_table_full() {
        let server = start_server(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        })
        .await;
        let _first = TestClient::connect(server.addr).await;
        sleep(TICK).await;

        let mut second = TestClient::connect(server.addr).await;
        assert!(second.is_closed().await);
    }

    /// Tests that an unknown action code is treated as a disconnect
    #[tokio::test]
    async fn malformed_record_drops_connection_and_kills_player() {
        let server = start_server(ServerConfig::default()).await;
        let (mut a, session) = create_paused(server.addr, 1).await;
        let mut b = join_paused(server.addr, 2, session).await;

        let mut bad = encode_command(&Command::pause(1, session)).unwrap();
        bad[8] = 0xEE;
        assert_eq!(bad.len(), COMMAND_SIZE);
        a.stream.write_all(&bad).await.unwrap();

        let state = b.recv_until(|s| s.player_count == 1).await;
        assert!(!state.slots[slot_of(&state, 1)].alive);
        assert!(a.is_closed().await);
    }

    /// Tests that an unbound connection may only create or join
    #[tokio::test]
    async fn unbound_commands_are_ignored() {
        let server = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(server.addr).await;

        client.send(Command::steer(5, 0, Heading::Up)).await;
        client.send(Command::pause(5, 0)).await;
        assert!(client.is_quiet().await);

        client.send(Command::create(5)).await;
        assert_eq!(client.recv().await.player_count, 1);
    }
}

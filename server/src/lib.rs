//! # Snake Session Server Library
//!
//! This library provides the authoritative server for multi-session snake
//! matches. It hosts a small, fixed number of independent sessions, ticks each
//! of them on its own schedule, and keeps every connected terminal client
//! informed with a full snapshot of its session after each tick.
//!
//! ## Core Responsibilities
//!
//! ### Session Hosting
//! Sessions live in a fixed table of slots ([`registry`]). A slot is handed
//! out on the first "create session" request and returns to the pool on its
//! own once nobody is left alive in it. Indices never move, so clients can
//! name a session by its index when joining.
//!
//! ### Player Lifecycle
//! A client picks a durable player id and keeps it across reconnects. Within
//! one session that id is either absent, alive (possibly paused), or dead.
//! Dead players stay visible with their final score and may never rejoin the
//! same session ([`lifecycle`]).
//!
//! ### Connection Multiplexing
//! Each TCP connection sends fixed-size command records. Commands from a
//! connection without a session create or join one; commands from a bound
//! connection steer, pause or quit its snake ([`dispatch`], [`network`]).
//!
//! ## Architecture Design
//!
//! ### One Worker Per Session
//! Every active session has its own tokio task ([`worker`]) that sleeps for
//! the tick period, runs the simulation step ([`game`]) under the session
//! lock, and publishes the result ([`publisher`]). Workers never wait on one
//! another and never on the accept loop.
//!
//! ### Independent Locks
//! Each session has its own lock. The connection table has a separate one.
//! Code that needs both copies what it needs from the connection table,
//! releases it, and only then locks the session.
//!
//! ### Non-blocking Delivery
//! Snapshots are queued per connection and written by a dedicated task. A
//! slow client loses snapshots rather than stalling a tick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use snake_server::config::ServerConfig;
//! use snake_server::network::Server;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snake_server::BoxError> {
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let server = Server::bind(ServerConfig::with_port(12345), shutdown_rx).await?;
//!
//!     // Stop everything after a minute
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         let _ = shutdown_tx.send(true);
//!     });
//!
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod connections;
pub mod dispatch;
pub mod game;
pub mod lifecycle;
pub mod network;
pub mod publisher;
pub mod registry;
pub mod worker;

/// Error type for server setup and the accept loop.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

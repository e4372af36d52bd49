//! Server network layer: TCP accept loop and per-connection socket tasks

use crate::config::ServerConfig;
use crate::connections::{ConnectionId, ConnectionTable};
use crate::dispatch::Dispatcher;
use crate::registry::SessionRegistry;
use crate::BoxError;
use bytes::Bytes;
use log::{debug, error, info, warn};
use snake_shared::{decode_command, Command, COMMAND_SIZE};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    CommandReceived {
        connection: ConnectionId,
        command: Command,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

/// Accepts connections and multiplexes their commands onto sessions
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listening socket. Nothing is served until [`Server::run`].
    pub async fn bind(
        config: ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let registry = Arc::new(match config.seed {
            Some(seed) => SessionRegistry::seeded(config.max_sessions, seed),
            None => SessionRegistry::new(config.max_sessions),
        });
        let connections = Arc::new(RwLock::new(ConnectionTable::new(config.max_connections)));
        info!(
            "Hosting up to {} sessions and {} connections, tick {:?}",
            registry.capacity(),
            connections.read().await.capacity(),
            config.tick
        );
        let dispatcher = Dispatcher::new(registry, connections, config.tick, shutdown.clone());
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            config,
            dispatcher,
            shutdown,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(self.dispatcher.registry())
    }

    async fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(self.config.outbound_queue);
        let id = {
            let mut connections = self.dispatcher.connections().write().await;
            connections.add(addr, outbound_tx)
        };
        let Some(id) = id else {
            warn!("Rejecting connection from {}: connection table full", addr);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        tokio::spawn(read_commands(
            id,
            reader,
            self.server_tx.clone(),
            self.shutdown.clone(),
        ));
        tokio::spawn(write_snapshots(id, writer, outbound_rx));
    }

    /// Main server loop: accepts sockets and routes their messages until shutdown
    pub async fn run(mut self) -> Result<(), BoxError> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept(stream, addr).await,
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::CommandReceived { connection, command }) => {
                            self.dispatcher.handle_command(connection, command).await;
                        },
                        Some(ServerMessage::Disconnected { connection }) => {
                            self.dispatcher.handle_disconnect(connection).await;
                        },
                        None => break,
                    }
                },

                _ = self.shutdown.changed() => {
                    info!("Server shutting down");
                    break;
                },
            }
        }

        let mut connections = self.dispatcher.connections().write().await;
        info!("Closing {} connections", connections.len());
        connections.clear();
        Ok(())
    }
}

/// Reads fixed-size command records until the socket fails or shutdown.
async fn read_commands(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; COMMAND_SIZE];

    loop {
        let read = tokio::select! {
            read = reader.read_exact(&mut buffer) => read,
            _ = shutdown.changed() => return,
        };

        match read {
            Ok(_) => match decode_command(&buffer) {
                Ok(command) => {
                    let message = ServerMessage::CommandReceived {
                        connection: id,
                        command,
                    };
                    if server_tx.send(message).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Protocol violation on connection {}: {}", id, e);
                    break;
                }
            },
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("Connection {} closed by peer", id);
                break;
            }
            Err(e) => {
                warn!("Error reading from connection {}: {}", id, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { connection: id });
}

/// Drains the outbound queue onto the socket. Ends when the connection is
/// removed from the table or the peer stops accepting data.
async fn write_snapshots(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Bytes>,
) {
    while let Some(payload) = outbound_rx.recv().await {
        if let Err(e) = writer.write_all(&payload).await {
            debug!("Failed to write to connection {}: {}", id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

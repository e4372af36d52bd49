//! Pushes session snapshots to bound connections.

use crate::connections::{ConnectionId, ConnectionTable};
use bytes::Bytes;
use log::{debug, error, info};
use snake_shared::{encode_snapshot, SessionState};
use tokio::sync::RwLock;

fn encode(state: &SessionState) -> Option<Bytes> {
    match encode_snapshot(state) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            error!("Failed to encode snapshot for session {}: {}", state.session_id, e);
            None
        }
    }
}

/// Sends `state` to every connection bound to its session.
///
/// When the session has stopped running, those connections are unbound in
/// the same pass so their clients can create or join again.
pub async fn publish(connections: &RwLock<ConnectionTable>, state: &SessionState) -> usize {
    let Ok(session) = usize::try_from(state.session_id) else {
        return 0;
    };
    let Some(payload) = encode(state) else {
        return 0;
    };

    let delivered = if state.running {
        connections.read().await.send_to_session(session, &payload)
    } else {
        let mut table = connections.write().await;
        let delivered = table.send_to_session(session, &payload);
        let unbound = table.unbind_session(session);
        info!("Session {} ended, unbound {} connections", session, unbound);
        delivered
    };
    debug!("Session {} snapshot queued for {} connections", session, delivered);
    delivered
}

/// Sends `state` to a single connection, bound or not.
pub async fn send_to(connections: &RwLock<ConnectionTable>, id: ConnectionId, state: &SessionState) -> bool {
    let Some(payload) = encode(state) else {
        return false;
    };
    connections.read().await.send(id, &payload)
}

//! One tick loop per active session.
//!
//! A worker starts when its session is allocated and stops by itself the
//! first time a tick leaves the session without alive players. Before exiting
//! it publishes the final snapshot (which unbinds every connection still
//! attached) and resets the slot so the registry can hand it out again.

use crate::connections::ConnectionTable;
use crate::publisher;
use crate::registry::SessionHandle;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct SessionWorker {
    index: usize,
    session: SessionHandle,
    connections: Arc<RwLock<ConnectionTable>>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SessionWorker {
    pub fn new(
        index: usize,
        session: SessionHandle,
        connections: Arc<RwLock<ConnectionTable>>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            index,
            session,
            connections,
            period,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Session {} worker started", self.index);
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick since it fires immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = self.shutdown.changed() => {
                    info!("Session {} worker stopping for shutdown", self.index);
                    return;
                }
            }

            let snapshot = {
                let mut session = self.session.lock().await;
                session.tick(self.period);
                session.state.clone()
            };

            let delivered = publisher::publish(&self.connections, &snapshot).await;
            debug!(
                "Session {} tick: {} alive, {} food, {} receivers",
                self.index, snapshot.player_count, snapshot.food_count, delivered
            );

            if !snapshot.running {
                self.session.lock().await.reset();
                info!(
                    "Session {} worker finished after {}s",
                    self.index, snapshot.elapsed_secs
                );
                return;
            }
        }
    }
}

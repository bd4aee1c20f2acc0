//! Async driver that keeps a [`ConnectionEngine`] connected and polled.
//!
//! # Loop shape (for beginners)
//!
//! ```text
//! every tick_interval:
//!   shutdown requested?        -> disconnect, return Ok
//!   token rejected?            -> return Err(TokenRejected)
//!   disconnected?              -> connect (at most once per reconnect_interval)
//!   otherwise                  -> engine.poll()
//! ```
//!
//! The engine itself never sleeps or spawns; all timing lives here.

use std::future::Future;
use std::time::Duration;

use pinwire_core::ConnectionEngine;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::transport::Connector;

/// Why [`Runner::run`] stopped without being asked to.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    /// Reconnecting is pointless until the token is changed.
    #[error("the broker rejected the auth token")]
    TokenRejected,
}

/// Owns an engine and a way to open transports for it.
pub struct Runner<C> {
    engine: ConnectionEngine,
    connector: C,
    tick_interval: Duration,
    reconnect_interval: Duration,
}

impl<C: Connector> Runner<C> {
    pub fn new(engine: ConnectionEngine, connector: C, server: &ServerConfig) -> Self {
        Self {
            engine,
            connector,
            tick_interval: server.tick_interval(),
            reconnect_interval: server.reconnect_interval(),
        }
    }

    pub fn engine(&self) -> &ConnectionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ConnectionEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> ConnectionEngine {
        self.engine
    }

    /// Drives the engine until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::TokenRejected`] as soon as the broker refuses the
    /// token; the engine is left disconnected.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), RunError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_attempt: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if self.engine.token_rejected() {
                error!("stopping: the broker rejected the auth token");
                return Err(RunError::TokenRejected);
            }

            if self.engine.state().is_active() {
                if let Err(e) = self.engine.poll() {
                    warn!("connection lost: {e}");
                }
                continue;
            }

            let now = Instant::now();
            if next_attempt.is_some_and(|at| now < at) {
                continue;
            }
            next_attempt = Some(now + self.reconnect_interval);
            self.attempt_connect().await;
        }

        self.engine.disconnect();
        Ok(())
    }

    async fn attempt_connect(&mut self) {
        debug!("opening transport");
        match self.connector.connect().await {
            Ok(transport) => {
                if let Err(e) = self.engine.connect(transport) {
                    warn!("connect failed: {e}");
                }
            }
            Err(e) => warn!(
                retry_in_ms = self.reconnect_interval.as_millis() as u64,
                "could not reach broker: {e}"
            ),
        }
    }
}

impl<C> std::fmt::Debug for Runner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("engine", &self.engine)
            .field("tick_interval", &self.tick_interval)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish_non_exhaustive()
    }
}

//! pinwire client entry point.
//!
//! Loads the configuration, installs logging, registers a few logging
//! handlers and keeps the device connected until Ctrl-C.
//!
//! ```text
//! pinwire-client [CONFIG]      # CONFIG defaults to ./pinwire.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pinwire_client::config::{DEFAULT_CONFIG_PATH, TOKEN_ENV_VAR};
use pinwire_client::{load_config, Runner, SystemClock, TcpConnector};
use pinwire_core::events::{ANY_VIRTUAL_WRITE, CONNECTED, DISCONNECTED};
use pinwire_core::{ConnectionEngine, Event};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config =
        load_config(&path).with_context(|| format!("loading {}", path.display()))?;
    config.apply_token_override(std::env::var(TOKEN_ENV_VAR).ok());

    // RUST_LOG wins over the file's log_level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    config.validate()?;
    info!(server = %config.server.address(), "pinwire client starting");

    // ── Engine and handlers ───────────────────────────────────────────────────
    let mut engine = ConnectionEngine::new(config.engine.clone(), SystemClock::new());
    engine
        .on(CONNECTED, |event, _| {
            if let Event::Connected { ping_ms } = event {
                info!(ping_ms, "broker session ready");
            }
            Ok(())
        })
        .on(DISCONNECTED, |_, _| {
            warn!("broker session lost");
            Ok(())
        })
        .on(ANY_VIRTUAL_WRITE, |event, _| {
            if let Event::VirtualWrite { pin, values } = event {
                info!(pin = %pin, ?values, "virtual pin write");
            }
            Ok(())
        });

    // ── Run until Ctrl-C ──────────────────────────────────────────────────────
    let connector = TcpConnector::new(&config.server);
    let mut runner = Runner::new(engine, connector, &config.server);
    runner
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("could not listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("pinwire client stopped");
    Ok(())
}

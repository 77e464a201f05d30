//! Termination signals turned into a cancellation token

use crate::errors::Result;
#[cfg(not(unix))]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{signal as unix_signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// The handlers are registered before this returns, so a signal arriving
/// at any later point is observed instead of killing the process.
pub fn spawn_signal_listener(token: CancellationToken) -> Result<JoinHandle<()>> {
    let mut signals = Signals::install()?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            name = signals.recv() => {
                info!("Received {}, initiating graceful shutdown", name);
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    }))
}

#[cfg(unix)]
struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: unix_signal(SignalKind::interrupt())?,
            terminate: unix_signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match signal::ctrl_c().await {
            Ok(()) => "Ctrl+C",
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending().await
            }
        }
    }
}

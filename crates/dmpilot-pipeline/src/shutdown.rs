// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shutdown signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel a [`CancellationToken`] that the
//! HTTP server and the worker pool both watch. Queued batches are drained
//! by [`WorkerPool::join`](crate::worker::WorkerPool::join).

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a token that is cancelled when either signal arrives. If the
/// SIGTERM handler cannot be installed, only Ctrl+C is watched.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, watching Ctrl+C only");
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = sigterm.recv() => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT (Ctrl+C), initiating shutdown"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

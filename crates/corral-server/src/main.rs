//! Corral control-plane server.
//!
//! Boots the execution substrate from environment configuration, starts
//! the background loops, and runs until SIGINT/SIGTERM/SIGHUP triggers a
//! graceful shutdown. Protocol front-ends attach to the plane's
//! dispatcher; this binary owns process lifecycle and exit codes.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use corral_core::config::Config;
use corral_core::plane::ControlPlane;

fn init_tracing(config: &Config) {
    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "corral_core=info,corral_server=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Logging may not be configured yet; write plainly too.
            eprintln!("fatal: {err}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config);

    let plane = ControlPlane::builder(config).build();
    plane.start();
    info!("control plane running; waiting for shutdown signal");

    if let Err(err) = wait_for_signal().await {
        error!(error = %err, "signal handling failed");
        plane.shutdown().await;
        return ExitCode::from(1);
    }

    plane.shutdown().await;
    info!("bye");
    ExitCode::SUCCESS
}

/// Wait for SIGINT, SIGTERM or SIGHUP.
async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received"),
            _ = terminate.recv() => info!("SIGTERM received"),
            _ = hangup.recv() => info!("SIGHUP received"),
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("ctrl-c received");
        Ok(())
    }
}

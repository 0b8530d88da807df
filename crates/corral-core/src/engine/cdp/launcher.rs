//! Engine process launching.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tempfile::TempDir;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, LaunchOptions};

/// Common Chromium paths on different platforms.
const CHROMIUM_PATHS: &[&str] = &[
    // Linux
    "chromium",
    "chromium-browser",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// A launched engine process and its endpoint.
pub struct LaunchedProcess {
    /// The OS process.
    pub child: Child,
    /// Browser-level CDP WebSocket URL.
    pub ws_url: String,
    /// Isolated user-data directory, removed on drop.
    pub user_data: TempDir,
}

/// Resolve the engine executable.
fn resolve_executable(options: &LaunchOptions) -> Result<PathBuf, EngineError> {
    if let Some(path) = &options.executable {
        return Ok(path.clone());
    }
    for candidate in CHROMIUM_PATHS {
        let path = PathBuf::from(candidate);
        if path.is_absolute() {
            if path.exists() {
                return Ok(path);
            }
        } else if which(candidate) {
            return Ok(path);
        }
    }
    Err(EngineError::Launch(
        "no Chromium executable found; set an explicit path".to_string(),
    ))
}

fn which(name: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(name).exists())
    })
}

/// Launch an engine process and wait for its DevTools endpoint.
///
/// The endpoint is read from the process stderr line
/// `DevTools listening on ws://...`, which Chromium prints once the
/// debugging socket is bound.
///
/// # Errors
///
/// Returns an error when the executable is missing, the process fails to
/// start, or the endpoint does not appear within the launch timeout.
pub async fn launch(options: &LaunchOptions) -> Result<LaunchedProcess, EngineError> {
    let executable = resolve_executable(options)?;
    let user_data = TempDir::with_prefix("corral-engine-")?;

    let mut command = Command::new(&executable);
    command
        .arg("--remote-debugging-port=0")
        .arg(format!("--user-data-dir={}", user_data.path().display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--mute-audio");
    if options.headless {
        command.arg("--headless=new");
    }
    for arg in &options.args {
        command.arg(arg);
    }
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

    debug!(executable = %executable.display(), "launching engine process");
    let mut child = command
        .spawn()
        .map_err(|e| EngineError::Launch(format!("spawn failed: {e}")))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Launch("engine stderr not captured".to_string()))?;

    // Chromium prints the endpoint early; scan stderr on a blocking thread.
    let scan = tokio::task::spawn_blocking(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines() {
            let line = line.ok()?;
            if let Some(rest) = line.strip_prefix("DevTools listening on ") {
                return Some(rest.trim().to_string());
            }
        }
        None
    });

    let ws_url = match timeout(options.launch_timeout, scan).await {
        Ok(Ok(Some(url))) => url,
        Ok(Ok(None)) => {
            let _ = child.kill();
            return Err(EngineError::Launch(
                "engine exited before reporting its DevTools endpoint".to_string(),
            ));
        }
        Ok(Err(join_err)) => {
            let _ = child.kill();
            return Err(EngineError::Launch(format!("stderr scan failed: {join_err}")));
        }
        Err(_) => {
            warn!("engine did not come up within the launch timeout");
            let _ = child.kill();
            return Err(EngineError::Timeout {
                what: "engine launch".to_string(),
            });
        }
    };

    info!(ws_url = %ws_url, pid = child.id(), "engine process launched");
    Ok(LaunchedProcess {
        child,
        ws_url,
        user_data,
    })
}

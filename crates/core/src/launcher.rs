//! Browser process launch: executable discovery, port selection, spawn with
//! a deterministic headless configuration, and DevTools endpoint probing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{Error, Result};

/// How the browser process is launched.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    /// Explicit browser executable; discovered from well-known locations
    /// when absent.
    pub browser_path: Option<PathBuf>,
    /// Fixed remote-debugging port; an ephemeral free port when absent.
    pub port: Option<u16>,
}

/// A launched browser process, exclusively owned by its session.
pub(crate) struct BrowserProcess {
    child: Child,
    pub(crate) port: u16,
    // Keeps the throwaway profile alive for the browser's lifetime.
    _profile_dir: tempfile::TempDir,
}

impl BrowserProcess {
    /// Terminates the process. Best-effort; the child is also killed on drop.
    pub(crate) async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| Error::Dispose(format!("failed to kill browser process: {e}")))
    }
}

/// Launches the browser and resolves the page target's WebSocket URL.
/// A partially started process is killed before any error propagates.
pub(crate) async fn launch(config: &LaunchConfig) -> Result<(BrowserProcess, String)> {
    let executable = match &config.browser_path {
        Some(path) => path.clone(),
        None => find_browser_executable().ok_or_else(|| {
            Error::Launch(
                "no Chrome/Chromium executable found; install one or pass an explicit path".into(),
            )
        })?,
    };
    let port = match config.port {
        Some(port) => port,
        None => pick_debugging_port()?,
    };
    let profile_dir = tempfile::tempdir()
        .map_err(|e| Error::Launch(format!("failed to create profile directory: {e}")))?;

    debug!(executable = %executable.display(), port, "launching browser");
    let child = Command::new(&executable)
        .arg("--headless")
        .arg("--disable-gpu")
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", profile_dir.path().display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::Launch(format!(
                "failed to launch browser at {}: {e}",
                executable.display()
            ))
        })?;

    let mut process = BrowserProcess {
        child,
        port,
        _profile_dir: profile_dir,
    };

    if let Err(err) = wait_for_endpoint(&mut process).await {
        let _ = process.kill().await;
        return Err(err);
    }

    match page_target_url(port).await {
        Ok(ws_url) => Ok((process, ws_url)),
        Err(err) => {
            let _ = process.kill().await;
            Err(err)
        }
    }
}

/// Polls `/json/version` until the endpoint answers, watching for an early
/// process exit. Bounded: launch is the one suspension point that may not
/// hang forever.
async fn wait_for_endpoint(process: &mut BrowserProcess) -> Result<()> {
    let client = probe_client()?;
    let url = format!("http://127.0.0.1:{}/json/version", process.port);
    let mut last_error = String::from("endpoint not reachable");

    for _ in 0..25 {
        tokio::time::sleep(Duration::from_millis(200)).await;

        if let Ok(Some(status)) = process.child.try_wait() {
            return Err(Error::Launch(format!(
                "browser exited before the debugging endpoint became available (status: {status})"
            )));
        }

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => last_error = format!("unexpected status {}", response.status()),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(Error::Connection(format!(
        "debugging endpoint not available on port {}: {last_error}",
        process.port
    )))
}

/// Subset of one entry in the `/json/list` target listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInfo {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    web_socket_debugger_url: Option<String>,
}

/// Resolves the WebSocket URL of the first page target.
async fn page_target_url(port: u16) -> Result<String> {
    let client = probe_client()?;
    let url = format!("http://127.0.0.1:{port}/json/list");
    let targets: Vec<TargetInfo> = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Connection(format!("failed to list targets on port {port}: {e}")))?
        .json()
        .await
        .map_err(|e| Error::Connection(format!("invalid target listing from port {port}: {e}")))?;

    first_page_target(&targets)
        .ok_or_else(|| Error::Connection(format!("no page target exposed on port {port}")))
}

fn first_page_target(targets: &[TargetInfo]) -> Option<String> {
    targets
        .iter()
        .find(|t| t.kind == "page")
        .and_then(|t| t.web_socket_debugger_url.clone())
}

fn probe_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(400))
        .build()
        .map_err(|e| Error::Connection(format!("failed to create probe client: {e}")))
}

/// Picks a free local port by binding an ephemeral listener and releasing it.
fn pick_debugging_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| Error::Launch(format!("no free local port for remote debugging: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Launch(format!("failed to read local port: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// Looks for a Chrome/Chromium executable: well-known install locations
/// first, then bare command names via PATH lookup.
fn find_browser_executable() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "google-chrome",
            "chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            "chrome",
            "msedge",
        ]
    } else {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    };

    candidates.iter().find_map(|c| resolve_candidate(c))
}

fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
    let path = Path::new(candidate);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    which::which(candidate).ok()
}

use crate::{HarvestError, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub fn find_chrome_executable() -> Result<PathBuf> {
    if let Some(path) = find_in_standard_locations() {
        return Ok(path);
    }

    if let Some(path) = find_in_path() {
        return Ok(path);
    }

    Err(HarvestError::LaunchFailed(
        "Could not find Chrome/Chromium executable. Please specify with --chrome-path".into(),
    ))
}

#[cfg(target_os = "macos")]
fn find_in_standard_locations() -> Option<PathBuf> {
    [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

#[cfg(target_os = "linux")]
fn find_in_standard_locations() -> Option<PathBuf> {
    [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

#[cfg(target_os = "windows")]
fn find_in_standard_locations() -> Option<PathBuf> {
    let fixed = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists());
    if fixed.is_some() {
        return fixed;
    }

    let local_app_data = std::env::var("LOCALAPPDATA").ok()?;
    let user_chrome = PathBuf::from(local_app_data)
        .join("Google")
        .join("Chrome")
        .join("Application")
        .join("chrome.exe");
    user_chrome.exists().then_some(user_chrome)
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn find_in_standard_locations() -> Option<PathBuf> {
    None
}

fn find_in_path() -> Option<PathBuf> {
    let binaries: &[&str] = if cfg!(windows) {
        &["chrome.exe", "chromium.exe"]
    } else {
        &["google-chrome", "chromium", "chromium-browser", "chrome"]
    };

    binaries.iter().find_map(|b| which::which(b).ok())
}

pub mod signal {
    use super::CancellationToken;

    /// Returns a token cancelled on the first Ctrl-C (or SIGTERM on unix).
    /// The run notices it at the next category or page boundary.
    pub fn cancel_on_interrupt() -> CancellationToken {
        let token = CancellationToken::new();
        let trigger = token.clone();

        tokio::spawn(async move {
            wait_for_interrupt().await;
            tracing::warn!("Interrupt received, finishing the current page and stopping...");
            trigger.cancel();
        });

        token
    }

    #[cfg(unix)]
    async fn wait_for_interrupt() {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            tokio::signal::ctrl_c().await.ok();
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_interrupt() {
        tokio::signal::ctrl_c().await.ok();
    }
}

//! Browser session management.

use std::env;
use std::path::PathBuf;
use std::process::Command;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use tokio::task::JoinHandle;

use loadcast_common::{LoadcastError, LoadcastResult};
use loadcast_spec_model::BrowserSpec;

/// Launch arguments every session gets, ahead of user extras.
const BASE_ARGS: &[&str] = &[
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-sync",
];

/// Binary names probed when nothing more specific is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Resolve the browser binary: the spec's explicit path first, then the
/// `CHROME_PATH` environment variable, then well-known binary names.
pub fn resolve_browser_executable(spec: &BrowserSpec) -> LoadcastResult<PathBuf> {
    if !spec.executable.is_empty() {
        let path = PathBuf::from(&spec.executable);
        if path.exists() {
            return Ok(path);
        }
        return Err(LoadcastError::browser(format!(
            "Browser executable not found: {}",
            spec.executable
        )));
    }

    if let Ok(chrome_path) = env::var("CHROME_PATH") {
        let path = PathBuf::from(&chrome_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(LoadcastError::browser(format!(
            "CHROME_PATH points to a missing file: {chrome_path}"
        )));
    }

    for candidate in BROWSER_CANDIDATES {
        if let Ok(output) = Command::new(candidate).arg("--version").output() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("Chrome") || stdout.contains("Chromium") {
                return Ok(PathBuf::from(candidate));
            }
        }
    }

    Err(LoadcastError::browser(
        "No browser executable found. Install Chrome or Chromium, or set CHROME_PATH.",
    ))
}

/// A running browser plus the handler task pumping its websocket.
///
/// The handler must be polled for the whole lifetime of the browser or
/// every command sent to it stalls, so it gets its own task the moment
/// the browser launches.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a browser with its window sized to the capture viewport.
    pub async fn launch(
        spec: &BrowserSpec,
        window_width: u32,
        window_height: u32,
    ) -> LoadcastResult<Self> {
        let executable = resolve_browser_executable(spec)?;
        tracing::info!(
            executable = %executable.display(),
            headless = spec.headless,
            window_width,
            window_height,
            "Launching browser"
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&executable)
            .window_size(window_width, window_height)
            .args(BASE_ARGS.iter().map(|arg| arg.to_string()))
            .args(spec.args.iter().cloned());
        if !spec.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| LoadcastError::browser(format!("Invalid browser configuration: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LoadcastError::browser(format!("Failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser handler event error");
                }
            }
            tracing::debug!("Browser handler stream ended");
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a blank page in the session.
    pub async fn new_page(&self) -> LoadcastResult<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| LoadcastError::browser(format!("Failed to open page: {e}")))
    }

    /// Close the browser and wait for the process to exit.
    pub async fn close(mut self) -> LoadcastResult<()> {
        self.browser
            .close()
            .await
            .map_err(|e| LoadcastError::browser(format!("Failed to close browser: {e}")))?;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "Browser did not exit cleanly");
        }
        self.handler_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_executable_must_exist() {
        let spec = BrowserSpec {
            executable: "/nonexistent/browser-binary".to_string(),
            ..BrowserSpec::default()
        };
        let err = resolve_browser_executable(&spec).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/browser-binary"));
    }

    #[test]
    fn explicit_executable_wins_over_probing() {
        // Any file that certainly exists works for the path check.
        let spec = BrowserSpec {
            executable: "/dev/null".to_string(),
            ..BrowserSpec::default()
        };
        let resolved = resolve_browser_executable(&spec).unwrap();
        assert_eq!(resolved, PathBuf::from("/dev/null"));
    }
}

//! Browser seam used by the recording session.
//!
//! Production sessions talk WebDriver (see [`crate::webdriver`]); tests
//! substitute an in-memory browser.

use std::path::Path;

use async_trait::async_trait;
use reel_common::error::{ReelError, ReelResult};

/// CSS selector matched once the visual has finished animating.
pub const SIGNAL_SELECTOR: &str = "body[data-rendering-over]";

/// Injected so the pointer never shows up in a capture.
pub const HIDE_CURSOR_SCRIPT: &str = "const style = document.createElement('style');\
style.innerHTML = '* { cursor: none !important; }';\
document.head.appendChild(style);";

/// Fixed browser window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Starts isolated browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, viewport: Viewport) -> ReelResult<Box<dyn BrowserSession>>;
}

/// One running browser instance.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> ReelResult<()>;

    /// Run a synchronous script in the page and return its result.
    async fn execute(&mut self, script: &str) -> ReelResult<serde_json::Value>;

    /// Whether an element matching `selector` is currently present.
    async fn element_present(&mut self, selector: &str) -> ReelResult<bool>;

    /// Shut the browser down. Must be safe to call after a failed step.
    async fn close(&mut self) -> ReelResult<()>;
}

/// Script that retitles the page so its window can be found on screen.
pub fn set_title_script(title: &str) -> ReelResult<String> {
    let literal = serde_json::to_string(title)?;
    Ok(format!("document.title = {literal};"))
}

/// Turn a visual reference into the URL the browser loads.
///
/// Network addresses are used as-is. Local files become `file://` URLs
/// carrying the recording length in milliseconds as `?duration=`, which
/// the page uses to time its own animation.
pub fn visual_url(reference: &str, recording_secs: f64) -> ReelResult<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(reference.to_string());
    }

    let path = Path::new(reference);
    if !path.is_file() {
        return Err(ReelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let absolute = std::fs::canonicalize(path)?;
    let millis = (recording_secs * 1000.0).round() as u64;
    Ok(format!("file://{}?duration={millis}", absolute.display()))
}

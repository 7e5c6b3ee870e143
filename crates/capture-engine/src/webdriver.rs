//! Minimal W3C WebDriver client driving Chrome through `chromedriver`.
//!
//! Each launch starts its own `chromedriver` on a free loopback port under
//! [`SupervisedProcess`], with a throwaway Chrome profile directory, so
//! sessions never share browser state.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner, SupervisedProcess};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::browser::{BrowserLauncher, BrowserSession, Viewport};

/// How long `chromedriver` gets to start answering `/status`.
const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Launches Chrome sessions via a private `chromedriver`.
pub struct ChromeDriverLauncher {
    runner: Arc<dyn ProcessRunner>,
    chromedriver: String,
    browser_binary: Option<PathBuf>,
    http: Client,
}

impl ChromeDriverLauncher {
    pub fn new(runner: Arc<dyn ProcessRunner>, chromedriver: impl Into<String>) -> ReelResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            runner,
            chromedriver: chromedriver.into(),
            browser_binary: None,
            http,
        })
    }

    pub fn from_config(runner: Arc<dyn ProcessRunner>, config: &AppConfig) -> ReelResult<Self> {
        let mut launcher = Self::new(runner, config.capture.chromedriver.clone())?;
        launcher.browser_binary = config.capture.browser_binary.clone();
        Ok(launcher)
    }

    pub fn with_browser_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.browser_binary = Some(binary.into());
        self
    }

    async fn wait_until_ready(&self, base: &str) -> ReelResult<()> {
        let poll = async {
            loop {
                let ready = match self.http.get(format!("{base}/status")).send().await {
                    Ok(response) => response
                        .json::<Value>()
                        .await
                        .ok()
                        .and_then(|body| body["value"]["ready"].as_bool())
                        .unwrap_or(false),
                    Err(_) => false,
                };
                if ready {
                    return;
                }
                tokio::time::sleep(DRIVER_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(DRIVER_READY_TIMEOUT, poll)
            .await
            .map_err(|_| {
                ReelError::timeout("chromedriver to become ready", DRIVER_READY_TIMEOUT.as_secs_f64())
            })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeDriverLauncher {
    async fn launch(&self, viewport: Viewport) -> ReelResult<Box<dyn BrowserSession>> {
        let port = free_port()?;
        let spec = CommandSpec::new(&self.chromedriver).arg(format!("--port={port}"));
        let mut driver = SupervisedProcess::start(self.runner.as_ref(), "chromedriver", &spec)
            .await?
            .with_grace(Duration::from_secs(2));

        let base = format!("http://127.0.0.1:{port}");
        if let Err(e) = self.wait_until_ready(&base).await {
            let _ = driver.shutdown().await;
            return Err(e);
        }

        let profile = tempfile::Builder::new().prefix("reel-chrome-").tempdir()?;
        let capabilities =
            chrome_capabilities(viewport, profile.path(), self.browser_binary.as_deref());
        let created = request(&self.http, Method::POST, &format!("{base}/session"), Some(capabilities)).await;
        let session_id = match created.and_then(|value| parse_session_id(&value)) {
            Ok(id) => id,
            Err(e) => {
                let _ = driver.shutdown().await;
                return Err(e);
            }
        };

        tracing::info!(port, session = %session_id, "Browser session started");
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            session_url: format!("{base}/session/{session_id}"),
            open: true,
            driver,
            _profile: profile,
        }))
    }
}

/// A live WebDriver session plus the driver process that owns it.
pub struct WebDriverSession {
    http: Client,
    session_url: String,
    open: bool,
    driver: SupervisedProcess,
    _profile: tempfile::TempDir,
}

impl WebDriverSession {
    // Borrows nothing from `self` across the await; the session is Send but not Sync.
    fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> impl Future<Output = ReelResult<Value>> + Send + 'static {
        let http = self.http.clone();
        let url = format!("{}/{path}", self.session_url);
        async move { request(&http, method, &url, body).await }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> ReelResult<()> {
        tracing::debug!(url, "Navigating");
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn execute(&mut self, script: &str) -> ReelResult<Value> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn element_present(&mut self, selector: &str) -> ReelResult<bool> {
        let body = json!({ "using": "css selector", "value": selector });
        match self.command(Method::POST, "element", Some(body)).await {
            Ok(_) => Ok(true),
            Err(ReelError::Browser { message }) if message.starts_with("no such element") => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) -> ReelResult<()> {
        let deleted = if self.open {
            self.open = false;
            request(&self.http, Method::DELETE, &self.session_url, None)
                .await
                .map(|_| ())
        } else {
            Ok(())
        };
        // The driver goes down even when the session delete failed.
        self.driver.shutdown().await?;
        tracing::debug!("Browser session closed");
        deleted
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

async fn request(
    http: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> ReelResult<Value> {
    let mut builder = http.request(method, url);
    if let Some(body) = body {
        builder = builder.json(&body);
    }
    let response = builder.send().await?;
    let status = response.status();
    let mut payload: Value = response.json().await?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(wire_error(status, value))
}

fn wire_error(status: StatusCode, value: Value) -> ReelError {
    match serde_json::from_value::<WireError>(value) {
        Ok(err) => ReelError::browser(format!("{}: {}", err.error, err.message)),
        Err(_) => ReelError::browser(format!("WebDriver request failed with HTTP {status}")),
    }
}

fn parse_session_id(value: &Value) -> ReelResult<String> {
    value["sessionId"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ReelError::browser("New session response carried no sessionId"))
}

fn chrome_capabilities(
    viewport: Viewport,
    profile: &std::path::Path,
    binary: Option<&std::path::Path>,
) -> Value {
    let mut options = json!({
        "args": [
            "--start-maximized",
            "--disable-gpu",
            format!("--window-size={},{}", viewport.width, viewport.height),
            format!("--user-data-dir={}", profile.display()),
        ],
    });
    if let Some(binary) = binary {
        options["binary"] = json!(binary.display().to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": options,
            }
        }
    })
}

fn free_port() -> ReelResult<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

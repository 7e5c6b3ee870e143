//! Recording session management.
//!
//! A [`RecordingSession`] shows one visual in a fresh browser and captures
//! the browser window until the page raises its `rendering-over` signal:
//!
//! ```text
//! Launching -> Navigated -> WaitingForSignal -> Completed | TimedOut | Errored -> Closed
//! ```
//!
//! Whatever happens after launch, the capture process is stopped and
//! reaped and the browser is closed before `record` returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reel_common::config::{AppConfig, TimingConfig};
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::ProcessRunner;
use reel_platform_linux::{resolve_window, WindowGeometry};

use crate::browser::{
    set_title_script, visual_url, BrowserLauncher, BrowserSession, Viewport, HIDE_CURSOR_SCRIPT,
    SIGNAL_SELECTOR,
};
use crate::pipeline::{validate_output_extension, CaptureSettings, ScreenCapture};

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Browser instance starting.
    Launching,
    /// Visual loaded.
    Navigated,
    /// Capture running, polling for the render-complete signal.
    WaitingForSignal,
    /// Signal seen.
    Completed,
    /// Signal never appeared.
    TimedOut,
    /// Any other failure.
    Errored,
    /// Capture stopped and browser closed.
    Closed,
}

/// Fixed parameters shared by every recording of a batch.
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub viewport: Viewport,
    /// Title injected into the page so its window can be located.
    pub window_title: String,
    pub xdotool: String,
    pub capture: CaptureSettings,
    /// Capture bound and signal timeout around the requested duration.
    pub timing: TimingConfig,
    pub page_settle: Duration,
    pub signal_poll_interval: Duration,
}

impl RecordingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            viewport: Viewport {
                width: config.capture.viewport_width,
                height: config.capture.viewport_height,
            },
            window_title: config.capture.window_title.clone(),
            xdotool: config.tools.xdotool.clone(),
            capture: CaptureSettings::from_config(config),
            timing: config.timing.clone(),
            page_settle: config.timing.page_settle(),
            signal_poll_interval: Duration::from_millis(250),
        }
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One visual to record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    /// Local page path or `http(s)` URL.
    pub visual: String,
    pub output: PathBuf,
    /// How long the visual should be shown, in seconds.
    pub duration_secs: f64,
    /// Overrides the configured capture frame rate.
    pub frame_rate: Option<u32>,
}

impl RecordingRequest {
    pub fn new(visual: impl Into<String>, output: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            visual: visual.into(),
            output: output.into(),
            duration_secs,
            frame_rate: None,
        }
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = Some(fps);
        self
    }
}

/// What a completed recording looked like.
#[derive(Debug, Clone)]
pub struct RecordingReport {
    pub output: PathBuf,
    pub geometry: WindowGeometry,
    pub elapsed: Duration,
    pub transitions: Vec<SessionState>,
}

/// Anything that can turn a visual into a video artifact.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, request: &RecordingRequest) -> ReelResult<RecordingReport>;
}

/// [`Recorder`] backed by a real browser and screen capture; every call
/// runs its own [`RecordingSession`].
pub struct BrowserRecorder {
    launcher: Arc<dyn BrowserLauncher>,
    runner: Arc<dyn ProcessRunner>,
    settings: RecordingSettings,
}

impl BrowserRecorder {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        runner: Arc<dyn ProcessRunner>,
        settings: RecordingSettings,
    ) -> Self {
        Self {
            launcher,
            runner,
            settings,
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }
}

#[async_trait]
impl Recorder for BrowserRecorder {
    async fn record(&self, request: &RecordingRequest) -> ReelResult<RecordingReport> {
        let mut session =
            RecordingSession::new(self.launcher.as_ref(), self.runner.as_ref(), &self.settings);
        session.record(request).await
    }
}

/// A single browser-driven recording.
pub struct RecordingSession<'a> {
    launcher: &'a dyn BrowserLauncher,
    runner: &'a dyn ProcessRunner,
    settings: &'a RecordingSettings,
    transitions: Vec<SessionState>,
}

impl<'a> RecordingSession<'a> {
    pub fn new(
        launcher: &'a dyn BrowserLauncher,
        runner: &'a dyn ProcessRunner,
        settings: &'a RecordingSettings,
    ) -> Self {
        Self {
            launcher,
            runner,
            settings,
            transitions: Vec::new(),
        }
    }

    /// Current state; `None` before `record` is called.
    pub fn state(&self) -> Option<SessionState> {
        self.transitions.last().copied()
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    /// Record `request.visual` to `request.output`.
    ///
    /// Invalid requests are rejected before anything is launched. On
    /// failure the partial output file is removed so a failed record leaves
    /// no video behind.
    pub async fn record(&mut self, request: &RecordingRequest) -> ReelResult<RecordingReport> {
        if !self.transitions.is_empty() {
            return Err(ReelError::capture("Recording session already used"));
        }
        validate_output_extension(&request.output)?;
        if !request.duration_secs.is_finite() || request.duration_secs <= 0.0 {
            return Err(ReelError::invalid_input(format!(
                "Recording duration must be positive, got {}",
                request.duration_secs
            )));
        }
        let url = visual_url(&request.visual, request.duration_secs)?;

        let started = Instant::now();
        tracing::info!(
            visual = %request.visual,
            output = %request.output.display(),
            duration_secs = request.duration_secs,
            "Recording visual"
        );

        self.enter(SessionState::Launching);
        let mut browser = match self.launcher.launch(self.settings.viewport).await {
            Ok(browser) => browser,
            Err(e) => {
                self.enter(SessionState::Errored);
                self.enter(SessionState::Closed);
                return Err(e);
            }
        };

        let mut capture = None;
        let outcome = self
            .drive(browser.as_mut(), &mut capture, &url, request)
            .await;
        self.enter(match &outcome {
            Ok(_) => SessionState::Completed,
            Err(ReelError::Timeout { .. }) => SessionState::TimedOut,
            Err(_) => SessionState::Errored,
        });

        let stopped = match capture.as_mut() {
            Some(capture) => capture.stop().await,
            None => Ok(()),
        };
        if let Err(e) = &stopped {
            tracing::warn!(error = %e, "Failed to stop screen capture cleanly");
        }
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser cleanly");
        }
        self.enter(SessionState::Closed);

        let result = outcome.and_then(|geometry| {
            stopped?;
            if !request.output.is_file() {
                return Err(ReelError::capture(format!(
                    "Screen capture produced no file at {}",
                    request.output.display()
                )));
            }
            Ok(geometry)
        });

        match result {
            Ok(geometry) => {
                let elapsed = started.elapsed();
                tracing::info!(
                    output = %request.output.display(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Recording complete"
                );
                Ok(RecordingReport {
                    output: request.output.clone(),
                    geometry,
                    elapsed,
                    transitions: self.transitions.clone(),
                })
            }
            Err(e) => {
                tracing::error!(
                    output = %request.output.display(),
                    error = %e,
                    states = ?self.transitions,
                    "Recording failed"
                );
                if request.output.exists() {
                    let _ = std::fs::remove_file(&request.output);
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        browser: &mut dyn BrowserSession,
        capture: &mut Option<ScreenCapture>,
        url: &str,
        request: &RecordingRequest,
    ) -> ReelResult<WindowGeometry> {
        browser.navigate(url).await?;
        self.enter(SessionState::Navigated);

        browser.execute(HIDE_CURSOR_SCRIPT).await?;
        browser
            .execute(&set_title_script(&self.settings.window_title)?)
            .await?;
        tokio::time::sleep(self.settings.page_settle).await;

        let geometry = resolve_window(
            self.runner,
            &self.settings.xdotool,
            &self.settings.window_title,
        )
        .await?;

        let mut capture_settings = self.settings.capture.clone();
        if let Some(fps) = request.frame_rate {
            capture_settings.frame_rate = fps;
        }
        let bound_secs = self.settings.timing.capture_bound_secs(request.duration_secs);
        *capture = Some(
            ScreenCapture::start(
                self.runner,
                &capture_settings,
                geometry,
                bound_secs,
                &request.output,
            )
            .await?,
        );

        self.enter(SessionState::WaitingForSignal);
        let timeout = self.settings.timing.signal_timeout(request.duration_secs);
        let wait = poll_signal(browser, self.settings.signal_poll_interval);
        match tokio::time::timeout(timeout, wait).await {
            Ok(signalled) => signalled?,
            Err(_) => {
                return Err(ReelError::timeout(
                    "rendering-over signal",
                    timeout.as_secs_f64(),
                ));
            }
        }
        tracing::debug!("Render-complete signal received");
        Ok(geometry)
    }

    fn enter(&mut self, state: SessionState) {
        tracing::trace!(?state, "Recording session state");
        self.transitions.push(state);
    }
}

async fn poll_signal(browser: &mut dyn BrowserSession, interval: Duration) -> ReelResult<()> {
    loop {
        if browser.element_present(SIGNAL_SELECTOR).await? {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use reel_common::process::CommandSpec;
    use reel_common::testing::{failed_output, stdout_output, MockRunner};

    #[derive(Default)]
    struct BrowserProbe {
        launches: AtomicUsize,
        polls: AtomicUsize,
        closed: AtomicBool,
        urls: Mutex<Vec<String>>,
        scripts: Mutex<Vec<String>>,
    }

    struct MockLauncher {
        probe: Arc<BrowserProbe>,
        /// Signal appears on this poll (1-based); never when `None`.
        signal_on_poll: Option<usize>,
    }

    struct MockBrowser {
        probe: Arc<BrowserProbe>,
        signal_on_poll: Option<usize>,
    }

    #[async_trait]
    impl BrowserLauncher for MockLauncher {
        async fn launch(&self, _viewport: Viewport) -> ReelResult<Box<dyn BrowserSession>> {
            self.probe.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockBrowser {
                probe: self.probe.clone(),
                signal_on_poll: self.signal_on_poll,
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for MockBrowser {
        async fn navigate(&mut self, url: &str) -> ReelResult<()> {
            self.probe.urls.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn execute(&mut self, script: &str) -> ReelResult<serde_json::Value> {
            self.probe.scripts.lock().unwrap().push(script.to_string());
            Ok(serde_json::Value::Null)
        }

        async fn element_present(&mut self, selector: &str) -> ReelResult<bool> {
            assert_eq!(selector, SIGNAL_SELECTOR);
            let n = self.probe.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(self.signal_on_poll.is_some_and(|at| n >= at))
        }

        async fn close(&mut self) -> ReelResult<()> {
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn window_runner() -> MockRunner {
        let sub = |spec: &CommandSpec, name: &str| spec.args.first().map(String::as_str) == Some(name);
        MockRunner::new()
            .on_run(move |s| sub(s, "search"), |_| Ok(stdout_output("42\n")))
            .on_run(
                move |s| sub(s, "getwindowgeometry"),
                |_| Ok(stdout_output("Window 42\n  Position: 0,0 (screen: 0)\n  Geometry: 1920x1080\n")),
            )
    }

    fn settings() -> RecordingSettings {
        RecordingSettings {
            page_settle: Duration::ZERO,
            ..RecordingSettings::default()
        }
    }

    fn fixture(dir: &Path) -> (String, PathBuf) {
        let visual = dir.join("comment_0000.html");
        std::fs::write(&visual, "<html><body></body></html>").unwrap();
        (visual.display().to_string(), dir.join("comment_0000.mp4"))
    }

    fn launcher(signal_on_poll: Option<usize>) -> (MockLauncher, Arc<BrowserProbe>) {
        let probe = Arc::new(BrowserProbe::default());
        (
            MockLauncher {
                probe: probe.clone(),
                signal_on_poll,
            },
            probe,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_completes_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());
        // Stands in for the file the encoder writes.
        std::fs::write(&output, b"").unwrap();

        let (launcher, probe) = launcher(Some(3));
        let runner = window_runner();
        let settings = settings();
        let mut session = RecordingSession::new(&launcher, &runner, &settings);

        let report = session
            .record(&RecordingRequest::new(visual, &output, 5.0))
            .await
            .unwrap();

        assert_eq!(
            report.transitions,
            vec![
                SessionState::Launching,
                SessionState::Navigated,
                SessionState::WaitingForSignal,
                SessionState::Completed,
                SessionState::Closed,
            ]
        );
        assert_eq!(probe.polls.load(Ordering::SeqCst), 3);
        assert!(probe.closed.load(Ordering::SeqCst));
        assert!(probe.urls.lock().unwrap()[0].ends_with("comment_0000.html?duration=5000"));

        let scripts = probe.scripts.lock().unwrap().clone();
        assert_eq!(scripts[0], HIDE_CURSOR_SCRIPT);
        assert_eq!(scripts[1], "document.title = \"Sample HTML\";");

        let spawns = runner.spawns();
        assert_eq!(spawns.len(), 1);
        let t = spawns[0].args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(spawns[0].args[t + 1], "6.0");

        let capture = &runner.children()[0];
        assert!(capture.terminated() && capture.reaped());
        assert!(output.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_signal_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());
        std::fs::write(&output, b"partial").unwrap();

        let (launcher, probe) = launcher(None);
        let runner = window_runner();
        let settings = settings();
        let mut session = RecordingSession::new(&launcher, &runner, &settings);

        let start = tokio::time::Instant::now();
        let err = session
            .record(&RecordingRequest::new(visual, &output, 5.0))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ReelError::Timeout { secs, .. } if secs == 15.0));
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed <= Duration::from_secs(15) + settings.signal_poll_interval);
        assert_eq!(
            session.transitions(),
            &[
                SessionState::Launching,
                SessionState::Navigated,
                SessionState::WaitingForSignal,
                SessionState::TimedOut,
                SessionState::Closed,
            ]
        );

        let capture = &runner.children()[0];
        assert!(capture.terminated());
        assert!(!capture.is_alive());
        assert!(probe.closed.load(Ordering::SeqCst));
        assert!(!output.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_capture_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());

        let (launcher, probe) = launcher(None);
        let runner = window_runner().ignore_terminate();
        let settings = settings();
        let mut session = RecordingSession::new(&launcher, &runner, &settings);

        assert!(session
            .record(&RecordingRequest::new(visual, &output, 1.0))
            .await
            .is_err());

        let capture = &runner.children()[0];
        assert!(capture.terminated());
        assert!(capture.killed());
        assert!(capture.reaped());
        assert!(probe.closed.load(Ordering::SeqCst));
        assert_eq!(session.state(), Some(SessionState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_window_closes_browser_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());

        let (launcher, probe) = launcher(Some(1));
        let runner = MockRunner::new().on_run(|_| true, |_| Ok(failed_output(1, "")));
        let settings = settings();
        let mut session = RecordingSession::new(&launcher, &runner, &settings);

        let err = session
            .record(&RecordingRequest::new(visual, &output, 2.0))
            .await
            .unwrap_err();

        assert!(matches!(err, ReelError::WindowNotFound { .. }));
        assert!(runner.spawns().is_empty());
        assert!(probe.closed.load(Ordering::SeqCst));
        assert_eq!(
            session.transitions(),
            &[
                SessionState::Launching,
                SessionState::Navigated,
                SessionState::Errored,
                SessionState::Closed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_signal_slack_times_out_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());

        let (launcher, probe) = launcher(None);
        let runner = window_runner();
        let mut settings = settings();
        settings.timing.signal_timeout_slack_secs = -60.0;
        let mut session = RecordingSession::new(&launcher, &runner, &settings);

        let err = session
            .record(&RecordingRequest::new(visual, &output, 5.0))
            .await
            .unwrap_err();

        assert!(matches!(err, ReelError::Timeout { secs, .. } if secs == 0.0));
        assert_eq!(session.state(), Some(SessionState::Closed));
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invalid_requests_launch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, _) = fixture(dir.path());
        let (launcher, probe) = launcher(Some(1));
        let runner = MockRunner::new();
        let settings = settings();

        let mut session = RecordingSession::new(&launcher, &runner, &settings);
        let err = session
            .record(&RecordingRequest::new(visual.clone(), dir.path().join("out.gif"), 3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::Unsupported { .. }));

        let mut session = RecordingSession::new(&launcher, &runner, &settings);
        let err = session
            .record(&RecordingRequest::new(
                dir.path().join("missing.html").display().to_string(),
                dir.path().join("out.mp4"),
                3.0,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::FileNotFound { .. }));

        let mut session = RecordingSession::new(&launcher, &runner, &settings);
        let err = session
            .record(&RecordingRequest::new(visual, dir.path().join("out.mp4"), 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::InvalidInput { .. }));

        assert_eq!(probe.launches.load(Ordering::SeqCst), 0);
        assert_eq!(runner.invocations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_rate_override_reaches_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (visual, output) = fixture(dir.path());
        std::fs::write(&output, b"").unwrap();

        let (launcher, _probe) = launcher(Some(1));
        let runner = Arc::new(window_runner());
        let recorder = BrowserRecorder::new(Arc::new(launcher), runner.clone(), settings());

        recorder
            .record(&RecordingRequest::new(visual, &output, 2.0).with_frame_rate(60))
            .await
            .unwrap();

        let args = &runner.spawns()[0].args;
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "60");
    }
}

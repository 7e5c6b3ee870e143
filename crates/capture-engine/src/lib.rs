//! CommentReel Capture Engine
//!
//! Records a rendered visual to a video file. A fresh browser shows the
//! visual, the browser window is located on screen, and an `x11grab`
//! encoder captures that region until the page signals it is done.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              RecordingSession                 │
//! │  ┌───────────────┐  ┌──────────────────────┐  │
//! │  │ BrowserSession│  │ ScreenCapture        │  │
//! │  │ (WebDriver)   │  │ (ffmpeg x11grab)     │  │
//! │  └───────┬───────┘  └──────────┬───────────┘  │
//! │          │ rendering-over      │              │
//! │          ▼                     ▼              │
//! │  ┌──────────────────────────────────────────┐ │
//! │  │        WorkDir: comment_NNNN.mp4         │ │
//! │  └──────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod pipeline;
pub mod session;
pub mod webdriver;

pub use browser::{BrowserLauncher, BrowserSession, Viewport};
pub use pipeline::{CaptureSettings, ScreenCapture};
pub use session::*;
pub use webdriver::ChromeDriverLauncher;

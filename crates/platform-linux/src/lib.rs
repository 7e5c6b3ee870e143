//! CommentReel Linux Platform Integration
//!
//! - **Display Detection:** which display server the session runs on
//! - **Window Geometry:** locating a browser window on screen by title
//!   so its region can be captured

pub mod display;
pub mod window;

pub use display::*;
pub use window::{resolve_window, WindowGeometry};

//! Display server detection.

use serde::Serialize;

/// Display server type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayServer {
    Wayland,
    X11,
    Unknown,
}

impl DisplayServer {
    /// Whether an X11 region grab and `xdotool` window lookup can work.
    ///
    /// Wayland sessions qualify only through XWayland, which shows up as a
    /// `DISPLAY` variable alongside `WAYLAND_DISPLAY`.
    pub fn supports_region_capture(self, x_display: Option<&str>) -> bool {
        match self {
            DisplayServer::X11 => true,
            DisplayServer::Wayland => x_display.is_some_and(|d| !d.is_empty()),
            DisplayServer::Unknown => false,
        }
    }
}

impl std::fmt::Display for DisplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DisplayServer::Wayland => "wayland",
            DisplayServer::X11 => "x11",
            DisplayServer::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    classify(
        std::env::var("WAYLAND_DISPLAY").ok().as_deref(),
        std::env::var("DISPLAY").ok().as_deref(),
    )
}

/// The X display the session exposes, if any.
pub fn x_display() -> Option<String> {
    std::env::var("DISPLAY").ok().filter(|d| !d.is_empty())
}

fn classify(wayland: Option<&str>, x11: Option<&str>) -> DisplayServer {
    if wayland.is_some_and(|d| !d.is_empty()) {
        DisplayServer::Wayland
    } else if x11.is_some_and(|d| !d.is_empty()) {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wayland_takes_precedence() {
        assert_eq!(classify(Some("wayland-0"), Some(":0")), DisplayServer::Wayland);
        assert_eq!(classify(None, Some(":0")), DisplayServer::X11);
        assert_eq!(classify(Some(""), None), DisplayServer::Unknown);
    }

    #[test]
    fn test_region_capture_needs_x() {
        assert!(DisplayServer::X11.supports_region_capture(None));
        assert!(DisplayServer::Wayland.supports_region_capture(Some(":1")));
        assert!(!DisplayServer::Wayland.supports_region_capture(None));
        assert!(!DisplayServer::Unknown.supports_region_capture(Some(":0")));
    }
}

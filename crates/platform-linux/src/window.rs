//! On-screen window lookup through `xdotool`.
//!
//! The capture region for a recording is the geometry of the browser window
//! carrying a known title. Lookup is two queries: `search --name` for the
//! window id, then `getwindowgeometry` for its position and size.

use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};
use serde::Serialize;

/// Window region in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    /// Same region with negative origins moved onto the screen edge.
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.max(0),
            y: self.y.max(0),
            ..self
        }
    }

    /// `WxH`, as used for capture sizes.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Find the window titled `title` and return its clamped geometry.
///
/// A window that cannot be found is [`ReelError::WindowNotFound`].
pub async fn resolve_window(
    runner: &dyn ProcessRunner,
    xdotool: &str,
    title: &str,
) -> ReelResult<WindowGeometry> {
    let search = CommandSpec::new(xdotool).args(["search", "--name", title]);
    let output = runner.run(&search).await?;
    // xdotool exits 1 with empty output when nothing matches.
    let Some(window_id) = parse_window_ids(&output.stdout).into_iter().next() else {
        tracing::warn!(title, stderr = %output.stderr.trim(), "Window not found");
        return Err(ReelError::WindowNotFound {
            title: title.to_string(),
        });
    };

    let query = CommandSpec::new(xdotool).args(["getwindowgeometry", window_id.as_str()]);
    let output = runner.run(&query).await?;
    if !output.success() {
        return Err(ReelError::WindowNotFound {
            title: title.to_string(),
        });
    }

    let raw = parse_geometry(&output.stdout).ok_or_else(|| {
        ReelError::capture(format!(
            "Unrecognised xdotool geometry output for window {window_id}: {}",
            output.stdout.trim()
        ))
    })?;
    let geometry = raw.clamped();
    tracing::debug!(
        window_id = %window_id,
        x = raw.x,
        y = raw.y,
        width = raw.width,
        height = raw.height,
        "Resolved window geometry"
    );
    Ok(geometry)
}

/// Window ids from `xdotool search` output, in the order listed.
pub fn parse_window_ids(stdout: &str) -> Vec<String> {
    stdout
        .split_whitespace()
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Parse `xdotool getwindowgeometry` output:
///
/// ```text
/// Window 62914567
///   Position: 10,-20 (screen: 0)
///   Geometry: 1920x1080
/// ```
pub fn parse_geometry(stdout: &str) -> Option<WindowGeometry> {
    let mut position = None;
    let mut size = None;

    for line in stdout.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Position:") {
            let coords = rest.trim().split(" (").next()?;
            let (x, y) = coords.split_once(',')?;
            position = Some((x.trim().parse().ok()?, y.trim().parse().ok()?));
        } else if let Some(rest) = line.strip_prefix("Geometry:") {
            let (w, h) = rest.trim().split_once('x')?;
            size = Some((w.trim().parse().ok()?, h.trim().parse().ok()?));
        }
    }

    let ((x, y), (width, height)) = (position?, size?);
    Some(WindowGeometry {
        x,
        y,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reel_common::testing::{failed_output, stdout_output, MockRunner};

    const SAMPLE: &str = "Window 62914567\n  Position: 10,-20 (screen: 0)\n  Geometry: 1920x1080\n";

    fn is_subcommand(spec: &CommandSpec, sub: &str) -> bool {
        spec.args.first().map(String::as_str) == Some(sub)
    }

    #[test]
    fn test_parse_geometry() {
        let geometry = parse_geometry(SAMPLE).unwrap();
        assert_eq!(
            geometry,
            WindowGeometry {
                x: 10,
                y: -20,
                width: 1920,
                height: 1080
            }
        );
        assert_eq!(geometry.clamped().y, 0);
        assert_eq!(geometry.size_arg(), "1920x1080");
    }

    #[test]
    fn test_parse_geometry_rejects_garbage() {
        assert!(parse_geometry("").is_none());
        assert!(parse_geometry("Position: a,b (screen: 0)\nGeometry: 1x1").is_none());
        assert!(parse_geometry("  Geometry: 800x600\n").is_none());
    }

    #[test]
    fn test_parse_window_ids() {
        assert_eq!(parse_window_ids("123\n456\n"), vec!["123", "456"]);
        assert!(parse_window_ids("").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_window_clamps() {
        let runner = MockRunner::new()
            .on_run(|s| is_subcommand(s, "search"), |_| Ok(stdout_output("777\n888\n")))
            .on_run(
                |s| is_subcommand(s, "getwindowgeometry"),
                |_| Ok(stdout_output("Window 777\n  Position: -4,-8 (screen: 0)\n  Geometry: 1280x720\n")),
            );

        let geometry = resolve_window(&runner, "xdotool", "Sample HTML").await.unwrap();
        assert_eq!(
            geometry,
            WindowGeometry {
                x: 0,
                y: 0,
                width: 1280,
                height: 720
            }
        );

        let runs = runner.runs();
        assert_eq!(runs[0].args, vec!["search", "--name", "Sample HTML"]);
        assert_eq!(runs[1].args, vec!["getwindowgeometry", "777"]);
    }

    #[tokio::test]
    async fn test_missing_window_is_reported() {
        let runner = MockRunner::new().on_run(|_| true, |_| Ok(failed_output(1, "")));
        let err = resolve_window(&runner, "xdotool", "Nope").await.unwrap_err();
        assert!(matches!(err, ReelError::WindowNotFound { ref title } if title == "Nope"));
        assert_eq!(runner.invocations(), 1);
    }

    proptest! {
        #[test]
        fn clamped_geometry_is_on_screen(x in -5000i32..5000, y in -5000i32..5000, w in 1u32..8000, h in 1u32..8000) {
            let text = format!("Window 1\n  Position: {x},{y} (screen: 0)\n  Geometry: {w}x{h}\n");
            let geometry = parse_geometry(&text).unwrap().clamped();
            prop_assert!(geometry.x >= 0 && geometry.y >= 0);
            prop_assert_eq!(geometry.x, x.max(0));
            prop_assert_eq!((geometry.width, geometry.height), (w, h));
        }
    }
}

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use log::{debug, warn};
use xcap::{Monitor, Window};

/// Take a screenshot of the game.
///
/// Captures the first window whose title contains `window_title`. Falls back to the primary
/// monitor if no title is given or no window matches.
pub fn capture_screenshot(window_title: Option<&str>) -> Result<RgbaImage> {
    if let Some(title) = window_title {
        match find_window(title)? {
            Some(window) => {
                debug!("Capturing window `{}`", window.title().unwrap_or_default());
                return window
                    .capture_image()
                    .with_context(|| format!("Failed to capture window `{title}`"));
            }
            None => warn!("No window titled `{title}` found, capturing the primary monitor"),
        }
    }

    let monitors = Monitor::all().context("Failed to list monitors")?;
    let monitor = monitors
        .iter()
        .find(|monitor| monitor.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .ok_or_else(|| anyhow!("No monitors detected"))?;

    monitor
        .capture_image()
        .context("Failed to capture the primary monitor")
}

fn find_window(title: &str) -> Result<Option<Window>> {
    let windows = Window::all().context("Failed to list windows")?;

    Ok(windows.into_iter().find(|window| {
        window
            .title()
            .map(|t| t.contains(title))
            .unwrap_or(false)
            && !window.is_minimized().unwrap_or(false)
    }))
}

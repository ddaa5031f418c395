//! Screenshot-as-wallpaper masking.
//!
//! While the player swaps files its window briefly disappears and the desktop
//! shows through. Capturing the paused first frame and installing it as the
//! desktop wallpaper makes that gap invisible.

use common::PortraitError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Where the current frame is captured from and stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameContext {
    /// Display index passed to the capture command
    pub display: u32,
    /// Directory the screenshot is written to
    pub directory: PathBuf,
}

/// Capture the visible frame and make it the desktop background
pub trait MaskingHook {
    async fn apply(&mut self, frame: &FrameContext) -> Result<(), PortraitError>;
}

/// External commands used by [`ShellMaskingHook`]
#[derive(Debug, Clone)]
pub struct MaskingCommands {
    /// Called as `<program> --display <n> --pngname <file>`
    pub capture_program: String,
    /// Called as `<program> --set-wallpaper=<file>`
    pub wallpaper_program: String,
    /// Value of `DISPLAY` for the wallpaper command
    pub x_display: String,
    pub screenshot_name: String,
}

/// Masking hook that shells out to a screenshot tool and the file manager
pub struct ShellMaskingHook {
    commands: MaskingCommands,
}

impl ShellMaskingHook {
    pub fn new(commands: MaskingCommands) -> Self {
        Self { commands }
    }

    fn screenshot_path(&self, frame: &FrameContext) -> PathBuf {
        frame.directory.join(&self.commands.screenshot_name)
    }

    async fn capture(&self, frame: &FrameContext, screenshot: &Path) -> Result<(), PortraitError> {
        let mut cmd = Command::new(&self.commands.capture_program);
        cmd.arg("--display")
            .arg(frame.display.to_string())
            .arg("--pngname")
            .arg(screenshot);
        run_quietly(cmd, &self.commands.capture_program).await
    }

    async fn set_wallpaper(&self, screenshot: &Path) -> Result<(), PortraitError> {
        let mut cmd = Command::new(&self.commands.wallpaper_program);
        cmd.env("DISPLAY", &self.commands.x_display)
            .arg(format!("--set-wallpaper={}", screenshot.display()));
        run_quietly(cmd, &self.commands.wallpaper_program).await
    }
}

impl MaskingHook for ShellMaskingHook {
    async fn apply(&mut self, frame: &FrameContext) -> Result<(), PortraitError> {
        let screenshot = self.screenshot_path(frame);
        log::debug!("Capturing display {} to {}", frame.display, screenshot.display());

        // Both commands always run, a failed capture does not skip the wallpaper
        let captured = self.capture(frame, &screenshot).await;
        let installed = self.set_wallpaper(&screenshot).await;

        match (captured, installed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(capture), Err(wallpaper)) => Err(PortraitError::MaskingHook(format!(
                "{}; {}",
                capture, wallpaper
            ))),
        }
    }
}

async fn run_quietly(mut cmd: Command, program: &str) -> Result<(), PortraitError> {
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| PortraitError::MaskingHook(format!("failed to run {}: {}", program, e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(PortraitError::MaskingHook(format!(
            "{} exited with {}",
            program, status
        )))
    }
}

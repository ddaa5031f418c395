use common::PortraitError;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

use crate::masking::FrameContext;

/// Glob used to find videos when none is given
pub const DEFAULT_VIDEO_PATTERN: &str = "*.mp4";
/// How many triggers play the same video before a new one is drawn
pub const DEFAULT_REPEAT_COUNT: NonZeroU64 = NonZeroU64::MIN;
/// Seconds between a trigger and the start of playback
pub const DEFAULT_PRE_PLAY_DELAY_SECS: u64 = 5;
/// Seconds after playback before the trigger is enabled again
pub const DEFAULT_REARM_DELAY_SECS: u64 = 20;
/// Seconds to wait before switching videos
pub const DEFAULT_PRE_ROTATE_DELAY_SECS: u64 = 10;

pub const DEFAULT_SCREEN_WIDTH: u32 = 1920;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1080;

pub const DEFAULT_SCREENSHOT_NAME: &str = "screen.png";
pub const DEFAULT_CAPTURE_DISPLAY: u32 = 0;
pub const DEFAULT_X_DISPLAY: &str = ":0";
pub const DEFAULT_CAPTURE_PROGRAM: &str = "raspi2png";
pub const DEFAULT_WALLPAPER_PROGRAM: &str = "pcmanfm";
pub const DEFAULT_PLAYER_PROGRAM: &str = "mpv";

/// Time the player gets to show its first frame before it is paused
pub const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Delays and repeat threshold of the trigger cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub pre_play_delay: Duration,
    pub rearm_delay: Duration,
    pub pre_rotate_delay: Duration,
    pub repeat_threshold: NonZeroU64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pre_play_delay: Duration::from_secs(DEFAULT_PRE_PLAY_DELAY_SECS),
            rearm_delay: Duration::from_secs(DEFAULT_REARM_DELAY_SECS),
            pre_rotate_delay: Duration::from_secs(DEFAULT_PRE_ROTATE_DELAY_SECS),
            repeat_threshold: DEFAULT_REPEAT_COUNT,
        }
    }
}

impl TimingConfig {
    /// Whether the given trigger count ends a repeat cycle
    pub fn rotates_on(&self, trigger_count: u64) -> bool {
        trigger_count % self.repeat_threshold.get() == 0
    }

    /// Plays left on the current video after the given trigger count
    pub fn repeats_left(&self, trigger_count: u64) -> u64 {
        let threshold = self.repeat_threshold.get();
        threshold - trigger_count % threshold
    }
}

/// Player window placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

impl DisplayGeometry {
    /// X11-style geometry string, e.g. `1920x1080+0+0`
    pub fn to_geometry_arg(&self) -> String {
        format!("{}x{}{:+}{:+}", self.width, self.height, self.x, self.y)
    }
}

/// Everything the controller needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub video_dir: PathBuf,
    pub pattern: String,
    pub timing: TimingConfig,
    pub frame: FrameContext,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    /// Never draw the video that just played when rotating
    pub avoid_immediate_repeat: bool,
}

impl ControllerSettings {
    pub fn validate(&self) -> Result<(), PortraitError> {
        if self.pattern.trim().is_empty() {
            return Err(PortraitError::InvalidConfig(
                "video pattern must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PortraitError::InvalidConfig(
                "motion poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn test_default_timing() {
        let timing = TimingConfig::default();
        assert_eq!(timing.pre_play_delay, Duration::from_secs(5));
        assert_eq!(timing.rearm_delay, Duration::from_secs(20));
        assert_eq!(timing.pre_rotate_delay, Duration::from_secs(10));
        assert_eq!(timing.repeat_threshold.get(), 1);
    }

    #[test]
    fn test_rotation_every_trigger_with_threshold_one() {
        let timing = TimingConfig {
            repeat_threshold: threshold(1),
            ..TimingConfig::default()
        };
        assert!((1..=20).all(|count| timing.rotates_on(count)));
    }

    #[test]
    fn test_rotation_period_three() {
        let timing = TimingConfig {
            repeat_threshold: threshold(3),
            ..TimingConfig::default()
        };
        let pattern: Vec<bool> = (1..=9).map(|count| timing.rotates_on(count)).collect();
        assert_eq!(
            pattern,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(timing.repeats_left(1), 2);
        assert_eq!(timing.repeats_left(2), 1);
    }

    #[test]
    fn test_rotation_iff_divisible() {
        for n in 1..=7 {
            let timing = TimingConfig {
                repeat_threshold: threshold(n),
                ..TimingConfig::default()
            };
            for count in 1..=50 {
                assert_eq!(timing.rotates_on(count), count % n == 0);
            }
        }
    }

    #[test]
    fn test_geometry_arg() {
        assert_eq!(DisplayGeometry::default().to_geometry_arg(), "1920x1080+0+0");

        let offset = DisplayGeometry {
            x: -10,
            y: 20,
            width: 800,
            height: 600,
        };
        assert_eq!(offset.to_geometry_arg(), "800x600-10+20");
    }

    #[test]
    fn test_settings_validation() {
        let settings = ControllerSettings {
            video_dir: PathBuf::from("."),
            pattern: DEFAULT_VIDEO_PATTERN.to_string(),
            timing: TimingConfig::default(),
            frame: FrameContext {
                display: DEFAULT_CAPTURE_DISPLAY,
                directory: PathBuf::from("."),
            },
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            settle_delay: STARTUP_SETTLE_DELAY,
            avoid_immediate_repeat: false,
        };
        assert!(settings.validate().is_ok());

        let empty_pattern = ControllerSettings {
            pattern: "  ".to_string(),
            ..settings.clone()
        };
        assert!(empty_pattern.validate().is_err());

        let zero_poll = ControllerSettings {
            poll_interval: Duration::ZERO,
            ..settings
        };
        assert!(zero_poll.validate().is_err());
    }
}

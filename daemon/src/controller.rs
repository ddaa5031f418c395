//! Trigger / playback / rearm state machine
//!
//! The controller owns the player and walks it through a fixed cycle every
//! time the motion sensor fires:
//!
//! ```text
//! Armed -> PrePlayDelay -> Playing -> RotateDecision -+-> RearmDelay -> Armed
//!                                                     |        ^
//!                                                     +-> PreRotateDelay
//! ```
//!
//! The player is paused on the first frame of the current video while armed,
//! and that frame is also the desktop wallpaper, so reloading the player to
//! switch videos never exposes the desktop.

use common::{MotionSensor, PortraitError};
use rand::rngs::StdRng;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::VideoCatalog;
use crate::config::{ControllerSettings, TimingConfig};
use crate::delay::Delay;
use crate::log_and_continue;
use crate::masking::{FrameContext, MaskingHook};
use crate::player::PlaybackEngine;

/// Granularity of the logged countdowns
const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Polling the sensor, player paused on the first frame
    Armed,
    PrePlayDelay,
    Playing,
    RotateDecision,
    PreRotateDelay,
    /// Cooldown before the sensor is polled again
    RearmDelay,
}

impl ControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::PrePlayDelay => "pre-play delay",
            Self::Playing => "playing",
            Self::RotateDecision => "rotate decision",
            Self::PreRotateDelay => "pre-rotate delay",
            Self::RearmDelay => "rearm delay",
        }
    }
}

/// Collaborators the controller drives besides the player
pub struct Peripherals<M, H, D> {
    pub sensor: M,
    pub hook: H,
    pub delay: D,
}

pub struct Controller<M, E, H, D> {
    timing: TimingConfig,
    catalog: VideoCatalog,
    /// Video currently loaded in the player
    selection: PathBuf,
    /// Triggers since startup
    trigger_count: u64,
    state: ControllerState,
    frame: FrameContext,
    poll_interval: Duration,
    avoid_immediate_repeat: bool,
    rng: StdRng,
    engine: E,
    sensor: M,
    hook: H,
    delay: D,
}

impl<M, E, H, D> Controller<M, E, H, D>
where
    M: MotionSensor,
    E: PlaybackEngine,
    H: MaskingHook,
    D: Delay,
{
    /// Build the catalog, open the player on a random video and arm
    ///
    /// `open_engine` is only called once the catalog is known to be non-empty.
    pub async fn start<F, Fut>(
        settings: ControllerSettings,
        mut rng: StdRng,
        peripherals: Peripherals<M, H, D>,
        open_engine: F,
    ) -> Result<Self, PortraitError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<E, PortraitError>>,
    {
        settings.validate()?;

        let catalog = VideoCatalog::build(&settings.video_dir, &settings.pattern)?;
        catalog.log_listing();

        let selection = catalog.select_random(&mut rng, None).to_path_buf();
        log::info!("Selected video: {}", selection.display());

        let engine = open_engine(selection.clone()).await?;
        let Peripherals {
            sensor,
            hook,
            delay,
        } = peripherals;

        let mut controller = Self {
            timing: settings.timing,
            catalog,
            selection,
            trigger_count: 0,
            state: ControllerState::Armed,
            frame: settings.frame,
            poll_interval: settings.poll_interval,
            avoid_immediate_repeat: settings.avoid_immediate_repeat,
            rng,
            engine,
            sensor,
            hook,
            delay,
        };

        if let Err(e) = controller.arm(settings.settle_delay).await {
            controller.release().await;
            return Err(e);
        }

        Ok(controller)
    }

    /// Park the player on the first frame and mask the desktop with it
    async fn arm(&mut self, settle: Duration) -> Result<(), PortraitError> {
        if !settle.is_zero() {
            self.delay.sleep(settle).await;
        }
        self.engine.pause().await?;
        self.engine.set_position(0.0).await?;
        self.mask().await;

        self.state = ControllerState::Armed;
        log::info!("Ready!");
        Ok(())
    }

    /// Run until `shutdown` resolves or a fatal error occurs
    ///
    /// The player is released in both cases. An operator shutdown is reported
    /// as [`PortraitError::Interrupted`].
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<(), PortraitError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Interrupt received, releasing player");
                    break Err(PortraitError::Interrupted);
                }
                stepped = self.step() => {
                    if let Err(e) = stepped {
                        log::error!("Controller stopped in state '{}': {}", self.state.name(), e);
                        break Err(e);
                    }
                }
            }
        };

        self.release().await;
        result
    }

    /// Execute the current state's action and move to the next state
    pub async fn step(&mut self) -> Result<ControllerState, PortraitError> {
        let next = match self.state {
            ControllerState::Armed => self.poll_motion().await,
            ControllerState::PrePlayDelay => {
                let delay = self.timing.pre_play_delay;
                self.countdown("Waiting before playback", delay).await;
                self.engine.play().await?;
                log::info!("Playing!");
                ControllerState::Playing
            }
            ControllerState::Playing => {
                self.play_through().await?;
                ControllerState::RotateDecision
            }
            ControllerState::RotateDecision => self.decide_rotation(),
            ControllerState::PreRotateDelay => {
                let delay = self.timing.pre_rotate_delay;
                self.countdown("Waiting before switching videos", delay).await;
                self.rotate().await?;
                ControllerState::RearmDelay
            }
            ControllerState::RearmDelay => {
                let delay = self.timing.rearm_delay;
                self.countdown("Waiting to rearm trigger", delay).await;
                log::info!("Ready!");
                ControllerState::Armed
            }
        };

        if next != self.state {
            log::debug!("State: {} -> {}", self.state.name(), next.name());
        }
        self.state = next;
        Ok(next)
    }

    async fn poll_motion(&mut self) -> ControllerState {
        if self.sensor.motion_detected() {
            self.trigger_count += 1;
            log::info!("Triggered! [count = {}]", self.trigger_count);
            ControllerState::PrePlayDelay
        } else {
            let interval = self.poll_interval;
            self.delay.sleep(interval).await;
            ControllerState::Armed
        }
    }

    /// Wait for the clip to end, then park it on its first frame again
    async fn play_through(&mut self) -> Result<(), PortraitError> {
        let clip = self.engine.duration().await?;
        log::debug!(
            "Waiting {:.1}s for {} to finish",
            clip.as_secs_f64(),
            self.selection.display()
        );
        self.delay.sleep(clip).await;

        self.engine.pause().await?;
        self.engine.set_position(0.0).await
    }

    fn decide_rotation(&self) -> ControllerState {
        if self.timing.rotates_on(self.trigger_count) {
            ControllerState::PreRotateDelay
        } else {
            log::info!(
                "Repeat video {} more times.",
                self.timing.repeats_left(self.trigger_count)
            );
            ControllerState::RearmDelay
        }
    }

    /// Draw the next video, load it paused and mask the desktop with it
    async fn rotate(&mut self) -> Result<(), PortraitError> {
        let exclude = self
            .avoid_immediate_repeat
            .then_some(self.selection.as_path());
        let next = self.catalog.select_random(&mut self.rng, exclude).to_path_buf();
        log::info!("Next video: {}", next.display());

        self.engine.load(&next, true).await?;
        self.selection = next;
        self.mask().await;
        Ok(())
    }

    async fn mask(&mut self) {
        log_and_continue!(
            self.hook.apply(&self.frame).await,
            "update masking wallpaper"
        );
    }

    async fn countdown(&mut self, phase: &str, total: Duration) {
        if total.is_zero() {
            return;
        }
        log::info!("{} ({}s)", phase, total.as_secs_f64());

        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(COUNTDOWN_STEP);
            remaining -= step;
            log::debug!("{}: {} more seconds", phase, remaining.as_secs());
            self.delay.sleep(step).await;
        }
    }

    async fn release(&mut self) {
        log_and_continue!(self.engine.quit().await, "release player");
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }

    pub fn selection(&self) -> &Path {
        &self.selection
    }
}

#[cfg(test)]
impl<M, E, H, D> Controller<M, E, H, D> {
    fn state(&self) -> ControllerState {
        self.state
    }

    fn engine(&self) -> &E {
        &self.engine
    }

    fn hook(&self) -> &H {
        &self.hook
    }

    fn delay(&self) -> &D {
        &self.delay
    }
}

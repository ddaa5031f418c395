mod catalog;
mod config;
mod controller;
mod delay;
mod macros;
mod masking;
mod player;

use anyhow::{Context, Result};
use clap::Parser;
use common::{PortraitError, SensorSettings};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ControllerSettings, DisplayGeometry, TimingConfig};
use crate::controller::{Controller, Peripherals};
use crate::delay::TokioDelay;
use crate::masking::{FrameContext, MaskingCommands, ShellMaskingHook};
use crate::player::{MpvEngine, MpvOptions, remove_socket};

#[derive(Parser)]
#[command(name = "living-portrait")]
#[command(about = "Play a random video whenever the motion sensor fires", long_about = None)]
#[command(version)]
struct Args {
    /// Directory containing the videos
    #[arg(long, env = "LIVING_PORTRAIT_VIDEO_DIR", default_value = ".")]
    video_dir: PathBuf,

    /// Glob pattern selecting videos inside the directory
    #[arg(long, default_value = config::DEFAULT_VIDEO_PATTERN)]
    pattern: String,

    /// Triggers per video before switching to another one
    #[arg(short, long, default_value_t = config::DEFAULT_REPEAT_COUNT)]
    repeat: NonZeroU64,

    /// Seconds between a trigger and the start of playback
    #[arg(long, default_value_t = config::DEFAULT_PRE_PLAY_DELAY_SECS)]
    pre_play_delay: u64,

    /// Seconds before the sensor is polled again after playback
    #[arg(long, default_value_t = config::DEFAULT_REARM_DELAY_SECS)]
    rearm_delay: u64,

    /// Seconds between the end of playback and switching videos
    #[arg(long, default_value_t = config::DEFAULT_PRE_ROTATE_DELAY_SECS)]
    pre_rotate_delay: u64,

    /// Never play the same video twice in a row when switching
    #[arg(long)]
    no_immediate_repeat: bool,

    /// Seed for video selection (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Player window width
    #[arg(long, default_value_t = config::DEFAULT_SCREEN_WIDTH)]
    width: u32,

    /// Player window height
    #[arg(long, default_value_t = config::DEFAULT_SCREEN_HEIGHT)]
    height: u32,

    #[arg(long, default_value_t = 0)]
    window_x: i32,

    #[arg(long, default_value_t = 0)]
    window_y: i32,

    /// Media player executable (must speak mpv's JSON IPC)
    #[arg(long, default_value = config::DEFAULT_PLAYER_PROGRAM)]
    player: String,

    /// Path of the player's IPC socket
    #[arg(long)]
    ipc_socket: Option<PathBuf>,

    /// Hold the last frame at the end of a clip instead of looping it
    #[arg(long)]
    no_loop: bool,

    /// Screen capture executable
    #[arg(long, default_value = config::DEFAULT_CAPTURE_PROGRAM)]
    capture_program: String,

    /// Wallpaper setter executable
    #[arg(long, default_value = config::DEFAULT_WALLPAPER_PROGRAM)]
    wallpaper_program: String,

    /// Display index passed to the capture program
    #[arg(long, default_value_t = config::DEFAULT_CAPTURE_DISPLAY)]
    capture_display: u32,

    /// X display the wallpaper setter runs against
    #[arg(long, default_value = config::DEFAULT_X_DISPLAY)]
    x_display: String,

    /// Screenshot file name, written to the working directory
    #[arg(long, default_value = config::DEFAULT_SCREENSHOT_NAME)]
    screenshot: String,

    /// BCM pin the PIR sensor is wired to
    #[arg(long, default_value_t = common::DEFAULT_PIR_PIN)]
    pin: u8,

    /// Number of sensor samples averaged together
    #[arg(long, default_value_t = common::DEFAULT_QUEUE_LEN)]
    queue_len: usize,

    /// Sensor samples per second
    #[arg(long, default_value_t = common::DEFAULT_SAMPLE_RATE)]
    sample_rate: f64,

    /// Fraction of high samples that counts as motion
    #[arg(long, default_value_t = common::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Milliseconds between sensor polls while armed
    #[arg(long, default_value_t = config::DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    log::info!("Starting Living Portrait v{}", env!("CARGO_PKG_VERSION"));

    let timing = TimingConfig {
        pre_play_delay: Duration::from_secs(args.pre_play_delay),
        rearm_delay: Duration::from_secs(args.rearm_delay),
        pre_rotate_delay: Duration::from_secs(args.pre_rotate_delay),
        repeat_threshold: args.repeat,
    };
    let geometry = DisplayGeometry {
        x: args.window_x,
        y: args.window_y,
        width: args.width,
        height: args.height,
    };
    let sensor_settings = SensorSettings {
        pin: args.pin,
        queue_len: args.queue_len,
        sample_rate: args.sample_rate,
        threshold: args.threshold,
    };
    let working_dir = std::env::current_dir().context("Failed to read working directory")?;

    log::info!("  Videos: {} ({})", args.video_dir.display(), args.pattern);
    log::info!(
        "  Timing: pre-play {}s, pre-rotate {}s, rearm {}s",
        args.pre_play_delay,
        args.pre_rotate_delay,
        args.rearm_delay
    );
    log::info!("  Repeat each video {} time(s)", args.repeat);
    log::info!(
        "  Sensor: pin {}, {} samples at {}Hz, threshold {}",
        sensor_settings.pin,
        sensor_settings.queue_len,
        sensor_settings.sample_rate,
        sensor_settings.threshold
    );
    log::info!("  Window: {}", geometry.to_geometry_arg());

    let settings = ControllerSettings {
        video_dir: args.video_dir,
        pattern: args.pattern,
        timing,
        frame: FrameContext {
            display: args.capture_display,
            directory: working_dir,
        },
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        settle_delay: config::STARTUP_SETTLE_DELAY,
        avoid_immediate_repeat: args.no_immediate_repeat,
    };

    let sensor = common::open_pir(&sensor_settings).context("Failed to open PIR sensor")?;
    let hook = ShellMaskingHook::new(MaskingCommands {
        capture_program: args.capture_program,
        wallpaper_program: args.wallpaper_program,
        x_display: args.x_display,
        screenshot_name: args.screenshot,
    });

    let mut mpv_options = MpvOptions::new(args.player, geometry);
    if let Some(socket) = args.ipc_socket {
        mpv_options.socket_path = socket;
    }
    mpv_options.looping = !args.no_loop;
    let socket_path = mpv_options.socket_path.clone();

    let rng = args
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    let peripherals = Peripherals {
        sensor,
        hook,
        delay: TokioDelay,
    };

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // Dropping a half-started controller kills the player but leaves its socket
    let mut controller = tokio::select! {
        started = Controller::start(settings, rng, peripherals, move |path: PathBuf| async move {
            MpvEngine::spawn(&path, &mpv_options).await
        }) => started.context("Failed to start")?,
        _ = &mut shutdown => {
            log::info!("Interrupted during startup");
            log_and_continue!(remove_socket(&socket_path), "remove player socket");
            return Ok(());
        }
    };

    match controller.run_until(&mut shutdown).await {
        Ok(()) | Err(PortraitError::Interrupted) => {
            log::info!(
                "Stopped after {} trigger(s), last video: {}",
                controller.trigger_count(),
                controller.selection().display()
            );
            Ok(())
        }
        Err(e) => Err(e).context("Playback stopped"),
    }
}

/// Resolves on SIGTERM or SIGINT
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Failed to set up signal handlers ({}), using Ctrl+C only", e);
                log_and_continue!(tokio::signal::ctrl_c().await, "wait for Ctrl+C");
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            log::info!("Received SIGINT, shutting down...");
        }
    }
}

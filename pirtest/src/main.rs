use anyhow::{Context, Result};
use clap::Parser;
use common::{MotionSensor, SensorSettings};
use std::io::Write;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pir-test")]
#[command(about = "Show the smoothed PIR sensor value to tune detection", long_about = None)]
#[command(version)]
struct Cli {
    /// BCM pin the sensor is wired to
    #[arg(short, long, default_value_t = common::DEFAULT_PIR_PIN)]
    pin: u8,

    /// Number of samples averaged together
    #[arg(short, long, default_value_t = common::DEFAULT_QUEUE_LEN)]
    queue_len: usize,

    /// Samples per second
    #[arg(short, long, default_value_t = common::DEFAULT_SAMPLE_RATE)]
    sample_rate: f64,

    /// Fraction of high samples that counts as motion
    #[arg(short, long, default_value_t = common::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Display refresh interval in milliseconds
    #[arg(short, long, default_value_t = 500)]
    refresh_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.refresh_ms == 0 {
        anyhow::bail!("Refresh interval must be greater than zero");
    }

    let settings = SensorSettings {
        pin: cli.pin,
        queue_len: cli.queue_len,
        sample_rate: cli.sample_rate,
        threshold: cli.threshold,
    };
    let sensor = common::open_pir(&settings).context("Failed to open PIR sensor")?;

    log::info!(
        "Watching pin {} ({} samples at {}Hz, threshold {}), Ctrl+C to stop",
        settings.pin,
        settings.queue_len,
        settings.sample_rate,
        settings.threshold
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.refresh_ms));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => print_reading(&sensor)?,
        }
    }

    println!();
    Ok(())
}

fn print_reading(sensor: &impl MotionSensor) -> Result<()> {
    let line = format_reading(sensor.value(), sensor.motion_detected());

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "\r{}", line)?;
    stdout.flush()?;
    Ok(())
}

/// One status line, padded so a shorter line fully overwrites a longer one
fn format_reading(value: Option<f64>, active: bool) -> String {
    let value = match value {
        Some(v) => format!("value = {:.2}", v),
        None => "value = --  (filling sample queue)".to_string(),
    };
    let prefix = if active { "[MOTION DETECTED!] " } else { "" };
    format!("{:<54}", format!("{}{}", prefix, value))
}

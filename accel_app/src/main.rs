//! ADXL355 acquisition daemon for a Linux host.
//!
//! Opens the I2C character device, brings the sensor up, then polls at a
//! fixed cadence and forwards converted samples to a time-series sink.

mod config;
mod sampler;
mod sink;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use adxl355::{Adxl355, CompatibleI2c, Odr, Range};
use clap::Parser;
use embedded_hal::delay::DelayNs;
use linux_embedded_hal::{Delay, I2cdev};
use log::{error, info, warn};

use config::CollectorConfig;
use sampler::{AccelSource, Sampler, SourceError, SystemClock};
use sink::{InfluxTcpSink, LogSink, Sink};

#[derive(Parser)]
#[command(
    name = "accel_app",
    about = "Polls an ADXL355 accelerometer over I2C and forwards samples to a time-series sink"
)]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long, default_value = "accel_app.json")]
    config: PathBuf,

    /// Override the sampling interval in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Log samples instead of sending them to the sink
    #[arg(long)]
    dry_run: bool,
}

/// Glue between the generic driver and the sampling loop: owns the device,
/// the requested configuration and the delay provider used during reset.
struct SensorSource<I2C, E, D> {
    dev: Adxl355<I2C, E>,
    range: Range,
    odr: Odr,
    delay: D,
}

impl<I2C, E, D> AccelSource for SensorSource<I2C, E, D>
where
    I2C: CompatibleI2c<E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    fn configure(&mut self) -> Result<(), SourceError> {
        self.dev
            .init(self.range, self.odr, &mut self.delay)
            .map_err(|e| SourceError::Fatal(format!("device init failed: {:?}", e)))?;
        info!(
            "ADXL355 configured: range {:?} ({} LSB/g)",
            self.range,
            self.dev.lsb_per_g() as u32
        );
        Ok(())
    }

    fn read_g(&mut self) -> Result<[f64; 3], SourceError> {
        match self.dev.read_accel() {
            Ok([x, y, z]) => Ok([x as f64, y as f64, z as f64]),
            Err(e) if e.is_transient() => Err(SourceError::Transient(format!("{:?}", e))),
            Err(e) => Err(SourceError::Fatal(format!("{:?}", e))),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match CollectorConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(interval) = args.interval {
        cfg.sample_interval_secs = interval;
        if let Err(e) = cfg.validate() {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    match run(cfg, args.dry_run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("collector stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: CollectorConfig, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let i2c = I2cdev::new(&cfg.i2c_bus)?;
    info!("opened {} (sensor at {:#04x})", cfg.i2c_bus, cfg.device_address);

    let source = SensorSource {
        dev: Adxl355::new(i2c, cfg.device_address),
        range: cfg.range.into(),
        odr: cfg.lowpass.into(),
        delay: Delay {},
    };

    let sink: Box<dyn Sink> = if dry_run {
        Box::new(LogSink)
    } else {
        Box::new(InfluxTcpSink::new(
            &cfg.sink_host,
            cfg.sink_port,
            Duration::from_secs_f64(cfg.write_timeout_secs),
        ))
    };

    let stop = Arc::new(AtomicBool::new(false));
    let mut sampler = Sampler::new(
        source,
        sink,
        SystemClock,
        Duration::from_secs_f64(cfg.sample_interval_secs),
        cfg.failure_budget,
        cfg.measurement.clone(),
        stop,
    );

    sampler.configure()?;
    let result = sampler.run();

    // Best effort: leave the part in standby on the way out.
    if let Err(e) = sampler.source_mut().dev.stop() {
        warn!("could not return sensor to standby: {:?}", e);
    }

    result.map_err(Into::into)
}

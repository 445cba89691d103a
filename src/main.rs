//! Motion Camera CLI
//!
//! Runs the motion detection scheduler against a simulated sensor, with
//! an optional intruder walking through the scene, and logs triggers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use motion_cam::{
    capture::MockSensor,
    config::FileConfig,
    device::{CapturedImage, CycleOutcome, EventSink, MotionCamera, TickReport},
    metrics::{MetricsRegistry, MetricsSnapshot, StatusReport},
    trigger::{Clock, SystemClock, TriggerEvent},
};
use rand_core::{OsRng, RngCore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "motion-cam", version, about = "Block-luminance motion detection on a simulated camera")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Persisted detection settings, overriding the config file.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Ticks to run (0 runs until Ctrl+C).
    #[arg(short = 'n', long, default_value_t = 0)]
    ticks: u64,

    /// Delay between ticks in milliseconds.
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Background luminance of the simulated scene.
    #[arg(long, default_value_t = 120)]
    level: u8,

    /// Sensor noise amplitude.
    #[arg(long, default_value_t = 4)]
    noise: u8,

    /// Noise seed. Drawn from the OS if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Send an intruder across the scene every N ticks (0 disables).
    #[arg(long, default_value_t = 30)]
    intruder_every: u64,

    /// Directory to write stored JPEG snapshots to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Metrics server port, overriding the config file (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,
}

/// Logs device events and optionally writes snapshots to disk.
struct LogSink {
    output_dir: Option<PathBuf>,
}

impl EventSink for LogSink {
    fn on_trigger(&mut self, event: &TriggerEvent) {
        info!(changed = event.changed_blocks, description = %event.description, "Motion detected");
    }

    fn on_notify(&mut self, event: &TriggerEvent, image_ok: bool) {
        info!(description = %event.description, image_ok, "Notification sent");
    }

    fn on_image(&mut self, image: &CapturedImage) {
        info!(index = image.index, reason = ?image.reason, bytes = image.jpeg.data().len(), "Image stored");
        let Some(dir) = &self.output_dir else {
            return;
        };
        let name = format!("{}-{:03}.jpg", Local::now().format("%Y%m%d-%H%M%S"), image.index);
        if let Err(e) = std::fs::write(dir.join(name), image.jpeg.data()) {
            warn!(error = %e, "Failed to write snapshot");
        }
    }

    fn on_sensor_input(&mut self, level: bool) {
        info!(level, "External sensor input");
    }
}

/// Moves an intruder rectangle across the simulated scene.
struct Intruder {
    every: u64,
    level: u8,
    background: u8,
}

impl Intruder {
    const STEPS: u64 = 6;

    fn paint(&self, sensor: &mut MockSensor, tick: u64, width: u32, height: u32) {
        sensor.fill_scene(self.background);
        if self.every == 0 {
            return;
        }
        let step = tick % self.every;
        if step >= Self::STEPS {
            return;
        }
        let w = width / 5;
        let h = height / 2;
        let x = (width - w) * step as u32 / (Self::STEPS as u32 - 1);
        sensor.paint_rect(x, height / 4, w, h, self.level);
    }
}

fn load_config(path: Option<&Path>) -> Result<FileConfig, motion_cam::ConfigError> {
    match path {
        Some(path) => FileConfig::from_file(path),
        None => Ok(FileConfig::default()),
    }
}

fn log_report(tick: u64, report: &TickReport) {
    match &report.cycle {
        CycleOutcome::Failed(e) if e.is_fatal() => error!(tick, error = %e, "Detection cycle failed"),
        CycleOutcome::Failed(e) => warn!(tick, error = %e, "Detection cycle failed"),
        CycleOutcome::Suppressed { changed, reason } => debug!(tick, changed, ?reason, "Trigger suppressed"),
        other => debug!(tick, outcome = ?other, "Cycle complete"),
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Motion Camera v{}", motion_cam::VERSION);

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if args.settings.is_some() {
        config.settings_path = args.settings.clone();
    }
    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create output directory: {}", e);
            std::process::exit(1);
        }
    }

    let seed = args.seed.unwrap_or_else(|| OsRng.next_u64());
    let sensor = MockSensor::new(config.capture.clone(), args.level)
        .with_noise(args.noise, seed)
        .with_exposure_response();
    let intruder = Intruder {
        every: args.intruder_every,
        level: args.level.saturating_add(90),
        background: args.level,
    };
    let (width, height) = (config.capture.frame_width, config.capture.frame_height);

    let sink = LogSink {
        output_dir: args.output_dir.clone(),
    };
    let mut camera = match MotionCamera::new(&config, sensor, SystemClock::new(), sink) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &config.settings_path {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let report = camera.load_persisted(&text);
                for rejected in &report.rejected {
                    warn!(setting = %rejected, "Persisted setting rejected, keeping default");
                }
            }
            Err(e) => info!(path = %path.display(), error = %e, "No persisted settings, using defaults"),
        }
    }

    if let Err(e) = camera.start() {
        eprintln!("Failed to start camera: {}", e);
        std::process::exit(1);
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    let metrics_port = args.metrics_port.unwrap_or(config.metrics.port);
    let publisher = MetricsPublisher::start(registry, metrics_port);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    }

    info!("Running motion detection, press Ctrl+C to stop");

    let tick_interval = Duration::from_millis(args.tick_ms);
    let mut tick: u64 = 0;
    while running.load(Ordering::SeqCst) && (args.ticks == 0 || tick < args.ticks) {
        intruder.paint(camera.driver_mut(), tick, width, height);
        let report = camera.tick(None);
        log_report(tick, &report);

        let snapshot = MetricsSnapshot::from_device(&camera);
        let status = camera.take_status();
        if tick % 10 == 0 || report.triggered().is_some() {
            info!("{}", status);
        }
        let fatal = matches!(&report.cycle, CycleOutcome::Failed(e) if e.is_fatal());
        publisher.publish(&snapshot, StatusReport::new(&status, !fatal));

        if fatal {
            error!("Camera unrecoverable, stopping");
            break;
        }

        tick += 1;
        camera.clock().sleep(tick_interval);
    }

    if let Some(path) = &config.settings_path {
        if let Err(e) = std::fs::write(path, camera.persisted()) {
            warn!(path = %path.display(), error = %e, "Failed to save settings");
        }
    }

    let counters = camera.counters();
    info!(
        ticks = tick,
        triggers = counters.triggers,
        images = counters.images_stored,
        "Done"
    );
}

/// Feeds the metrics registry, served over HTTP when the `metrics`
/// feature is enabled.
struct MetricsPublisher {
    #[cfg(feature = "metrics")]
    state: Option<(
        tokio::runtime::Runtime,
        Arc<tokio::sync::RwLock<motion_cam::metrics::MetricsState>>,
    )>,
    #[cfg(not(feature = "metrics"))]
    registry: MetricsRegistry,
}

impl MetricsPublisher {
    #[cfg(feature = "metrics")]
    fn start(registry: MetricsRegistry, port: u16) -> Self {
        use motion_cam::metrics::{MetricsServer, MetricsServerConfig};

        if port == 0 {
            return Self { state: None };
        }
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Failed to start metrics runtime");
                return Self { state: None };
            }
        };
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();
        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Metrics server stopped");
            }
        });
        Self {
            state: Some((runtime, state)),
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn start(registry: MetricsRegistry, port: u16) -> Self {
        if port != 0 {
            debug!(port, "Built without the metrics feature, not serving metrics");
        }
        Self { registry }
    }

    #[cfg(feature = "metrics")]
    fn publish(&self, snapshot: &MetricsSnapshot, report: StatusReport) {
        if let Some((_, state)) = &self.state {
            state.blocking_write().update(snapshot, report);
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn publish(&self, snapshot: &MetricsSnapshot, _report: StatusReport) {
        self.registry.update(snapshot);
    }
}

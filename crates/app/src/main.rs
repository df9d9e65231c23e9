use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use tethercast_app::cli::Cli;
use tethercast_app::config::Config;
use tethercast_app::dispatcher::Dispatcher;
use tethercast_device::{CaptureBackend, DeviceRef, Gphoto2Cli};
use tethercast_foundation::{exit, real_clock};
use tethercast_stream::{
    control_channel, CaptureWorker, Command, EncoderLauncher, ProcScanProbe, StreamStats,
    Supervisor, SupervisorConfig, WorkerConfig,
};

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "tethercast.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    // stdout stays clean for the menu; diagnostics go to stderr and the file.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        eprintln!("failed to initialize logging: {:#}", e);
    }
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "fatal error");
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let cfg = Config::load(cli.config.as_deref()).apply_cli(&cli);
    tracing::info!(?cfg, "starting tethercast");

    if !cfg.output_device.exists() {
        tracing::error!(
            sink = %cfg.output_device.display(),
            "output device missing (is the v4l2loopback module loaded?)"
        );
        return Ok(exit::NO_OUTPUT_SINK);
    }

    let backend: Arc<dyn CaptureBackend> = Arc::new(Gphoto2Cli::new());
    let Some(device) = discover_camera(backend.as_ref(), cfg.wait_for_device) else {
        tracing::error!("no camera detected");
        return Ok(exit::NO_DEVICE);
    };
    tracing::info!(model = %device.model, port = %device.port, "camera detected");

    let (control, endpoint) = control_channel();
    let stats = Arc::new(StreamStats::default());
    let worker_cfg = WorkerConfig {
        sink: cfg.output_device.clone(),
        width: cfg.width,
        height: cfg.height,
        preserve_aspect: cfg.preserve_aspect,
    };

    let spawner = {
        let backend = Arc::clone(&backend);
        let endpoint = endpoint.clone();
        let stats = Arc::clone(&stats);
        let worker_cfg = worker_cfg.clone();
        Box::new(move || {
            CaptureWorker::new(
                Arc::clone(&backend),
                EncoderLauncher::ffmpeg(),
                worker_cfg.clone(),
                endpoint.clone(),
            )
            .with_stats(Arc::clone(&stats))
            .spawn()
        })
    };

    let stop = Arc::new(AtomicBool::new(false));
    let supervisor = Supervisor::new(
        SupervisorConfig::new(cfg.output_device.clone(), cfg.idle_timeout()),
        real_clock(),
        Box::new(ProcScanProbe),
        control.clone(),
        spawner,
        Arc::clone(&stats),
    );
    let supervisor_thread = supervisor.spawn(Arc::clone(&stop))?;

    let mut dispatcher = Dispatcher::new(control.clone());
    dispatcher.run()?;

    // Quit: stop the watchdog first so the worker is not respawned, then
    // shut the worker down and wait briefly for its teardown acknowledgement.
    // The worker may already be gone (mid-respawn), so the wait is bounded.
    tracing::info!(frames = stats.frames(), respawns = stats.respawns(), "shutting down");
    stop.store(true, Ordering::SeqCst);
    let _ = supervisor_thread.join();
    let _ = control.send(Command::Shutdown);
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while std::time::Instant::now() < deadline {
        match control.try_take() {
            Some(tethercast_stream::Outcome::Done) => break,
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    Ok(exit::CLEAN)
}

/// Find the first camera; with `wait` set, poll until one appears.
fn discover_camera(backend: &dyn CaptureBackend, wait: bool) -> Option<DeviceRef> {
    loop {
        match backend.list_devices() {
            Ok(devices) => {
                if let Some(device) = devices.into_iter().next() {
                    return Some(device);
                }
            }
            Err(e) => tracing::warn!(error = %e, "camera enumeration failed"),
        }
        if !wait {
            return None;
        }
        tracing::info!("waiting for a camera to appear");
        std::thread::sleep(Duration::from_secs(2));
    }
}

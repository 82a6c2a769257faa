//! livedetect - run a detector against a live camera feed.
//!
//! 1. Opens the configured source and pumps frames into a single-slot buffer
//! 2. Loads the detector backend in the background
//! 3. Ticks the detection loop at the configured interval
//! 4. Prints the latest predictions until Ctrl-C or `--seconds` elapses
//!
//! With `--interactive`, pressing Enter toggles detection on and off.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use live_detect::{
    open_capture, ui, AppConfig, BackendRegistry, CaptureThread, DetectionLoop, DetectorSlot,
    LatestFrame, LoopState, ModelLoader, OverlayRenderer, OverlayStyle, ResultStore,
};

const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about = "Live camera object detection")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "LIVEDETECT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (default: run until Ctrl-C).
    #[arg(long)]
    seconds: Option<u64>,

    /// Read stdin; each Enter toggles detection on/off.
    #[arg(long)]
    interactive: bool,

    /// Write the final overlay to this PNG on exit.
    #[arg(long, value_name = "PATH")]
    save_overlay: Option<PathBuf>,

    /// How often to print the latest predictions, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    print_every_ms: u64,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

enum Command {
    Toggle,
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = AppConfig::load_from(args.config.as_deref())?;
    log::info!(
        "livedetect starting: source={} backend={} interval={:?}",
        cfg.source.url,
        cfg.detector.backend,
        cfg.detection.interval
    );

    let frames = LatestFrame::new();
    let pump = {
        let _stage = ui.stage("Connect camera");
        let capture = open_capture(&cfg.source)?;
        CaptureThread::spawn(capture, frames.clone(), cfg.source.target_fps)?
    };

    let slot = DetectorSlot::new();
    let registry = BackendRegistry::with_builtin();
    if !registry.contains(&cfg.detector.backend) {
        log::warn!(
            "unknown backend '{}'; available: {}",
            cfg.detector.backend,
            registry.list().join(", ")
        );
    }
    let loader = ModelLoader::spawn(registry, cfg.detector.clone(), slot.clone())?;
    let backend = {
        let _stage = ui.stage("Load detector");
        loader.wait(MODEL_LOAD_TIMEOUT)?
    };
    log::info!("detector ready: {}", backend);

    let renderer = Arc::new(Mutex::new(OverlayRenderer::new(OverlayStyle::from(
        &cfg.overlay,
    ))));
    let store = ResultStore::new();
    let detection_loop = DetectionLoop::new(
        Arc::new(frames),
        slot,
        Arc::clone(&renderer),
        store.clone(),
        &cfg.detection,
    )?;
    detection_loop.start()?;

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Command::Shutdown);
    })
    .context("error setting Ctrl-C handler")?;

    if args.interactive {
        let stdin_tx = tx.clone();
        std::thread::Builder::new()
            .name("stdin-toggle".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    if line.is_err() || stdin_tx.send(Command::Toggle).is_err() {
                        break;
                    }
                }
            })?;
        eprintln!("press Enter to start/stop detection");
    }
    drop(tx);

    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let print_every = Duration::from_millis(args.print_every_ms.max(1));
    let mut last_printed = 0u64;

    loop {
        match rx.recv_timeout(print_every) {
            Ok(Command::Shutdown) => {
                log::info!("shutdown signal received");
                break;
            }
            Ok(Command::Toggle) => match detection_loop.toggle() {
                Ok(LoopState::Running) => eprintln!("detection started"),
                Ok(LoopState::Idle) => eprintln!("detection stopped"),
                Err(err) => log::warn!("cannot toggle detection: {}", err),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let batch = store.current();
        if store.publications() > 0 && batch.sequence() != last_printed {
            last_printed = batch.sequence();
            println!("{}", ui::summarize(&batch));
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("run time elapsed");
            break;
        }
    }

    detection_loop.stop();
    if !detection_loop.wait_settled(SETTLE_TIMEOUT) {
        log::warn!("inference call still running after {:?}", SETTLE_TIMEOUT);
    }

    let batch = store.current();
    println!("Predictions:");
    for line in ui::prediction_lines(&batch) {
        println!("  {}", line);
    }

    if let Some(path) = &args.save_overlay {
        let renderer = renderer
            .lock()
            .map_err(|_| anyhow::anyhow!("overlay renderer lock poisoned"))?;
        renderer.save_png(path)?;
        log::info!("overlay written to {}", path.display());
    }

    let stats = detection_loop.stats();
    log::info!(
        "ticks={} dispatched={} skipped_busy={} skipped_not_ready={} completed={} failures={}",
        stats.ticks,
        stats.dispatched,
        stats.skipped_busy,
        stats.skipped_not_ready,
        stats.completed,
        stats.failures
    );

    // Grace was spent in the settle wait; a call still running is detached.
    if !detection_loop.shutdown(Duration::ZERO) {
        log::warn!("exiting with an inference call still running");
    }
    pump.stop();
    Ok(())
}

//! Terminal presentation: stage spinners and the prediction list.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::detect::{BatchOutcome, DetectionBatch};

const SPINNER_TICK: Duration = Duration::from_millis(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    /// `plain`, `pretty`, anything else is auto.
    pub fn parse(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "plain" => Self::Plain,
            "pretty" => Self::Pretty,
            _ => Self::Auto,
        }
    }
}

/// Stage reporter on stderr. Spinners only when stderr is a terminal.
#[derive(Clone, Copy, Debug)]
pub struct Ui {
    spinners: bool,
}

impl Ui {
    /// `stdout_piped` keeps auto mode plain when output is being captured.
    pub fn new(mode: UiMode, stderr_is_tty: bool, stdout_piped: bool) -> Self {
        let spinners = stderr_is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !stdout_piped,
                UiMode::Plain => false,
            };
        Self { spinners }
    }

    pub fn from_args(ui_flag: Option<&str>, stderr_is_tty: bool, stdout_piped: bool) -> Self {
        let mode = ui_flag.map_or(UiMode::Auto, UiMode::parse);
        Self::new(mode, stderr_is_tty, stdout_piped)
    }

    pub fn uses_spinners(&self) -> bool {
        self.spinners
    }

    /// Announce a long-running step; its duration is reported when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.spinners {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg} {elapsed}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(name.to_string());
            spinner.enable_steady_tick(SPINNER_TICK);
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        StageGuard {
            name: name.to_string(),
            started: Instant::now(),
            spinner,
        }
    }
}

pub struct StageGuard {
    name: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let line = format!("done: {} ({})", self.name, format_duration(self.started.elapsed()));
        match self.spinner.take() {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{}", line),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Lines for the "Predictions:" list, one per detection in batch order.
pub fn prediction_lines(batch: &DetectionBatch) -> Vec<String> {
    batch
        .detections()
        .iter()
        .map(|detection| detection.display_label())
        .collect()
}

/// One-line summary of a batch for the periodic status print.
pub fn summarize(batch: &DetectionBatch) -> String {
    if batch.outcome() == BatchOutcome::Failed {
        return format!("frame {}: inference failed", batch.sequence());
    }
    if batch.is_empty() {
        return format!("frame {}: no objects", batch.sequence());
    }
    format!(
        "frame {}: {}",
        batch.sequence(),
        prediction_lines(batch).join(", ")
    )
}

//! Console status display.
//!
//! `Plain` writes line-oriented progress to stderr; `Pretty` drives
//! `indicatif` bars on a TTY. Either way only confirmed statuses and counts
//! are shown.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::aggregate::OccupancyCounts;
use crate::detect::Phase;
use crate::engine::FrameReport;
use crate::report::RunSummary;
use crate::runner::StatusSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

pub struct ConsoleDisplay {
    pretty: bool,
    calibration: Option<ProgressBar>,
    status: Option<ProgressBar>,
    calibration_started: Option<Instant>,
    last_percent: Option<u32>,
    last_counts: Option<OccupancyCounts>,
    detecting: bool,
}

impl ConsoleDisplay {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !disable_pretty,
                UiMode::Plain => false,
            };
        Self {
            pretty,
            calibration: None,
            status: None,
            calibration_started: None,
            last_percent: None,
            last_counts: None,
            detecting: false,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Announces a setup step; completion is printed when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    fn show_calibration(&mut self, frame: u32, of: u32) {
        let started = *self.calibration_started.get_or_insert_with(Instant::now);
        if self.pretty {
            let bar = self.calibration.get_or_insert_with(|| {
                let bar = ProgressBar::new(of as u64);
                bar.set_draw_target(ProgressDrawTarget::stderr());
                let style = ProgressStyle::with_template("Initializing {bar:30} {percent:>3}%")
                    .unwrap_or_else(|_| ProgressStyle::default_bar());
                bar.set_style(style);
                bar
            });
            bar.set_position(frame as u64);
            return;
        }
        let percent = Phase::Calibrating { frame, of }.percent();
        if self.last_percent.map_or(true, |last| percent / 10 > last / 10) {
            eprintln!("Initializing: {}%", percent);
            self.last_percent = Some(percent);
        }
        if frame == of {
            eprintln!("✔ calibration ({})", format_duration(started.elapsed()));
        }
    }

    fn enter_detection(&mut self) {
        self.detecting = true;
        if let Some(bar) = self.calibration.take() {
            let elapsed = self
                .calibration_started
                .map(|t| t.elapsed())
                .unwrap_or_default();
            bar.finish_with_message(format!("✔ calibration ({})", format_duration(elapsed)));
        }
        if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            self.status = Some(spinner);
        } else {
            eprintln!("==> detecting");
        }
    }
}

impl StatusSink for ConsoleDisplay {
    fn on_frame(&mut self, report: &FrameReport) {
        match report.phase {
            Phase::Warmup { .. } => return,
            Phase::Calibrating { frame, of } => {
                self.show_calibration(frame, of);
                return;
            }
            Phase::Detecting => {
                if !self.detecting {
                    self.enter_detection();
                }
            }
        }

        let line = status_line(&report.counts, report.sensitivity);
        if let Some(spinner) = &self.status {
            for t in &report.transitions {
                spinner.println(format!("space {} {} -> {} at {:.2}s", t.label, t.from, t.to, t.at_s));
            }
            spinner.set_message(line);
            return;
        }
        for t in &report.transitions {
            eprintln!("space {} {} -> {} at {:.2}s", t.label, t.from, t.to, t.at_s);
        }
        if self.last_counts != Some(report.counts) {
            eprintln!("{line}");
            self.last_counts = Some(report.counts);
        }
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        if let Some(spinner) = self.status.take() {
            spinner.finish_with_message(status_line(&summary.counts, summary.sensitivity));
        }
        if let Some(bar) = self.calibration.take() {
            bar.abandon();
        }
        eprintln!("{summary}");
    }
}

/// One-line lot summary shown under the progress display.
pub fn status_line(counts: &OccupancyCounts, sensitivity: f64) -> String {
    format!(
        "Vacant: {}  Occupied: {}  Sensitivity: {:.1}",
        counts.vacant, counts.occupied, sensitivity
    )
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selection_follows_flag_and_tty() {
        assert!(ConsoleDisplay::from_args(Some("pretty"), true, true).is_pretty());
        assert!(!ConsoleDisplay::from_args(Some("pretty"), false, false).is_pretty());
        assert!(!ConsoleDisplay::from_args(Some("plain"), true, false).is_pretty());
        assert!(ConsoleDisplay::from_args(None, true, false).is_pretty());
        assert!(!ConsoleDisplay::from_args(Some("auto"), true, true).is_pretty());
    }

    #[test]
    fn status_line_matches_overlay() {
        let counts = OccupancyCounts {
            total: 5,
            vacant: 3,
            occupied: 2,
        };
        assert_eq!(
            status_line(&counts, 1.4),
            "Vacant: 3  Occupied: 2  Sensitivity: 1.4"
        );
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}

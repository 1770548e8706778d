//! Terminal output for the `trackview` binary.
//!
//! Stages print a spinner on a TTY and a plain `==>` line otherwise. While a session
//! runs, [`TerminalPresenter`] keeps the latest status line on the spinner.

use clap::ValueEnum;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::controller::SessionReport;
use crate::present::Presenter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    /// `TRACKVIEW_PLAIN` or `NO_COLOR` turn off the spinner in `Auto` mode.
    pub fn detect(mode: UiMode) -> Self {
        use std::io::IsTerminal;
        let disable_pretty = std::env::var_os("TRACKVIEW_PLAIN").is_some()
            || std::env::var_os("NO_COLOR").is_some();
        Self::new(mode, std::io::stderr().is_terminal(), disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Presenter for a session driven from the terminal.
    pub fn presenter(&self) -> TerminalPresenter {
        TerminalPresenter {
            spinner: self.use_pretty().then(spinner),
            frames: 0,
        }
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
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

/// Shows `frame N | FPS: ... | Detected: ...` on a spinner, or logs it at debug level
/// when the output is not a terminal.
pub struct TerminalPresenter {
    spinner: Option<ProgressBar>,
    frames: u64,
}

impl TerminalPresenter {
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }
}

impl Presenter for TerminalPresenter {
    fn frame(&mut self, frame_index: u64, _image: &RgbImage, status: &str) {
        self.frames += 1;
        match &self.spinner {
            Some(spinner) => spinner.set_message(format!("frame {} | {}", frame_index, status)),
            None => log::debug!("frame {}: {}", frame_index, status),
        }
    }

    fn status(&mut self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(message),
            None => log::info!("{}", message),
        }
    }

    fn finished(&mut self, report: &SessionReport) {
        let message = format!(
            "{} ({} frames processed)",
            report.status_text(),
            report.frames_processed
        );
        match self.spinner.take() {
            Some(spinner) => spinner.finish_with_message(message),
            None => log::info!("{}", message),
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

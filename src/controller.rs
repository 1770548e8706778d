//! Run controller.
//!
//! A [`Session`] is one processing pass: it owns the open frame source and the export
//! sinks, processes one frame per [`Session::step`] and releases everything in
//! [`Session::teardown`]. The [`Controller`] enforces that at most one session runs at a
//! time and drives sessions either on a background worker ([`Controller::start`]) or on
//! the calling thread ([`Controller::run_blocking`]).
//!
//! Only the thread driving a session ever releases its resources. `stop` merely raises a
//! flag that the loop checks before every frame.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

use crate::config::AppConfig;
use crate::detect::{Annotator, DefaultLoader, DetectorAdapter, ModelProfile};
use crate::error::PipelineError;
use crate::export::{ExportPaths, LogSink, VideoSink};
use crate::ingest::{FrameSource, SourceSelector};
use crate::present::Presenter;
use crate::summary::{FpsMeter, FrameSummary};

pub const STATUS_NO_SOURCE: &str = "No video source selected.";
pub const STATUS_NO_MODEL: &str = "No model loaded. Please select a model.";
pub const STATUS_ALREADY_RUNNING: &str = "Detection is already running.";
pub const STATUS_STOPPED: &str = "Detection stopped.";
pub const STATUS_FINISHED: &str = "Detection finished: end of video.";

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    StopRequested,
    EndOfStream,
    Failure,
    /// The stopped session has been collected; the controller may start again.
    Reset,
}

/// The lifecycle state machine. `None` means the event is not valid in `state`.
pub fn transition(state: Lifecycle, event: LifecycleEvent) -> Option<Lifecycle> {
    use Lifecycle::*;
    use LifecycleEvent::*;
    match (state, event) {
        (Idle, Start) => Some(Running),
        (Running, StopRequested | EndOfStream | Failure) => Some(Stopped),
        (Stopped, Reset) => Some(Idle),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Which exports a session writes. Fixed when the session starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub video: bool,
    pub log: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            video: true,
            log: true,
        }
    }
}

/// Result of one loop iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Processed(FrameSummary),
    EndOfStream,
    Failed(PipelineError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum EndReason {
    Stopped,
    EndOfStream,
    Failed(PipelineError),
}

impl EndReason {
    fn event(&self) -> LifecycleEvent {
        match self {
            EndReason::Stopped => LifecycleEvent::StopRequested,
            EndReason::EndOfStream => LifecycleEvent::EndOfStream,
            EndReason::Failed(_) => LifecycleEvent::Failure,
        }
    }
}

/// What a finished session did and released.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub source: String,
    pub end: EndReason,
    pub started_at: DateTime<Local>,
    pub frames_processed: u64,
    pub source_released: bool,
    pub video_path: Option<PathBuf>,
    pub video_frames: u64,
    pub log_path: Option<PathBuf>,
    pub log_lines: usize,
    /// Failures during teardown. Teardown keeps going past each one.
    pub teardown_errors: Vec<PipelineError>,
}

impl SessionReport {
    pub fn status_text(&self) -> String {
        match &self.end {
            EndReason::Stopped => STATUS_STOPPED.to_string(),
            EndReason::EndOfStream => STATUS_FINISHED.to_string(),
            EndReason::Failed(err) => format!("Detection failed: {}", err),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.end, EndReason::Failed(_)) && self.teardown_errors.is_empty()
    }
}

pub struct Session {
    state: Lifecycle,
    selector: SourceSelector,
    source: FrameSource,
    video: Option<VideoSink>,
    log: Option<LogSink>,
    started_at: DateTime<Local>,
    fps: FpsMeter,
    frames_processed: u64,
    report: Option<SessionReport>,
}

impl Session {
    /// Open the source and the enabled sinks. Output files are stamped with the
    /// session start time.
    pub fn open(selector: &SourceSelector, exports: ExportOptions, output_dir: &Path) -> Result<Self> {
        let mut source = FrameSource::open(selector)?;
        let started_at = Local::now();
        let paths = ExportPaths::new(output_dir, &started_at);

        if exports.video || exports.log {
            std::fs::create_dir_all(output_dir).map_err(|err| {
                PipelineError::SinkFailure(format!(
                    "create output directory {}: {}",
                    output_dir.display(),
                    err
                ))
            })?;
        }

        let video = if exports.video {
            match VideoSink::open(&paths.video, source.frame_size(), source.frame_rate()) {
                Ok(sink) => Some(sink),
                Err(err) => {
                    source.close();
                    return Err(err);
                }
            }
        } else {
            None
        };
        let log = exports.log.then(|| {
            log::info!("Session: writing log to {}", paths.log.display());
            LogSink::new(paths.log.clone())
        });

        let state = transition(Lifecycle::Idle, LifecycleEvent::Start)
            .ok_or_else(|| anyhow!("session cannot start"))?;
        Ok(Self {
            state,
            selector: selector.clone(),
            source,
            video,
            log,
            started_at,
            fps: FpsMeter::new(),
            frames_processed: 0,
            report: None,
        })
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Pull, infer, present and export one frame.
    pub fn step(&mut self, detector: &DetectorAdapter, presenter: &mut dyn Presenter) -> Step {
        if self.state != Lifecycle::Running {
            return Step::EndOfStream;
        }
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Step::EndOfStream,
            Err(err) => {
                return Step::Failed(PipelineError::classify(
                    &err,
                    PipelineError::FrameDecodeFailure,
                ))
            }
        };

        let inference = match detector.infer(&frame) {
            Ok(inference) => inference,
            Err(err) => {
                return Step::Failed(PipelineError::classify(&err, PipelineError::InferenceFailure))
            }
        };

        let fps = self.fps.tick(Instant::now());
        let summary = FrameSummary::new(
            frame.index,
            Local::now(),
            fps,
            &inference.detections,
            inference.model,
        );
        presenter.frame(frame.index, &inference.annotated, &summary.status_text());

        if let Some(video) = self.video.as_mut() {
            if let Err(err) = video.write(&inference.annotated) {
                return Step::Failed(PipelineError::classify(&err, PipelineError::SinkFailure));
            }
        }
        if let Some(log) = self.log.as_mut() {
            log.append(summary.log_line());
        }
        self.frames_processed += 1;
        Step::Processed(summary)
    }

    /// Release the source and close both sinks. Every step runs even when an earlier
    /// one fails. Calling it again returns the first report.
    pub fn teardown(&mut self, end: EndReason) -> SessionReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.source.close();
        let mut teardown_errors = Vec::new();

        let (video_path, video_frames) = match self.video.take() {
            Some(mut video) => {
                if let Err(err) = video.close() {
                    log::warn!("Session: {:#}", err);
                    teardown_errors.push(PipelineError::classify(&err, PipelineError::SinkFailure));
                }
                (Some(video.path().to_path_buf()), video.frames_written())
            }
            None => (None, 0),
        };

        let (log_path, log_lines) = match self.log.take() {
            Some(mut log) => {
                let lines = log.len();
                if let Err(err) = log.close() {
                    log::warn!("Session: {:#}", err);
                    teardown_errors.push(PipelineError::classify(&err, PipelineError::SinkFailure));
                }
                (Some(log.path().to_path_buf()), lines)
            }
            None => (None, 0),
        };

        self.state = transition(self.state, end.event()).unwrap_or(Lifecycle::Stopped);
        let report = SessionReport {
            source: self.selector.to_string(),
            end,
            started_at: self.started_at,
            frames_processed: self.frames_processed,
            source_released: !self.source.is_open(),
            video_path,
            video_frames,
            log_path,
            log_lines,
            teardown_errors,
        };
        log::info!(
            "Session: {} after {} frames",
            report.status_text(),
            report.frames_processed
        );
        self.report = Some(report.clone());
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.report.is_none() {
            self.teardown(EndReason::Stopped);
        }
    }
}

/// Step `session` until the stop flag is raised, the stream ends or a frame fails,
/// then tear it down. Shared by the worker and the blocking driver.
fn drive(
    mut session: Session,
    detector: &DetectorAdapter,
    presenter: &mut dyn Presenter,
    stop: &AtomicBool,
) -> SessionReport {
    let end = loop {
        if stop.load(Ordering::SeqCst) {
            break EndReason::Stopped;
        }
        match session.step(detector, presenter) {
            Step::Processed(_) => {}
            Step::EndOfStream => break EndReason::EndOfStream,
            Step::Failed(err) => {
                log::warn!("Session: frame failed ({}): {}", err.code(), err);
                break EndReason::Failed(err);
            }
        }
    };
    let report = session.teardown(end);
    presenter.status(&report.status_text());
    presenter.finished(&report);
    report
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

/// Why `start` or `run_blocking` did not start a session. `Display` is the status line.
#[derive(Clone, Debug, PartialEq)]
pub enum StartError {
    NoSource,
    NoModel,
    AlreadyRunning,
    Open(PipelineError),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::NoSource => f.write_str(STATUS_NO_SOURCE),
            StartError::NoModel => f.write_str(STATUS_NO_MODEL),
            StartError::AlreadyRunning => f.write_str(STATUS_ALREADY_RUNNING),
            StartError::Open(err) => write!(f, "Could not start detection: {}", err),
        }
    }
}

impl std::error::Error for StartError {}

/// Cloneable handle that asks the running session to stop, e.g. from a signal handler.
#[derive(Clone, Debug)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

pub struct Controller {
    detector: Arc<DetectorAdapter>,
    source: Option<SourceSelector>,
    exports: ExportOptions,
    output_dir: PathBuf,
    lifecycle: Arc<Mutex<Lifecycle>>,
    status: Arc<Mutex<String>>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<Option<SessionReport>>>,
    last_report: Option<SessionReport>,
}

impl Controller {
    pub fn new(detector: DetectorAdapter, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            detector: Arc::new(detector),
            source: None,
            exports: ExportOptions::default(),
            output_dir: output_dir.into(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Idle)),
            status: Arc::new(Mutex::new(String::new())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            last_report: None,
        }
    }

    /// Build the detector stack and export defaults from configuration. The configured
    /// profile, if any, is loaded here.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let annotator = match &config.label_font {
            Some(path) => Annotator::with_font_file(path)?,
            None => Annotator::new(),
        };
        let detector = DetectorAdapter::new(
            Box::new(DefaultLoader::with_thresholds(config.confidence, config.iou)),
            config.model_dir.clone(),
        )
        .with_annotator(annotator)
        .with_persist(config.persist_tracks);

        let mut controller = Self::new(detector, config.output_dir.clone());
        controller.exports = ExportOptions {
            video: config.export_video,
            log: config.export_log,
        };
        if let Some(profile) = config.profile {
            controller.load_profile(profile)?;
        }
        Ok(controller)
    }

    pub fn detector(&self) -> &Arc<DetectorAdapter> {
        &self.detector
    }

    pub fn select_source(&mut self, selector: SourceSelector) {
        log::info!("Controller: source set to {}", selector);
        let status = match &selector {
            SourceSelector::Device(_) => "Webcam selected.".to_string(),
            SourceSelector::File(path) => format!("Selected file: {}", path.display()),
            SourceSelector::Synthetic(url) => format!("Selected source: {}", url),
        };
        self.set_status(status);
        self.source = Some(selector);
    }

    pub fn select_webcam(&mut self) {
        self.select_source(SourceSelector::webcam());
    }

    /// Select a video file after checking it exists and has a known extension.
    pub fn select_file(&mut self, path: &Path) -> Result<()> {
        let selector = SourceSelector::File(path.to_path_buf());
        if let Err(err) = selector.validate() {
            self.set_status(format!("{}", err));
            return Err(err);
        }
        self.select_source(selector);
        Ok(())
    }

    pub fn source(&self) -> Option<&SourceSelector> {
        self.source.as_ref()
    }

    /// Load a profile's weights. Allowed while running; the next frame uses the new model.
    pub fn load_profile(&self, profile: ModelProfile) -> Result<String> {
        match self.detector.load_profile(profile) {
            Ok(name) => {
                self.set_status(format!("Loaded model: {}", profile.file_name()));
                Ok(name)
            }
            Err(err) => {
                self.set_status(format!("Failed to load {} model: {:#}", profile, err));
                Err(err)
            }
        }
    }

    /// Load an explicit weight location. Allowed while running.
    pub fn load_weights(&self, weights: &Path) -> Result<String> {
        match self.detector.load_weights(weights) {
            Ok(name) => {
                self.set_status(format!("Loaded model: {}", name));
                Ok(name)
            }
            Err(err) => {
                self.set_status(format!("Failed to load model: {:#}", err));
                Err(err)
            }
        }
    }

    /// Export choices for the next session. A running session keeps its own.
    pub fn set_export_video(&mut self, enabled: bool) {
        self.exports.video = enabled;
    }

    pub fn set_export_log(&mut self, enabled: bool) {
        self.exports.log = enabled;
    }

    pub fn exports(&self) -> ExportOptions {
        self.exports
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock_state(&self.lifecycle)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub fn status(&self) -> String {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    fn set_status(&self, message: impl Into<String>) {
        set_shared_status(&self.status, message.into());
    }

    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop_flag),
        }
    }

    /// Start a session on a background worker.
    ///
    /// The source and sinks are opened on the worker before this returns, so open
    /// failures are reported here and leave the controller idle.
    pub fn start(&mut self, presenter: Box<dyn Presenter>) -> Result<(), StartError> {
        self.poll();
        let selector = self.begin()?;

        let detector = Arc::clone(&self.detector);
        let lifecycle = Arc::clone(&self.lifecycle);
        let status = Arc::clone(&self.status);
        let stop = Arc::clone(&self.stop_flag);
        let exports = self.exports;
        let output_dir = self.output_dir.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), PipelineError>>(1);

        let spawned = std::thread::Builder::new()
            .name("trackview-session".to_string())
            .spawn(move || {
                let mut presenter = presenter;
                let session = match Session::open(&selector, exports, &output_dir) {
                    Ok(session) => session,
                    Err(err) => {
                        let _ = ready_tx.send(Err(PipelineError::classify(
                            &err,
                            PipelineError::SourceUnavailable,
                        )));
                        return None;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let report = drive(session, &detector, presenter.as_mut(), &stop);
                set_shared_status(&status, report.status_text());
                finish_lifecycle(&lifecycle, &report.end);
                Some(report)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let err = PipelineError::SourceUnavailable(format!("spawn session worker: {}", err));
                return Err(self.abort_start(err));
            }
        };

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(PipelineError::SourceUnavailable("session worker exited".to_string())));
        match ready {
            Ok(()) => {
                self.worker = Some(handle);
                log::info!("Controller: session started");
                Ok(())
            }
            Err(err) => {
                let _ = handle.join();
                Err(self.abort_start(err))
            }
        }
    }

    /// Run a whole session on the calling thread. Returns when the stream ends, a
    /// frame fails or a stop is requested through a [`StopHandle`].
    pub fn run_blocking(&mut self, presenter: &mut dyn Presenter) -> Result<SessionReport, StartError> {
        self.poll();
        let selector = self.begin()?;
        let session = match Session::open(&selector, self.exports, &self.output_dir) {
            Ok(session) => session,
            Err(err) => {
                let err = PipelineError::classify(&err, PipelineError::SourceUnavailable);
                return Err(self.abort_start(err));
            }
        };
        let report = drive(session, &self.detector, presenter, &self.stop_flag);
        self.set_status(report.status_text());
        finish_lifecycle(&self.lifecycle, &report.end);
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Check preconditions and move to `Running`.
    fn begin(&mut self) -> Result<SourceSelector, StartError> {
        let Some(selector) = self.source.clone() else {
            return Err(self.reject(StartError::NoSource));
        };
        if !self.detector.is_loaded() {
            return Err(self.reject(StartError::NoModel));
        }
        {
            let mut state = lock_state(&self.lifecycle);
            match transition(*state, LifecycleEvent::Start) {
                Some(next) => *state = next,
                None => {
                    drop(state);
                    return Err(self.reject(StartError::AlreadyRunning));
                }
            }
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        if let Err(err) = self.detector.reset_tracks() {
            log::warn!("Controller: {:#}", err);
        }
        self.set_status(format!("Running on {}", selector));
        Ok(selector)
    }

    fn reject(&self, rejection: StartError) -> StartError {
        log::warn!("Controller: start rejected: {}", rejection);
        self.set_status(rejection.to_string());
        rejection
    }

    /// Return to `Idle` after a session failed to open.
    fn abort_start(&mut self, err: PipelineError) -> StartError {
        *lock_state(&self.lifecycle) = Lifecycle::Idle;
        self.reject(StartError::Open(err))
    }

    /// Ask the running session to stop without waiting. No-op when idle.
    pub fn request_stop(&self) {
        if self.is_running() {
            log::info!("Controller: stop requested");
            self.stop_flag.store(true, Ordering::SeqCst);
        }
    }

    /// Stop the background session and wait for its teardown. No-op when idle.
    pub fn stop(&mut self) -> Option<SessionReport> {
        let worker = self.worker.take()?;
        self.stop_flag.store(true, Ordering::SeqCst);
        self.collect(worker)
    }

    /// Collect a background session that ended on its own (end of stream or failure).
    pub fn poll(&mut self) -> Option<SessionReport> {
        if !self.worker.as_ref().is_some_and(|worker| worker.is_finished()) {
            return None;
        }
        let worker = self.worker.take()?;
        self.collect(worker)
    }

    fn collect(&mut self, worker: JoinHandle<Option<SessionReport>>) -> Option<SessionReport> {
        match worker.join() {
            Ok(Some(report)) => {
                self.last_report = Some(report.clone());
                Some(report)
            }
            Ok(None) => None,
            Err(_) => {
                log::warn!("Controller: session worker panicked");
                *lock_state(&self.lifecycle) = Lifecycle::Idle;
                self.set_status("Detection failed: session worker panicked");
                None
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_state(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn finish_lifecycle(lifecycle: &Mutex<Lifecycle>, end: &EndReason) {
    let mut state = lock_state(lifecycle);
    let stopped = transition(*state, end.event()).unwrap_or(Lifecycle::Stopped);
    *state = transition(stopped, LifecycleEvent::Reset).unwrap_or(Lifecycle::Idle);
}

fn set_shared_status(status: &Mutex<String>, message: String) {
    if let Ok(mut current) = status.lock() {
        *current = message;
    }
}

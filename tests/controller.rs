use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::TempDir;

use trackview::controller::{
    Lifecycle, STATUS_FINISHED, STATUS_NO_MODEL, STATUS_NO_SOURCE, STATUS_STOPPED,
};
use trackview::detect::{DetectorBackend, StubLoader};
use trackview::export::{LOG_EXTENSION, LOG_PREFIX, VIDEO_PREFIX};
use trackview::present::ChannelPresenter;
use trackview::{
    Controller, Detection, DetectorAdapter, EndReason, Frame, LogPresenter, ModelProfile,
    PipelineError, SourceSelector, StartError,
};

const CLIP: &str = "stub://clip?frames=5&width=32&height=24";
const LIVE: &str = "stub://live?width=32&height=24";

fn controller(dir: &Path) -> Controller {
    let detector = DetectorAdapter::new(Box::new(StubLoader), "stub://models");
    Controller::new(detector, dir)
}

fn ready_controller(dir: &Path, source: &str) -> Result<Controller> {
    let mut controller = controller(dir);
    controller.load_profile(ModelProfile::LowEnd)?;
    controller.select_source(SourceSelector::parse(source)?);
    Ok(controller)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        files.push(entry?.path());
    }
    Ok(files)
}

/// Never detects anything.
struct BlindBackend;

impl DetectorBackend for BlindBackend {
    fn name(&self) -> &str {
        "blind"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

#[test]
fn finite_clip_runs_to_end_and_exports_both_files() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), CLIP)?;

    let report = controller.run_blocking(&mut LogPresenter::new())?;
    assert_eq!(report.end, EndReason::EndOfStream);
    assert_eq!(report.frames_processed, 5);
    assert!(report.source_released);
    assert!(report.is_success());
    assert_eq!(controller.status(), STATUS_FINISHED);
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);

    let video = report.video_path.expect("video exported");
    assert!(video.starts_with(dir.path()));
    assert!(video
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("video_")));
    assert!(std::fs::metadata(&video)?.len() > 0);
    assert_eq!(report.video_frames, 5);

    let log = report.log_path.expect("log exported");
    let lines = read_lines(&log)?;
    assert_eq!(lines.len(), 5);
    assert_eq!(report.log_lines, 5);
    for line in &lines {
        assert!(line.starts_with('['), "{}", line);
        assert_eq!(&line[10..16], " FPS: ");
        assert!(line.ends_with("| Detected: person (0.90)"), "{}", line);
    }
    Ok(())
}

#[test]
fn frames_without_detections_log_none() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = controller(dir.path());
    controller.detector().swap_backend(Box::new(BlindBackend))?;
    controller.select_source(SourceSelector::parse(CLIP)?);
    controller.set_export_video(false);

    let report = controller.run_blocking(&mut LogPresenter::new())?;
    assert_eq!(report.video_path, None);
    let lines = read_lines(&report.log_path.expect("log exported"))?;
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|line| line.ends_with("| Detected: None")));
    Ok(())
}

#[test]
fn disabled_exports_write_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), CLIP)?;
    controller.set_export_video(false);
    controller.set_export_log(false);

    let report = controller.run_blocking(&mut LogPresenter::new())?;
    assert_eq!(report.frames_processed, 5);
    assert_eq!(report.video_path, None);
    assert_eq!(report.log_path, None);
    assert!(files_in(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn start_then_stop_releases_everything() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), LIVE)?;

    controller.start(Box::new(LogPresenter::new()))?;
    assert!(controller.is_running());
    std::thread::sleep(Duration::from_millis(50));

    let report = controller.stop().expect("session report");
    assert_eq!(report.end, EndReason::Stopped);
    assert!(report.source_released);
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert_eq!(controller.status(), STATUS_STOPPED);

    let log = report.log_path.expect("log exported");
    assert!(log.exists());
    assert_eq!(read_lines(&log)?.len(), report.log_lines);
    assert_eq!(report.log_lines as u64, report.frames_processed);
    assert!(report.video_path.expect("video exported").exists());
    Ok(())
}

#[test]
fn stop_while_idle_is_a_no_op() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), LIVE)?;
    controller.request_stop();
    assert!(controller.stop().is_none());
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert!(files_in(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn second_start_is_rejected_while_running() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), LIVE)?;
    controller.start(Box::new(LogPresenter::new()))?;

    let second = controller.start(Box::new(LogPresenter::new()));
    assert_eq!(second, Err(StartError::AlreadyRunning));
    assert!(controller.is_running());

    let report = controller.stop().expect("session report");
    assert_eq!(report.end, EndReason::Stopped);
    Ok(())
}

#[test]
fn start_without_source_or_model_stays_idle() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = controller(dir.path());

    let err = controller.start(Box::new(LogPresenter::new()));
    assert_eq!(err, Err(StartError::NoSource));
    assert_eq!(controller.status(), STATUS_NO_SOURCE);
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);

    controller.select_source(SourceSelector::parse(CLIP)?);
    let err = controller.run_blocking(&mut LogPresenter::new());
    assert_eq!(err, Err(StartError::NoModel));
    assert_eq!(controller.status(), STATUS_NO_MODEL);
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert!(files_in(dir.path())?.is_empty());
    Ok(())
}

#[test]
fn unopenable_source_reports_source_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), CLIP)?;
    let missing = dir.path().join("missing.mp4");
    assert!(controller.select_file(&missing).is_err());

    controller.select_source(SourceSelector::File(missing));
    match controller.start(Box::new(LogPresenter::new())) {
        Err(StartError::Open(PipelineError::SourceUnavailable(_))) => {}
        other => panic!("unexpected start result: {:?}", other),
    }
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    Ok(())
}

#[test]
fn inference_failure_ends_the_session() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), CLIP)?;
    controller.load_weights(Path::new("stub://models/flaky.onnx?fail_at=2"))?;

    let report = controller.run_blocking(&mut LogPresenter::new())?;
    assert!(matches!(
        report.end,
        EndReason::Failed(PipelineError::InferenceFailure(_))
    ));
    assert_eq!(report.frames_processed, 2);
    assert!(report.source_released);
    assert_eq!(read_lines(&report.log_path.expect("log exported"))?.len(), 2);
    assert!(controller.status().starts_with("Detection failed: inference failure"));
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    Ok(())
}

#[test]
fn decode_failure_ends_the_session() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(
        dir.path(),
        "stub://clip?frames=5&width=32&height=24&fail_at=3",
    )?;
    let report = controller.run_blocking(&mut LogPresenter::new())?;
    assert!(matches!(
        report.end,
        EndReason::Failed(PipelineError::FrameDecodeFailure(_))
    ));
    assert_eq!(report.frames_processed, 3);
    Ok(())
}

#[test]
fn failed_model_load_keeps_previous_model() -> Result<()> {
    let dir = TempDir::new()?;
    let controller = ready_controller(dir.path(), CLIP)?;
    let before = controller.detector().model_name();

    let err = controller
        .load_weights(Path::new("stub://models/bad.onnx?confidence=7"))
        .unwrap_err();
    let typed = err.downcast_ref::<PipelineError>().expect("typed error");
    assert_eq!(typed.code(), "MODEL_LOAD_FAILURE");
    assert_eq!(controller.detector().model_name(), before);
    Ok(())
}

#[test]
fn model_swap_mid_session_switches_cleanly() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = controller(dir.path());
    controller.load_weights(Path::new("stub://models/a.onnx?label=alpha&delay_ms=2"))?;
    controller.select_source(SourceSelector::parse(LIVE)?);
    controller.set_export_video(false);

    let (presenter, receiver) = ChannelPresenter::channel(1);
    controller.start(Box::new(presenter))?;

    let wait_for = |label: &str| -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Ok(update) = receiver.frames.recv_timeout(Duration::from_millis(100)) {
                if update.status.contains(label) {
                    return true;
                }
            }
        }
        false
    };

    assert!(wait_for("alpha (0.90)"));
    controller.load_weights(Path::new("stub://models/b.onnx?label=beta&delay_ms=2"))?;
    assert!(wait_for("beta (0.90)"));
    let report = controller.stop().expect("session report");

    let lines = read_lines(&report.log_path.expect("log exported"))?;
    let first_beta = lines
        .iter()
        .position(|line| line.contains("beta"))
        .expect("beta frames logged");
    assert!(first_beta > 0);
    assert!(lines[..first_beta].iter().all(|line| line.contains("alpha")));
    assert!(lines[first_beta..].iter().all(|line| line.contains("beta")));
    Ok(())
}

#[test]
fn controller_can_run_again_after_a_session() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), CLIP)?;
    controller.set_export_video(false);
    controller.set_export_log(false);

    let first = controller.run_blocking(&mut LogPresenter::new())?;
    let second = controller.run_blocking(&mut LogPresenter::new())?;
    assert_eq!(first.frames_processed, 5);
    assert_eq!(second.frames_processed, 5);
    assert_eq!(controller.last_report(), Some(&second));
    Ok(())
}

#[test]
fn request_stop_returns_while_inference_is_in_flight() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), LIVE)?;
    controller.load_weights(Path::new("stub://models/slow.onnx?delay_ms=500"))?;
    controller.start(Box::new(LogPresenter::new()))?;
    std::thread::sleep(Duration::from_millis(100));

    let asked = Instant::now();
    controller.request_stop();
    assert!(asked.elapsed() < Duration::from_millis(250));

    let deadline = Instant::now() + Duration::from_secs(10);
    let report = loop {
        if let Some(report) = controller.poll() {
            break report;
        }
        assert!(Instant::now() < deadline, "session never finished");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(report.end, EndReason::Stopped);
    assert!(report.source_released);
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    assert_eq!(controller.last_report(), Some(&report));
    Ok(())
}

#[test]
fn teardown_continues_past_a_failed_log_write() -> Result<()> {
    let dir = TempDir::new()?;
    let mut controller = ready_controller(dir.path(), LIVE)?;
    controller.start(Box::new(LogPresenter::new()))?;

    let video = files_in(dir.path())?
        .into_iter()
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&format!("{}_", VIDEO_PREFIX)))
        })
        .expect("video file created at start");
    let stamp = video
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix(&format!("{}_", VIDEO_PREFIX)))
        .expect("timestamped video name")
        .to_string();
    let log = dir
        .path()
        .join(format!("{}_{}{}", LOG_PREFIX, stamp, LOG_EXTENSION));
    std::fs::create_dir(&log)?;
    std::thread::sleep(Duration::from_millis(50));

    let report = controller.stop().expect("session report");
    assert_eq!(report.end, EndReason::Stopped);
    assert!(report.source_released);
    assert!(!report.is_success());
    assert_eq!(report.log_path.as_deref(), Some(log.as_path()));
    assert_eq!(report.teardown_errors.len(), 1);
    assert_eq!(report.teardown_errors[0].code(), "SINK_FAILURE");

    assert_eq!(report.video_path.as_deref(), Some(video.as_path()));
    assert_eq!(report.video_frames, report.frames_processed);
    assert!(std::fs::metadata(&video)?.len() > 0);
    assert!(log.is_dir());
    assert_eq!(controller.lifecycle(), Lifecycle::Idle);
    Ok(())
}

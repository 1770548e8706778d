//! trackview
//!
//! Runs an object detector over a live camera or a video file, shows annotated frames
//! with a per-frame status line and optionally exports the annotated video and a text
//! log of per-frame summaries.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> DetectorAdapter -> FrameSummary -> Presenter
//!                                              \--> VideoSink / LogSink
//! ```
//!
//! The [`controller::Controller`] owns the run lifecycle (`Idle -> Running -> Stopped`)
//! and guarantees that a session's source and sinks are released however it ends.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (video files, camera devices, synthetic `stub://`)
//! - `detect`: detector backends, model profiles, tracking and annotation
//! - `export`: timestamped video and log sinks
//! - `controller`: session loop and lifecycle
//! - `present`: handoff of frames and status to a front-end
//! - `config`: file and environment configuration

pub mod config;
pub mod controller;
pub mod detect;
pub mod error;
pub mod export;
pub mod frame;
pub mod hardware;
pub mod ingest;
pub mod present;
pub mod summary;
pub mod ui;

pub use config::AppConfig;
pub use controller::{
    Controller, EndReason, ExportOptions, Lifecycle, SessionReport, StartError, StopHandle,
};
pub use detect::{Detection, DetectorAdapter, ModelProfile};
pub use error::PipelineError;
pub use frame::Frame;
pub use hardware::Accelerator;
pub use ingest::{FrameSource, SourceSelector};
pub use present::{ChannelPresenter, LogPresenter, PresentationEvent, Presenter};
pub use summary::FrameSummary;

//! Pipeline error taxonomy.
//!
//! Library plumbing propagates `anyhow::Error`. The variants here are the failures the
//! run controller has to tell apart: they are created at the component boundary,
//! converted into `anyhow::Error` with `.into()`, and recovered with
//! `downcast_ref::<PipelineError>()` where classification matters.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// Selected file does not exist or the device cannot be opened.
    SourceUnavailable(String),
    /// Weight file missing or corrupt. The previous model (if any) stays active.
    ModelLoadFailure(String),
    /// A frame could not be decoded mid-session.
    FrameDecodeFailure(String),
    /// The detector failed on a frame mid-session.
    InferenceFailure(String),
    /// A frame's dimensions differ from the size the video sink was opened with.
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// I/O failure while writing an export sink.
    SinkFailure(String),
}

impl PipelineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            PipelineError::ModelLoadFailure(_) => "MODEL_LOAD_FAILURE",
            PipelineError::FrameDecodeFailure(_) => "FRAME_DECODE_FAILURE",
            PipelineError::InferenceFailure(_) => "INFERENCE_FAILURE",
            PipelineError::FrameSizeMismatch { .. } => "FRAME_SIZE_MISMATCH",
            PipelineError::SinkFailure(_) => "SINK_FAILURE",
        }
    }

    /// Classify an arbitrary error, falling back to `fallback` when it carries no
    /// pipeline variant.
    pub fn classify(err: &anyhow::Error, fallback: fn(String) -> PipelineError) -> PipelineError {
        match err.downcast_ref::<PipelineError>() {
            Some(known) => known.clone(),
            None => fallback(format!("{:#}", err)),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::SourceUnavailable(msg) => write!(f, "source unavailable: {}", msg),
            PipelineError::ModelLoadFailure(msg) => write!(f, "model load failure: {}", msg),
            PipelineError::FrameDecodeFailure(msg) => write!(f, "frame decode failure: {}", msg),
            PipelineError::InferenceFailure(msg) => write!(f, "inference failure: {}", msg),
            PipelineError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "frame size mismatch: sink expects {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            PipelineError::SinkFailure(msg) => write!(f, "sink failure: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classify_recovers_typed_variant_through_context() {
        let err: anyhow::Error = PipelineError::SourceUnavailable("missing.mp4".into()).into();
        let err = err.context("open session");
        let classified = PipelineError::classify(&err, PipelineError::InferenceFailure);
        assert_eq!(classified.code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn classify_falls_back_for_untyped_errors() {
        let err = anyhow!("tensor shape wrong");
        let classified = PipelineError::classify(&err, PipelineError::InferenceFailure);
        assert_eq!(
            classified,
            PipelineError::InferenceFailure("tensor shape wrong".to_string())
        );
    }

    #[test]
    fn size_mismatch_message_names_both_sizes() {
        let err = PipelineError::FrameSizeMismatch {
            expected: (640, 480),
            actual: (320, 240),
        };
        assert_eq!(
            err.to_string(),
            "frame size mismatch: sink expects 640x480, got 320x240"
        );
    }
}

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::annotate::Annotator;
use crate::detect::backend::DetectorBackend;
use crate::detect::loader::ModelLoader;
use crate::detect::profile::ModelProfile;
use crate::detect::result::Detection;
use crate::detect::tracker::IouTracker;
use crate::error::PipelineError;
use crate::frame::Frame;

/// Output of one inference.
#[derive(Clone, Debug)]
pub struct Inference {
    pub detections: Vec<Detection>,
    /// The input frame with boxes (and labels) drawn on it.
    pub annotated: RgbImage,
    /// Name of the model that produced `detections`.
    pub model: String,
}

struct ModelSlot {
    backend: Option<Box<dyn DetectorBackend>>,
    profile: Option<ModelProfile>,
    tracker: IouTracker,
}

/// Owns the active detector and makes it safe to swap while a session runs.
///
/// `infer` holds the slot lock for the whole inference. A swap builds the new backend
/// without the lock and installs it under the same lock, so a frame is always processed
/// by exactly one model and the swap takes effect on the next frame.
pub struct DetectorAdapter {
    slot: Mutex<ModelSlot>,
    loader: Box<dyn ModelLoader>,
    model_dir: PathBuf,
    annotator: Annotator,
    persist: bool,
}

impl DetectorAdapter {
    pub fn new(loader: Box<dyn ModelLoader>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            slot: Mutex::new(ModelSlot {
                backend: None,
                profile: None,
                tracker: IouTracker::default(),
            }),
            loader,
            model_dir: model_dir.into(),
            annotator: Annotator::new(),
            persist: true,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Enable or disable IoU track persistence.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, ModelSlot>> {
        self.slot
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))
    }

    pub fn is_loaded(&self) -> bool {
        self.lock_slot()
            .map(|slot| slot.backend.is_some())
            .unwrap_or(false)
    }

    pub fn model_name(&self) -> Option<String> {
        self.lock_slot()
            .ok()
            .and_then(|slot| slot.backend.as_ref().map(|b| b.name().to_string()))
    }

    pub fn profile(&self) -> Option<ModelProfile> {
        self.lock_slot().ok().and_then(|slot| slot.profile)
    }

    /// Load the weights for `profile` from the model directory and install them.
    pub fn load_profile(&self, profile: ModelProfile) -> Result<String> {
        let weights = profile.weights_path(&self.model_dir);
        let backend = self.build(&weights)?;
        self.install(backend, Some(profile))
    }

    /// Load an explicit weight location and install it.
    pub fn load_weights(&self, weights: &Path) -> Result<String> {
        let backend = self.build(weights)?;
        self.install(backend, None)
    }

    /// Install an already constructed backend.
    pub fn swap_backend(&self, mut backend: Box<dyn DetectorBackend>) -> Result<String> {
        backend
            .warm_up()
            .map_err(|err| PipelineError::ModelLoadFailure(format!("{:#}", err)))?;
        self.install(backend, None)
    }

    fn build(&self, weights: &Path) -> Result<Box<dyn DetectorBackend>> {
        log::info!("Detector: loading {}", weights.display());
        let mut backend = self.loader.load(weights).map_err(|err| {
            PipelineError::ModelLoadFailure(format!("{}: {:#}", weights.display(), err))
        })?;
        backend.warm_up().map_err(|err| {
            PipelineError::ModelLoadFailure(format!("{}: {:#}", weights.display(), err))
        })?;
        Ok(backend)
    }

    fn install(
        &self,
        backend: Box<dyn DetectorBackend>,
        profile: Option<ModelProfile>,
    ) -> Result<String> {
        let name = backend.name().to_string();
        let mut slot = self.lock_slot()?;
        let previous = slot.backend.replace(backend);
        slot.profile = profile;
        slot.tracker.reset();
        drop(slot);
        match previous {
            Some(previous) => log::info!("Detector: swapped {} for {}", previous.name(), name),
            None => log::info!("Detector: loaded {}", name),
        }
        Ok(name)
    }

    /// Forget all track identities, e.g. at the start of a session.
    pub fn reset_tracks(&self) -> Result<()> {
        self.lock_slot()?.tracker.reset();
        Ok(())
    }

    /// Run the active model on `frame`.
    ///
    /// Every failure, including a missing model, is an `InferenceFailure`.
    pub fn infer(&self, frame: &Frame) -> Result<Inference> {
        let (detections, model) = {
            let mut guard = self.lock_slot()?;
            let slot = &mut *guard;
            let Some(backend) = slot.backend.as_mut() else {
                return Err(PipelineError::InferenceFailure("no model loaded".to_string()).into());
            };
            let mut detections = backend.infer(frame).map_err(|err| {
                PipelineError::InferenceFailure(format!("{}: {:#}", backend.name(), err))
            })?;
            if self.persist && !backend.assigns_track_ids() {
                slot.tracker.assign(&mut detections);
            }
            (detections, backend.name().to_string())
        };

        let annotated = self.annotator.draw(&frame.image, &detections);
        Ok(Inference {
            detections,
            annotated,
            model,
        })
    }
}

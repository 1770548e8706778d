//! Detection stage.
//!
//! A [`DetectorBackend`] wraps one loaded model. [`DetectorAdapter`] owns the active
//! backend, serializes inference against model swaps, assigns persistent track
//! identities and draws the annotated frame.

mod adapter;
mod annotate;
mod backend;
mod backends;
mod loader;
mod profile;
mod result;
mod tracker;

pub use adapter::{DetectorAdapter, Inference};
pub use annotate::{class_color, Annotator};
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractConfig};
pub use loader::{is_stub_location, DefaultLoader, ModelLoader, StubLoader};
#[cfg(feature = "backend-tract")]
pub use loader::TractLoader;
pub use profile::ModelProfile;
pub use result::{BoundingBox, Detection};
pub use tracker::IouTracker;

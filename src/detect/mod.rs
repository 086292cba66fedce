mod backend;
mod backends;
mod registry;
mod result;
pub mod yolo;

pub use backend::{DetectionCapability, DetectionMode, DetectorBackend};
pub use backends::open_vocab;
pub use backends::{OpenVocabBackend, OpenVocabConfig, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{non_max_suppression, BoundingBox, Detection, DetectionResult};

pub mod open_vocab;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use open_vocab::{OpenVocabBackend, OpenVocabConfig};
pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

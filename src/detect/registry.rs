use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::result::DetectionResult;

use super::backend::{DetectionCapability, DetectionMode, DetectorBackend};

/// Registry of detector backends keyed by name.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        log::debug!("registered detector backend '{}'", name);
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability, then
    /// falls back to the lowest-named backend that does.
    pub fn backend_for_capability(
        &self,
        capability: DetectionCapability,
    ) -> Result<Arc<Mutex<dyn DetectorBackend>>> {
        if let Some(default_backend) = self.default_backend() {
            let supports = {
                let guard = default_backend
                    .lock()
                    .map_err(|_| anyhow!("default backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            let Some(backend) = self.backends.get(&name) else {
                continue;
            };
            let supports = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(backend.clone());
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }

    /// Run detection using a backend that supports the requested capability.
    pub fn detect_with_capability(
        &self,
        capability: DetectionCapability,
        image: &RgbImage,
    ) -> Result<DetectionResult> {
        let backend = self.backend_for_capability(capability)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        log::debug!("running detector backend '{}'", guard.name());
        guard.detect(image)
    }

    /// Run detection for an operator-selected mode.
    pub fn detect_for_mode(&self, mode: DetectionMode, image: &RgbImage) -> Result<DetectionResult> {
        self.detect_with_capability(mode.capability(), image)
    }

    /// Warm up every registered backend.
    pub fn warm_up_all(&self) -> Result<()> {
        for name in self.list() {
            if let Some(backend) = self.backends.get(&name) {
                let mut guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.warm_up()?;
            }
        }
        Ok(())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use crate::detect::result::{BoundingBox, Detection};

    fn registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::closed_vocabulary(vec![Detection::new(
            "rock",
            0.9,
            BoundingBox::new(0, 0, 4, 4),
        )]));
        registry.register(StubBackend::open_vocabulary(
            vec![Detection::new("barrier", 0.7, BoundingBox::new(1, 1, 3, 3))],
            vec!["barrier".to_string()],
        ));
        registry
    }

    #[test]
    fn first_registered_backend_is_default() {
        let registry = registry();
        let default = registry.default_backend().expect("default");
        assert_eq!(default.lock().unwrap().name(), "stub-local");
        assert_eq!(registry.list(), vec!["stub-local", "stub-open-vocab"]);
    }

    #[test]
    fn dispatches_by_mode() {
        let registry = registry();
        let image = RgbImage::new(8, 8);
        let local = registry
            .detect_for_mode(DetectionMode::Local, &image)
            .unwrap();
        assert_eq!(local.labels(), ["rock"]);
        let remote = registry
            .detect_for_mode(DetectionMode::OpenVocab, &image)
            .unwrap();
        assert_eq!(remote.labels(), ["barrier"]);
    }

    #[test]
    fn missing_capability_is_an_error() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::closed_vocabulary(vec![]));
        let err = registry
            .detect_for_mode(DetectionMode::OpenVocab, &RgbImage::new(1, 1))
            .unwrap_err();
        assert!(err.to_string().contains("OpenVocabulary"));
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::Detector;
use super::backends::{CpuBackend, StubBackend};
use crate::config::DetectorSettings;

type BackendFactory = dyn Fn(&DetectorSettings) -> Result<Box<dyn Detector>> + Send + Sync;

/// Named detector factories.
///
/// Loading a model can be slow, so the registry hands out constructors rather
/// than instances; `ModelLoader` calls them off the caller's thread.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |_| Ok(Box::new(StubBackend::new())));
        registry.register("cpu", |_| Ok(Box::new(CpuBackend::new())));
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
            let backend = super::backends::TractBackend::new(
                path,
                settings.input_width,
                settings.input_height,
            )?
            .with_threshold(settings.min_confidence);
            Ok(Box::new(backend))
        });
        registry
    }

    /// Register a factory. A later registration under the same name replaces it.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn Detector>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the backend named in `settings`.
    pub fn build(&self, settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
        let factory = self.factories.get(&settings.backend).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                settings.backend,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(backend: &str) -> DetectorSettings {
        DetectorSettings {
            backend: backend.to_string(),
            ..DetectorSettings::default()
        }
    }

    #[test]
    fn builtin_backends_are_buildable() -> Result<()> {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.contains("stub"));
        assert!(registry.contains("cpu"));
        assert_eq!(registry.build(&settings("cpu"))?.name(), "cpu");
        Ok(())
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let registry = BackendRegistry::with_builtin();
        let err = registry.build(&settings("yolo")).err().expect("error");
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn custom_factory_replaces_builtin() -> Result<()> {
        let mut registry = BackendRegistry::with_builtin();
        registry.register("stub", |_| Err(anyhow!("weights missing")));
        assert!(registry.build(&settings("stub")).is_err());
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};
use super::backends::{MotionBackend, StubBackend};

/// Settings handed to a backend builder.
#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.25,
        }
    }
}

type Builder = Box<dyn Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>>;

/// Name-keyed registry of detector backend builders.
///
/// Backends are constructed on demand so that heavyweight models are only
/// loaded for the backend a session actually selects.
pub struct BackendRegistry {
    builders: BTreeMap<&'static str, Builder>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |_| Ok(Box::new(StubBackend::new())));
        registry.register("motion", |_| Ok(Box::new(MotionBackend::new())));
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("the tract backend requires a model path"))?;
            let backend = super::backends::TractBackend::new(
                model_path,
                settings.input_width,
                settings.input_height,
            )?
            .with_threshold(settings.confidence_threshold);
            Ok(Box::new(backend))
        });
        registry
    }

    /// Register a builder. A later registration under the same name wins.
    pub fn register<F>(&mut self, name: &'static str, builder: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + 'static,
    {
        self.builders.insert(name, Box::new(builder));
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        self.builders.keys().copied().collect()
    }

    /// Build and warm up a backend by name.
    pub fn build(&self, name: &str, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
        let builder = self.builders.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        let mut backend = builder(settings)?;
        backend.warm_up()?;
        if !backend.supports(DetectionCapability::ObjectDetection)
            && !backend.supports(DetectionCapability::Motion)
        {
            return Err(anyhow!("backend '{}' supports no frame capability", name));
        }
        Ok(backend)
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

    #[test]
    fn builtin_backends_are_listed() {
        let registry = BackendRegistry::with_builtin();
        let names = registry.list();
        assert!(names.contains(&"stub"));
        assert!(names.contains(&"motion"));
    }

    #[test]
    fn builds_by_name() {
        let registry = BackendRegistry::with_builtin();
        let backend = registry.build("motion", &DetectorSettings::default()).unwrap();
        assert_eq!(backend.name(), "motion");
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let registry = BackendRegistry::with_builtin();
        let err = registry
            .build("yolo9000", &DetectorSettings::default())
            .err()
            .expect("unknown backend");
        assert!(err.to_string().contains("not registered"));
    }
}

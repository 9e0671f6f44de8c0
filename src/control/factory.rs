//! Controller factory registry
//!
//! Controllers are selected by the `kind` string in configuration and
//! built from functions registered at compile time.

use std::collections::HashMap;

use super::config::{ControllerConfig, DEFAULT_CONTROLLER_KIND};
use super::controller::FrameHandlerController;
use super::rank::RankAssigner;
use crate::error::{ControlError, ControlResult};

/// Builds a controller from its configuration
pub type ControllerFactory = fn(&ControllerConfig) -> FrameHandlerController;

/// Registry of controller factories keyed by kind
#[derive(Clone)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_CONTROLLER_KIND, build_frame_processor);
        registry
    }
}

impl ControllerRegistry {
    /// Registry with no kinds registered
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` under `kind`, replacing any previous entry
    pub fn register(&mut self, kind: impl Into<String>, factory: ControllerFactory) {
        let kind = kind.into();
        if self.factories.insert(kind.clone(), factory).is_some() {
            tracing::warn!(kind = %kind, "Replacing registered controller factory");
        }
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Validate `config` and build the controller for its kind
    pub fn build(&self, config: &ControllerConfig) -> ControlResult<FrameHandlerController> {
        config.validate()?;

        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ControlError::UnknownControllerKind {
                kind: config.kind.clone(),
                registered: self.kinds(),
            })?;

        tracing::debug!(kind = %config.kind, name = %config.name, "Building controller");
        Ok(factory(config))
    }
}

fn build_frame_processor(config: &ControllerConfig) -> FrameHandlerController {
    let assigner = RankAssigner::new(config.failure_policy).with_count_path(config.count_path.clone());
    FrameHandlerController::with_parts(config.name.clone(), config.monitor(), assigner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::peer::ParameterController;
    use crate::control::rank::FailurePolicy;

    #[test]
    fn test_default_kinds() {
        let registry = ControllerRegistry::default();
        assert_eq!(registry.kinds(), vec![DEFAULT_CONTROLLER_KIND.to_string()]);
    }

    #[test]
    fn test_build_uses_config() {
        let config = ControllerConfig::builder()
            .name("fp3")
            .failure_policy(FailurePolicy::ContinueOnError)
            .build()
            .unwrap();

        let controller = ControllerRegistry::default().build(&config).unwrap();
        assert_eq!(controller.name(), "fp3");
        assert_eq!(controller.assigner().policy(), FailurePolicy::ContinueOnError);
    }

    #[test]
    fn test_unknown_kind() {
        let config = ControllerConfig {
            kind: "odin_data".to_string(),
            ..ControllerConfig::default()
        };

        match ControllerRegistry::default().build(&config) {
            Err(ControlError::UnknownControllerKind { kind, registered }) => {
                assert_eq!(kind, "odin_data");
                assert_eq!(registered, vec![DEFAULT_CONTROLLER_KIND.to_string()]);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected unknown kind"),
        }
    }

    #[test]
    fn test_register_custom_kind() {
        fn quiet(config: &ControllerConfig) -> FrameHandlerController {
            FrameHandlerController::new(format!("{}-quiet", config.name))
        }

        let mut registry = ControllerRegistry::empty();
        registry.register("quiet", quiet);

        let config = ControllerConfig {
            kind: "quiet".to_string(),
            ..ControllerConfig::default()
        };
        let controller = registry.build(&config).unwrap();
        assert_eq!(controller.name(), "fp-quiet");
    }
}

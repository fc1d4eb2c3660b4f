//! source types known to a processor
//!
//! A [SourceRegistry] maps a top-level config key to a [SourceFactory] and a priority. The priority decides the order
//! in which a [Processor] overlays the sources: a source with a higher priority overrides one with a lower priority.
//!
//! The [SourceRegistry::standard] registry:
//!
//! | key | source | priority |
//! |-----|--------|----------|
//! | `vars` | [VarsSource](crate::source::VarsSource) | 10 |
//! | `defaults` | [DeployablesSource](crate::source::DeployablesSource) | 20 |
//! | `environments` | [EnvironmentsSource](crate::source::EnvironmentsSource) | 30 |
//! | `filesystem` | [FileSystemSource](crate::source::FileSystemSource) | 50 |
//! | `templates` | [InlineTemplatesSource](crate::source::InlineTemplatesSource) | 60 |
//! | `env_vars_prefix` | [EnvVarsSource](crate::source::EnvVarsSource) | 100 |
use crate::processor::{Processor, SourceInstance};
use crate::source::{self, SourceFactory};
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct RegisteredSource {
    pub name: String,
    pub factory: SourceFactory,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: IndexMap<String, RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All sources this crate ships with
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let standard: [(&str, SourceFactory, i32); 6] = [
            (source::VARS, source::VarsSource::boxed, 10),
            (source::DEFAULTS, source::DeployablesSource::boxed, 20),
            (source::ENVIRONMENTS, source::EnvironmentsSource::boxed, 30),
            (source::FILESYSTEM, source::FileSystemSource::boxed, 50),
            (source::TEMPLATES, source::InlineTemplatesSource::boxed, 60),
            (source::ENV_VARS_PREFIX, source::EnvVarsSource::boxed, 100),
        ];
        for (name, factory, priority) in standard {
            registry.sources.insert(
                name.to_owned(),
                RegisteredSource {
                    name: name.to_owned(),
                    factory,
                    priority,
                },
            );
        }
        registry
    }

    /// Register `factory` under `name`
    ///
    /// An existing registration of `name` is only replaced when `force` is set. A replacement keeps its place among
    /// equal priorities.
    pub fn register(
        &mut self,
        name: &str,
        factory: SourceFactory,
        priority: i32,
        force: bool,
    ) -> Result<(), RegistryError> {
        if self.sources.contains_key(name) {
            if !force {
                return Err(RegistryError::DuplicateSource(name.to_owned()));
            }
            tracing::info!(source = %name, "source is being replaced");
        }

        self.sources.insert(
            name.to_owned(),
            RegisteredSource {
                name: name.to_owned(),
                factory,
                priority,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredSource> {
        self.sources.get(name)
    }

    /// Sources sorted by ascending priority, ties in registration order
    pub fn sorted(&self) -> Vec<&RegisteredSource> {
        let mut sorted: Vec<_> = self.sources.values().collect();
        // stable sort
        sorted.sort_by_key(|registered| registered.priority);
        sorted
    }

    /// A fresh processor with one new instance of every registered source
    pub fn new_processor(&self) -> Processor {
        let sources = self
            .sorted()
            .into_iter()
            .map(|registered| SourceInstance::new(registered.name.clone(), (registered.factory)()))
            .collect();

        Processor::new(sources)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("source {0} already registered")]
    DuplicateSource(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::{DeployablesSource, EnvironmentsSource};
    use pretty_assertions::assert_eq;

    fn names(registry: &SourceRegistry) -> Vec<String> {
        registry
            .sorted()
            .into_iter()
            .map(|registered| registered.name.clone())
            .collect()
    }

    #[test]
    fn standard_order() {
        assert_eq!(
            names(&SourceRegistry::standard()),
            [
                "vars",
                "defaults",
                "environments",
                "filesystem",
                "templates",
                "env_vars_prefix"
            ]
        );
    }

    #[test]
    fn duplicate_without_force_fails() {
        let mut registry = SourceRegistry::new();
        registry
            .register("defaults", DeployablesSource::boxed, 20, false)
            .unwrap();

        assert_eq!(
            registry.register("defaults", EnvironmentsSource::boxed, 30, false),
            Err(RegistryError::DuplicateSource("defaults".into()))
        );
        assert_eq!(registry.get("defaults").unwrap().priority, 20);
    }

    #[test]
    fn duplicate_with_force_replaces() {
        let mut registry = SourceRegistry::new();
        registry
            .register("defaults", DeployablesSource::boxed, 20, false)
            .unwrap();
        registry
            .register("defaults", EnvironmentsSource::boxed, 30, true)
            .unwrap();

        assert_eq!(registry.get("defaults").unwrap().priority, 30);
        assert_eq!(registry.sorted().len(), 1);
    }

    #[test]
    fn ties_keep_registration_order() {
        let mut registry = SourceRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register(name, DeployablesSource::boxed, 10, false)
                .unwrap();
        }
        registry
            .register("first", DeployablesSource::boxed, 1, false)
            .unwrap();

        assert_eq!(names(&registry), ["first", "c", "a", "b"]);
        let processor = registry.new_processor();
        let instance_names: Vec<_> = processor.sources().iter().map(|si| si.name()).collect();
        assert_eq!(instance_names, ["first", "c", "a", "b"]);
    }
}

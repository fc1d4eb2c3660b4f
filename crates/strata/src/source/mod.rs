//! configuration contributors
//!
//! A [Source] ingests raw config documents (one top-level key of a config document each) and answers two questions
//! later on: "what do you deploy for environment X" and "what is the body of template Y".
//!
//! Every [Source] method except [Source::merge_config] and [Source::merge_history] has an empty default, so a source
//! only implements what it actually contributes.
use crate::config::ConfigError;
use crate::deployables::Deployables;
use crate::template::{TemplateError, Templates};

mod deployables;
mod env_vars;
mod environments;
mod filesystem;
mod templates;

pub use deployables::{DeployablesSource, VarsSource};
pub use env_vars::EnvVarsSource;
pub use environments::EnvironmentsSource;
pub use filesystem::FileSystemSource;
pub use templates::InlineTemplatesSource;

pub const VARS: &str = "vars";
pub const DEFAULTS: &str = "defaults";
pub const ENVIRONMENTS: &str = "environments";
pub const FILESYSTEM: &str = "filesystem";
pub const TEMPLATES: &str = "templates";
pub const ENV_VARS_PREFIX: &str = "env_vars_prefix";

pub trait Source: std::fmt::Debug + Send + Sync {
    /// Ingest one raw value, `origin` names where it came from
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError>;

    /// Everything merged so far, in merge order
    fn merge_history(&self) -> &MergeHistory;

    /// Deployables for `environment`, `None` when there is nothing to contribute
    fn deployables_for_environment(&self, _environment: Option<&str>) -> Option<&Deployables> {
        None
    }

    fn template(&self, _name: &str) -> Result<Option<&str>, TemplateError> {
        Ok(None)
    }

    fn all_environments(&self) -> Vec<String> {
        vec![]
    }

    fn all_templates(&self) -> Option<&Templates> {
        None
    }
}

/// A source constructor, as stored in the registry
pub type SourceFactory = fn() -> Box<dyn Source>;

/// What was merged from where
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MergeEvent {
    pub origin: String,
    pub loaded: serde_yaml::Value,
}

/// Append-only log of [MergeEvent]s, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct MergeHistory(Vec<MergeEvent>);

impl MergeHistory {
    pub fn add(&mut self, origin: impl Into<String>, loaded: serde_yaml::Value) {
        self.0.push(MergeEvent {
            origin: origin.into(),
            loaded,
        });
    }

    pub fn events(&self) -> &[MergeEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a MergeHistory {
    type Item = &'a MergeEvent;
    type IntoIter = std::slice::Iter<'a, MergeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

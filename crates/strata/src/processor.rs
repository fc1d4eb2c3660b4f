//! resolving and deploying
//!
//! A [Processor] owns one instance of every registered source, ordered by ascending priority. It is used in two
//! phases:
//!
//! 1. ingestion: [Processor::merge_config] hands every top-level key of a config document to the source registered
//!    under that key. This is the only phase that mutates sources.
//! 2. resolution: [Processor::specs] overlays what every source contributes for one environment, lowest priority
//!    first, and [Processor::run_for_environment] renders and writes the result.
use crate::config::ConfigError;
use crate::deploy::{self, DeployError, MultiDeployError};
use crate::deployables::{Deployables, Specs};
use crate::source::{MergeHistory, Source};
use crate::spec::Spec;
use crate::template::{Renderer, TemplateError};
use crate::value;
use crate::vars::Vars;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level config key setting [Processor::default_environment]
pub const DEFAULT_ENVIRONMENT_KEY: &str = "default_environment";

/// Variable every deployed spec receives, naming the environment it was deployed for
pub const ENVIRONMENT_VAR: &str = "environment";

/// A source together with the name it was registered under
#[derive(Debug, derive_new::new)]
pub struct SourceInstance {
    name: String,
    source: Box<dyn Source>,
}

impl SourceInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn Source {
        self.source.as_mut()
    }
}

#[derive(Debug)]
pub struct Processor {
    default_environment: Option<String>,
    sources: Vec<SourceInstance>,
    warnings: Vec<ConfigError>,
    renderer: Renderer,
}

impl Processor {
    /// `sources` must already be in ascending priority order
    pub fn new(sources: Vec<SourceInstance>) -> Self {
        Self {
            default_environment: None,
            sources,
            warnings: vec![],
            renderer: Renderer::new(),
        }
    }

    pub fn sources(&self) -> &[SourceInstance] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|si| si.name == name)
            .map(SourceInstance::source)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn Source> {
        self.sources
            .iter_mut()
            .find(|si| si.name == name)
            .map(SourceInstance::source_mut)
    }

    pub fn default_environment(&self) -> Option<&str> {
        self.default_environment.as_deref()
    }

    /// Non-fatal problems found during ingestion
    pub fn warnings(&self) -> &[ConfigError] {
        &self.warnings
    }

    /// Ingest one config document
    ///
    /// Every top-level key goes to the source registered under that name. A key without a source is recorded in
    /// [Processor::warnings] and skipped. Any other error aborts the ingestion.
    pub fn merge_config(&mut self, origin: &str, config: &serde_yaml::Value) -> Result<(), ConfigError> {
        let Some(mapping) = value::as_mapping(config, origin, "config")? else {
            tracing::debug!(%origin, "empty config");
            return Ok(());
        };

        for (key, val) in mapping {
            let key = value::key_to_string(key, origin)?;

            if key == DEFAULT_ENVIRONMENT_KEY {
                let environment = value::to_string(val, origin, &key)?;
                tracing::debug!(%origin, %environment, "setting default environment");
                self.default_environment = Some(environment).filter(|e| !e.is_empty());
                continue;
            }

            match self.get_mut(&key) {
                Some(source) => {
                    tracing::debug!(%origin, source = %key, "merging config");
                    source.merge_config(origin, val)?;
                }
                None => {
                    tracing::warn!(%origin, source = %key, "source not registered, skipping");
                    self.warnings.push(ConfigError::UnregisteredSourceKey {
                        origin: origin.to_owned(),
                        key,
                    });
                }
            }
        }

        Ok(())
    }

    /// Final specs for `environment`
    ///
    /// Every source is overlaid in priority order, so a higher priority source overrides a lower one field by field
    /// and var by var. Shared vars fill the remaining gaps last.
    pub fn specs(&self, environment: Option<&str>) -> Specs {
        let mut deployables = Deployables::default();
        for si in &self.sources {
            if let Some(contributed) = si.source.deployables_for_environment(environment) {
                tracing::trace!(source = %si.name, "overlaying deployables");
                deployables.overlay(contributed);
            }
        }

        deployables.prepared_specs()
    }

    /// Body of template `name` from the highest priority source defining it
    pub fn template(&self, name: &str) -> Result<Option<&str>, TemplateError> {
        for si in self.sources.iter().rev() {
            match si.source.template(name)? {
                Some(content) if !content.is_empty() => {
                    tracing::debug!(%name, source = %si.name, "found template");
                    return Ok(Some(content));
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Every environment any source knows about, sorted
    pub fn list_environments(&self) -> Vec<String> {
        let mut environments: Vec<_> = self
            .sources
            .iter()
            .flat_map(|si| si.source.all_environments())
            .collect();
        environments.sort();
        environments.dedup();
        environments
    }

    /// Per source: template name to the file it is read from, `None` for inline templates
    pub fn list_templates(&self) -> IndexMap<&str, IndexMap<&str, Option<&Path>>> {
        self.sources
            .iter()
            .filter_map(|si| {
                let templates = si.source.all_templates()?;
                let templates = templates
                    .iter()
                    .map(|(name, template)| (name.as_str(), template.path()))
                    .collect();
                Some((si.name.as_str(), templates))
            })
            .collect()
    }

    /// Merge history of every source, in priority order
    pub fn merge_history(&self) -> IndexMap<&str, &MergeHistory> {
        self.sources
            .iter()
            .map(|si| (si.name.as_str(), si.source.merge_history()))
            .collect()
    }

    /// Resolve the specs for `environment` and deploy all of them
    ///
    /// With `target_base_dir` every target is written below that directory instead of its own path. Returns the
    /// written paths in resolution order.
    pub fn run_for_environment(
        &self,
        environment: Option<&str>,
        target_base_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>, RunError> {
        let mut specs = self.specs(environment);
        if specs.is_empty() {
            return Err(match environment {
                Some(environment) => RunError::NothingToDeploy(environment.to_owned()),
                None => RunError::NoEnvironment,
            });
        }

        if let Some(environment) = environment {
            for spec in specs.values_mut() {
                let vars = spec.vars.get_or_insert_with(Vars::new);
                if !vars.contains_key(ENVIRONMENT_VAR) {
                    vars.insert(ENVIRONMENT_VAR, environment);
                }
            }
        }

        check_distinct_targets(&specs, target_base_dir)?;

        tracing::info!(environment = environment.unwrap_or_default(), count = specs.len(), "deploying");
        let written = deploy::deploy_concurrently(&specs, |name, spec| {
            self.deploy_spec(name, spec, target_base_dir)
        })?;
        Ok(written)
    }

    fn deploy_spec(
        &self,
        name: &str,
        spec: &Spec,
        target_base_dir: Option<&Path>,
    ) -> Result<PathBuf, DeployError> {
        if spec.target.is_empty() {
            return Err(DeployError::MissingTarget);
        }

        tracing::info!(%name, "deploying");
        let source = self.template(name)?.ok_or(DeployError::NoTemplate)?;

        let empty = Vars::new();
        let rendered = self
            .renderer
            .render(name, source, spec.vars.as_ref().unwrap_or(&empty))
            .map_err(DeployError::Render)?;

        let path = deploy::target_path(target_base_dir, &spec.target);
        deploy::write_target(&path, rendered.as_bytes(), spec)?;
        Ok(path)
    }
}

fn check_distinct_targets(specs: &Specs, target_base_dir: Option<&Path>) -> Result<(), RunError> {
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    for (name, spec) in specs {
        if spec.target.is_empty() {
            continue;
        }

        let path = deploy::target_path(target_base_dir, &spec.target);
        if let Some(first) = seen.get(&path) {
            return Err(RunError::DuplicateTarget {
                path,
                first: (*first).to_owned(),
                second: name.clone(),
            });
        }
        seen.insert(path, name);
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("no environment specified - nothing to deploy")]
    NoEnvironment,
    #[error("nothing to deploy for environment {0}")]
    NothingToDeploy(String),
    #[error("{first} and {second} both deploy to {}", path.display())]
    DuplicateTarget {
        path: PathBuf,
        first: String,
        second: String,
    },
    #[error(transparent)]
    Deploy(#[from] MultiDeployError),
}

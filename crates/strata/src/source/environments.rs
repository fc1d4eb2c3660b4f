use super::{MergeHistory, Source};
use crate::config::ConfigError;
use crate::deployables::Deployables;
use crate::value;
use indexmap::IndexMap;

/// One deployables block per environment name
#[derive(Debug, Default)]
pub struct EnvironmentsSource {
    environments: IndexMap<String, Deployables>,
    history: MergeHistory,
}

impl EnvironmentsSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }
}

impl Source for EnvironmentsSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        self.history.add(origin, value.clone());

        let Some(mapping) = value::as_mapping(value, origin, "environments")? else {
            tracing::debug!(%origin, "no environments");
            return Ok(());
        };

        for (environment, deployables) in mapping {
            let environment = value::key_to_string(environment, origin)?;
            tracing::debug!(%environment, %origin, "making environment deployables");
            if deployables.is_null() {
                tracing::debug!(%environment, "no deployables");
                continue;
            }

            let deployables = Deployables::from_value(deployables, origin)?;
            match self.environments.get_mut(&environment) {
                Some(existing) => {
                    tracing::debug!(%environment, "merging environment deployables");
                    existing.merge(&deployables);
                }
                None => {
                    self.environments.insert(environment, deployables);
                }
            }
        }

        Ok(())
    }

    fn merge_history(&self) -> &MergeHistory {
        &self.history
    }

    fn deployables_for_environment(&self, environment: Option<&str>) -> Option<&Deployables> {
        self.environments.get(environment?)
    }

    fn all_environments(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }
}

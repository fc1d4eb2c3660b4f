use super::{DeployablesSource, MergeHistory, Source};
use crate::config::ConfigError;
use crate::deployables::Deployables;
use crate::vars::Vars;

/// Process environment variables as shared vars
///
/// The merged value is a prefix. Every environment variable starting with it becomes a shared var, named without the
/// prefix. No specs.
#[derive(Debug, Default)]
pub struct EnvVarsSource {
    inner: DeployablesSource,
}

impl EnvVarsSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }

    /// Like [Source::merge_config], reading from `env` instead of the process environment
    pub fn merge_env<K, V>(
        &mut self,
        origin: &str,
        prefix: &str,
        env: impl IntoIterator<Item = (K, V)>,
    ) where
        K: AsRef<str>,
        V: Into<String>,
    {
        let origin = format!("{origin} env_vars {prefix}");
        let prefix_value = serde_yaml::Value::String(prefix.to_owned());

        if prefix.is_empty() {
            tracing::warn!(%origin, "empty env vars prefix, ignoring");
            self.inner.merge_vars(&origin, &prefix_value, Vars::new());
            return;
        }

        let mut env_vars: Vec<(String, String)> = env
            .into_iter()
            .filter_map(|(name, val)| {
                name.as_ref()
                    .strip_prefix(prefix)
                    .map(|stripped| (stripped.to_owned(), val.into()))
            })
            .collect();
        env_vars.sort();

        tracing::debug!(%origin, count = env_vars.len(), "merging env vars");
        self.inner
            .merge_vars(&origin, &prefix_value, env_vars.into_iter().collect());
    }
}

impl Source for EnvVarsSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        let prefix = match value {
            serde_yaml::Value::String(prefix) => prefix,
            other => {
                return Err(ConfigError::invalid_shape(
                    origin,
                    super::ENV_VARS_PREFIX,
                    "string",
                    other,
                ))
            }
        };

        // names or values that are not unicode cannot become vars
        let env = std::env::vars_os()
            .filter_map(|(name, val)| Some((name.into_string().ok()?, val.into_string().ok()?)));
        self.merge_env(origin, prefix, env);
        Ok(())
    }

    fn merge_history(&self) -> &MergeHistory {
        self.inner.merge_history()
    }

    fn deployables_for_environment(&self, environment: Option<&str>) -> Option<&Deployables> {
        self.inner.deployables_for_environment(environment)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prefix_is_stripped() {
        let mut source = EnvVarsSource::default();
        source.merge_env(
            "common.yaml",
            "app_",
            [("app_port", "8080"), ("PATH", "/bin"), ("app_host", "db")],
        );

        let deployables = source.deployables_for_environment(Some("any")).unwrap();
        assert!(deployables.specs.is_empty());
        assert_eq!(
            deployables.vars,
            Some([("port", "8080"), ("host", "db")].into_iter().collect())
        );
        assert_eq!(
            source.merge_history().events()[0].origin,
            "common.yaml env_vars app_"
        );
    }

    #[test]
    fn reads_the_process_environment() {
        let prefix = "strata_env_vars_source_test_";
        std::env::set_var(format!("{prefix}a"), "a");

        let mut source = EnvVarsSource::default();
        source
            .merge_config("test", &serde_yaml::Value::String(prefix.into()))
            .unwrap();
        std::env::remove_var(format!("{prefix}a"));

        assert_eq!(
            source.deployables_for_environment(None).unwrap().vars,
            Some([("a", "a")].into_iter().collect())
        );
    }

    #[test]
    fn prefix_must_be_a_string() {
        let mut source = EnvVarsSource::default();
        let value: serde_yaml::Value = serde_yaml::from_str("[a]").unwrap();
        assert!(source.merge_config("test", &value).is_err());
    }
}

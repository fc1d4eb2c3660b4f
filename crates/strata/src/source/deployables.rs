use super::{MergeHistory, Source};
use crate::config::ConfigError;
use crate::deployables::Deployables;
use crate::vars::Vars;

/// One deployables block, the same for every environment
///
/// Used for `defaults`. Later merges override earlier ones.
#[derive(Debug, Default)]
pub struct DeployablesSource {
    deployables: Option<Deployables>,
    history: MergeHistory,
}

impl DeployablesSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }

    pub fn deployables(&self) -> Option<&Deployables> {
        self.deployables.as_ref()
    }

    pub(crate) fn merge_deployables(&mut self, deployables: &Deployables) {
        self.deployables
            .get_or_insert_with(Deployables::default)
            .merge(deployables);
    }

    /// Record `value` and merge `vars` as the shared scope
    pub(crate) fn merge_vars(&mut self, origin: &str, value: &serde_yaml::Value, vars: Vars) {
        self.history.add(origin, value.clone());
        self.merge_deployables(&Deployables {
            vars: Some(vars),
            ..Default::default()
        });
    }
}

impl Source for DeployablesSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        tracing::debug!(%origin, "making deployables");
        self.history.add(origin, value.clone());

        let deployables = Deployables::from_value(value, origin)?;
        self.merge_deployables(&deployables);
        Ok(())
    }

    fn merge_history(&self) -> &MergeHistory {
        &self.history
    }

    fn deployables_for_environment(&self, _environment: Option<&str>) -> Option<&Deployables> {
        self.deployables.as_ref()
    }
}

/// Flat shared vars, the lowest scope of all
#[derive(Debug, Default)]
pub struct VarsSource {
    inner: DeployablesSource,
}

impl VarsSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }
}

impl Source for VarsSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        tracing::debug!(%origin, "merging shared vars");
        let vars = Vars::from_value(value, origin)?;
        self.inner.merge_vars(origin, value, vars);
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

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn every_environment_sees_the_same_block() {
        let mut source = DeployablesSource::default();
        source
            .merge_config("a.yaml", &yaml("db:\n  target: db.ini\n"))
            .unwrap();
        source
            .merge_config("b.yaml", &yaml("db:\n  user: nobody\n"))
            .unwrap();

        let prod = source.deployables_for_environment(Some("prod")).unwrap();
        assert_eq!(prod.specs["db"].target, "db.ini");
        assert_eq!(prod.specs["db"].user, "nobody");
        assert_eq!(
            source.deployables_for_environment(None),
            Some(prod)
        );
        assert_eq!(source.merge_history().len(), 2);
    }

    #[test]
    fn empty_block_is_recorded() {
        let mut source = DeployablesSource::default();
        source
            .merge_config("empty.yaml", &serde_yaml::Value::Null)
            .unwrap();

        assert_eq!(source.merge_history().events()[0].origin, "empty.yaml");
        assert_eq!(
            source.deployables_for_environment(None),
            Some(&Deployables::default())
        );
    }

    #[test]
    fn vars_source_contributes_shared_vars_only() {
        let mut source = VarsSource::default();
        source
            .merge_config("common.yaml", &yaml("x: 1\ny: two\n"))
            .unwrap();

        let deployables = source.deployables_for_environment(None).unwrap();
        assert!(deployables.specs.is_empty());
        assert_eq!(
            deployables.vars,
            Some([("x", "1"), ("y", "two")].into_iter().collect())
        );
    }
}

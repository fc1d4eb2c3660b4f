//! named specs sharing one variable scope
use crate::config::ConfigError;
use crate::spec::Spec;
use crate::value;
use crate::vars::Vars;
use indexmap::IndexMap;

/// Reserved key of a deployables block holding the shared vars
pub const GLOBAL_VARS_KEY: &str = "_vars";

/// Spec name to spec, in order of first appearance
pub type Specs = IndexMap<String, Spec>;

/// Everything one source contributes for one scope (defaults or a single environment)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deployables {
    pub vars: Option<Vars>,
    pub specs: Specs,
}

impl Deployables {
    /// Structural merge
    ///
    /// Shared vars are merged, specs are merged field-wise by name. A new name is merged into a fresh [Spec].
    pub fn merge(&mut self, other: &Deployables) {
        if let Some(vars) = &other.vars {
            self.vars.get_or_insert_with(Vars::new).merge([vars]);
        }

        for (name, spec) in &other.specs {
            if self.specs.contains_key(name) {
                tracing::debug!(%name, "merging spec");
            } else {
                tracing::debug!(%name, "setting spec");
            }
            self.specs.entry(name.clone()).or_default().merge(spec);
        }
    }

    /// Merge a higher priority scope on top of this one
    ///
    /// The shared vars of `other` are first pushed into the vars of every spec already present, so they outrank
    /// whatever lower priority scopes set on those specs. Only then the structural [Deployables::merge] runs, which
    /// means specs that `other` introduces do not receive the push-down.
    pub fn overlay(&mut self, other: &Deployables) {
        if let Some(vars) = &other.vars {
            for spec in self.specs.values_mut() {
                spec.vars.get_or_insert_with(Vars::new).merge([vars]);
            }
        }

        self.merge(other);
    }

    /// Independent copies of all specs with variable gaps filled from the shared vars
    pub fn prepared_specs(&self) -> Specs {
        self.specs
            .iter()
            .map(|(name, spec)| {
                tracing::debug!(%name, "merging missing vars into spec");
                let mut spec = spec.clone();
                spec.vars
                    .get_or_insert_with(Vars::new)
                    .set_missing(self.vars.as_ref());
                (name.clone(), spec)
            })
            .collect()
    }

    /// Parse a deployables block: `_vars` plus one mapping per spec name
    pub fn from_value(value: &serde_yaml::Value, origin: &str) -> Result<Self, ConfigError> {
        let mut deployables = Deployables::default();
        let Some(mapping) = value::as_mapping(value, origin, "deployables")? else {
            return Ok(deployables);
        };

        for (name, val) in mapping {
            let name = value::key_to_string(name, origin)?;
            if name == GLOBAL_VARS_KEY {
                tracing::trace!(%origin, "making shared vars");
                deployables.vars = Some(Vars::from_value(val, origin)?);
                continue;
            }

            tracing::trace!(%origin, %name, "making spec");
            deployables.specs.insert(name, Spec::from_value(val, origin)?);
        }

        Ok(deployables)
    }
}

//! flat string variables
use crate::config::ConfigError;
use crate::value;
use indexmap::IndexMap;
use serde::Serialize;

/// String to string settings handed to templates
///
/// Order of keys carries no meaning, equality ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Vars(IndexMap<String, String>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set every key of every `other`, later ones win
    ///
    /// Accepts anything that iterates `&Vars`, so `Option<&Vars>` works and `None` is a no-op.
    pub fn merge<'a>(&mut self, others: impl IntoIterator<Item = &'a Vars>) {
        for other in others {
            for (key, val) in other.iter() {
                match self.0.get_mut(key) {
                    Some(existing) if existing == val => {}
                    Some(existing) => {
                        tracing::debug!(%key, %val, "changing var");
                        *existing = val.clone();
                    }
                    None => {
                        tracing::debug!(%key, %val, "setting var");
                        self.0.insert(key.clone(), val.clone());
                    }
                }
            }
        }
    }

    /// Set only keys that are absent, earlier `others` win
    pub fn set_missing<'a>(&mut self, others: impl IntoIterator<Item = &'a Vars>) {
        for other in others {
            for (key, val) in other.iter() {
                if !self.0.contains_key(key) {
                    tracing::debug!(%key, %val, "setting missing var");
                    self.0.insert(key.clone(), val.clone());
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, val: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), val.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from a parsed mapping, coercing scalar values to strings
    pub fn from_value(value: &serde_yaml::Value, origin: &str) -> Result<Self, ConfigError> {
        let mut vars = Vars::new();
        let Some(mapping) = value::as_mapping(value, origin, "vars")? else {
            return Ok(vars);
        };

        for (key, val) in mapping {
            let key = value::key_to_string(key, origin)?;
            let val = value::to_string(val, origin, &key)?;
            vars.0.insert(key, val);
        }

        Ok(vars)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Vars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Vars(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Vars {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

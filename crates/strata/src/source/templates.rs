use super::{MergeHistory, Source};
use crate::config::ConfigError;
use crate::template::{Template, TemplateError, Templates};
use crate::value;

/// Template bodies given inline in a config document
#[derive(Debug, Default)]
pub struct InlineTemplatesSource {
    templates: Templates,
    history: MergeHistory,
}

impl InlineTemplatesSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }
}

impl Source for InlineTemplatesSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        self.history.add(origin, value.clone());

        let Some(mapping) = value::as_mapping(value, origin, super::TEMPLATES)? else {
            return Ok(());
        };

        for (name, content) in mapping {
            let name = value::key_to_string(name, origin)?;
            let content = value::to_string(content, origin, &name)?;
            tracing::debug!(%name, %origin, "setting inline template");
            self.templates.insert(name, Template::inline(content));
        }

        Ok(())
    }

    fn merge_history(&self) -> &MergeHistory {
        &self.history
    }

    fn template(&self, name: &str) -> Result<Option<&str>, TemplateError> {
        self.templates.get(name).map(Template::content).transpose()
    }

    fn all_templates(&self) -> Option<&Templates> {
        Some(&self.templates)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn later_merges_replace_templates() {
        let mut source = InlineTemplatesSource::default();
        let first: serde_yaml::Value = serde_yaml::from_str("db: 'host={{ host }}'\nweb: x").unwrap();
        let second: serde_yaml::Value = serde_yaml::from_str("db: 'server={{ host }}'").unwrap();
        source.merge_config("a.yaml", &first).unwrap();
        source.merge_config("b.yaml", &second).unwrap();

        assert_eq!(source.template("db").unwrap(), Some("server={{ host }}"));
        assert_eq!(source.template("web").unwrap(), Some("x"));
        assert_eq!(source.template("nope").unwrap(), None);
    }
}

use super::{EnvironmentsSource, MergeHistory, Source};
use crate::config::{self, ConfigError, ENVIRONMENTS_SUBDIR, TEMPLATES_SUBDIR};
use crate::deployables::Deployables;
use crate::template::{Template, TemplateError, Templates};
use crate::value;
use std::path::Path;

/// Environments and templates discovered in a config directory
///
/// Merged value: `{dir: <path>, suffix: <file suffix>}`.
/// - `<dir>/environments/<name><suffix>` is merged like an `environments` entry for `<name>`
/// - `<dir>/templates/<name>` becomes template `<name>`, read on first use
#[derive(Debug, Default)]
pub struct FileSystemSource {
    environments: EnvironmentsSource,
    templates: Templates,
    history: MergeHistory,
}

impl FileSystemSource {
    pub fn boxed() -> Box<dyn Source> {
        Box::<Self>::default()
    }

    fn scan_environments(&mut self, dir: &Path, suffix: &str) -> Result<(), ConfigError> {
        let environments_dir = dir.join(ENVIRONMENTS_SUBDIR);
        let files = config::files_with_suffix(&environments_dir, suffix)?;
        if files.is_empty() {
            return Ok(());
        }

        tracing::debug!(dir=%environments_dir.display(), "entering environments");
        let mut environments = serde_yaml::Mapping::new();
        for file in files {
            let Some(environment) = file
                .file_name()
                .map(|name| name.to_string_lossy())
                .and_then(|name| name.strip_suffix(suffix).map(str::to_owned))
            else {
                continue;
            };

            tracing::debug!(%environment, "loading environment");
            let deployables = match config::read_yaml(&file)? {
                // an empty file still defines the environment
                serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
                deployables => deployables,
            };
            environments.insert(environment.into(), deployables);
        }

        let origin = environments_dir.join(format!("*{suffix}")).display().to_string();
        let environments = serde_yaml::Value::Mapping(environments);
        self.history.add(origin.as_str(), environments.clone());
        self.environments.merge_config(&origin, &environments)
    }

    fn scan_templates(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let templates_dir = dir.join(TEMPLATES_SUBDIR);
        let read_dir = match std::fs::read_dir(&templates_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: templates_dir,
                    source,
                })
            }
        };

        let mut paths = vec![];
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|source| ConfigError::Io {
                path: templates_dir.clone(),
                source,
            })?;
            paths.push(dir_entry.path());
        }
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
                continue;
            };
            tracing::debug!(%name, path=%path.display(), "found template");
            self.templates.insert(name, Template::file(path));
        }

        Ok(())
    }
}

impl Source for FileSystemSource {
    fn merge_config(&mut self, origin: &str, value: &serde_yaml::Value) -> Result<(), ConfigError> {
        self.history.add(origin, value.clone());

        let Some(mapping) = value::as_mapping(value, origin, super::FILESYSTEM)? else {
            return Err(ConfigError::invalid_shape(
                origin,
                super::FILESYSTEM,
                "mapping",
                value,
            ));
        };

        let setting = |key: &str| -> Result<String, ConfigError> {
            mapping
                .get(key)
                .map(|v| value::to_string(v, origin, key))
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let dir = setting("dir")?;
        let suffix = setting("suffix")?;
        let suffix = if suffix.is_empty() {
            config::CONFIG_SUFFIX.to_owned()
        } else {
            suffix
        };

        let dir = Path::new(&dir);
        self.scan_environments(dir, &suffix)?;
        self.scan_templates(dir)
    }

    fn merge_history(&self) -> &MergeHistory {
        &self.history
    }

    fn deployables_for_environment(&self, environment: Option<&str>) -> Option<&Deployables> {
        self.environments.deployables_for_environment(environment)
    }

    fn template(&self, name: &str) -> Result<Option<&str>, TemplateError> {
        self.templates.get(name).map(Template::content).transpose()
    }

    fn all_environments(&self) -> Vec<String> {
        self.environments.all_environments()
    }

    fn all_templates(&self) -> Option<&Templates> {
        Some(&self.templates)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(dir: &Path) -> FileSystemSource {
        let value: serde_yaml::Value =
            serde_yaml::from_str(&format!("dir: {}\nsuffix: .yaml\n", dir.display())).unwrap();
        let mut source = FileSystemSource::default();
        source.merge_config(&dir.display().to_string(), &value).unwrap();
        source
    }

    #[test]
    fn discovers_environments_and_templates() {
        let dir = tempfile::tempdir().unwrap();
        let environments = dir.path().join(ENVIRONMENTS_SUBDIR);
        let templates = dir.path().join(TEMPLATES_SUBDIR);
        std::fs::create_dir_all(&environments).unwrap();
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(environments.join("prod.yaml"), "db:\n  vars:\n    host: db.prod\n").unwrap();
        std::fs::write(environments.join("README.md"), "not an environment").unwrap();
        std::fs::write(templates.join("db"), "host={{ host }}").unwrap();

        let source = scan(dir.path());

        assert_eq!(source.all_environments(), ["prod"]);
        assert_eq!(
            source.deployables_for_environment(Some("prod")).unwrap().specs["db"].vars,
            Some([("host", "db.prod")].into_iter().collect())
        );
        assert_eq!(source.template("db").unwrap(), Some("host={{ host }}"));
        assert_eq!(source.template("web").unwrap(), None);
        // the scan itself, then the environment files it loaded
        assert_eq!(source.merge_history().len(), 2);
    }

    #[test]
    fn empty_environment_file_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        let environments = dir.path().join(ENVIRONMENTS_SUBDIR);
        std::fs::create_dir_all(&environments).unwrap();
        std::fs::write(environments.join("dev.yaml"), "").unwrap();

        let source = scan(dir.path());

        assert_eq!(source.all_environments(), ["dev"]);
        assert_eq!(
            source.deployables_for_environment(Some("dev")),
            Some(&Deployables::default())
        );
    }

    #[test]
    fn empty_directory_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = scan(dir.path());

        assert!(source.all_environments().is_empty());
        assert!(source.all_templates().unwrap().is_empty());
        assert_eq!(source.deployables_for_environment(Some("prod")), None);
        assert_eq!(source.merge_history().len(), 1);
    }
}

//! config documents on disk
//!
//! A config directory looks like this:
//!
//! ```text
//! <dir>/common.yaml          main config, optional
//! <dir>/config.d/*.yaml      fragments, merged in file name order after the main config
//! <dir>/environments/*.yaml  one deployables block per environment (filesystem source)
//! <dir>/templates/*          one template per file (filesystem source)
//! ```
//!
//! Every document is parsed into a [serde_yaml::Value] and handed to [Processor::merge_config] with its path as origin.
use crate::processor::Processor;
use crate::registry::SourceRegistry;
use std::path::{Path, PathBuf};

pub const CONFIG_SUFFIX: &str = ".yaml";
pub const CONFIG_FILE: &str = "common.yaml";
pub const CONFIG_D: &str = "config.d";
pub const ENVIRONMENTS_SUBDIR: &str = "environments";
pub const TEMPLATES_SUBDIR: &str = "templates";

/// Build a processor from `registry` and ingest everything found in `dir`
pub fn load_config_dir(registry: &SourceRegistry, dir: &Path) -> Result<Processor, ConfigError> {
    let mut processor = registry.new_processor();

    let config_path = dir.join(CONFIG_FILE);
    if config_path.is_file() {
        tracing::debug!(path=%config_path.display(), "reading main config");
        processor.merge_config(&config_path.display().to_string(), &read_yaml(&config_path)?)?;
    } else {
        tracing::debug!(path=%config_path.display(), "no main config");
    }

    for fragment in files_with_suffix(&dir.join(CONFIG_D), CONFIG_SUFFIX)? {
        processor.merge_config(&fragment.display().to_string(), &read_yaml(&fragment)?)?;
    }

    match processor.get_mut(crate::source::FILESYSTEM) {
        Some(filesystem) => {
            let mut scan = serde_yaml::Mapping::new();
            scan.insert("dir".into(), dir.display().to_string().into());
            scan.insert("suffix".into(), CONFIG_SUFFIX.into());
            filesystem.merge_config(
                &dir.display().to_string(),
                &serde_yaml::Value::Mapping(scan),
            )?;
        }
        None => tracing::debug!("no filesystem source registered, skipping scan"),
    }

    Ok(processor)
}

pub fn read_yaml(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    tracing::info!(path=%path.display(), "loading file");

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;

    let yaml_error = |source| ConfigError::Yaml {
        path: path.to_owned(),
        source,
    };
    let mut value: serde_yaml::Value = serde_yaml::from_str(&contents).map_err(yaml_error)?;
    // resolve `<<: *anchor` merge keys
    value.apply_merge().map_err(yaml_error)?;
    Ok(value)
}

/// Regular files in `dir` ending with `suffix`, sorted by name
///
/// A missing directory yields nothing.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => {
            return Err(ConfigError::Io {
                path: dir.to_owned(),
                source,
            })
        }
    };

    let mut files = vec![];
    for dir_entry in read_dir {
        let dir_entry = dir_entry.map_err(|source| ConfigError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = dir_entry.path();
        if !path.is_file() {
            continue;
        }

        if dir_entry.file_name().to_string_lossy().ends_with(suffix) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{origin}: source {key} not registered")]
    UnregisteredSourceKey { origin: String, key: String },
    #[error("{origin}: {key} must be a {expected}, found {found}")]
    InvalidShape {
        origin: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse yaml file {}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn invalid_shape(
        origin: &str,
        key: &str,
        expected: &'static str,
        found: &serde_yaml::Value,
    ) -> Self {
        ConfigError::InvalidShape {
            origin: origin.to_owned(),
            key: key.to_owned(),
            expected,
            found: crate::value::kind(found),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fragments_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.yaml", "a.yaml", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("c.yaml")).unwrap();

        let names: Vec<_> = files_with_suffix(dir.path(), CONFIG_SUFFIX)
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, ["a.yaml", "b.yaml"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(files_with_suffix(&dir.path().join("nope"), CONFIG_SUFFIX)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn merge_keys_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "defaults:\n  base: &base\n    target: x.conf\n    vars:\n      a: '1'\n  db:\n    <<: *base\n    user: nobody\n",
        )
        .unwrap();

        let processor = load_config_dir(&SourceRegistry::standard(), dir.path()).unwrap();
        let db = &processor.specs(None)["db"];

        assert_eq!(db.target, "x.conf");
        assert_eq!(db.user, "nobody");
        assert_eq!(db.vars.as_ref().unwrap().get("a"), Some("1"));
    }

    #[test]
    fn broken_yaml_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "defaults: [unclosed").unwrap();

        let err = load_config_dir(&SourceRegistry::standard(), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}

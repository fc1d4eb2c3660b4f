//! one file to deploy
use crate::config::ConfigError;
use crate::value;
use crate::vars::Vars;
use serde::Serialize;

/// Deployment target metadata
///
/// Empty strings, `0` perms and `None` vars mean "unset". Unset fields never override set ones when merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Spec {
    pub target: String,
    pub user: String,
    pub group: String,
    pub perms: u32,
    pub vars: Option<Vars>,
}

impl Spec {
    /// Field-wise override: every set field of `other` wins
    pub fn merge(&mut self, other: &Spec) {
        if !other.target.is_empty() && other.target != self.target {
            tracing::debug!(path = %other.target, "setting target");
            self.target.clone_from(&other.target);
        }
        if !other.user.is_empty() && other.user != self.user {
            tracing::debug!(user = %other.user, "setting target owner");
            self.user.clone_from(&other.user);
        }
        if !other.group.is_empty() && other.group != self.group {
            tracing::debug!(group = %other.group, "setting target group");
            self.group.clone_from(&other.group);
        }
        if other.perms != 0 && other.perms != self.perms {
            tracing::debug!(perms = %format!("{:o}", other.perms), "setting target permissions");
            self.perms = other.perms;
        }
        if let Some(vars) = &other.vars {
            self.vars.get_or_insert_with(Vars::new).merge([vars]);
        }
    }

    /// Parse a spec mapping with the keys `target`, `user`, `group`, `perms` and `vars`
    ///
    /// `null` is an empty spec, unknown keys are ignored.
    pub fn from_value(value: &serde_yaml::Value, origin: &str) -> Result<Self, ConfigError> {
        let mut spec = Spec::default();
        let Some(mapping) = value::as_mapping(value, origin, "spec")? else {
            return Ok(spec);
        };

        for (key, val) in mapping {
            let key = value::key_to_string(key, origin)?;
            match key.as_str() {
                "target" => spec.target = value::to_string(val, origin, &key)?,
                "user" => spec.user = value::to_string(val, origin, &key)?,
                "group" => spec.group = value::to_string(val, origin, &key)?,
                "perms" => spec.perms = value::to_perms(val, origin, &key)?,
                "vars" => spec.vars = Some(Vars::from_value(val, origin)?),
                _ => tracing::debug!(%origin, %key, "ignoring unknown spec key"),
            }
        }

        tracing::trace!(?spec, "made spec");
        Ok(spec)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_takes_set_fields_only() {
        let mut base = Spec {
            target: "/etc/app.conf".into(),
            user: "app".into(),
            vars: Some([("a", "1"), ("b", "1")].into_iter().collect()),
            ..Default::default()
        };
        let other = Spec {
            group: "staff".into(),
            perms: 0o640,
            vars: Some([("b", "2")].into_iter().collect()),
            ..Default::default()
        };

        base.merge(&other);

        assert_eq!(
            base,
            Spec {
                target: "/etc/app.conf".into(),
                user: "app".into(),
                group: "staff".into(),
                perms: 0o640,
                vars: Some([("a", "1"), ("b", "2")].into_iter().collect()),
            }
        );
    }

    #[test]
    fn unset_fields_do_not_clear() {
        let mut base = Spec {
            target: "t".into(),
            perms: 0o600,
            ..Default::default()
        };
        base.merge(&Spec::default());

        assert_eq!(base.target, "t");
        assert_eq!(base.perms, 0o600);
        assert_eq!(base.vars, None);
    }

    #[test]
    fn parse_spec() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "target: db.ini\nuser: nobody\nperms: \"0600\"\nvars:\n  host: localhost\n",
        )
        .unwrap();

        let spec = Spec::from_value(&value, "test").unwrap();
        assert_eq!(
            spec,
            Spec {
                target: "db.ini".into(),
                user: "nobody".into(),
                perms: 0o600,
                vars: Some([("host", "localhost")].into_iter().collect()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn spec_must_be_a_mapping() {
        let value = serde_yaml::Value::String("db.ini".into());
        assert!(Spec::from_value(&value, "test").is_err());
    }
}

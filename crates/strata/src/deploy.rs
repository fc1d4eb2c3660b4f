//! writing rendered specs to disk
//!
//! [deploy_concurrently] runs one task per spec on scoped threads. Tasks never affect each other: a failing or
//! panicking task is recorded and every other task still runs to completion. Only after all tasks were joined the
//! failures are reported together as one [MultiDeployError].
//!
//! [write_target] is the filesystem side of a single task. Content is rendered before the file is opened, so a
//! template error never leaves a truncated file behind.
use crate::spec::Spec;
use crate::template::TemplateError;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

/// Where `target` ends up when deploying below `base_dir`
///
/// Absolute targets are re-rooted, `/etc/app.conf` below `/tmp/out` is `/tmp/out/etc/app.conf`.
pub fn target_path(base_dir: Option<&Path>, target: &str) -> PathBuf {
    let target = Path::new(target);
    let Some(base_dir) = base_dir else {
        return target.to_owned();
    };

    let relative: PathBuf = target
        .components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect();
    base_dir.join(relative)
}

/// Create `path` with `content`, then apply the permissions and ownership set in `spec`
pub fn write_target(path: &Path, content: &[u8], spec: &Spec) -> Result<(), DeployError> {
    let io_error = |source| DeployError::Io {
        path: path.to_owned(),
        source,
    };

    tracing::info!(path=%path.display(), "writing");

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DeployError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if spec.perms != 0 {
        // new files never exist with a wider mode than requested
        options.mode(spec.perms);
    }
    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(content).map_err(io_error)?;

    // mode() only applies to new files and is subject to the umask
    if spec.perms != 0 {
        file.set_permissions(std::fs::Permissions::from_mode(spec.perms))
            .map_err(io_error)?;
    }

    if !spec.user.is_empty() || !spec.group.is_empty() {
        let (uid, gid) = resolve_owner(&spec.user, &spec.group)?;
        tracing::debug!(path=%path.display(), uid, gid, "changing owner");
        std::os::unix::fs::fchown(&file, Some(uid), Some(gid)).map_err(io_error)?;
    }

    file.sync_all().map_err(io_error)
}

/// uid and gid for `user`/`group`
///
/// An empty user means the current user. The group defaults to the user's primary group.
fn resolve_owner(user: &str, group: &str) -> Result<(u32, u32), DeployError> {
    use nix::unistd::{getuid, Group, User};

    let owner = if user.is_empty() {
        let uid = getuid();
        User::from_uid(uid)
            .map_err(DeployError::OwnerLookup)?
            .ok_or_else(|| DeployError::UnknownUser(uid.to_string()))?
    } else {
        User::from_name(user)
            .map_err(DeployError::OwnerLookup)?
            .ok_or_else(|| DeployError::UnknownUser(user.to_owned()))?
    };

    let gid = if group.is_empty() {
        owner.gid
    } else {
        Group::from_name(group)
            .map_err(DeployError::OwnerLookup)?
            .ok_or_else(|| DeployError::UnknownGroup(group.to_owned()))?
            .gid
    };

    Ok((owner.uid.as_raw(), gid.as_raw()))
}

/// Run `task` for every spec on its own thread and wait for all of them
///
/// Returns what the tasks returned, in spec order, or every failure.
pub fn deploy_concurrently<'s, I, F>(specs: I, task: F) -> Result<Vec<PathBuf>, MultiDeployError>
where
    I: IntoIterator<Item = (&'s String, &'s Spec)>,
    F: Fn(&str, &Spec) -> Result<PathBuf, DeployError> + Sync,
{
    let task = &task;

    std::thread::scope(|scope| {
        let handles: Vec<_> = specs
            .into_iter()
            .map(|(name, spec)| (name, scope.spawn(move || task(name.as_str(), spec))))
            .collect();

        let mut written = vec![];
        let mut failures = vec![];
        for (name, handle) in handles {
            let error = match handle.join() {
                Ok(Ok(path)) => {
                    written.push(path);
                    continue;
                }
                Ok(Err(error)) => error,
                Err(panic) => DeployError::Panicked(panic_message(panic.as_ref())),
            };

            tracing::debug!(%name, %error, "deploy failed");
            failures.push(TargetFailure {
                name: name.clone(),
                error,
            });
        }

        if failures.is_empty() {
            Ok(written)
        } else {
            Err(MultiDeployError { failures })
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_owned()
}

#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("no target")]
    MissingTarget,
    #[error("no template")]
    NoTemplate,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to render template")]
    Render(#[source] minijinja::Error),
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("failed to look up file owner")]
    OwnerLookup(#[source] nix::Error),
    #[error("deploy task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub struct TargetFailure {
    pub name: String,
    pub error: DeployError,
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)?;

        let mut source = std::error::Error::source(&self.error);
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

/// Every failed target of one run
#[derive(Debug)]
pub struct MultiDeployError {
    pub failures: Vec<TargetFailure>,
}

impl std::error::Error for MultiDeployError {}

impl std::fmt::Display for MultiDeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to deploy {} target(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

//! # strata - layered configuration deployer
//!
//! `strata` resolves configuration fragments from several layers into one set of files per environment and writes
//! them.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `strata` works internally.
//!
//! ### Terms
//!
//! - a [spec::Spec] describes one file to write: target path, owner, group, permission bits and [vars::Vars]
//! - [deployables::Deployables] are named specs plus shared vars for one scope (defaults, or one environment)
//! - a [source::Source] is one layer of configuration. It ingests raw documents and answers "what do you deploy for
//!   environment X" and "what is template Y"
//! - the [registry::SourceRegistry] decides which top-level config keys exist and in which order their sources are
//!   layered
//!
//! ### Loading
//!
//! see [config::load_config_dir]
//!
//! ```yaml
//! # common.yaml
//! default_environment: prod
//!
//! vars:
//!   port: "80"
//!
//! defaults:
//!   _vars:
//!     host: localhost
//!   db:
//!     target: /etc/app/db.ini
//!     perms: "0640"
//!
//! environments:
//!   prod:
//!     db:
//!       vars:
//!         host: db.prod.example.com
//!
//! env_vars_prefix: APP_
//! ```
//!
//! Each top-level key is handed to the source registered under that name. Unknown keys are only warned about.
//!
//! ### Resolving
//!
//! see [processor::Processor::specs]
//!
//! Sources are overlaid from lowest to highest priority. Overlaying pushes the shared vars of the higher layer into
//! every spec that is already known, then merges spec by spec. Once all layers are in, the remaining shared vars fill
//! whatever gaps the specs left.
//!
//! With the example above, `db` in `prod` renders with `host=db.prod.example.com` and `port=80` unless `APP_port` is
//! set in the process environment, which outranks everything.
//!
//! ### Deploying
//!
//! see [processor::Processor::run_for_environment]
//!
//! Every spec is rendered with the template of the same name, taken from the highest priority source that has one.
//! Specs are deployed concurrently and independently. Failures are collected and reported together once every spec
//! was attempted.
use std::path::Path;

pub mod config;
pub mod deploy;
pub mod deployables;
pub mod processor;
pub mod registry;
pub mod source;
pub mod spec;
pub mod template;
pub mod value;
pub mod vars;

/// Load `config_dir` with the standard sources and deploy `environment`
///
/// Falls back to the configured `default_environment` when no environment is given. The processor is returned for
/// inspection after a successful run.
pub fn execute(
    config_dir: &Path,
    environment: Option<&str>,
    target_base_dir: Option<&Path>,
) -> anyhow::Result<processor::Processor> {
    let processor = config::load_config_dir(&registry::SourceRegistry::standard(), config_dir)?;

    let environment = environment.or(processor.default_environment());
    tracing::info!(environment = environment.unwrap_or_default(), "resolved environment");

    processor.run_for_environment(environment, target_base_dir)?;
    Ok(processor)
}

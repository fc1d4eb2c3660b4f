mod cli;

use strata::processor::Processor;
use strata::registry::SourceRegistry;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_env("STRATA_LOG");
    if cli.verbose {
        env_filter = env_filter.add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into());
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Deploy(deploy_cli) => deploy(deploy_cli),
        cli::Command::Specs(specs_cli) => specs(specs_cli),
        cli::Command::Environments(environments_cli) => environments(environments_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn deploy(cli: cli::DeployCommand) -> anyhow::Result<()> {
    let config_dir = cli.config.config_dir();
    tracing::info!(config_dir=%config_dir.display(), "deploying");

    strata::execute(
        &config_dir,
        cli.environment.as_deref(),
        cli.output_dir.as_deref(),
    )?;
    Ok(())
}

pub fn specs(cli: cli::SpecsCommand) -> anyhow::Result<()> {
    let processor = load(&cli.config)?;
    let environment = cli
        .environment
        .as_deref()
        .or(processor.default_environment());

    let specs = processor.specs(environment);
    anyhow::ensure!(
        !specs.is_empty(),
        "Nothing to deploy for environment {}",
        environment.unwrap_or("<none>")
    );

    match cli.output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &specs)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &specs)?,
    };

    Ok(())
}

pub fn environments(cli: cli::EnvironmentsCommand) -> anyhow::Result<()> {
    let processor = load(&cli.config)?;
    for environment in processor.list_environments() {
        println!("{environment}");
    }

    Ok(())
}

fn load(config: &cli::ConfigArgs) -> anyhow::Result<Processor> {
    let config_dir = config.config_dir();
    let processor = strata::config::load_config_dir(&SourceRegistry::standard(), &config_dir)?;

    for warning in processor.warnings() {
        eprintln!("warning: {warning}");
    }

    Ok(processor)
}

/// (strata-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let processor = load(&cli.config)?;

    match cli.command {
        Templates => serde_yaml::to_writer(std::io::stdout(), &processor.list_templates())?,
        History => serde_yaml::to_writer(std::io::stdout(), &processor.merge_history())?,
    }

    Ok(())
}

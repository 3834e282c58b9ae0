//! CLI command definitions and dispatch.

pub mod check;
pub mod plan;
pub mod synth;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ecsynth_common::config::StackConfig;
use ecsynth_template::template::Template;

/// ecsynth: deployment template synthesis for an ECS service behind a load balancer.
#[derive(Parser, Debug)]
#[command(name = ecsynth_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Stack configuration file (JSON, or YAML by extension).
    #[arg(long, global = true, env = "ECSYNTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the template and print it.
    Synth(synth::SynthArgs),
    /// List resources in dependency order.
    Plan(plan::PlanArgs),
    /// Compare the template against a baseline.
    Check(check::CheckArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Synth(args) => synth::execute(&args, &config),
        Command::Plan(args) => plan::execute(&args, &config),
        Command::Check(args) => check::execute(&args, &config),
    }
}

/// Loads the configuration file, or the built-in parameters without one.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<StackConfig> {
    match path {
        Some(path) => StackConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(StackConfig::default()),
    }
}

fn synthesize(config: &StackConfig) -> anyhow::Result<Template> {
    ecsynth_template::stack::synthesize(config)
        .with_context(|| format!("failed to synthesize stack {}", config.stack_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ecsynth", "plan", "--config", "stack.yaml", "--log-json"])
            .expect("should parse");
        assert!(cli.log_json);
        assert_eq!(cli.config.as_deref(), Some(Path::new("stack.yaml")));
        assert!(matches!(cli.command, Command::Plan(_)));
    }

    #[test]
    fn check_requires_baseline() {
        assert!(Cli::try_parse_from(["ecsynth", "check"]).is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/stack.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stack.yaml"), "got: {err}");
    }

    #[test]
    fn no_config_uses_defaults() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config, StackConfig::default());
    }
}

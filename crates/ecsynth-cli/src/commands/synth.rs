//! `ecsynth synth`: build the template and print it.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use ecsynth_common::config::StackConfig;
use ecsynth_template::template::Template;

use crate::output;

/// Serialization format of the template.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Write the template to this file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Executes the `synth` command.
///
/// # Errors
///
/// Returns an error if synthesis fails or the output cannot be written.
pub fn execute(args: &SynthArgs, config: &StackConfig) -> anyhow::Result<()> {
    let template = super::synthesize(config)?;
    let text = render(&template, args.format)?;
    tracing::info!(
        stack = %config.stack_name,
        resources = template.resources.len(),
        format = ?args.format,
        "synthesized template"
    );
    output::emit_to(args.output.as_deref(), &text)
}

/// Serializes `template` in `format`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render(template: &Template, format: Format) -> anyhow::Result<String> {
    let text = match format {
        Format::Json => template.to_json_pretty()?,
        Format::Yaml => template.to_yaml()?,
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_and_yaml_describe_the_same_document() {
        let template = super::super::synthesize(&StackConfig::default()).expect("synthesize");
        let json: serde_json::Value =
            serde_json::from_str(&render(&template, Format::Json).expect("json")).expect("parse json");
        let yaml: serde_json::Value =
            serde_yaml::from_str(&render(&template, Format::Yaml).expect("yaml")).expect("parse yaml");
        assert_eq!(json, yaml);
    }

    #[test]
    fn synth_writes_output_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stack.json");
        let args = SynthArgs {
            format: Format::Json,
            output: Some(path.clone()),
        };
        execute(&args, &StackConfig::default()).expect("synth");
        let written = std::fs::read_to_string(&path).expect("read");
        assert!(written.contains("\"AWS::ECS::TaskDefinition\""));
    }
}

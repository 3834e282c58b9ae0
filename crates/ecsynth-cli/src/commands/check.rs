//! `ecsynth check`: compare the template against a baseline.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use ecsynth_common::config::StackConfig;
use ecsynth_template::assert::{AssertionError, MatchStyle, TemplateAssertions};
use ecsynth_template::template::Template;
use serde_json::Value;

use crate::output;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Baseline template (JSON, or YAML by extension).
    #[arg(long)]
    pub baseline: PathBuf,

    /// How the template is compared: `exact` or `superset`.
    #[arg(long, default_value = "exact")]
    pub style: MatchStyle,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns an error if the baseline cannot be read or the template does not
/// match it.
pub fn execute(args: &CheckArgs, config: &StackConfig) -> anyhow::Result<()> {
    let baseline = load_baseline(&args.baseline)?;
    let template = super::synthesize(config)?;
    let report = compare(&template, &baseline, args.style)?;
    match report {
        None => output::emit(&format!("template matches {} ({})", args.baseline.display(), args.style)),
        Some(report) => {
            output::emit(&report)?;
            anyhow::bail!("template does not match {}", args.baseline.display())
        }
    }
}

/// Compares `template` with `baseline`, returning a report of differences.
///
/// # Errors
///
/// Returns an error if the template cannot be serialized.
pub fn compare(template: &Template, baseline: &Value, style: MatchStyle) -> anyhow::Result<Option<String>> {
    let assertions = TemplateAssertions::new(template)?;
    match assertions.matches(baseline, style) {
        Ok(()) => Ok(None),
        Err(AssertionError::Mismatch { style, mismatches }) => {
            tracing::warn!(%style, differences = mismatches.len(), "template differs from baseline");
            let mut report = output::heading(&format!("{} difference(s) ({style})", mismatches.len()));
            for mismatch in &mismatches {
                let _ = writeln!(report, "  - {mismatch}");
            }
            Ok(Some(report))
        }
        Err(err) => Err(err.into()),
    }
}

fn load_baseline(path: &Path) -> anyhow::Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read baseline {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let baseline = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))?
    };
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use serde_json::json;

    use super::*;

    fn template() -> Template {
        super::super::synthesize(&StackConfig::default()).expect("synthesize")
    }

    #[test]
    fn own_output_passes_exact_check() {
        let template = template();
        let baseline = template.to_value().expect("value");
        assert!(compare(&template, &baseline, MatchStyle::Exact).expect("compare").is_none());
    }

    #[test]
    fn placeholder_baseline_reports_differences() {
        let report = compare(&template(), &json!({"Resources": {}}), MatchStyle::Exact)
            .expect("compare")
            .expect("mismatch report");
        assert!(report.contains("unexpected"), "got: {report}");
    }

    #[test]
    fn check_fails_on_mismatch() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("create temp file");
        write!(file, r#"{{"Resources": {{}}}}"#).expect("write baseline");
        let args = CheckArgs {
            baseline: file.path().to_path_buf(),
            style: MatchStyle::Superset,
        };
        assert!(execute(&args, &StackConfig::default()).is_err());
    }

    #[test]
    fn yaml_baseline_is_accepted() {
        let template = template();
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .expect("create temp file");
        write!(file, "{}", template.to_yaml().expect("yaml")).expect("write baseline");
        let baseline = load_baseline(file.path()).expect("load");
        assert!(compare(&template, &baseline, MatchStyle::Exact).expect("compare").is_none());
    }
}

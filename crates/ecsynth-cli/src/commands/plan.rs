//! `ecsynth plan`: list resources in dependency order.

use std::fmt::Write;

use clap::Args;
use ecsynth_common::config::StackConfig;
use ecsynth_template::graph::DependencyGraph;
use ecsynth_template::template::Template;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Also list each resource's direct dependencies.
    #[arg(long)]
    pub dependencies: bool,
}

/// Executes the `plan` command.
///
/// Synthesizes the stack, resolves the resource dependency graph, and prints
/// resources in creation order with their types.
///
/// # Errors
///
/// Returns an error if synthesis or graph resolution fails.
pub fn execute(args: &PlanArgs, config: &StackConfig) -> anyhow::Result<()> {
    let template = super::synthesize(config)?;
    let report = render(&config.stack_name, &template, args.dependencies)?;
    output::emit(&report)
}

/// Renders the creation-order report.
///
/// # Errors
///
/// Returns an error if the dependency graph has a cycle.
pub fn render(stack_name: &str, template: &Template, dependencies: bool) -> anyhow::Result<String> {
    let graph = DependencyGraph::from_template(template);
    let order = graph.resolve_order()?;

    let mut report = output::heading(&format!("Deployment Plan for: {stack_name}"));
    report.push('\n');
    for id in &order {
        let Some(resource) = template.resource(id) else {
            continue;
        };
        let _ = writeln!(report, "  + {id}  ({})", resource.resource_type);
        if dependencies {
            let deps = graph.dependencies_of(id);
            if !deps.is_empty() {
                let names: Vec<_> = deps.iter().map(ToString::to_string).collect();
                let _ = writeln!(report, "      after: {}", names.join(", "));
            }
        }
    }
    report.push('\n');
    let _ = writeln!(report, "  {} resource(s) will be created.", order.len());
    if !template.parameters.is_empty() {
        let _ = writeln!(report, "  {} parameter(s) resolved at deployment.", template.parameters.len());
    }
    for (name, out) in &template.outputs {
        let _ = writeln!(
            report,
            "  output {name}: {}",
            out.description.as_deref().unwrap_or("(no description)")
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_lists_every_resource_once() {
        let template = super::super::synthesize(&StackConfig::default()).expect("synthesize");
        let report = render("Stack", &template, false).expect("render");
        let listed = report.lines().filter(|l| l.starts_with("  + ")).count();
        assert_eq!(listed, template.resources.len());
        assert!(report.contains("(AWS::ECS::Service)"));
    }

    #[test]
    fn network_precedes_service() {
        let template = super::super::synthesize(&StackConfig::default()).expect("synthesize");
        let report = render("Stack", &template, true).expect("render");
        let vpc = report.find("(AWS::EC2::VPC)").expect("vpc listed");
        let service = report.find("(AWS::ECS::Service)").expect("service listed");
        assert!(vpc < service);
        assert!(report.contains("      after: "));
    }
}

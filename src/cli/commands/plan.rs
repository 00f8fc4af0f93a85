//! Plan command implementation
//!
//! Implements `bleep plan` to show the invocations each module would run.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::cli::output::OutputConfig;
use crate::core::graph::DependencyGraph;
use crate::core::planner::BuildPlan;
use crate::error::GraphError;

/// Execute the plan command
pub fn execute(graph: &DependencyGraph, module: Option<&str>, config: &OutputConfig) -> Result<()> {
    let names = match module {
        Some(name) if !graph.contains(name) => {
            return Err(GraphError::UnknownModule {
                name: name.to_string(),
            }
            .into());
        }
        Some(name) => vec![name.to_string()],
        None => graph.topological_order(),
    };

    if config.json {
        let plans: BTreeMap<&str, &BuildPlan> = names
            .iter()
            .filter_map(|name| graph.get(name))
            .map(|node| (node.name(), &node.build_plan))
            .collect();
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    print!("{}", render(graph, &names));
    Ok(())
}

/// Human-readable plans for `names`
pub fn render(graph: &DependencyGraph, names: &[String]) -> String {
    let mut out = String::new();

    for node in names.iter().filter_map(|name| graph.get(name)) {
        out.push_str(&format!("{} ({})\n", node.name(), node.working_dir.display()));
        if let Some(reason) = graph.exclusions().get(node.name()) {
            out.push_str(&format!("  excluded: {reason}\n"));
        } else if node.build_plan.is_empty() {
            out.push_str("  nothing to build\n");
        } else {
            for line in node.build_plan.display().lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }

    out
}

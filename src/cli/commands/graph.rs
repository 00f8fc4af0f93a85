//! Graph command implementation
//!
//! Implements `bleep graph` to show modules in build order with their edges.

use anyhow::Result;

use crate::cli::output::{status, OutputConfig};
use crate::core::graph::DependencyGraph;

/// Execute the graph command
pub fn execute(graph: &DependencyGraph, dot: bool, config: &OutputConfig) -> Result<()> {
    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }
    if config.json {
        println!("{}", serde_json::to_string_pretty(graph)?);
        return Ok(());
    }

    print!("{}", render(graph));
    Ok(())
}

/// Human-readable listing in topological order
pub fn render(graph: &DependencyGraph) -> String {
    let mut out = String::new();

    for name in graph.topological_order() {
        let Some(node) = graph.get(&name) else {
            continue;
        };
        let marker = if graph.exclusions().contains_key(&name) {
            status::ERROR
        } else {
            status::SUCCESS
        };
        if node.dependencies.is_empty() {
            out.push_str(&format!("{marker} {name}\n"));
        } else {
            let deps: Vec<&str> = node.dependencies.iter().map(String::as_str).collect();
            out.push_str(&format!("{marker} {name} -> {}\n", deps.join(", ")));
        }
    }

    if !graph.aliases().is_empty() {
        out.push_str("\nAliases:\n");
        for (alias, owner) in graph.aliases() {
            out.push_str(&format!("  {alias} => {owner}\n"));
        }
    }

    if !graph.exclusions().is_empty() {
        out.push_str("\nExcluded:\n");
        for (name, reason) in graph.exclusions() {
            match reason.detail() {
                Some(detail) => out.push_str(&format!("  {name}: {reason} ({detail})\n")),
                None => out.push_str(&format!("  {name}: {reason}\n")),
            }
        }
    }

    out
}

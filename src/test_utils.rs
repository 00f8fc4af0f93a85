//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use std::path::PathBuf;

    use crate::core::graph::{DependencyGraph, ModuleNode};
    use crate::core::manifest::ModuleManifest;
    use crate::core::planner::{BuildPlan, Invocation, InvocationGroup};

    /// Generate a valid module name (lowercase alphanumeric with hyphens)
    pub fn module_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a plain command token (no quotes, no whitespace)
    pub fn command_token() -> impl Strategy<Value = String> {
        "[a-z0-9./=-]{1,12}"
    }

    /// Generate a script made of commands joined by `&&`
    pub fn script() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::collection::vec(command_token(), 1..4), 1..4).prop_map(
            |commands| {
                commands
                    .into_iter()
                    .map(|tokens| tokens.join(" "))
                    .collect::<Vec<_>>()
                    .join(" && ")
            },
        )
    }

    /// One-invocation plan for `name`
    pub fn single_step_plan(name: &str) -> BuildPlan {
        BuildPlan {
            groups: vec![InvocationGroup {
                script: "dev".into(),
                invocations: vec![Invocation {
                    program: "build".into(),
                    args: vec![name.into()],
                    working_dir: PathBuf::from(format!("/ui/{name}")),
                }],
            }],
        }
    }

    /// Generate an acyclic graph of `m0..mN`, where module `i` may only
    /// depend on modules with a lower index
    pub fn acyclic_graph(max_modules: usize) -> impl Strategy<Value = DependencyGraph> {
        (1..=max_modules)
            .prop_flat_map(|n| {
                let edges = (0..n)
                    .map(|i| prop::collection::btree_set(0..i.max(1), 0..=i.min(3)))
                    .collect::<Vec<_>>();
                (Just(n), edges)
            })
            .prop_map(|(n, edges)| {
                let nodes = (0..n).map(|i| {
                    let name = format!("m{i}");
                    let manifest = edges[i]
                        .iter()
                        .filter(|dep| **dep < i)
                        .fold(ModuleManifest::new(&name), |m, dep| m.with_dep(format!("m{dep}")));
                    ModuleNode::new(manifest, format!("/ui/{name}")).with_plan(single_step_plan(&name))
                });
                DependencyGraph::from_nodes(nodes)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(crate::config::defaults::MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_module_name_generator(name in module_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_script_generator(script in script()) {
            prop_assert!(!script.trim().is_empty());
            prop_assert!(!script.contains('\''));
        }

        #[test]
        fn test_acyclic_graph_generator(graph in acyclic_graph(12)) {
            prop_assert!(graph.cycles().is_empty());
            prop_assert!(graph.exclusions().is_empty());
            for node in graph.nodes() {
                prop_assert!(node.dependencies.iter().all(|d| graph.contains(d)));
            }
        }
    }
}

//! Module dependency graph
//!
//! Building the graph is a pure, read-only phase that fully precedes
//! scheduling:
//!
//! 1. walk the module tree and read each module's manifest, bundler config
//!    and build plan
//! 2. resolve declared dependencies to edges, keeping only names that are
//!    known modules (or aliases of known modules)
//! 3. refine edges with bundle inputs that live in another module
//! 4. find every module on a dependency cycle and exclude it
//!
//! Modules that could not be read or planned stay in the graph with an
//! exclusion reason so they show up in reports and can be re-read when
//! their manifest changes.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::bundle::{BundleConfigReader, BundleTarget, RollupConfigReader};
use crate::core::manifest::{module_name, ManifestReader, ModuleManifest, PackageJsonReader};
use crate::core::planner::{BuildPlan, CommandPlanner};
use crate::core::state::FailureReason;
use crate::error::GraphError;
use crate::infra::walk;

/// A vertex of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleNode {
    /// Manifest as read
    pub manifest: ModuleManifest,
    /// Module directory
    pub working_dir: PathBuf,
    /// Modules this one requires (resolved edges)
    pub dependencies: BTreeSet<String>,
    /// Modules requiring this one (reverse edges)
    pub dependents: BTreeSet<String>,
    /// Bundler targets
    pub targets: Vec<BundleTarget>,
    /// Planned invocations
    pub build_plan: BuildPlan,
    /// Problem found while reading or planning
    pub problem: Option<FailureReason>,
}

impl ModuleNode {
    /// Create a node with no edges, targets or plan
    pub fn new(manifest: ModuleManifest, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            working_dir: working_dir.into(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            targets: Vec::new(),
            build_plan: BuildPlan::empty(),
            problem: None,
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Set the build plan
    #[must_use]
    pub fn with_plan(mut self, plan: BuildPlan) -> Self {
        self.build_plan = plan;
        self
    }

    /// Set the bundler targets
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<BundleTarget>) -> Self {
        self.targets = targets;
        self
    }
}

/// Module name -> node, with edges resolved and cycles excluded
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, ModuleNode>,
    aliases: BTreeMap<String, String>,
    exclusions: BTreeMap<String, FailureReason>,
    cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Assemble a graph from nodes, resolving all edges
    pub fn from_nodes(nodes: impl IntoIterator<Item = ModuleNode>) -> Self {
        let mut graph = Self {
            nodes: nodes
                .into_iter()
                .map(|n| (n.name().to_string(), n))
                .collect(),
            ..Self::default()
        };
        graph.resolve();
        graph
    }

    /// Look up a module
    pub fn get(&self, name: &str) -> Option<&ModuleNode> {
        self.nodes.get(name)
    }

    /// Whether a module is in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All modules, by name
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.values()
    }

    /// All module names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no modules
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bundle output aliases (alias -> owning module)
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Modules excluded from scheduling and why
    pub fn exclusions(&self) -> &BTreeMap<String, FailureReason> {
        &self.exclusions
    }

    /// Dependency cycles found, each as a sorted member list
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Every module depending on `name`, directly or transitively
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for dependent in &node.dependents {
                if dependent != name && seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        seen
    }

    /// Module whose directory contains `path` (deepest match wins)
    pub fn module_for_path(&self, path: &Path) -> Option<&str> {
        self.nodes
            .values()
            .filter(|n| path.starts_with(&n.working_dir))
            .max_by_key(|n| n.working_dir.components().count())
            .map(ModuleNode::name)
    }

    /// Modules with dependencies before dependents
    ///
    /// Ties are broken by name. Cycle members come last, sorted by name.
    pub fn topological_order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .values()
            .map(|n| (n.name(), n.dependencies.len()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.pop_first() {
            remaining.remove(name);
            order.push(name.to_string());
            for dependent in &self.nodes[name].dependents {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        order.extend(remaining.keys().map(ToString::to_string));
        order
    }

    /// Graphviz rendering; excluded modules are drawn red
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph modules {\n    rankdir=LR;\n");
        for node in self.nodes.values() {
            if self.exclusions.contains_key(node.name()) {
                let _ = writeln!(out, "    \"{}\" [color=red, fontcolor=red];", node.name());
            } else {
                let _ = writeln!(out, "    \"{}\";", node.name());
            }
        }
        for node in self.nodes.values() {
            for dep in &node.dependencies {
                let _ = writeln!(out, "    \"{}\" -> \"{dep}\";", node.name());
            }
        }
        out.push_str("}\n");
        out
    }

    /// Recompute aliases, edges, cycles and exclusions from node contents
    fn resolve(&mut self) {
        self.resolve_aliases();
        self.resolve_edges();
        self.cycles = self.find_cycles();

        self.exclusions = self
            .nodes
            .values()
            .filter_map(|n| n.problem.clone().map(|p| (n.name().to_string(), p)))
            .collect();
        for member in self.cycles.iter().flatten() {
            self.exclusions
                .insert(member.clone(), FailureReason::DependencyCycle);
        }
    }

    fn resolve_aliases(&mut self) {
        self.aliases.clear();
        for node in self.nodes.values() {
            for target in &node.targets {
                let alias = &target.output_id;
                if alias != node.name() && !self.nodes.contains_key(alias) {
                    self.aliases
                        .entry(alias.clone())
                        .or_insert_with(|| node.name().to_string());
                }
            }
        }
    }

    fn resolve_edges(&mut self) {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for node in self.nodes.values() {
            let mut deps = BTreeSet::new();

            for declared in &node.manifest.declared_deps {
                if self.nodes.contains_key(declared) {
                    deps.insert(declared.clone());
                } else if let Some(owner) = self.aliases.get(declared) {
                    if owner != node.name() {
                        deps.insert(owner.clone());
                    }
                } else {
                    tracing::trace!(module = %node.name(), "Dropping external dependency '{declared}'");
                }
            }

            for target in &node.targets {
                for input in &target.inputs {
                    let input = walk::normalize(&node.working_dir.join(input));
                    if let Some(owner) = self.module_for_path(&input) {
                        if owner != node.name() {
                            deps.insert(owner.to_string());
                        }
                    }
                }
            }

            edges.insert(node.name().to_string(), deps);
        }

        for node in self.nodes.values_mut() {
            node.dependents.clear();
        }
        for (name, deps) in edges {
            for dep in &deps {
                if let Some(target) = self.nodes.get_mut(dep) {
                    target.dependents.insert(name.clone());
                }
            }
            if let Some(node) = self.nodes.get_mut(&name) {
                node.dependencies = deps;
            }
        }
    }

    /// Strongly connected components with more than one member, or a self edge
    fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut search = CycleSearch::default();
        for name in self.nodes.keys() {
            if !search.index.contains_key(name.as_str()) {
                search.visit(self, name);
            }
        }
        search.cycles.sort();
        search.cycles
    }
}

/// Depth-first cycle search state (Tarjan's algorithm)
///
/// The walk keeps its own frame stack so deep dependency chains cannot
/// overflow the thread stack.
#[derive(Default)]
struct CycleSearch<'g> {
    next_index: usize,
    index: BTreeMap<&'g str, usize>,
    low_link: BTreeMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: BTreeSet<&'g str>,
    cycles: Vec<Vec<String>>,
}

/// A module being visited, with the dependencies still to look at
struct Frame<'g> {
    name: &'g str,
    deps: std::collections::btree_set::Iter<'g, String>,
}

impl<'g> CycleSearch<'g> {
    fn visit(&mut self, graph: &'g DependencyGraph, root: &'g str) {
        let mut frames = vec![self.enter(graph, root)];

        while let Some(frame) = frames.last_mut() {
            let name = frame.name;
            if let Some(dep) = frame.deps.next() {
                let dep = dep.as_str();
                if !self.index.contains_key(dep) {
                    if graph.nodes.contains_key(dep) {
                        let next = self.enter(graph, dep);
                        frames.push(next);
                    }
                } else if self.on_stack.contains(dep) {
                    let low = self.low_link[name].min(self.index[dep]);
                    self.low_link.insert(name, low);
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let low = self.low_link[parent.name].min(self.low_link[name]);
                self.low_link.insert(parent.name, low);
            }
            if self.low_link[name] == self.index[name] {
                self.close(graph, name);
            }
        }
    }

    fn enter(&mut self, graph: &'g DependencyGraph, name: &'g str) -> Frame<'g> {
        self.index.insert(name, self.next_index);
        self.low_link.insert(name, self.next_index);
        self.next_index += 1;
        self.stack.push(name);
        self.on_stack.insert(name);
        Frame {
            name,
            deps: graph.nodes[name].dependencies.iter(),
        }
    }

    /// Pop the component rooted at `name`
    fn close(&mut self, graph: &DependencyGraph, name: &str) {
        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack.remove(member);
            component.push(member.to_string());
            if member == name {
                break;
            }
        }
        if component.len() > 1 || graph.nodes[name].dependencies.contains(name) {
            component.sort();
            self.cycles.push(component);
        }
    }
}

/// Builds [`DependencyGraph`]s from a module tree
pub struct GraphBuilder {
    manifest_reader: Box<dyn ManifestReader>,
    bundle_reader: Box<dyn BundleConfigReader>,
    planner: CommandPlanner,
    ignore: Vec<String>,
    exclude: Vec<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(CommandPlanner::default())
    }
}

impl GraphBuilder {
    /// Create a builder reading `package.json` and `rollup.config.mjs`
    pub fn new(planner: CommandPlanner) -> Self {
        Self {
            manifest_reader: Box::new(PackageJsonReader),
            bundle_reader: Box::new(RollupConfigReader),
            planner,
            ignore: defaults::IGNORE_NAMES.iter().map(ToString::to_string).collect(),
            exclude: Vec::new(),
        }
    }

    /// Replace the manifest reader
    #[must_use]
    pub fn with_manifest_reader(mut self, reader: impl ManifestReader + 'static) -> Self {
        self.manifest_reader = Box::new(reader);
        self
    }

    /// Replace the bundler config reader
    #[must_use]
    pub fn with_bundle_reader(mut self, reader: impl BundleConfigReader + 'static) -> Self {
        self.bundle_reader = Box::new(reader);
        self
    }

    /// Directory names never walked into
    #[must_use]
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Module names dropped from the graph
    #[must_use]
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Directory names never walked into
    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    /// Walk `root` and build the graph
    pub fn build(&self, root: &Path) -> Result<DependencyGraph, GraphError> {
        let nodes = self.read_tree(root, false)?;
        let graph = DependencyGraph::from_nodes(nodes);

        tracing::info!(
            "Found {} module(s) under {} ({} excluded)",
            graph.len(),
            root.display(),
            graph.exclusions().len()
        );
        for cycle in graph.cycles() {
            tracing::warn!("{}", GraphError::CircularDependency { cycle: cycle.clone() });
        }
        Ok(graph)
    }

    /// Re-read the subtree rooted at `dir` and return an updated graph
    ///
    /// Modules previously found under `dir` are replaced by what is there
    /// now; a deleted manifest removes its module.
    pub fn refresh(&self, graph: &DependencyGraph, dir: &Path) -> Result<DependencyGraph, GraphError> {
        let mut nodes: BTreeMap<String, ModuleNode> = graph
            .nodes
            .iter()
            .filter(|(_, n)| !n.working_dir.starts_with(dir))
            .map(|(name, n)| (name.clone(), n.clone()))
            .collect();

        if dir.is_dir() {
            for node in self.read_tree(dir, true)? {
                if let Some(existing) = nodes.get(node.name()) {
                    tracing::warn!(
                        "Module name '{}' at {} already used by {}, skipping",
                        node.name(),
                        node.working_dir.display(),
                        existing.working_dir.display()
                    );
                    continue;
                }
                nodes.insert(node.name().to_string(), node);
            }
        }

        tracing::debug!("Refreshed modules under {}", dir.display());
        Ok(DependencyGraph::from_nodes(nodes.into_values()))
    }

    fn read_tree(&self, root: &Path, include_root: bool) -> Result<Vec<ModuleNode>, GraphError> {
        let mut nodes: BTreeMap<String, ModuleNode> = BTreeMap::new();

        for dir in walk::candidate_dirs(root, &self.ignore, include_root)? {
            let Some(node) = self.read_module(&dir) else {
                continue;
            };
            if self.exclude.iter().any(|e| e == node.name()) {
                tracing::debug!("Excluding module '{}' by configuration", node.name());
                continue;
            }
            if let Some(existing) = nodes.get(node.name()) {
                tracing::warn!(
                    "Module name '{}' at {} already used by {}, skipping",
                    node.name(),
                    dir.display(),
                    existing.working_dir.display()
                );
                continue;
            }
            nodes.insert(node.name().to_string(), node);
        }

        Ok(nodes.into_values().collect())
    }

    /// Read one directory; `None` when it is not a module
    fn read_module(&self, dir: &Path) -> Option<ModuleNode> {
        let manifest = match self.manifest_reader.read(dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("{e}");
                let mut node = ModuleNode::new(ModuleManifest::new(module_name(dir)), dir);
                node.problem = Some(FailureReason::InvalidManifest(e.to_string()));
                return Some(node);
            }
        };

        let mut node = ModuleNode::new(manifest, dir);

        match self.bundle_reader.read(dir) {
            Ok(targets) => node.targets = targets,
            Err(e) => {
                tracing::warn!("{e}");
                node.problem = Some(FailureReason::InvalidManifest(e.to_string()));
            }
        }

        match self.planner.plan(&node.manifest, dir) {
            Ok(plan) => node.build_plan = plan,
            Err(e) => {
                tracing::warn!(module = %node.name(), "{e}");
                node.problem
                    .get_or_insert(FailureReason::InvalidBuildScript(e.to_string()));
            }
        }

        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::{Invocation, InvocationGroup};
    use tempfile::TempDir;

    fn node(name: &str, deps: &[&str]) -> ModuleNode {
        let manifest = deps
            .iter()
            .fold(ModuleManifest::new(name), |m, d| m.with_dep(*d));
        ModuleNode::new(manifest, format!("/ui/{name}"))
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_unknown_dependencies_are_dropped() {
        let graph = DependencyGraph::from_nodes([
            node("common", &["snabbdom", "debounce-promise"]),
            node("round", &["common", "chessground"]),
        ]);

        assert!(graph.get("common").unwrap().dependencies.is_empty());
        assert_eq!(graph.get("round").unwrap().dependencies, set(&["common"]));
        assert_eq!(graph.get("common").unwrap().dependents, set(&["round"]));
        assert!(graph.exclusions().is_empty());
    }

    #[test]
    fn test_cycle_members_are_excluded() {
        let graph = DependencyGraph::from_nodes([
            node("a", &["b"]),
            node("b", &["c"]),
            node("c", &["a"]),
            node("d", &["a"]),
            node("e", &[]),
        ]);

        assert_eq!(graph.cycles(), &[vec!["a".to_string(), "b".into(), "c".into()]]);
        let excluded: BTreeSet<String> = graph.exclusions().keys().cloned().collect();
        assert_eq!(excluded, set(&["a", "b", "c"]));
        assert!(graph
            .exclusions()
            .values()
            .all(|r| *r == FailureReason::DependencyCycle));
    }

    #[test]
    fn test_cycle_reached_through_cross_edge() {
        // a -> b -> a, a -> c -> b: c is on a cycle even though the search
        // reaches b from a before it reaches c
        let graph = DependencyGraph::from_nodes([
            node("a", &["b", "c"]),
            node("b", &["a"]),
            node("c", &["b"]),
        ]);

        let excluded: BTreeSet<String> = graph.exclusions().keys().cloned().collect();
        assert_eq!(excluded, set(&["a", "b", "c"]));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = DependencyGraph::from_nodes([node("loop", &["loop"])]);
        assert_eq!(
            graph.exclusions().get("loop"),
            Some(&FailureReason::DependencyCycle)
        );
    }

    fn long_chain(len: usize) -> Vec<ModuleNode> {
        (0..len)
            .map(|i| {
                let name = format!("m{i:05}");
                if i == 0 {
                    node(&name, &[])
                } else {
                    let dep = format!("m{:05}", i - 1);
                    node(&name, &[dep.as_str()])
                }
            })
            .collect()
    }

    #[test]
    fn test_deep_chain_has_no_cycles() {
        let graph = DependencyGraph::from_nodes(long_chain(50_000));

        assert!(graph.cycles().is_empty());
        assert!(graph.exclusions().is_empty());
        assert_eq!(graph.topological_order().first().map(String::as_str), Some("m00000"));
    }

    #[test]
    fn test_deep_cycle_is_one_component() {
        let mut nodes = long_chain(50_000);
        nodes[0] = node("m00000", &["m49999"]);
        let graph = DependencyGraph::from_nodes(nodes);

        assert_eq!(graph.cycles().len(), 1);
        assert_eq!(graph.cycles()[0].len(), 50_000);
        assert_eq!(graph.exclusions().len(), 50_000);
    }

    #[test]
    fn test_topological_order() {
        let graph = DependencyGraph::from_nodes([
            node("site", &[]),
            node("common", &[]),
            node("game", &["common"]),
            node("round", &["game", "common", "site"]),
        ]);

        assert_eq!(graph.topological_order(), vec!["common", "game", "site", "round"]);
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::from_nodes([
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("d", &[]),
        ]);

        assert_eq!(graph.transitive_dependents("a"), set(&["b", "c"]));
        assert!(graph.transitive_dependents("c").is_empty());
    }

    #[test]
    fn test_alias_resolves_to_owner() {
        let analyse = node("analyse", &[]).with_targets(vec![BundleTarget {
            owner: "analyse".into(),
            key: "main".into(),
            output_id: "analysisBoard".into(),
            inputs: vec![PathBuf::from("src/main.ts")],
        }]);
        let graph = DependencyGraph::from_nodes([analyse, node("puzzle", &["analysisBoard"])]);

        assert_eq!(graph.aliases().get("analysisBoard").map(String::as_str), Some("analyse"));
        assert_eq!(graph.get("puzzle").unwrap().dependencies, set(&["analyse"]));
    }

    #[test]
    fn test_bundle_input_in_other_module_adds_edge() {
        let analyse = node("analyse", &[]).with_targets(vec![BundleTarget {
            owner: "analyse".into(),
            key: "study".into(),
            output_id: "study".into(),
            inputs: vec![PathBuf::from("../study/src/main.ts"), PathBuf::from("src/x.ts")],
        }]);
        let graph = DependencyGraph::from_nodes([analyse, node("study", &[])]);

        assert_eq!(graph.get("analyse").unwrap().dependencies, set(&["study"]));
        assert!(graph.aliases().is_empty());
    }

    #[test]
    fn test_module_for_path_prefers_deepest() {
        let mut nested = node("inner", &[]);
        nested.working_dir = PathBuf::from("/ui/outer/inner");
        let graph = DependencyGraph::from_nodes([node("outer", &[]), nested]);

        assert_eq!(graph.module_for_path(Path::new("/ui/outer/src/a.ts")), Some("outer"));
        assert_eq!(graph.module_for_path(Path::new("/ui/outer/inner/a.ts")), Some("inner"));
        assert_eq!(graph.module_for_path(Path::new("/elsewhere/a.ts")), None);
    }

    #[test]
    fn test_dot_marks_excluded() {
        let graph = DependencyGraph::from_nodes([node("a", &["b"]), node("b", &["a"]), node("c", &["a"])]);
        let dot = graph.to_dot();
        assert!(dot.contains("\"a\" [color=red, fontcolor=red];"));
        assert!(dot.contains("\"c\" -> \"a\";"));
        assert!(dot.contains("    \"c\";"));
    }

    fn write_module(root: &Path, name: &str, package_json: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), package_json).unwrap();
    }

    #[test]
    fn test_build_from_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_module(root, "common", r#"{"scripts": {"dev": "tsc"}}"#);
        write_module(
            root,
            "round",
            r#"{"dependencies": {"common": "*", "snabbdom": "*"}, "scripts": {"dev": "rollup"}}"#,
        );
        write_module(root, "broken", "{");
        write_module(root, "quoting", r#"{"scripts": {"dev": "echo 'oops"}}"#);
        write_module(root, "node_modules/snabbdom", "{}");
        std::fs::write(root.join("package.json"), "{}").unwrap();

        let graph = GraphBuilder::default().build(root).unwrap();

        let names: Vec<&str> = graph.names().collect();
        assert_eq!(names, vec!["broken", "common", "quoting", "round"]);
        assert_eq!(graph.get("round").unwrap().dependencies, set(&["common"]));
        assert_eq!(
            graph.get("common").unwrap().build_plan,
            BuildPlan {
                groups: vec![InvocationGroup {
                    script: "dev".into(),
                    invocations: vec![Invocation {
                        program: "tsc".into(),
                        args: vec!["--incremental".into()],
                        working_dir: root.join("common"),
                    }],
                }]
            }
        );
        assert!(matches!(
            graph.exclusions().get("broken"),
            Some(FailureReason::InvalidManifest(_))
        ));
        assert!(matches!(
            graph.exclusions().get("quoting"),
            Some(FailureReason::InvalidBuildScript(_))
        ));
    }

    #[test]
    fn test_build_respects_exclude() {
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "tutor", "{}");
        write_module(tmp.path(), "site", "{}");

        let graph = GraphBuilder::default()
            .with_exclude(vec!["tutor".into()])
            .build(tmp.path())
            .unwrap();
        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["site"]);
    }

    #[test]
    fn test_refresh_picks_up_new_edge_and_removal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_module(root, "a", "{}");
        write_module(root, "b", "{}");
        write_module(root, "c", "{}");
        let builder = GraphBuilder::default();
        let graph = builder.build(root).unwrap();
        assert!(graph.get("b").unwrap().dependencies.is_empty());

        write_module(root, "b", r#"{"dependencies": {"a": "*"}}"#);
        let graph = builder.refresh(&graph, &root.join("b")).unwrap();
        assert_eq!(graph.get("b").unwrap().dependencies, set(&["a"]));
        assert_eq!(graph.get("a").unwrap().dependents, set(&["b"]));

        std::fs::remove_file(root.join("c/package.json")).unwrap();
        let graph = builder.refresh(&graph, &root.join("c")).unwrap();
        assert!(!graph.contains("c"));
        assert_eq!(graph.len(), 2);
    }

    struct FixedManifests(BTreeMap<String, ModuleManifest>);

    impl ManifestReader for FixedManifests {
        fn read(&self, dir: &Path) -> Result<Option<ModuleManifest>, crate::error::ManifestError> {
            Ok(self.0.get(&module_name(dir)).cloned())
        }
    }

    struct InputFrom(&'static str, &'static str);

    impl BundleConfigReader for InputFrom {
        fn read(&self, dir: &Path) -> Result<Vec<BundleTarget>, crate::error::ManifestError> {
            let owner = module_name(dir);
            if owner != self.0 {
                return Ok(Vec::new());
            }
            Ok(vec![BundleTarget {
                owner: owner.clone(),
                key: "main".into(),
                output_id: owner,
                inputs: vec![PathBuf::from(format!("../{}/src/main.ts", self.1))],
            }])
        }
    }

    #[test]
    fn test_custom_readers() {
        let tmp = TempDir::new().unwrap();
        for dir in ["lib", "app", "docs"] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        let manifests = ["lib", "app"]
            .into_iter()
            .map(|name| (name.to_string(), ModuleManifest::new(name)))
            .collect();

        let graph = GraphBuilder::default()
            .with_manifest_reader(FixedManifests(manifests))
            .with_bundle_reader(InputFrom("app", "lib"))
            .build(tmp.path())
            .unwrap();

        assert_eq!(graph.names().collect::<Vec<_>>(), vec!["app", "lib"]);
        assert_eq!(graph.get("app").unwrap().dependencies, set(&["lib"]));
    }
}

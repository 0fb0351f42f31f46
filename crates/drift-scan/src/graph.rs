//! Module dependency graph
//!
//! Tracks import relationships between scanned files. Every edge A -> B is
//! mirrored as `B in A.dependencies` and `A in B.dependents`, and that holds
//! after every mutation. Traversals use explicit stacks so very deep import
//! chains cannot overflow the call stack.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use drift_core::config::GraphConfig;

/// How a module was imported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
    /// `import x from '...'`
    #[default]
    Static,
    /// `import('...')`
    Dynamic,
    /// `require('...')`
    Require,
    /// Type-only import, erased at runtime
    Type,
}

/// How a symbol was exported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportKind {
    #[default]
    Named,
    Default,
    /// `export { x } from '...'`
    ReExport,
    /// `export * from '...'`
    Namespace,
    Type,
}

/// An import record produced by source analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    /// Specifier as written
    pub source: String,
    /// File the specifier resolved to, if any
    #[serde(default)]
    pub resolved_path: Option<String>,
    /// Imported names
    #[serde(default)]
    pub specifiers: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: ImportKind,
    /// `import './polyfill'`
    #[serde(default)]
    pub side_effect_only: bool,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl ImportInfo {
    /// Create an unresolved static import
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            resolved_path: None,
            specifiers: Vec::new(),
            kind: ImportKind::Static,
            side_effect_only: false,
            line: 0,
            column: 0,
        }
    }

    /// Set the resolved target
    pub fn with_resolved_path(mut self, path: impl Into<String>) -> Self {
        self.resolved_path = Some(path.into());
        self
    }

    /// Set the import kind
    pub fn with_kind(mut self, kind: ImportKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the imported names
    pub fn with_specifiers(mut self, specifiers: Vec<String>) -> Self {
        self.specifiers = specifiers;
        self
    }
}

/// An export record produced by source analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ExportKind,
    /// Module re-exported from
    #[serde(default)]
    pub source: Option<String>,
    /// Name before `as` renaming
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl ExportInfo {
    /// Create a named export
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::Named,
            source: None,
            original_name: None,
            line: 0,
            column: 0,
        }
    }

    /// Set the export kind
    pub fn with_kind(mut self, kind: ExportKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A module (file) in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    /// Normalized path
    pub path: String,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    /// Modules this one imports
    pub dependencies: BTreeSet<String>,
    /// Modules importing this one
    pub dependents: BTreeSet<String>,
    /// False for placeholders known only as import targets
    pub analyzed: bool,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl ModuleNode {
    fn placeholder(path: &str) -> Self {
        Self {
            path: path.to_string(),
            imports: Vec::new(),
            exports: Vec::new(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            analyzed: false,
            analyzed_at: None,
        }
    }
}

/// A resolved import relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub import: ImportInfo,
}

/// Import filtering
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Record type-only imports as edges
    pub track_type_imports: bool,
    /// Record imports resolving into node_modules
    pub include_node_modules: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::from(&GraphConfig::default())
    }
}

impl From<&GraphConfig> for GraphOptions {
    fn from(config: &GraphConfig) -> Self {
        Self {
            track_type_imports: config.track_type_imports,
            include_node_modules: config.include_node_modules,
        }
    }
}

/// Result of [`ModuleGraph::detect_circular_dependencies`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub has_circular: bool,
    pub cycles: Vec<Vec<String>>,
}

/// Forward slashes, no trailing slash
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

fn is_node_modules(path: &str) -> bool {
    path.split('/').any(|segment| segment == "node_modules")
}

/// Directed graph of modules and their imports
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    options: GraphOptions,
    nodes: BTreeMap<String, ModuleNode>,
    edges: Vec<DependencyEdge>,
}

impl ModuleGraph {
    /// Create an empty graph
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Record a scanned module, replacing any previous version of it.
    ///
    /// Existing dependents are kept; the previous outgoing edges are dropped
    /// and rebuilt from `imports`. Unknown import targets become placeholders.
    pub fn add_module(&mut self, path: &str, imports: Vec<ImportInfo>, exports: Vec<ExportInfo>) {
        let path = normalize_path(path);
        let imports: Vec<ImportInfo> = imports.into_iter().filter(|i| self.accepts(i)).collect();

        self.unlink_outgoing(&path);
        let dependents = self
            .nodes
            .remove(&path)
            .map(|node| node.dependents)
            .unwrap_or_default();

        let mut dependencies = BTreeSet::new();
        for import in &imports {
            let Some(resolved) = import.resolved_path.as_deref() else {
                continue;
            };
            let target = normalize_path(resolved);
            if !self.nodes.contains_key(&target) && target != path {
                debug!(module = %target, "placeholder created for import target");
                self.nodes
                    .insert(target.clone(), ModuleNode::placeholder(&target));
            }
            dependencies.insert(target.clone());
            self.edges.push(DependencyEdge {
                from: path.clone(),
                to: target,
                import: import.clone(),
            });
        }

        self.nodes.insert(
            path.clone(),
            ModuleNode {
                path: path.clone(),
                imports,
                exports,
                dependencies: dependencies.clone(),
                dependents,
                analyzed: true,
                analyzed_at: Some(Utc::now()),
            },
        );

        for dep in &dependencies {
            if let Some(node) = self.nodes.get_mut(dep) {
                node.dependents.insert(path.clone());
            }
        }

        debug!(module = %path, dependencies = dependencies.len(), "module added");
    }

    /// Remove a module and every edge touching it; false if unknown
    pub fn remove_module(&mut self, path: &str) -> bool {
        let path = normalize_path(path);
        let Some(node) = self.nodes.remove(&path) else {
            return false;
        };

        for dependent in &node.dependents {
            if let Some(other) = self.nodes.get_mut(dependent) {
                other.dependencies.remove(&path);
            }
        }
        for dep in &node.dependencies {
            if let Some(other) = self.nodes.get_mut(dep) {
                other.dependents.remove(&path);
            }
        }
        self.edges.retain(|edge| edge.from != path && edge.to != path);

        debug!(module = %path, "module removed");
        true
    }

    /// Direct dependencies, empty if unknown
    pub fn dependencies(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(&normalize_path(path))
            .map(|n| n.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents, empty if unknown
    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(&normalize_path(path))
            .map(|n| n.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Everything reachable through imports, excluding `path` itself
    pub fn transitive_dependencies(&self, path: &str) -> Vec<String> {
        self.reachable(path, |node| &node.dependencies)
    }

    /// Everything that reaches `path` through imports, excluding `path` itself
    pub fn transitive_dependents(&self, path: &str) -> Vec<String> {
        self.reachable(path, |node| &node.dependents)
    }

    fn reachable<F>(&self, path: &str, neighbours: F) -> Vec<String>
    where
        F: Fn(&ModuleNode) -> &BTreeSet<String>,
    {
        let origin = normalize_path(path);
        let Some(node) = self.nodes.get(&origin) else {
            return Vec::new();
        };

        let mut visited: HashSet<&str> = HashSet::from([origin.as_str()]);
        let mut stack: Vec<&str> = neighbours(node).iter().rev().map(String::as_str).collect();
        let mut found = Vec::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            found.push(current.to_string());
            if let Some(node) = self.nodes.get(current) {
                stack.extend(
                    neighbours(node)
                        .iter()
                        .rev()
                        .map(String::as_str)
                        .filter(|n| !visited.contains(n)),
                );
            }
        }

        found
    }

    /// Modules ordered so every dependency precedes its dependents
    #[instrument(skip_all, fields(modules = self.nodes.len()))]
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut visiting: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for (root, root_node) in &self.nodes {
            if visited.contains(root.as_str()) {
                continue;
            }

            visiting.insert(root.as_str());
            let mut stack = vec![(root.as_str(), root_node.dependencies.iter())];

            loop {
                let Some((_, deps)) = stack.last_mut() else {
                    break;
                };

                match deps.next() {
                    Some(dep) => {
                        let dep = dep.as_str();
                        if visited.contains(dep) {
                            continue;
                        }
                        if visiting.contains(dep) {
                            let start = stack.iter().position(|(p, _)| *p == dep).unwrap_or(0);
                            let cycle = stack[start..].iter().map(|(p, _)| p.to_string()).collect();
                            return Err(GraphError::CycleDetected { cycle });
                        }
                        match self.nodes.get(dep) {
                            Some(node) => {
                                visiting.insert(dep);
                                stack.push((dep, node.dependencies.iter()));
                            }
                            None => {
                                visited.insert(dep);
                                order.push(dep.to_string());
                            }
                        }
                    }
                    None => {
                        if let Some((done, _)) = stack.pop() {
                            visiting.remove(done);
                            visited.insert(done);
                            order.push(done.to_string());
                        }
                    }
                }
            }
        }

        Ok(order)
    }

    /// Whether any import cycle exists
    pub fn has_circular_dependency(&self) -> bool {
        self.topological_order().is_err()
    }

    /// Import cycles found by depth-first search, one per distinct node set
    #[instrument(skip_all, fields(modules = self.nodes.len()))]
    pub fn circular_dependencies(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut cycles = Vec::new();

        for (root, root_node) in &self.nodes {
            if visited.contains(root.as_str()) {
                continue;
            }

            visited.insert(root.as_str());
            let mut on_stack: HashSet<&str> = HashSet::from([root.as_str()]);
            let mut stack = vec![(root.as_str(), root_node.dependencies.iter())];

            loop {
                let Some((_, deps)) = stack.last_mut() else {
                    break;
                };

                match deps.next() {
                    Some(dep) => {
                        let dep = dep.as_str();
                        if on_stack.contains(dep) {
                            let start = stack.iter().position(|(p, _)| *p == dep).unwrap_or(0);
                            let cycle: Vec<String> =
                                stack[start..].iter().map(|(p, _)| p.to_string()).collect();
                            let mut members = cycle.clone();
                            members.sort();
                            if seen.insert(members) {
                                cycles.push(cycle);
                            }
                        } else if !visited.contains(dep) {
                            if let Some(node) = self.nodes.get(dep) {
                                visited.insert(dep);
                                on_stack.insert(dep);
                                stack.push((dep, node.dependencies.iter()));
                            }
                        }
                    }
                    None => {
                        if let Some((done, _)) = stack.pop() {
                            on_stack.remove(done);
                        }
                    }
                }
            }
        }

        if !cycles.is_empty() {
            debug!(cycles = cycles.len(), "circular dependencies found");
        }
        cycles
    }

    /// Cycle presence and the cycles themselves
    pub fn detect_circular_dependencies(&self) -> CycleReport {
        let cycles = self.circular_dependencies();
        CycleReport {
            has_circular: !cycles.is_empty(),
            cycles,
        }
    }

    /// Every module that is part of some detected cycle
    pub fn modules_in_cycles(&self) -> Vec<String> {
        self.circular_dependencies()
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Modules without dependencies
    pub fn leaf_modules(&self) -> Vec<String> {
        self.paths_where(|node| node.dependencies.is_empty())
    }

    /// Modules nothing depends on
    pub fn root_modules(&self) -> Vec<String> {
        self.paths_where(|node| node.dependents.is_empty())
    }

    /// Import targets that have not been scanned yet
    pub fn placeholder_modules(&self) -> Vec<String> {
        self.paths_where(|node| !node.analyzed)
    }

    fn paths_where(&self, predicate: impl Fn(&ModuleNode) -> bool) -> Vec<String> {
        self.nodes
            .values()
            .filter(|node| predicate(node))
            .map(|node| node.path.clone())
            .collect()
    }

    pub fn module(&self, path: &str) -> Option<&ModuleNode> {
        self.nodes.get(&normalize_path(path))
    }

    pub fn has_module(&self, path: &str) -> bool {
        self.nodes.contains_key(&normalize_path(path))
    }

    /// All modules ordered by path
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Number of modules, placeholders included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    fn accepts(&self, import: &ImportInfo) -> bool {
        if import.kind == ImportKind::Type && !self.options.track_type_imports {
            return false;
        }
        if !self.options.include_node_modules {
            if let Some(resolved) = &import.resolved_path {
                if is_node_modules(&normalize_path(resolved)) {
                    return false;
                }
            }
        }
        true
    }

    fn unlink_outgoing(&mut self, path: &str) {
        let previous: Vec<String> = match self.nodes.get(path) {
            Some(node) => node.dependencies.iter().cloned().collect(),
            None => return,
        };
        if previous.is_empty() {
            return;
        }
        for dep in &previous {
            if let Some(node) = self.nodes.get_mut(dep) {
                node.dependents.remove(path);
            }
        }
        self.edges.retain(|edge| edge.from != path);
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
        None => String::new(),
    }
}

/// Errors from graph ordering
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph is not a DAG
    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    CycleDetected { cycle: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(target: &str) -> ImportInfo {
        ImportInfo::new(format!("./{target}")).with_resolved_path(target)
    }

    fn graph() -> ModuleGraph {
        ModuleGraph::new(GraphOptions::default())
    }

    fn assert_consistent(graph: &ModuleGraph) {
        for node in graph.modules() {
            for dep in &node.dependencies {
                let target = graph.module(dep).expect("dependency node exists");
                assert!(target.dependents.contains(&node.path), "{dep} missing dependent {}", node.path);
            }
            for dependent in &node.dependents {
                let source = graph.module(dependent).expect("dependent node exists");
                assert!(source.dependencies.contains(&node.path));
            }
        }
        for edge in graph.edges() {
            assert!(graph.module(&edge.from).unwrap().dependencies.contains(&edge.to));
        }
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![], vec![]);

        assert_eq!(graph.dependencies("a"), vec!["b"]);
        assert_eq!(graph.dependents("b"), vec!["a"]);
        assert_eq!(graph.edge_count(), 1);
        assert_consistent(&graph);

        let order = graph.topological_order().unwrap();
        let pos = |p: &str| order.iter().position(|x| x == p).unwrap();
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn test_placeholder_then_analyzed() {
        let mut graph = graph();
        graph.add_module("src/app.ts", vec![import("src/util.ts")], vec![]);

        let placeholder = graph.module("src/util.ts").unwrap();
        assert!(!placeholder.analyzed);
        assert!(placeholder.analyzed_at.is_none());
        assert_eq!(graph.placeholder_modules(), vec!["src/util.ts"]);
        assert_eq!(graph.dependents("src/util.ts"), vec!["src/app.ts"]);

        graph.add_module("src/util.ts", vec![], vec![ExportInfo::new("helper")]);
        let node = graph.module("src/util.ts").unwrap();
        assert!(node.analyzed);
        assert_eq!(node.exports.len(), 1);
        // Dependents survive the upgrade from placeholder
        assert_eq!(graph.dependents("src/util.ts"), vec!["src/app.ts"]);
        assert!(graph.placeholder_modules().is_empty());
        assert_consistent(&graph);
    }

    #[test]
    fn test_readd_replaces_outgoing_edges() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b"), import("c")], vec![]);
        graph.add_module("a", vec![import("c")], vec![]);

        assert_eq!(graph.dependencies("a"), vec!["c"]);
        assert!(graph.dependents("b").is_empty());
        assert_eq!(graph.edge_count(), 1);
        assert_consistent(&graph);
    }

    #[test]
    fn test_path_normalization() {
        let mut graph = graph();
        graph.add_module("src\\lib\\", vec![import("src\\util")], vec![]);

        assert!(graph.has_module("src/lib"));
        assert!(graph.has_module("src/lib/"));
        assert_eq!(graph.dependencies("src/lib"), vec!["src/util"]);
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_type_imports_filter() {
        let mut graph = ModuleGraph::new(GraphOptions {
            track_type_imports: false,
            include_node_modules: false,
        });
        graph.add_module(
            "a",
            vec![import("types").with_kind(ImportKind::Type), import("b")],
            vec![],
        );

        assert_eq!(graph.dependencies("a"), vec!["b"]);
        assert!(!graph.has_module("types"));
        assert_eq!(graph.module("a").unwrap().imports.len(), 1);
    }

    #[test]
    fn test_node_modules_filter() {
        let mut graph = graph();
        graph.add_module(
            "a",
            vec![ImportInfo::new("react").with_resolved_path("node_modules/react/index.js")],
            vec![],
        );
        assert!(graph.dependencies("a").is_empty());

        let mut graph = ModuleGraph::new(GraphOptions {
            track_type_imports: true,
            include_node_modules: true,
        });
        graph.add_module(
            "a",
            vec![ImportInfo::new("react").with_resolved_path("node_modules/react/index.js")],
            vec![],
        );
        assert_eq!(graph.dependencies("a"), vec!["node_modules/react/index.js"]);
    }

    #[test]
    fn test_unresolved_imports_add_no_edges() {
        let mut graph = graph();
        graph.add_module("a", vec![ImportInfo::new("lodash")], vec![]);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.module("a").unwrap().imports.len(), 1);
    }

    #[test]
    fn test_remove_module() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![import("c")], vec![]);
        graph.add_module("c", vec![], vec![]);

        assert!(graph.remove_module("b"));
        assert!(!graph.remove_module("b"));
        assert!(!graph.has_module("b"));
        assert!(graph.edges().iter().all(|e| e.from != "b" && e.to != "b"));
        for node in graph.modules() {
            assert!(!node.dependencies.contains("b"));
            assert!(!node.dependents.contains("b"));
        }
        assert_consistent(&graph);
    }

    #[test]
    fn test_transitive_queries() {
        let mut graph = graph();
        graph.add_module("app", vec![import("service"), import("util")], vec![]);
        graph.add_module("service", vec![import("db"), import("util")], vec![]);
        graph.add_module("db", vec![], vec![]);
        graph.add_module("util", vec![], vec![]);

        let mut deps = graph.transitive_dependencies("app");
        deps.sort();
        assert_eq!(deps, vec!["db", "service", "util"]);

        let mut dependents = graph.transitive_dependents("util");
        dependents.sort();
        assert_eq!(dependents, vec!["app", "service"]);

        assert!(graph.transitive_dependencies("missing").is_empty());
    }

    #[test]
    fn test_transitive_excludes_origin_in_cycle() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![import("a")], vec![]);

        assert_eq!(graph.transitive_dependencies("a"), vec!["b"]);
        assert_eq!(graph.transitive_dependents("a"), vec!["b"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![import("a")], vec![]);

        assert!(graph.has_circular_dependency());
        let cycles = graph.circular_dependencies();
        assert_eq!(cycles.len(), 1);
        let mut members = cycles[0].clone();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        let err = graph.topological_order().unwrap_err();
        assert!(err.to_string().contains("Circular dependency detected"));

        let report = graph.detect_circular_dependencies();
        assert!(report.has_circular);
        assert_eq!(report.cycles, cycles);
        assert_eq!(graph.modules_in_cycles(), vec!["a", "b"]);
    }

    #[test]
    fn test_overlapping_and_disjoint_cycles() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![import("a"), import("c")], vec![]);
        graph.add_module("c", vec![import("b")], vec![]);
        graph.add_module("d", vec![import("e")], vec![]);
        graph.add_module("e", vec![import("d")], vec![]);

        let mut member_sets: Vec<Vec<String>> = graph
            .circular_dependencies()
            .into_iter()
            .map(|mut cycle| {
                cycle.sort();
                cycle
            })
            .collect();
        member_sets.sort();
        assert_eq!(
            member_sets,
            vec![vec!["a", "b"], vec!["b", "c"], vec!["d", "e"]]
        );
        assert_eq!(
            graph.modules_in_cycles(),
            vec!["a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn test_cycle_reached_from_two_roots_reported_once() {
        let mut graph = graph();
        graph.add_module("entry1", vec![import("x")], vec![]);
        graph.add_module("entry2", vec![import("y")], vec![]);
        graph.add_module("x", vec![import("y")], vec![]);
        graph.add_module("y", vec![import("z")], vec![]);
        graph.add_module("z", vec![import("x")], vec![]);

        let cycles = graph.circular_dependencies();
        assert_eq!(cycles, vec![vec!["x", "y", "z"]]);
        assert_eq!(graph.modules_in_cycles(), vec!["x", "y", "z"]);
        assert_consistent(&graph);
    }

    #[test]
    fn test_self_import_cycle() {
        let mut graph = graph();
        graph.add_module("a", vec![import("a")], vec![]);

        assert_eq!(graph.dependents("a"), vec!["a"]);
        assert_eq!(graph.circular_dependencies(), vec![vec!["a".to_string()]]);
        assert!(graph.topological_order().is_err());
        assert_consistent(&graph);
    }

    #[test]
    fn test_acyclic_graph_reports_no_cycles() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b"), import("c")], vec![]);
        graph.add_module("b", vec![import("c")], vec![]);

        assert!(!graph.has_circular_dependency());
        assert!(graph.circular_dependencies().is_empty());
        assert!(graph.modules_in_cycles().is_empty());
        assert_eq!(graph.topological_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_leaf_and_root_modules() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.add_module("b", vec![import("c")], vec![]);
        graph.add_module("d", vec![], vec![]);

        assert_eq!(graph.leaf_modules(), vec!["c", "d"]);
        assert_eq!(graph.root_modules(), vec!["a", "d"]);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut graph = graph();
        let depth = 50_000;
        for i in 0..depth {
            graph.add_module(&format!("m{i}"), vec![import(&format!("m{}", i + 1))], vec![]);
        }

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), depth + 1);
        assert_eq!(order.first().map(String::as_str), Some(format!("m{depth}").as_str()));
        assert_eq!(graph.transitive_dependencies("m0").len(), depth);
        assert!(graph.circular_dependencies().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut graph = graph();
        graph.add_module("a", vec![import("b")], vec![]);
        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_import_info_wire_format() {
        let json = r#"{"source":"./b","resolvedPath":"b","specifiers":["x"],"type":"type","sideEffectOnly":false,"line":3,"column":1}"#;
        let info: ImportInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.kind, ImportKind::Type);
        assert_eq!(info.resolved_path.as_deref(), Some("b"));
        assert_eq!(info.line, 3);
    }
}

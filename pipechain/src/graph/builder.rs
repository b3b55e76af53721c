//! Construction of execution graphs from pipeline configurations.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use super::groups::ChainableGroups;
use crate::config::PipelineConfig;
use crate::errors::GraphError;

/// A validated, acyclic directed graph over a pipeline's node ids.
///
/// Edges point from a node to the nodes that run after it. The graph is
/// derived from `dagAdjacency` and never persisted; it is rebuilt from the
/// configuration whenever a run is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionGraph {
    nodes: BTreeSet<String>,
    downstream: BTreeMap<String, BTreeSet<String>>,
    upstream: BTreeMap<String, BTreeSet<String>>,
}

impl ExecutionGraph {
    fn add_node(&mut self, node: &str) {
        if self.nodes.insert(node.to_string()) {
            self.downstream.insert(node.to_string(), BTreeSet::new());
            self.upstream.insert(node.to_string(), BTreeSet::new());
        }
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        if let Some(out) = self.downstream.get_mut(from) {
            out.insert(to.to_string());
        }
        if let Some(inc) = self.upstream.get_mut(to) {
            inc.insert(from.to_string());
        }
    }

    /// Returns all node ids in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(BTreeSet::len).sum()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if the node is part of the graph.
    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Returns the nodes that directly follow `node`.
    pub fn downstream(&self, node: &str) -> impl Iterator<Item = &str> {
        self.downstream
            .get(node)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Returns the nodes that directly precede `node`.
    pub fn upstream(&self, node: &str) -> impl Iterator<Item = &str> {
        self.upstream
            .get(node)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Groups nodes into layers that can run concurrently.
    ///
    /// Kahn layering: each pass takes every node whose upstream nodes are all
    /// scheduled, sorts the layer by node id and removes its out-edges.
    #[must_use]
    pub fn chainable_groups(&self) -> ChainableGroups {
        let mut in_degree: BTreeMap<&str, usize> = self
            .upstream
            .iter()
            .map(|(node, inc)| (node.as_str(), inc.len()))
            .collect();

        let mut groups = Vec::new();
        let mut layer: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();

        while !layer.is_empty() {
            let mut next = Vec::new();
            for node in &layer {
                for child in self.downstream(node) {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(child);
                        }
                    }
                }
            }
            next.sort_unstable();
            groups.push(layer.iter().map(|s| (*s).to_string()).collect());
            layer = next;
        }

        ChainableGroups::new(groups)
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node.as_str()) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for child in self.downstream(node) {
            if on_stack.contains(child) {
                let start = path.iter().position(|n| *n == child).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(child.to_string());
                return Some(cycle);
            }
            if !visited.contains(child) {
                if let Some(cycle) = self.dfs_cycle(child, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_stack.remove(node);
        None
    }
}

/// Builds [`ExecutionGraph`]s from pipeline configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionGraphBuilder;

impl ExecutionGraphBuilder {
    /// Builds and validates the execution graph of a configuration.
    ///
    /// Every node mentioned in `dagAdjacency`, as a key or as a target, must
    /// have a task definition. The result is guaranteed acyclic.
    pub fn build(config: &PipelineConfig) -> Result<ExecutionGraph, GraphError> {
        if config.dag_adjacency.is_empty() && !config.task_definitions.is_empty() {
            return Err(GraphError::EmptyDag {
                task_count: config.task_definitions.len(),
            });
        }

        let mut graph = ExecutionGraph::default();
        for (node, targets) in &config.dag_adjacency {
            if !config.task_definitions.contains_key(node) {
                return Err(GraphError::UndefinedNode {
                    node: node.clone(),
                    referenced_by: None,
                });
            }
            graph.add_node(node);

            for target in targets {
                if !config.task_definitions.contains_key(target) {
                    return Err(GraphError::UndefinedNode {
                        node: target.clone(),
                        referenced_by: Some(node.clone()),
                    });
                }
                graph.add_edge(node, target);
            }
        }

        if let Some(path) = graph.find_cycle() {
            return Err(GraphError::Cycle { path });
        }

        debug!(
            pipeline_id = %config.pipeline_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built execution graph"
        );
        Ok(graph)
    }

    /// Computes the chainable groups of a graph.
    #[must_use]
    pub fn chainable_groups(graph: &ExecutionGraph) -> ChainableGroups {
        graph.chainable_groups()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskDefinition;
    use pretty_assertions::assert_eq;

    fn config(edges: &[(&str, &[&str])]) -> PipelineConfig {
        let mut config = PipelineConfig::new("p").with_queue("q");
        for (node, targets) in edges {
            config = config.with_edges(*node, targets);
            for n in std::iter::once(node).chain(targets.iter()) {
                config = config.with_task(*n, TaskDefinition::new(format!("tasks.{n}")));
            }
        }
        config
    }

    fn groups(edges: &[(&str, &[&str])]) -> Vec<Vec<String>> {
        let graph = ExecutionGraphBuilder::build(&config(edges)).unwrap();
        graph.chainable_groups().into_inner()
    }

    #[test]
    fn test_diamond_layers() {
        let result = groups(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(
            result,
            vec![vec!["a".to_string()], vec!["b".into(), "c".into()], vec!["d".into()]]
        );
    }

    #[test]
    fn test_fan_in_layers_sorted() {
        let result = groups(&[("b", &["c"]), ("a", &["c"])]);
        assert_eq!(result, vec![vec!["a".to_string(), "b".into()], vec!["c".into()]]);
    }

    #[test]
    fn test_node_waits_for_longest_path() {
        // a -> b -> c and a -> c: c must land after b.
        let graph = ExecutionGraphBuilder::build(&config(&[("a", &["b", "c"]), ("b", &["c"])])).unwrap();
        let groups = graph.chainable_groups();

        assert_eq!(groups.group_of("a"), Some(0));
        assert_eq!(groups.group_of("b"), Some(1));
        assert_eq!(groups.group_of("c"), Some(2));
    }

    #[test]
    fn test_disconnected_singletons_share_group() {
        let result = groups(&[("x", &[]), ("y", &[])]);
        assert_eq!(result, vec![vec!["x".to_string(), "y".into()]]);
    }

    #[test]
    fn test_groups_respect_every_edge() {
        let graph = ExecutionGraphBuilder::build(&config(&[
            ("a", &["d"]),
            ("b", &["d", "e"]),
            ("c", &["e"]),
            ("d", &["f"]),
            ("e", &["f"]),
        ]))
        .unwrap();
        let groups = graph.chainable_groups();

        assert_eq!(groups.node_count(), graph.node_count());
        for node in graph.nodes() {
            for child in graph.downstream(node) {
                assert!(groups.group_of(node) < groups.group_of(child));
            }
        }
    }

    #[test]
    fn test_undefined_target_rejected() {
        let cfg = PipelineConfig::new("p")
            .with_edges("a", &["ghost"])
            .with_task("a", TaskDefinition::new("tasks.a"));

        let err = ExecutionGraphBuilder::build(&cfg).unwrap_err();
        assert_eq!(
            err,
            GraphError::UndefinedNode {
                node: "ghost".into(),
                referenced_by: Some("a".into())
            }
        );
    }

    #[test]
    fn test_undefined_key_rejected() {
        let cfg = PipelineConfig::new("p").with_edges("a", &[]);
        let err = ExecutionGraphBuilder::build(&cfg).unwrap_err();
        assert!(matches!(err, GraphError::UndefinedNode { referenced_by: None, .. }));
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let err = ExecutionGraphBuilder::build(&config(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]))
            .unwrap_err();

        match err {
            GraphError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let err = ExecutionGraphBuilder::build(&config(&[("a", &["a"])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                path: vec!["a".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_empty_dag_with_tasks_rejected() {
        let cfg = PipelineConfig::new("p").with_task("a", TaskDefinition::new("tasks.a"));
        let err = ExecutionGraphBuilder::build(&cfg).unwrap_err();
        assert_eq!(err, GraphError::EmptyDag { task_count: 1 });
    }

    #[test]
    fn test_empty_config_builds_empty_graph() {
        let graph = ExecutionGraphBuilder::build(&PipelineConfig::new("p")).unwrap();
        assert!(graph.is_empty());
        assert!(ExecutionGraphBuilder::chainable_groups(&graph).is_empty());
    }
}

//! Resource dependency graph using `petgraph`.
//!
//! Builds a directed acyclic graph from the references and explicit
//! `DependsOn` entries of a template and resolves the order in which the
//! provisioning engine has to create resources.

use std::collections::HashMap;

use ecsynth_common::error::{Result, StackError};
use ecsynth_common::types::LogicalId;
use petgraph::graph::NodeIndex;

use crate::intrinsic;
use crate::template::Template;

/// A dependency graph of resources.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: petgraph::Graph<LogicalId, ()>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
        }
    }

    /// Builds the graph of every resource in `template`.
    ///
    /// Edges come from `Ref` / `Fn::GetAtt` targets that are resources and
    /// from `DependsOn`. References to parameters, pseudo-parameters, or
    /// undeclared ids add no edge; the validator reports the latter.
    #[must_use]
    pub fn from_template(template: &Template) -> Self {
        let mut graph = Self::new();
        let nodes: HashMap<&LogicalId, NodeIndex> = template
            .resources
            .keys()
            .map(|id| (id, graph.add_resource(id.clone())))
            .collect();

        for (id, resource) in &template.resources {
            let Some(&dependent) = nodes.get(id) else {
                continue;
            };
            let referenced = intrinsic::references(&resource.properties);
            let targets = referenced
                .iter()
                .map(|name| LogicalId::new(name.as_str()))
                .chain(resource.depends_on.iter().cloned());
            for target in targets {
                if let Some(&dependency) = nodes.get(&target) {
                    graph.add_dependency(dependent, dependency);
                }
            }
        }
        graph
    }

    /// Adds a resource node to the graph.
    pub fn add_resource(&mut self, id: LogicalId) -> NodeIndex {
        self.graph.add_node(id)
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if self.graph.find_edge(dependency, dependent).is_none() {
            let _ = self.graph.add_edge(dependency, dependent, ());
        }
    }

    /// Number of resources in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of distinct dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Logical ids that `id` directly depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: &LogicalId) -> Vec<LogicalId> {
        let Some(node) = self.graph.node_indices().find(|&n| &self.graph[n] == id) else {
            return Vec::new();
        };
        let mut deps: Vec<LogicalId> = self
            .graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect();
        deps.sort();
        deps
    }

    /// Returns a creation order for all resources.
    ///
    /// Dependencies appear before the resources that depend on them.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Cycle`] if the graph contains cycles.
    pub fn resolve_order(&self) -> Result<Vec<LogicalId>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(StackError::Cycle {
                id: self
                    .graph
                    .node_weight(cycle.node_id())
                    .map_or_else(String::new, ToString::to_string),
            }),
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::Resource;

    fn id(name: &str) -> LogicalId {
        LogicalId::new(name)
    }

    fn position(order: &[LogicalId], name: &str) -> usize {
        order.iter().position(|n| n.as_str() == name).expect(name)
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
    }

    #[test]
    fn linear_dependency_chain() {
        let mut graph = DependencyGraph::new();
        let service = graph.add_resource(id("service"));
        let cluster = graph.add_resource(id("cluster"));
        graph.add_dependency(service, cluster);

        let order = graph.resolve_order().expect("should resolve");
        assert!(position(&order, "cluster") < position(&order, "service"));
    }

    #[test]
    fn diamond_dependency() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_resource(id("a"));
        let b = graph.add_resource(id("b"));
        let c = graph.add_resource(id("c"));
        let d = graph.add_resource(id("d"));
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order.len(), 4);
        assert!(position(&order, "d") < position(&order, "b"));
        assert!(position(&order, "d") < position(&order, "c"));
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn cycle_detection() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_resource(id("a"));
        let b = graph.add_resource(id("b"));
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let err = graph.resolve_order().unwrap_err();
        assert!(err.to_string().contains("cyclic"), "got: {err}");
    }

    #[test]
    fn repeated_dependency_adds_one_edge() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_resource(id("a"));
        let b = graph.add_resource(id("b"));
        graph.add_dependency(a, b);
        graph.add_dependency(a, b);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn template_references_and_depends_on_become_edges() {
        let mut template = Template::default();
        let _ = template.resources.insert(
            id("Vpc"),
            Resource::new("AWS::EC2::VPC", &json!({})).expect("resource"),
        );
        let _ = template.resources.insert(
            id("Subnet"),
            Resource::new(
                "AWS::EC2::Subnet",
                &json!({"VpcId": {"Ref": "Vpc"}, "AvailabilityZone": {"Ref": "AWS::Region"}}),
            )
            .expect("resource"),
        );
        let _ = template.resources.insert(
            id("Lb"),
            Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer", &json!({}))
                .expect("resource")
                .depends_on(id("Subnet")),
        );

        let graph = DependencyGraph::from_template(&template);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependencies_of(&id("Subnet")), vec![id("Vpc")]);
        assert_eq!(graph.dependencies_of(&id("Lb")), vec![id("Subnet")]);

        let order = graph.resolve_order().expect("should resolve");
        assert!(position(&order, "Vpc") < position(&order, "Subnet"));
        assert!(position(&order, "Subnet") < position(&order, "Lb"));
    }
}

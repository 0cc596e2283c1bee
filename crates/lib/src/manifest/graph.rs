//! Pipeline dependency graph.
//!
//! Pipelines reference each other through their build environment and their
//! stage inputs. The graph is used to check that a manifest is executable in
//! declaration order.

use std::collections::BTreeMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::Manifest;
use crate::error::{ManifestError, Result};

/// A DAG of pipelines, edges pointing from a dependency to its dependent.
#[derive(Debug)]
pub struct PipelineGraph {
  graph: DiGraph<String, ()>,
  nodes: BTreeMap<String, NodeIndex>,
}

impl PipelineGraph {
  /// Build and verify the graph of `manifest`.
  ///
  /// # Errors
  ///
  /// Returns [`ManifestError::InvalidPipelineGraph`] if a pipeline name is
  /// used twice, a reference names an unknown pipeline or one declared later,
  /// or the references form a cycle.
  pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
    let mut graph = DiGraph::new();
    let mut nodes = BTreeMap::new();

    for pipeline in manifest.pipelines() {
      if nodes.contains_key(&pipeline.name) {
        return Err(ManifestError::InvalidPipelineGraph(format!(
          "pipeline {:?} is declared more than once",
          pipeline.name
        )));
      }
      let idx = graph.add_node(pipeline.name.clone());
      nodes.insert(pipeline.name.clone(), idx);
    }

    for (position, pipeline) in manifest.pipelines().iter().enumerate() {
      let dependent = nodes[&pipeline.name];
      for dep in pipeline.dependencies() {
        let Some(&dep_idx) = nodes.get(dep) else {
          return Err(ManifestError::InvalidPipelineGraph(format!(
            "pipeline {:?} references unknown pipeline {:?}",
            pipeline.name, dep
          )));
        };
        // Node indices follow declaration order.
        if dep_idx.index() >= position {
          return Err(ManifestError::InvalidPipelineGraph(format!(
            "pipeline {:?} references {:?} before it is declared",
            pipeline.name, dep
          )));
        }
        graph.add_edge(dep_idx, dependent, ());
      }
    }

    let dag = Self { graph, nodes };
    dag.order()?;
    Ok(dag)
  }

  /// Pipeline names with every dependency before its dependents.
  pub fn order(&self) -> Result<Vec<&str>> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| {
      ManifestError::InvalidPipelineGraph(format!(
        "dependency cycle through pipeline {:?}",
        self.graph[cycle.node_id()]
      ))
    })?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].as_str()).collect())
  }

  /// Pipelines that read directly from `name`.
  pub fn dependents(&self, name: &str) -> Vec<&str> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };
    let mut out: Vec<&str> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|n| self.graph[n].as_str())
      .collect();
    out.sort_unstable();
    out.dedup();
    out
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

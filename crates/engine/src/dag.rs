//! DAG validation — run on workflow activation, before anything is handed to
//! the engine.
//!
//! Rules enforced over the *enabled* edges:
//! 1. Every edge endpoint references an existing node.
//! 2. No edge connects a node to itself.
//! 3. Conditional edges carry a condition expression.
//! 4. The graph is acyclic (Kahn's topological sort must visit every node).
//!
//! Returns a topologically-sorted list of node ids on success.

use std::collections::{HashMap, VecDeque};

use crate::models::Workflow;
use crate::EngineError;

/// Validate the workflow's enabled-edge subgraph and return the nodes in a
/// valid execution order.
///
/// # Errors
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::SelfLoop`] if an edge connects a node to itself.
/// - [`EngineError::MissingConditionExpression`] for a conditional edge
///   without an expression.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    let enabled_edges: Vec<_> = workflow.edges.iter().filter(|e| e.is_enabled()).collect();

    // -----------------------------------------------------------------------
    // 1. Edge-level checks
    // -----------------------------------------------------------------------
    for edge in &enabled_edges {
        if edge.from_node_id == edge.to_node_id {
            return Err(EngineError::SelfLoop(edge.id.clone()));
        }
        for endpoint in [&edge.from_node_id, &edge.to_node_id] {
            if !workflow.nodes.contains_key(endpoint) {
                return Err(EngineError::UnknownNodeReference {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        if edge.is_conditional() && edge.condition_expression().is_none() {
            return Err(EngineError::MissingConditionExpression(edge.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for id in workflow.nodes.keys() {
        adjacency.entry(id.as_str()).or_default();
        in_degree.entry(id.as_str()).or_insert(0);
    }

    for edge in &enabled_edges {
        adjacency
            .entry(edge.from_node_id.as_str())
            .or_default()
            .push(edge.to_node_id.as_str());
        *in_degree.entry(edge.to_node_id.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let degree = in_degree.entry(neighbour).or_insert(0);
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // Unvisited nodes mean a cycle.
    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

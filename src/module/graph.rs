// src/module/graph.rs
//! The module dependency graph.
//!
//! Nodes are module names; an edge `A -> B` means "A imports B". The graph
//! must be acyclic; `resolve` returns modules so that every module appears
//! after all of its dependencies.

use rustc_hash::FxHashMap;

use crate::errors::CompileError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Default)]
pub struct DepGraph {
    /// Insertion order of nodes; keeps the sort deterministic.
    nodes: Vec<String>,
    adj: FxHashMap<String, Vec<String>>,
}

impl DepGraph {
    pub fn new() -> DepGraph {
        DepGraph::default()
    }

    pub fn add_node(&mut self, name: &str) {
        if !self.adj.contains_key(name) {
            self.nodes.push(name.to_string());
            self.adj.insert(name.to_string(), Vec::new());
        }
    }

    /// Record `from` importing `to`. Duplicate edges collapse.
    pub fn add_dep(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        let deps = self.adj.get_mut(from).expect("node just added");
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
        }
    }

    pub fn deps_of(&self, name: &str) -> &[String] {
        self.adj.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first topological sort. On a back-edge, the error carries the
    /// cycle path from its entry node back to itself.
    pub fn resolve(&self) -> Result<Vec<String>, CompileError> {
        let mut marks: FxHashMap<&str, Mark> =
            self.nodes.iter().map(|n| (n.as_str(), Mark::Unvisited)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();

        for node in &self.nodes {
            if marks[node.as_str()] == Mark::Unvisited {
                self.visit(node, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut FxHashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), CompileError> {
        marks.insert(node, Mark::InProgress);
        stack.push(node);

        for dep in self.deps_of(node) {
            match marks.get(dep.as_str()).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => {}
                Mark::InProgress => {
                    return Err(CompileError::ImportCycle {
                        cycle: render_cycle(stack, dep),
                    });
                }
                Mark::Unvisited => self.visit(dep, marks, stack, order)?,
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }
}

/// `stack` holds the DFS path; `entry` is the node whose revisit closed the
/// cycle. Render the loop from its first occurrence back to itself.
fn render_cycle(stack: &[&str], entry: &str) -> String {
    let start = stack.iter().position(|n| *n == entry).unwrap_or(0);
    let mut parts: Vec<&str> = stack[start..].to_vec();
    parts.push(entry);
    parts.join(" -> ")
}

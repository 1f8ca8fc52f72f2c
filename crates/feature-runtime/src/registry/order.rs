//! Dependency ordering for features.
//!
//! Nodes are `(name, dependencies)` in registration order. Ties in the
//! topological order are broken by that order, so the result is
//! deterministic.

use std::collections::{BTreeSet, HashMap};

use crate::error::DependencyError;

/// A feature name and the names it depends on.
pub(crate) type Node = (String, Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

fn index_of(nodes: &[Node]) -> HashMap<&str, usize> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i))
        .collect()
}

/// Find a cycle among known names, searching from the first node onwards.
///
/// Dependencies on unknown names are ignored. The returned path repeats its
/// first name at the end.
pub(crate) fn find_cycle(nodes: &[Node]) -> Option<Vec<String>> {
    let index = index_of(nodes);
    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut path = Vec::new();

    (0..nodes.len()).find_map(|start| {
        if marks[start] == Mark::Unvisited {
            visit(start, nodes, &index, &mut marks, &mut path)
        } else {
            None
        }
    })
}

fn visit(
    node: usize,
    nodes: &[Node],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[node] = Mark::OnPath;
    path.push(node);

    for dep in &nodes[node].1 {
        let Some(&next) = index.get(dep.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::OnPath => {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&n| nodes[n].0.clone()).collect();
                cycle.push(nodes[next].0.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, nodes, index, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}

/// Kahn's algorithm; dependencies come before their dependents.
pub(crate) fn topological_order(nodes: &[Node]) -> Result<Vec<String>, DependencyError> {
    let index = index_of(nodes);
    let mut pending = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, (name, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            let Some(&j) = index.get(dep.as_str()) else {
                return Err(DependencyError::MissingDependency {
                    feature: name.clone(),
                    dependency: dep.clone(),
                });
            };
            pending[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(nodes[i].0.clone());
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < nodes.len() {
        return Err(DependencyError::CyclicDependency {
            cycle: find_cycle(nodes).unwrap_or_default(),
        });
    }
    Ok(order)
}

//! Execution order over the non-error edge graph.
//!
//! The total order is Kahn's topological sort restricted to non-error edges.
//! Error edges may close cycles (explicit retry loops) and are ignored here;
//! a cycle through non-error edges is a dataflow defect and is reported with
//! the offending node sequence.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ir::{EdgeDef, NodeDef};

/// A cycle in the non-error edge graph.
#[derive(Debug, Error, Diagnostic)]
#[error("cycle detected through nodes: {}", cycle.join(" -> "))]
#[diagnostic(
    code(pflow::graph::cycle),
    help("Only edges with an `error*` action may loop back; re-route or re-label the cycle.")
)]
pub struct CycleError {
    /// Nodes forming the cycle, first node repeated at the end.
    pub cycle: Vec<String>,
}

/// Compute the total execution order by Kahn's algorithm.
///
/// Ties are broken by declaration order in `nodes`, so the result is
/// deterministic for a given IR. Edges whose endpoints do not exist are
/// ignored here; the validator reports them separately.
pub fn execution_order(nodes: &[NodeDef], edges: &[EdgeDef]) -> Result<Vec<String>, CycleError> {
    let declared: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let mut indegree: FxHashMap<&str, usize> =
        nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut successors: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

    for edge in edges {
        if edge.is_error_edge() {
            continue;
        }
        if !declared.contains(edge.from.as_str()) || !declared.contains(edge.to.as_str()) {
            continue;
        }
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *indegree.entry(edge.to.as_str()).or_default() += 1;
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut remaining: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    while !remaining.is_empty() {
        // Declaration order is the tie-break: take the first ready node.
        let Some(pos) = remaining.iter().position(|id| indegree[id] == 0) else {
            return Err(CycleError {
                cycle: find_cycle(&remaining, &successors),
            });
        };
        let id = remaining.remove(pos);
        order.push(id.to_string());
        if let Some(next) = successors.get(id) {
            for succ in next {
                if let Some(d) = indegree.get_mut(succ) {
                    *d = d.saturating_sub(1);
                }
            }
        }
    }

    Ok(order)
}

/// Walk successors from a stuck node until one repeats, yielding the cycle.
fn find_cycle(remaining: &[&str], successors: &FxHashMap<&str, Vec<&str>>) -> Vec<String> {
    let stuck: FxHashSet<&str> = remaining.iter().copied().collect();
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };

    let mut seen: Vec<&str> = Vec::new();
    let mut current = start;
    loop {
        if let Some(at) = seen.iter().position(|&id| id == current) {
            let mut cycle: Vec<String> = seen[at..].iter().map(|s| s.to_string()).collect();
            cycle.push(current.to_string());
            return cycle;
        }
        seen.push(current);
        let next = successors
            .get(current)
            .and_then(|succ| succ.iter().find(|s| stuck.contains(**s)));
        match next {
            Some(&n) => current = n,
            // Dead end inside the stuck set; restart from another stuck node.
            None => {
                let Some(&other) = remaining.iter().find(|id| !seen.contains(id)) else {
                    seen.push(start);
                    return seen.iter().map(|s| s.to_string()).collect();
                };
                current = other;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn node(id: &str) -> NodeDef {
        NodeDef {
            id: id.to_string(),
            node_type: "noop".to_string(),
            purpose: String::new(),
            params: Default::default(),
        }
    }

    fn edge(from: &str, to: &str, action: &str) -> EdgeDef {
        EdgeDef {
            from: from.to_string(),
            to: to.to_string(),
            action: Action::from(action),
        }
    }

    #[test]
    fn linear_order() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b", "default"), edge("b", "c", "default")];
        assert_eq!(execution_order(&nodes, &edges).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let nodes = vec![node("z"), node("a"), node("m")];
        assert_eq!(execution_order(&nodes, &[]).unwrap(), ["z", "a", "m"]);
    }

    #[test]
    fn error_edges_may_cycle() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![
            edge("a", "b", "default"),
            edge("b", "a", "error:retry"),
        ];
        assert_eq!(execution_order(&nodes, &edges).unwrap(), ["a", "b"]);
    }

    #[test]
    fn non_error_cycle_is_reported() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![
            edge("a", "b", "default"),
            edge("b", "c", "default"),
            edge("c", "b", "default"),
        ];
        let err = execution_order(&nodes, &edges).unwrap_err();
        assert!(err.cycle.len() >= 3);
        assert_eq!(err.cycle.first(), err.cycle.last());
        assert!(err.cycle.contains(&"b".to_string()));
        assert!(err.cycle.contains(&"c".to_string()));
    }
}

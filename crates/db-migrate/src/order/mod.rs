//! Foreign-key dependency ordering.
//!
//! Two orders are produced from the same edges (table → referenced table,
//! ignoring self-references and references to tables outside the set):
//!
//! - [`dependency_order`]: strict. Every table follows all tables it
//!   references; a cycle is an error. Required when foreign keys are
//!   created together with the table.
//! - [`topological_order`]: lenient. Cycles are broken (and logged) since
//!   the constraints will only be added after load.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::core::schema::Table;
use crate::error::{MigrateError, Result};

/// Order tables so each one comes after every table it references.
///
/// Repeatedly scans the remaining tables: the first one whose references
/// are all placed moves to the output, otherwise the head rotates to the
/// back. A full rotation without progress means a cycle, reported with the
/// names of the tables still waiting.
pub fn dependency_order<'a, I>(tables: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a Table>,
{
    let mut remaining: VecDeque<&Table> = tables.into_iter().collect();
    let included: HashSet<&str> = remaining.iter().map(|t| t.name.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::with_capacity(remaining.len());
    let mut order = Vec::with_capacity(remaining.len());
    let mut stalled = 0usize;

    while let Some(table) = remaining.pop_front() {
        let ready = table
            .referenced_tables()
            .into_iter()
            .all(|r| placed.contains(r) || !included.contains(r));

        if ready {
            placed.insert(table.name.as_str());
            order.push(table.name.clone());
            stalled = 0;
        } else {
            remaining.push_back(table);
            stalled += 1;
            if stalled >= remaining.len() {
                let mut blocked: Vec<String> =
                    remaining.iter().map(|t| t.name.clone()).collect();
                blocked.sort();
                return Err(MigrateError::DependencyCycle(blocked));
            }
        }
    }

    debug!("Dependency order: {:?}", order);
    Ok(order)
}

/// Order tables referenced-first, tolerating cycles.
///
/// Strongly connected components are ordered topologically; ties, and the
/// members of a cyclic component, are ordered by name so the result only
/// depends on the input set.
pub fn topological_order<'a, I>(tables: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Table>,
{
    let mut sorted: Vec<&Table> = tables.into_iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = sorted
        .iter()
        .map(|t| (t.name.as_str(), graph.add_node(t.name.as_str())))
        .collect();

    for table in &sorted {
        let to = nodes[table.name.as_str()];
        for referenced in table.referenced_tables() {
            if let Some(&from) = nodes.get(referenced) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let components = tarjan_scc(&graph);
    let mut component_of = vec![0usize; graph.node_count()];
    let mut members: Vec<Vec<&str>> = Vec::with_capacity(components.len());
    for (idx, component) in components.iter().enumerate() {
        let mut names: Vec<&str> = component.iter().map(|n| graph[*n]).collect();
        names.sort_unstable();
        if names.len() > 1 {
            warn!(
                "Foreign key cycle between tables {}; ordering them by name",
                names.join(", ")
            );
        }
        for node in component {
            component_of[node.index()] = idx;
        }
        members.push(names);
    }

    let mut in_degree = vec![0usize; components.len()];
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    for edge in graph.raw_edges() {
        let (from, to) = (
            component_of[edge.source().index()],
            component_of[edge.target().index()],
        );
        if from != to && successors[from].insert(to) {
            in_degree[to] += 1;
        }
    }

    // Kahn's algorithm, always taking the ready component with the smallest name
    let mut ready: BTreeSet<(&str, usize)> = (0..components.len())
        .filter(|c| in_degree[*c] == 0)
        .map(|c| (members[c][0], c))
        .collect();
    let mut order = Vec::with_capacity(sorted.len());
    while let Some(next) = ready.pop_first() {
        let component = next.1;
        order.extend(members[component].iter().map(|n| n.to_string()));
        for &succ in &successors[component] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.insert((members[succ][0], succ));
            }
        }
    }

    debug!("Topological order: {:?}", order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;

    fn table(name: &str, refs: &[&str]) -> Table {
        let mut t = Table::new(name);
        t.primary_key = vec!["id".to_string()];
        t.foreign_keys = refs
            .iter()
            .map(|r| ForeignKey {
                name: format!("fk_{}_{}", name, r),
                columns: vec![format!("{}_id", r)],
                ref_table: r.to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: None,
                on_update: None,
            })
            .collect();
        t
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_dependency_order_chain() {
        // A references B, B references C, D stands alone
        let tables = vec![table("a", &["b"]), table("b", &["c"]), table("c", &[]), table("d", &[])];
        let order = dependency_order(&tables).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "c") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(order.contains(&"d".to_string()));
    }

    #[test]
    fn test_dependency_order_rejects_cycle() {
        let tables = vec![table("a", &["b"]), table("b", &["a"]), table("c", &[])];
        match dependency_order(&tables) {
            Err(MigrateError::DependencyCycle(names)) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_dependency_order_ignores_self_and_outside_references() {
        let tables = vec![table("node", &["node", "archived"]), table("edge", &["node"])];
        let order = dependency_order(&tables).unwrap();
        assert_eq!(order, vec!["node", "edge"]);
    }

    #[test]
    fn test_dependency_order_empty() {
        assert!(dependency_order(&Vec::<Table>::new()).unwrap().is_empty());
    }

    #[test]
    fn test_topological_order_chain() {
        let tables = vec![table("a", &["b"]), table("b", &["c"]), table("c", &[]), table("d", &[])];
        let order = topological_order(&tables);
        assert_eq!(order, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn test_topological_order_tolerates_cycle() {
        let tables = vec![
            table("orders", &["customers"]),
            table("customers", &["accounts"]),
            table("accounts", &["customers"]),
        ];
        let order = topological_order(&tables);
        assert_eq!(order, vec!["accounts", "customers", "orders"]);
    }

    #[test]
    fn test_topological_order_is_deterministic() {
        let forward = vec![table("x", &[]), table("y", &["x"]), table("z", &[])];
        let backward: Vec<Table> = forward.iter().rev().cloned().collect();
        assert_eq!(topological_order(&forward), topological_order(&backward));
    }
}

//! Topological ordering with cycle detection.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::EngineError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Order every node reachable from `roots` so dependencies come first.
///
/// Uses DFS with three-color marking (white→gray→black). `deps_of` returns the
/// direct dependencies of a node.
///
/// # Errors
/// Returns an error if a cycle is reachable from the roots, or if `deps_of`
/// fails.
pub(crate) fn topological_order<K, F>(
    roots: impl IntoIterator<Item = K>,
    mut deps_of: F,
) -> Result<Vec<K>, EngineError>
where
    K: Clone + Eq + Hash + Display,
    F: FnMut(&K) -> Result<Vec<K>, EngineError>,
{
    let mut color: HashMap<K, Color> = HashMap::new();
    let mut order = Vec::new();
    let mut stack = Vec::new();
    for root in roots {
        visit(root, &mut deps_of, &mut color, &mut order, &mut stack)?;
    }
    Ok(order)
}

fn visit<K, F>(
    node: K,
    deps_of: &mut F,
    color: &mut HashMap<K, Color>,
    order: &mut Vec<K>,
    stack: &mut Vec<K>,
) -> Result<(), EngineError>
where
    K: Clone + Eq + Hash + Display,
    F: FnMut(&K) -> Result<Vec<K>, EngineError>,
{
    match color.get(&node) {
        Some(Color::Black) => return Ok(()),
        Some(Color::Gray) => {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = stack
                .get(start..)
                .unwrap_or(stack.as_slice())
                .iter()
                .map(ToString::to_string)
                .collect();
            cycle.push(node.to_string());
            return Err(EngineError::DependencyCycle {
                cycle: cycle.join(" -> "),
            });
        }
        None => {}
    }

    color.insert(node.clone(), Color::Gray);
    stack.push(node.clone());

    for dep in deps_of(&node)? {
        visit(dep, deps_of, color, order, stack)?;
    }

    stack.pop();
    color.insert(node.clone(), Color::Black);
    order.push(node);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, Vec<&'static str>> {
        let mut map: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        for (from, to) in pairs {
            map.entry(*from).or_default().push(*to);
        }
        map
    }

    #[test]
    fn dependencies_come_first() {
        let graph = edges(&[("a", "b"), ("b", "c"), ("a", "c")]);
        let order =
            topological_order(["a"], |n| Ok(graph.get(n).cloned().unwrap_or_default())).unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn diamond_visited_once() {
        let graph = edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let order =
            topological_order(["a"], |n| Ok(graph.get(n).cloned().unwrap_or_default())).unwrap();
        assert_eq!(order.iter().filter(|n| **n == "d").count(), 1);
        assert_eq!(order.last(), Some(&"a"));
    }

    #[test]
    fn cycle_reports_path() {
        let graph = edges(&[("a", "b"), ("b", "c"), ("c", "b")]);
        let err = topological_order(["a"], |n| Ok(graph.get(n).cloned().unwrap_or_default()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("b -> c -> b"), "error was: {err}");
    }

    #[test]
    fn deps_of_failure_propagates() {
        let result = topological_order(["a"], |_| {
            Err(EngineError::DependencyCycle {
                cycle: "boom".to_owned(),
            })
        });
        assert!(result.is_err());
    }
}

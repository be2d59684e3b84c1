//! Dependency ordering (spec §4.4).
//!
//! Pure functions over a borrowed view of the registry; no locking, no
//! I/O. [`topological_order`] is Kahn's algorithm with a registration-
//! index tie-break so that ordering is deterministic across runs that
//! register components in the same order, matching the teacher's
//! `get_startup_order` priority-sort approach but keyed on registration
//! order rather than a numeric priority field, per this crate's data
//! model (spec §3: components are ordered purely by their `dependsOn`
//! graph, not by an independent priority).

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct DependencyCycleError {
    pub cycle: Vec<String>,
}

impl std::fmt::Display for DependencyCycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dependency cycle: {}", self.cycle.join(" -> "))
    }
}

impl std::error::Error for DependencyCycleError {}

/// `order` is registration order; `deps` maps a name to the names it
/// depends on. Names in `deps` that are absent from `order` are
/// ignored for ordering purposes (the registry's `validate_dependencies`
/// is what reports them as missing — this function only orders what it
/// is given).
pub fn topological_order(
    order: &[String],
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, DependencyCycleError> {
    let index_of: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> = order.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = order.iter().map(|n| (n.as_str(), Vec::new())).collect();

    for name in order {
        if let Some(dependency_names) = deps.get(name) {
            for dep in dependency_names {
                if !index_of.contains_key(dep.as_str()) {
                    continue;
                }
                *in_degree.get_mut(name.as_str()).unwrap() += 1;
                dependents.get_mut(dep.as_str()).unwrap().push(name.as_str());
            }
        }
    }

    let mut ready: VecDeque<&str> = order
        .iter()
        .map(|n| n.as_str())
        .filter(|n| in_degree[n] == 0)
        .collect();
    // VecDeque built from an iterator over `order` is already in
    // registration order; ties are broken by staying in that order.

    let mut result = Vec::with_capacity(order.len());
    while let Some(name) = ready.pop_front() {
        result.push(name.to_string());
        let mut newly_ready: Vec<&str> = Vec::new();
        for dependent in &dependents[name] {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                newly_ready.push(dependent);
            }
        }
        newly_ready.sort_by_key(|n| index_of[n]);
        for n in newly_ready {
            ready.push_back(n);
        }
    }

    if result.len() != order.len() {
        let cycle = find_a_cycle(order, deps, &index_of);
        return Err(DependencyCycleError { cycle });
    }

    Ok(result)
}

/// Startup order reversed (spec §4.4: "stop order is the reverse of
/// start order unless a component explicitly opts out" — no opt-out
/// exists yet in this data model, so this is currently a pure reverse).
pub fn reverse_order(startup_order: &[String]) -> Vec<String> {
    let mut order = startup_order.to_vec();
    order.reverse();
    order
}

fn find_a_cycle(
    order: &[String],
    deps: &HashMap<String, Vec<String>>,
    index_of: &HashMap<&str, usize>,
) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    for start in order {
        if visited.contains(start.as_str()) {
            continue;
        }
        if let Some(cycle) = dfs(start, deps, index_of, &mut visited, &mut stack, &mut on_stack) {
            return cycle;
        }
    }
    Vec::new()
}

fn dfs<'a>(
    node: &'a str,
    deps: &'a HashMap<String, Vec<String>>,
    index_of: &HashMap<&str, usize>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    stack.push(node);
    on_stack.insert(node);

    if let Some(dependency_names) = deps.get(node) {
        for dep in dependency_names {
            let dep = dep.as_str();
            if !index_of.contains_key(dep) {
                continue;
            }
            if on_stack.contains(dep) {
                let start = stack.iter().position(|n| *n == dep).unwrap();
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs(dep, deps, index_of, visited, stack, on_stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    on_stack.remove(node);
    None
}

/// Non-throwing inspection used by the registry's `validateDependencies`
/// (spec §4.4): reports every missing dependency and every cycle it can
/// find, rather than failing fast on the first problem.
pub fn validate_dependencies(
    order: &[String],
    deps: &HashMap<String, Vec<String>>,
) -> (Vec<(String, String)>, Vec<Vec<String>>) {
    let known: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
    let mut missing = Vec::new();
    for name in order {
        if let Some(dependency_names) = deps.get(name) {
            for dep in dependency_names {
                if !known.contains(dep.as_str()) {
                    missing.push((name.clone(), dep.clone()));
                }
            }
        }
    }

    let index_of: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut cycles = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    for start in order {
        if visited.contains(start.as_str()) {
            continue;
        }
        let mut stack = Vec::new();
        let mut on_stack = HashSet::new();
        if let Some(cycle) = dfs(start, deps, &index_of, &mut visited, &mut stack, &mut on_stack) {
            cycles.push(cycle);
        }
    }

    (missing, cycles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_of(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, ds)| (name.to_string(), ds.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn linear_chain_orders_by_dependency() {
        let order = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let deps = deps_of(&[("b", &["a"]), ("c", &["b"]), ("a", &[])]);
        let result = topological_order(&order, &deps).unwrap();
        assert_eq!(result, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_dependency_resolves() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let deps = deps_of(&[("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"]), ("a", &[])]);
        let result = topological_order(&order, &deps).unwrap();
        assert_eq!(result.first().unwrap(), "a");
        assert_eq!(result.last().unwrap(), "d");
        assert!(result.iter().position(|n| n == "b").unwrap() < result.iter().position(|n| n == "d").unwrap());
        assert!(result.iter().position(|n| n == "c").unwrap() < result.iter().position(|n| n == "d").unwrap());
    }

    #[test]
    fn ties_break_on_registration_order() {
        let order = vec!["b".to_string(), "a".to_string()];
        let deps = deps_of(&[("a", &[]), ("b", &[])]);
        let result = topological_order(&order, &deps).unwrap();
        assert_eq!(result, vec!["b", "a"]);
    }

    #[test]
    fn direct_cycle_is_reported() {
        let order = vec!["a".to_string(), "b".to_string()];
        let deps = deps_of(&[("a", &["b"]), ("b", &["a"])]);
        let err = topological_order(&order, &deps).unwrap_err();
        assert!(err.cycle.contains(&"a".to_string()));
        assert!(err.cycle.contains(&"b".to_string()));
    }

    #[test]
    fn missing_dependency_is_ignored_for_ordering_but_reported_by_validation() {
        let order = vec!["a".to_string()];
        let deps = deps_of(&[("a", &["ghost"])]);
        let result = topological_order(&order, &deps).unwrap();
        assert_eq!(result, vec!["a"]);

        let (missing, cycles) = validate_dependencies(&order, &deps);
        assert_eq!(missing, vec![("a".to_string(), "ghost".to_string())]);
        assert!(cycles.is_empty());
    }
}

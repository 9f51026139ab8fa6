use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Find cycles in the import graph with an iterative DFS.
///
/// The checklist graph is a DAG by construction, but the file-dependency map
/// comes from observed imports and carries no such guarantee. Traversal is
/// visited/in-progress marking rather than path copying; each cycle is
/// reported once as the node sequence that closes it. Search depth and the
/// number of reported cycles are unbounded, which can get expensive on very
/// densely interlinked graphs.
pub fn find_cycles(graph: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for start in graph.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }

        // Stack frames: (node, index of the next neighbor to visit).
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        let mut path: Vec<&str> = vec![start.as_str()];
        marks.insert(start.as_str(), Mark::InProgress);

        while let Some(&mut (node, next)) = stack.last_mut() {
            let neighbors = graph.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if next >= neighbors.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                path.pop();
                continue;
            }
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            let neighbor = neighbors[next].as_str();

            match marks.get(neighbor) {
                Some(Mark::InProgress) => {
                    if let Some(pos) = path.iter().position(|n| *n == neighbor) {
                        cycles.push(path[pos..].iter().map(|n| (*n).to_string()).collect());
                    }
                }
                Some(Mark::Done) => {}
                None => {
                    if graph.contains_key(neighbor) {
                        marks.insert(neighbor, Mark::InProgress);
                        stack.push((neighbor, 0));
                        path.push(neighbor);
                    } else {
                        // Leaf module with no recorded imports of its own.
                        marks.insert(neighbor, Mark::Done);
                    }
                }
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| {
                (
                    (*from).to_string(),
                    to.iter().map(|t| (*t).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn reports_no_cycles_on_a_dag() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &["d"])]);
        assert_eq!(find_cycles(&g), Vec::<Vec<String>>::new());
    }

    #[test]
    fn finds_a_planted_three_node_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn finds_a_self_loop() {
        let g = graph(&[("a", &["a"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn ignores_edges_into_leaf_modules() {
        let g = graph(&[("a", &["os", "sys"]), ("b", &["a"])]);
        assert!(find_cycles(&g).is_empty());
    }
}

//! Topology assignment — compatibility graph construction plus matching.

use tracing::debug;

use gridrun_core::{is_subset, Topology};

use crate::graph::MatchGraph;

/// Match required topologies onto provided ones.
///
/// Returns, for each requirement index, the index of the provided
/// topology it is assigned to — or `None` when no complete assignment
/// exists. The assignment is injective and every pair satisfies the
/// subset predicate.
pub fn assign(required: &[Topology], given: &[Topology]) -> Option<Vec<usize>> {
    let mut graph = MatchGraph::new(required.len(), given.len());
    for (i, requirement) in required.iter().enumerate() {
        for (j, candidate) in given.iter().enumerate() {
            if is_subset(candidate, requirement) {
                graph.add_edge(i, j);
            }
        }
    }

    let matching = graph.maximum_matching();
    debug!(
        required = required.len(),
        given = given.len(),
        matched = matching.size,
        "topology matching computed"
    );

    if !matching.is_complete() {
        return None;
    }
    matching.pair_left.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridrun_core::{ComputeResource, Device, MemorySpace};

    const GB: u64 = 1024 * 1024 * 1024;

    fn host(mem_bytes: u64) -> Topology {
        Topology {
            devices: vec![Device {
                kind: "NUMA Domain".to_string(),
                memory_spaces: vec![MemorySpace {
                    kind: "RAM".to_string(),
                    size_bytes: mem_bytes,
                    extra: Default::default(),
                }],
                compute_resources: vec![ComputeResource {
                    kind: "Processing Unit".to_string(),
                    extra: Default::default(),
                }],
                extra: Default::default(),
            }],
            extra: Default::default(),
        }
    }

    #[test]
    fn assigns_small_and_big_requirements() {
        let small = host(4 * GB);
        let big = host(64 * GB);

        let required = vec![small.clone(), small.clone(), big.clone()];
        let given = vec![big, small.clone(), small];

        let assignment = assign(&required, &given).unwrap();
        // The big requirement can only go to given[0]; the two small
        // requirements take the remaining small hosts in index order.
        assert_eq!(assignment, vec![1, 2, 0]);
    }

    #[test]
    fn all_small_hosts_cannot_satisfy_a_big_requirement() {
        let small = host(4 * GB);
        let big = host(64 * GB);

        let required = vec![small.clone(), small.clone(), big];
        let given = vec![small.clone(), small.clone(), small];

        assert!(assign(&required, &given).is_none());
    }

    #[test]
    fn assignment_pairs_satisfy_the_subset_predicate() {
        let required = vec![host(2 * GB), host(8 * GB)];
        let given = vec![host(8 * GB), host(2 * GB), host(32 * GB)];

        let assignment = assign(&required, &given).unwrap();
        let mut used = vec![false; given.len()];
        for (i, &j) in assignment.iter().enumerate() {
            assert!(is_subset(&given[j], &required[i]));
            assert!(!used[j], "host assigned twice");
            used[j] = true;
        }
    }

    #[test]
    fn spare_hosts_are_allowed() {
        let required = vec![host(4 * GB)];
        let given = vec![host(4 * GB), host(4 * GB), host(4 * GB)];

        let assignment = assign(&required, &given).unwrap();
        assert_eq!(assignment.len(), 1);
    }

    #[test]
    fn more_requirements_than_hosts_is_unmatchable() {
        let required = vec![host(4 * GB), host(4 * GB)];
        let given = vec![host(64 * GB)];

        assert!(assign(&required, &given).is_none());
    }

    #[test]
    fn empty_requirements_match_trivially() {
        let assignment = assign(&[], &[host(GB)]).unwrap();
        assert!(assignment.is_empty());
    }
}

//! Hopcroft–Karp maximum bipartite matching.
//!
//! Left vertices are requirements, right vertices are candidates. Each
//! phase builds a BFS layer graph from the free left vertices, then
//! augments along vertex-disjoint shortest paths found by DFS; phases
//! repeat until no augmenting path exists. O(E·√V).
//!
//! Edges are iterated left-to-right, lowest right index first, so the
//! result is deterministic for a fixed input.

use std::collections::VecDeque;

/// A bipartite graph under construction.
#[derive(Debug, Clone)]
pub struct MatchGraph {
    n_left: usize,
    n_right: usize,
    adjacency: Vec<Vec<usize>>,
}

/// The outcome of a maximum-matching run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// For each left vertex, the matched right vertex.
    pub pair_left: Vec<Option<usize>>,
    /// For each right vertex, the matched left vertex.
    pub pair_right: Vec<Option<usize>>,
    /// Number of matched pairs.
    pub size: usize,
}

impl Matching {
    /// Whether every left vertex is matched.
    pub fn is_complete(&self) -> bool {
        self.size == self.pair_left.len()
    }
}

impl MatchGraph {
    pub fn new(n_left: usize, n_right: usize) -> Self {
        Self {
            n_left,
            n_right,
            adjacency: vec![Vec::new(); n_left],
        }
    }

    /// Declare that `left` may be matched to `right`.
    pub fn add_edge(&mut self, left: usize, right: usize) {
        self.adjacency[left].push(right);
    }

    /// Run Hopcroft–Karp and return the maximum matching.
    pub fn maximum_matching(&self) -> Matching {
        let mut pair_left: Vec<Option<usize>> = vec![None; self.n_left];
        let mut pair_right: Vec<Option<usize>> = vec![None; self.n_right];
        let mut distance = vec![usize::MAX; self.n_left];
        let mut size = 0;

        while self.layer(&pair_left, &pair_right, &mut distance) {
            for left in 0..self.n_left {
                if pair_left[left].is_none()
                    && self.augment(left, &mut distance, &mut pair_left, &mut pair_right)
                {
                    size += 1;
                }
            }
        }

        Matching {
            pair_left,
            pair_right,
            size,
        }
    }

    /// BFS phase: layer the graph from free left vertices. Returns true
    /// if some free right vertex is reachable.
    fn layer(
        &self,
        pair_left: &[Option<usize>],
        pair_right: &[Option<usize>],
        distance: &mut [usize],
    ) -> bool {
        let mut queue = VecDeque::new();
        for left in 0..self.n_left {
            if pair_left[left].is_none() {
                distance[left] = 0;
                queue.push_back(left);
            } else {
                distance[left] = usize::MAX;
            }
        }

        let mut reachable = false;
        while let Some(left) = queue.pop_front() {
            for &right in &self.adjacency[left] {
                match pair_right[right] {
                    None => reachable = true,
                    Some(next) if distance[next] == usize::MAX => {
                        distance[next] = distance[left] + 1;
                        queue.push_back(next);
                    }
                    Some(_) => {}
                }
            }
        }
        reachable
    }

    /// DFS phase: extend an augmenting path from `left` along the layer
    /// graph, flipping matched edges on success.
    fn augment(
        &self,
        left: usize,
        distance: &mut [usize],
        pair_left: &mut [Option<usize>],
        pair_right: &mut [Option<usize>],
    ) -> bool {
        for &right in &self.adjacency[left] {
            let extends = match pair_right[right] {
                None => true,
                Some(next) => {
                    distance[next] == distance[left].saturating_add(1)
                        && self.augment(next, distance, pair_left, pair_right)
                }
            };
            if extends {
                pair_left[left] = Some(right);
                pair_right[right] = Some(left);
                return true;
            }
        }
        // Dead end; prune this vertex for the rest of the phase.
        distance[left] = usize::MAX;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_matching_on_identity_graph() {
        let mut graph = MatchGraph::new(3, 3);
        for i in 0..3 {
            graph.add_edge(i, i);
        }
        let matching = graph.maximum_matching();
        assert_eq!(matching.size, 3);
        assert!(matching.is_complete());
        assert_eq!(matching.pair_left, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn finds_matching_that_needs_augmentation() {
        // Greedy left-to-right would match 0→0 and strand vertex 1;
        // an augmenting path reassigns 0→1.
        let mut graph = MatchGraph::new(2, 2);
        graph.add_edge(0, 0);
        graph.add_edge(0, 1);
        graph.add_edge(1, 0);

        let matching = graph.maximum_matching();
        assert_eq!(matching.size, 2);
        assert_eq!(matching.pair_left, vec![Some(1), Some(0)]);
    }

    #[test]
    fn reports_incomplete_when_no_perfect_matching() {
        // Both left vertices compete for the single right vertex 0.
        let mut graph = MatchGraph::new(2, 2);
        graph.add_edge(0, 0);
        graph.add_edge(1, 0);

        let matching = graph.maximum_matching();
        assert_eq!(matching.size, 1);
        assert!(!matching.is_complete());
    }

    #[test]
    fn matching_is_injective() {
        let mut graph = MatchGraph::new(4, 5);
        for left in 0..4 {
            for right in 0..5 {
                if (left + right) % 2 == 0 {
                    graph.add_edge(left, right);
                }
            }
        }

        let matching = graph.maximum_matching();
        let mut seen = vec![false; 5];
        for right in matching.pair_left.iter().flatten() {
            assert!(!seen[*right], "right vertex matched twice");
            seen[*right] = true;
        }
    }

    #[test]
    fn pairings_are_mutually_consistent() {
        let mut graph = MatchGraph::new(3, 4);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 1);
        graph.add_edge(2, 3);

        let matching = graph.maximum_matching();
        for (left, right) in matching.pair_left.iter().enumerate() {
            if let Some(right) = right {
                assert_eq!(matching.pair_right[*right], Some(left));
            }
        }
    }

    #[test]
    fn empty_graph_matches_nothing() {
        let graph = MatchGraph::new(0, 3);
        assert_eq!(graph.maximum_matching().size, 0);

        let graph = MatchGraph::new(2, 2);
        let matching = graph.maximum_matching();
        assert_eq!(matching.size, 0);
        assert_eq!(matching.pair_left, vec![None, None]);
    }

    #[test]
    fn deterministic_for_fixed_input() {
        let mut graph = MatchGraph::new(3, 3);
        for left in 0..3 {
            for right in 0..3 {
                graph.add_edge(left, right);
            }
        }
        let first = graph.maximum_matching();
        let second = graph.maximum_matching();
        assert_eq!(first, second);
        assert_eq!(first.size, 3);
    }

    #[test]
    fn wide_graph_saturates_left_side() {
        let mut graph = MatchGraph::new(2, 6);
        graph.add_edge(0, 4);
        graph.add_edge(0, 5);
        graph.add_edge(1, 5);

        let matching = graph.maximum_matching();
        assert_eq!(matching.size, 2);
        assert_eq!(matching.pair_left, vec![Some(4), Some(5)]);
    }
}

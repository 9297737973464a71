// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{Edge, VertexId};

/// Generator of a deterministic edge set for `n` vertices.
///
/// Generation is pure: equal inputs yield equal edge lists in equal order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// `i -> i+1` for every `i < n-1`.
    Chain,
    /// Chain closed by `n-1 -> 0`.
    Ring,
    /// `0 -> i` for every `i > 0`.
    Star,
    /// Star plus `i -> 0` for every leaf, leaf edges following hub edges.
    BidirectionalStar,
    /// Vertices on a `ceil(sqrt(n))`-wide grid, each linked to its up to
    /// eight neighbours (orthogonal and diagonal).
    GridDiagonal,
    /// Every ordered pair of distinct vertices.
    FullyConnected,
}

impl Pattern {
    /// Edge list for `vertex_count` vertices.
    pub fn generate(&self, vertex_count: usize) -> Vec<Edge> {
        let n = vertex_count as u32;
        match self {
            Pattern::Chain => chain(n),
            Pattern::Ring => {
                let mut edges = chain(n);
                if n > 1 {
                    edges.push(Edge::new(n - 1, 0));
                }
                edges
            }
            Pattern::Star => star(n),
            Pattern::BidirectionalStar => {
                let mut edges = star(n);
                edges.extend((1..n).map(|leaf| Edge::new(leaf, 0)));
                edges
            }
            Pattern::GridDiagonal => grid_diagonal(n),
            Pattern::FullyConnected => (0..n)
                .flat_map(|i| (0..n).filter(move |j| *j != i).map(move |j| Edge::new(i, j)))
                .collect(),
        }
    }
}

fn chain(n: u32) -> Vec<Edge> {
    (1..n).map(|i| Edge::new(i - 1, i)).collect()
}

fn star(n: u32) -> Vec<Edge> {
    (1..n).map(|leaf| Edge::new(0, leaf)).collect()
}

fn grid_side(n: u32) -> u32 {
    let mut side = (n as f64).sqrt() as u32;
    while side * side < n {
        side += 1;
    }
    side
}

fn grid_diagonal(n: u32) -> Vec<Edge> {
    let side = grid_side(n) as i64;
    let mut edges = Vec::new();
    for v in 0..n {
        let (row, col) = ((v as i64) / side, (v as i64) % side);
        for dr in -1..=1i64 {
            for dc in -1..=1i64 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let (r, c) = (row + dr, col + dc);
                if r < 0 || c < 0 || c >= side {
                    continue;
                }
                let neighbour = r * side + c;
                if neighbour < n as i64 {
                    edges.push(Edge {
                        source: VertexId(v),
                        target: VertexId(neighbour as u32),
                    });
                }
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn pairs(edges: &[Edge]) -> Vec<(u32, u32)> {
        edges.iter().map(|e| (e.source.0, e.target.0)).collect()
    }

    #[test]
    fn chain_links_neighbours() {
        assert_eq!(pairs(&Pattern::Chain.generate(4)), vec![(0, 1), (1, 2), (2, 3)]);
        assert!(Pattern::Chain.generate(1).is_empty());
        assert!(Pattern::Chain.generate(0).is_empty());
    }

    #[test]
    fn ring_closes_the_chain() {
        assert_eq!(
            pairs(&Pattern::Ring.generate(3)),
            vec![(0, 1), (1, 2), (2, 0)]
        );
        assert!(Pattern::Ring.generate(1).is_empty());
    }

    #[test]
    fn star_fans_out_from_zero() {
        assert_eq!(pairs(&Pattern::Star.generate(4)), vec![(0, 1), (0, 2), (0, 3)]);
    }

    #[test]
    fn bidirectional_star_adds_return_edges() {
        assert_eq!(
            pairs(&Pattern::BidirectionalStar.generate(3)),
            vec![(0, 1), (0, 2), (1, 0), (2, 0)]
        );
    }

    #[test]
    fn grid_diagonal_on_full_square() {
        let edges = Pattern::GridDiagonal.generate(9);
        // corners 3, edges 5, centre 8
        assert_eq!(edges.len(), 4 * 3 + 4 * 5 + 8);
        let centre: Vec<u32> = edges
            .iter()
            .filter(|e| e.source == VertexId(4))
            .map(|e| e.target.0)
            .collect();
        assert_eq!(centre, vec![0, 1, 2, 3, 5, 6, 7, 8]);
        let corner: Vec<u32> = edges
            .iter()
            .filter(|e| e.source == VertexId(0))
            .map(|e| e.target.0)
            .collect();
        assert_eq!(corner, vec![1, 3, 4]);
    }

    #[test]
    fn grid_diagonal_clips_at_vertex_count() {
        // side 3, only the first row and a half exist
        let edges = Pattern::GridDiagonal.generate(5);
        assert!(edges.iter().all(|e| e.source.0 < 5 && e.target.0 < 5));
        let from_two: Vec<u32> = edges
            .iter()
            .filter(|e| e.source == VertexId(2))
            .map(|e| e.target.0)
            .collect();
        assert_eq!(from_two, vec![1, 4]);
    }

    #[test]
    fn fully_connected_has_every_ordered_pair() {
        let edges = Pattern::FullyConnected.generate(4);
        assert_eq!(edges.len(), 12);
        assert!(edges.iter().all(|e| e.source != e.target));
    }

    #[rstest]
    fn generation_is_deterministic(
        #[values(
            Pattern::Chain,
            Pattern::Ring,
            Pattern::Star,
            Pattern::BidirectionalStar,
            Pattern::GridDiagonal,
            Pattern::FullyConnected
        )]
        pattern: Pattern,
        #[values(0, 1, 2, 7, 16, 23)] n: usize,
    ) {
        let first = pattern.generate(n);
        assert_eq!(first, pattern.generate(n));
        assert!(
            first
                .iter()
                .all(|e| e.source.index() < n && e.target.index() < n)
        );
    }

    #[test]
    fn bidirectional_star_edges_invert_twice_to_themselves() {
        let edges = Pattern::BidirectionalStar.generate(12);
        for edge in &edges {
            assert_eq!(edge.inverse().inverse(), *edge);
            assert!(edges.contains(&edge.inverse()));
        }
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use trellis_backend::PeerId;

use super::GraphError;

/// Strategy placing every vertex on exactly one peer.
///
/// Assignment is pure and total: index `v` of the result is the peer
/// hosting vertex `v`, always in `0..peer_count`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// Contiguous blocks: peer `p` owns
    /// `[p * vertex_count / peer_count, (p + 1) * vertex_count / peer_count)`.
    /// Block sizes differ by at most one. With fewer vertices than peers some
    /// peers own nothing.
    Consecutive,
    /// Vertex `v` goes to peer `v % peer_count`.
    RoundRobin,
    /// Uniform placement from a generator seeded with `seed`.
    Random {
        /// Equal seeds give equal placements.
        seed: u64,
    },
}

impl Mapping {
    /// Owning peer of every vertex.
    pub fn assign(&self, vertex_count: usize, peer_count: usize) -> Result<Vec<PeerId>, GraphError> {
        if peer_count == 0 {
            return Err(GraphError::NoPeers);
        }
        let peers = peer_count as u32;

        let owners = match self {
            Mapping::Consecutive => {
                // largest p with p * V / P <= v
                let (n, p) = (vertex_count as u64, peer_count as u64);
                (0..n)
                    .map(|v| PeerId((((v + 1) * p - 1) / n) as u32))
                    .collect()
            }
            Mapping::RoundRobin => (0..vertex_count)
                .map(|v| PeerId((v % peer_count) as u32))
                .collect(),
            Mapping::Random { seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                (0..vertex_count)
                    .map(|_| PeerId(rng.random_range(0..peers)))
                    .collect()
            }
        };
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(owners: &[PeerId]) -> Vec<u32> {
        owners.iter().map(|p| p.0).collect()
    }

    #[rstest]
    #[case(7, 3, vec![0, 0, 1, 1, 2, 2, 2])]
    #[case(8, 3, vec![0, 0, 1, 1, 1, 2, 2, 2])]
    #[case(6, 3, vec![0, 0, 1, 1, 2, 2])]
    #[case(4, 4, vec![0, 1, 2, 3])]
    fn consecutive_splits_into_floor_blocks(
        #[case] vertices: usize,
        #[case] peers: usize,
        #[case] expected: Vec<u32>,
    ) {
        let owners = Mapping::Consecutive.assign(vertices, peers).unwrap();
        assert_eq!(ids(&owners), expected);
    }

    #[test]
    fn consecutive_matches_block_bounds() {
        let (v, p) = (23usize, 5usize);
        let owners = Mapping::Consecutive.assign(v, p).unwrap();
        for (vertex, owner) in owners.iter().enumerate() {
            let q = owner.index();
            assert!(q * v / p <= vertex && vertex < (q + 1) * v / p, "{vertex} -> {q}");
        }
    }

    #[test]
    fn consecutive_with_fewer_vertices_than_peers() {
        // peers 0 and 2 own the empty blocks [0, 0) and [1, 1)
        let owners = Mapping::Consecutive.assign(2, 4).unwrap();
        assert_eq!(ids(&owners), vec![1, 3]);
    }

    #[test]
    fn round_robin_cycles() {
        let owners = Mapping::RoundRobin.assign(7, 3).unwrap();
        assert_eq!(ids(&owners), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn random_is_reproducible_per_seed() {
        let a = Mapping::Random { seed: 42 }.assign(64, 5).unwrap();
        let b = Mapping::Random { seed: 42 }.assign(64, 5).unwrap();
        let c = Mapping::Random { seed: 43 }.assign(64, 5).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_peers_is_rejected() {
        assert_eq!(
            Mapping::RoundRobin.assign(3, 0),
            Err(GraphError::NoPeers)
        );
    }

    #[rstest]
    fn every_vertex_gets_exactly_one_peer_in_range(
        #[values(Mapping::Consecutive, Mapping::RoundRobin, Mapping::Random { seed: 7 })]
        mapping: Mapping,
        #[values(0, 1, 5, 7, 100)] vertices: usize,
        #[values(1, 2, 3, 8)] peers: usize,
    ) {
        let owners = mapping.assign(vertices, peers).unwrap();
        assert_eq!(owners.len(), vertices);
        assert!(owners.iter().all(|p| p.index() < peers));
    }
}

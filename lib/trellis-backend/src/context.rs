// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Peer identities and peer groups.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::error::CommError;

/// Dense identifier of a peer, assigned by the backend at join time.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl PeerId {
    /// Index form, for addressing per-peer tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for PeerId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Lineage identifier of a context.
///
/// Every version of a growing context shares one lineage; messages are
/// routed by lineage so traffic survives a membership update.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl ContextId {
    /// Lineage of the global context every backend starts with.
    pub const GLOBAL: ContextId = ContextId(0);

    fn derive(parent: ContextId, members: &[PeerId]) -> ContextId {
        let mut hasher = Xxh3::new();
        hasher.update(&parent.0.to_le_bytes());
        for member in members {
            hasher.update(&member.0.to_le_bytes());
        }
        match hasher.digest() {
            // keep the global lineage unambiguous
            0 => ContextId(1),
            id => ContextId(id),
        }
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{:016x}", self.0)
    }
}

/// Ordered, versioned roster of peers.
///
/// A context is an immutable value. Growing the membership produces a new
/// context of the same lineage with a higher version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    id: ContextId,
    version: u64,
    members: Arc<[PeerId]>,
    me: PeerId,
}

impl Context {
    /// Builds a context, checking that members are unique and include `me`.
    pub fn new(
        id: ContextId,
        version: u64,
        members: impl Into<Arc<[PeerId]>>,
        me: PeerId,
    ) -> Result<Self, CommError> {
        let members = members.into();
        let mut seen = HashSet::with_capacity(members.len());
        for member in members.iter() {
            if !seen.insert(*member) {
                return Err(CommError::InvalidContext(format!(
                    "{member} appears twice in {id}"
                )));
            }
        }
        if !seen.contains(&me) {
            return Err(CommError::InvalidContext(format!(
                "{me} is not a member of {id}"
            )));
        }
        Ok(Self {
            id,
            version,
            members,
            me,
        })
    }

    /// The global context made of peers `0..size` as seen by `me`.
    ///
    /// The version of a global context equals its size, so every peer agrees
    /// on which roster a version denotes.
    pub fn global(size: usize, me: PeerId) -> Result<Self, CommError> {
        let members: Vec<PeerId> = (0..size as u32).map(PeerId).collect();
        Self::new(ContextId::GLOBAL, size as u64, members, me)
    }

    /// Derives a sub-group of `self`.
    ///
    /// Every id must belong to this context, ids must be unique and the
    /// caller must be one of them. The derived lineage depends only on this
    /// lineage and the member list, so all members derive the same id.
    pub fn subset(&self, ids: &[PeerId]) -> Result<Self, CommError> {
        if let Some(outsider) = ids.iter().find(|id| !self.contains(**id)) {
            return Err(CommError::InvalidContext(format!(
                "{outsider} is not a member of {}",
                self.id
            )));
        }
        Self::new(
            ContextId::derive(self.id, ids),
            0,
            ids.to_vec(),
            self.me,
        )
    }

    /// Lineage id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Version within the lineage.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// The calling peer.
    pub fn peer_id(&self) -> PeerId {
        self.me
    }

    /// Members in rank order.
    pub fn members(&self) -> &[PeerId] {
        &self.members
    }

    /// Iterates over members in rank order.
    pub fn iter(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.members.iter().copied()
    }

    /// Whether `peer` belongs to this context.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.members.contains(&peer)
    }

    /// Position of `peer` in this context.
    pub fn rank_of(&self, peer: PeerId) -> Option<usize> {
        self.members.iter().position(|p| *p == peer)
    }

    /// Position of the calling peer.
    pub fn rank(&self) -> usize {
        self.rank_of(self.me).unwrap_or_default()
    }

    /// Member at `rank`.
    pub fn peer_at(&self, rank: usize) -> Option<PeerId> {
        self.members.get(rank).copied()
    }

    pub(crate) fn check_member(&self, peer: PeerId) -> Result<(), CommError> {
        if self.contains(peer) {
            Ok(())
        } else {
            Err(CommError::InvalidContext(format!(
                "{peer} is not a member of {} (size {})",
                self.id,
                self.size()
            )))
        }
    }
}

/// Latest known version per context lineage.
///
/// Operations on a context older than the latest version of its lineage are
/// rejected as stale.
#[derive(Debug, Default)]
pub struct ContextVersions {
    latest: DashMap<ContextId, u64>,
}

impl ContextVersions {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `ctx` as a known version; keeps the maximum.
    pub fn observe(&self, ctx: &Context) {
        self.latest
            .entry(ctx.id())
            .and_modify(|v| *v = (*v).max(ctx.version()))
            .or_insert(ctx.version());
    }

    /// Latest recorded version of a lineage.
    pub fn latest(&self, id: ContextId) -> Option<u64> {
        self.latest.get(&id).map(|v| *v)
    }

    /// Fails with [`CommError::StaleContext`] if a newer version is known.
    pub fn check(&self, ctx: &Context) -> Result<(), CommError> {
        match self.latest(ctx.id()) {
            Some(latest) if latest > ctx.version() => Err(CommError::StaleContext {
                context: ctx.id(),
                version: ctx.version(),
                latest,
            }),
            _ => Ok(()),
        }
    }
}

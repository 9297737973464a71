// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use trellis_event::EventPoison;

use crate::context::ContextId;

/// Errors reported by communication operations.
///
/// Cloneable so a completed [`trellis_event::Event`] can hand the same
/// failure to repeated waits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommError {
    /// The transport could not deliver or receive a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// The context was superseded by a later membership update.
    #[error("stale context {context}: version {version}, latest {latest}")]
    StaleContext {
        /// Lineage of the stale context.
        context: ContextId,
        /// Version the caller used.
        version: u64,
        /// Latest version known to the backend.
        latest: u64,
    },

    /// A peer or id set does not fit the context.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// A payload does not have the size the operation requires.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize {
        /// Bytes the operation needed.
        expected: usize,
        /// Bytes actually supplied or received.
        actual: usize,
    },

    /// The backend has been shut down.
    #[error("backend is shut down")]
    Shutdown,
}

impl From<EventPoison> for CommError {
    fn from(poison: EventPoison) -> Self {
        CommError::Transport(poison.to_string())
    }
}

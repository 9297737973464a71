// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event status types.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::handle::EventHandle;

/// Status returned from non-blocking event queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EventStatus {
    Pending,
    Ready,
    Failed,
}

/// Reason an event resolved without its producer completing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventPoison {
    handle: EventHandle,
    reason: Arc<str>,
}

impl EventPoison {
    /// Create a new poison record.
    pub fn new(handle: EventHandle, reason: impl Into<Arc<str>>) -> Self {
        Self {
            handle,
            reason: reason.into(),
        }
    }

    /// Handle of the poisoned event.
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// Human readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for EventPoison {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} poisoned: {}", self.handle, self.reason())
    }
}

impl std::error::Error for EventPoison {}

// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex;
use std::task::{Context, Poll, Waker};

/// Shared completion cell between one [`crate::Completer`] and one [`crate::Event`].
pub(crate) struct Slot<T, E> {
    // Outcome and wakers share a lock so a completion can never slip between
    // a waiter's check and its waker registration.
    inner: Mutex<SlotInner<T, E>>,
}

struct SlotInner<T, E> {
    outcome: Option<Result<T, E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Slot<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                outcome: None,
                wakers: Vec::with_capacity(1),
            }),
        }
    }

    /// Stores the outcome and wakes every registered waiter. Later calls are ignored.
    pub(crate) fn complete(&self, outcome: Result<T, E>) {
        let wakers = {
            let mut guard = self.inner.lock();
            if guard.outcome.is_some() {
                return;
            }
            guard.outcome = Some(outcome);
            std::mem::take(&mut guard.wakers)
        };

        for waker in wakers {
            waker.wake();
        }
    }

    /// Takes the outcome if present without registering interest.
    pub(crate) fn try_take(&self) -> Option<Result<T, E>> {
        self.inner.lock().outcome.take()
    }

    /// Takes the outcome, or registers the task's waker and returns pending.
    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Result<T, E>> {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.outcome.take() {
            return Poll::Ready(outcome);
        }

        // select! loops re-poll with the same waker; keep one entry per task
        let waker = cx.waker();
        if let Some(existing) = inner.wakers.iter_mut().find(|w| w.will_wake(waker)) {
            existing.clone_from(waker);
        } else {
            inner.wakers.push(waker.clone());
        }

        Poll::Pending
    }
}

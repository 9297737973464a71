// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::handle::EventHandle;
use crate::slot::Slot;
use crate::status::{EventPoison, EventStatus};

/// Creates a linked producer/consumer pair for one asynchronous operation.
pub fn event_pair<T, E>() -> (Completer<T, E>, Event<T, E>)
where
    E: From<EventPoison>,
{
    let handle = EventHandle::next();
    let slot = Arc::new(Slot::new());
    let completer = Completer {
        handle,
        slot: Some(Arc::clone(&slot)),
    };
    let event = Event {
        handle,
        state: EventState::Pending(slot),
    };
    (completer, event)
}

/// Caller side of an outstanding asynchronous operation.
///
/// An event can be awaited directly, which consumes it, or waited on through
/// [`Event::wait`], which caches the outcome so later waits observe the same
/// result. Dropping an event without waiting does not cancel the operation.
#[must_use = "an event does nothing unless waited on or polled"]
pub struct Event<T, E> {
    handle: EventHandle,
    state: EventState<T, E>,
}

enum EventState<T, E> {
    Pending(Arc<Slot<T, E>>),
    Done(Result<T, E>),
    Consumed,
}

// No field is ever structurally pinned.
impl<T, E> Unpin for Event<T, E> {}

impl<T, E> Event<T, E> {
    /// An event that is already complete.
    pub fn ready(value: T) -> Self {
        Self::resolved(Ok(value))
    }

    /// An event that has already failed.
    pub fn failed(error: E) -> Self {
        Self::resolved(Err(error))
    }

    fn resolved(outcome: Result<T, E>) -> Self {
        Self {
            handle: EventHandle::next(),
            state: EventState::Done(outcome),
        }
    }

    /// Identifier for logging and tracing.
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// Non-blocking completion query.
    pub fn status(&mut self) -> EventStatus {
        if let EventState::Pending(slot) = &self.state
            && let Some(outcome) = slot.try_take()
        {
            self.state = EventState::Done(outcome);
        }

        match &self.state {
            EventState::Pending(_) => EventStatus::Pending,
            EventState::Done(Ok(_)) => EventStatus::Ready,
            EventState::Done(Err(_)) | EventState::Consumed => EventStatus::Failed,
        }
    }

    fn poll_done(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if let EventState::Pending(slot) = &self.state {
            match slot.poll_take(cx) {
                Poll::Ready(outcome) => self.state = EventState::Done(outcome),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(())
    }
}

impl<T: Clone, E: Clone + From<EventPoison>> Event<T, E> {
    /// Waits for completion and returns the outcome.
    ///
    /// The outcome is cached; waiting again returns the same result.
    pub async fn wait(&mut self) -> Result<T, E> {
        poll_fn(|cx| self.poll_done(cx)).await;
        match &self.state {
            EventState::Done(outcome) => outcome.clone(),
            _ => Err(E::from(EventPoison::new(
                self.handle,
                "event outcome already consumed",
            ))),
        }
    }
}

impl<T, E: From<EventPoison>> Future for Event<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.poll_done(cx).is_pending() {
            return Poll::Pending;
        }
        match std::mem::replace(&mut this.state, EventState::Consumed) {
            EventState::Done(outcome) => Poll::Ready(outcome),
            _ => Poll::Ready(Err(E::from(EventPoison::new(
                this.handle,
                "event outcome already consumed",
            )))),
        }
    }
}

impl<T, E> fmt::Debug for Event<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            EventState::Pending(_) => "pending",
            EventState::Done(Ok(_)) => "ready",
            EventState::Done(Err(_)) => "failed",
            EventState::Consumed => "consumed",
        };
        f.debug_struct("Event")
            .field("handle", &self.handle)
            .field("state", &state)
            .finish()
    }
}

/// Producer side of an outstanding asynchronous operation.
///
/// Dropping a completer without completing it fails the paired event with an
/// [`EventPoison`].
pub struct Completer<T, E: From<EventPoison>> {
    handle: EventHandle,
    slot: Option<Arc<Slot<T, E>>>,
}

impl<T, E: From<EventPoison>> Completer<T, E> {
    /// Identifier shared with the paired [`Event`].
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// True once the paired [`Event`] has been dropped, so nobody can observe
    /// the outcome any more.
    pub fn is_abandoned(&self) -> bool {
        self.slot
            .as_ref()
            .is_none_or(|slot| Arc::strong_count(slot) == 1)
    }

    /// Resolves the paired event with `outcome`.
    pub fn complete(mut self, outcome: Result<T, E>) {
        if let Some(slot) = self.slot.take() {
            slot.complete(outcome);
        }
    }

    /// Resolves the paired event successfully.
    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    /// Resolves the paired event with an error.
    pub fn fail(self, error: E) {
        self.complete(Err(error));
    }
}

impl<T, E: From<EventPoison>> Drop for Completer<T, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::debug!(handle = %self.handle, "completer dropped before completion");
            slot.complete(Err(E::from(EventPoison::new(
                self.handle,
                "completer dropped before completion",
            ))));
        }
    }
}

impl<T, E: From<EventPoison>> fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("handle", &self.handle)
            .finish()
    }
}

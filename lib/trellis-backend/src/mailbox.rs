// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Receive-side matching of inbound payloads against posted receives.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use trellis_event::{Completer, Event, event_pair};

use crate::error::CommError;
use crate::message::{Envelope, Message, RecvFilter};

type RecvCompleter = Completer<Message, CommError>;

/// Per-peer inbox.
///
/// Unmatched payloads queue in arrival order; unmatched receives queue in
/// posting order. Both sides are scanned front to back, which keeps delivery
/// FIFO for any fixed (source, tag, context).
#[derive(Default)]
pub(crate) struct Mailbox {
    inner: Mutex<MailboxInner>,
}

#[derive(Default)]
struct MailboxInner {
    unexpected: VecDeque<(Envelope, Bytes)>,
    posted: VecDeque<(RecvFilter, RecvCompleter)>,
    closed: bool,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hands a payload to the oldest matching receive, or queues it.
    ///
    /// Fails with [`CommError::Shutdown`] once the mailbox is closed; the
    /// payload is dropped.
    pub(crate) fn deliver(&self, envelope: Envelope, payload: Bytes) -> Result<(), CommError> {
        let completer = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(CommError::Shutdown);
            }
            // receivers that dropped their event no longer count
            inner.posted.retain(|(_, c)| !c.is_abandoned());
            match inner.posted.iter().position(|(f, _)| f.matches(&envelope)) {
                Some(idx) => inner.posted.remove(idx).map(|(_, c)| c),
                None => {
                    inner.unexpected.push_back((envelope, payload.clone()));
                    None
                }
            }
        };

        if let Some(completer) = completer {
            completer.succeed(Message {
                src: envelope.src,
                tag: envelope.tag,
                payload,
            });
        }
        Ok(())
    }

    /// Posts a receive; resolves immediately if a queued payload matches.
    pub(crate) fn post(&self, filter: RecvFilter) -> Event<Message, CommError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Event::failed(CommError::Shutdown);
        }
        if let Some(idx) = inner.unexpected.iter().position(|(e, _)| filter.matches(e))
            && let Some((envelope, payload)) = inner.unexpected.remove(idx)
        {
            return Event::ready(Message {
                src: envelope.src,
                tag: envelope.tag,
                payload,
            });
        }

        let (completer, event) = event_pair();
        inner.posted.push_back((filter, completer));
        event
    }

    /// Fails every pending receive and rejects later ones.
    pub(crate) fn close(&self) {
        let posted = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.unexpected.clear();
            std::mem::take(&mut inner.posted)
        };
        for (_, completer) in posted {
            completer.fail(CommError::Shutdown);
        }
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.inner.lock().unexpected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextId, PeerId};
    use crate::message::Channel;
    use trellis_event::EventStatus;

    fn envelope(src: u32, tag: u32) -> Envelope {
        Envelope {
            context: ContextId::GLOBAL,
            channel: Channel::User,
            src: PeerId(src),
            tag,
        }
    }

    fn filter(src: Option<u32>, tag: Option<u32>) -> RecvFilter {
        RecvFilter {
            context: ContextId::GLOBAL,
            channel: Channel::User,
            src: src.map(PeerId),
            tag,
        }
    }

    #[tokio::test]
    async fn queued_payload_matches_later_receive() {
        let mailbox = Mailbox::new();
        mailbox.deliver(envelope(1, 5), Bytes::from_static(b"abc")).unwrap();

        let msg = mailbox.post(filter(Some(1), Some(5))).await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"abc"));
        assert_eq!(mailbox.queued(), 0);
    }

    #[tokio::test]
    async fn posted_receive_is_completed_on_arrival() {
        let mailbox = Mailbox::new();
        let mut event = mailbox.post(filter(None, None));
        assert_eq!(event.status(), EventStatus::Pending);

        mailbox.deliver(envelope(3, 9), Bytes::from_static(b"x")).unwrap();
        let msg = event.wait().await.unwrap();
        assert_eq!(msg.src, PeerId(3));
        assert_eq!(msg.tag, 9);
    }

    #[tokio::test]
    async fn same_source_and_tag_is_fifo() {
        let mailbox = Mailbox::new();
        for i in 0..4u8 {
            mailbox.deliver(envelope(2, 1), Bytes::from(vec![i])).unwrap();
        }
        for i in 0..4u8 {
            let msg = mailbox.post(filter(Some(2), Some(1))).await.unwrap();
            assert_eq!(msg.payload.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn mismatched_tag_stays_queued() {
        let mailbox = Mailbox::new();
        mailbox.deliver(envelope(0, 1), Bytes::from_static(b"one")).unwrap();

        let mut event = mailbox.post(filter(Some(0), Some(2)));
        assert_eq!(event.status(), EventStatus::Pending);
        assert_eq!(mailbox.queued(), 1);

        mailbox.deliver(envelope(0, 2), Bytes::from_static(b"two")).unwrap();
        assert_eq!(
            event.wait().await.unwrap().payload,
            Bytes::from_static(b"two")
        );
    }

    #[tokio::test]
    async fn dropped_receive_does_not_swallow_payload() {
        let mailbox = Mailbox::new();
        drop(mailbox.post(filter(None, None)));

        mailbox.deliver(envelope(1, 1), Bytes::from_static(b"kept")).unwrap();
        let msg = mailbox.post(filter(None, None)).await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"kept"));
    }

    #[tokio::test]
    async fn close_fails_pending_receives() {
        let mailbox = Mailbox::new();
        let event = mailbox.post(filter(None, None));
        mailbox.close();
        assert_eq!(event.await, Err(CommError::Shutdown));
        assert_eq!(
            mailbox.post(filter(None, None)).await,
            Err(CommError::Shutdown)
        );
        assert_eq!(
            mailbox.deliver(envelope(0, 1), Bytes::from_static(b"late")),
            Err(CommError::Shutdown)
        );
    }
}

// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machine inbox
//!
//! The inbox owns the schedule status of its machine. Enqueue and dequeue flip the
//! *handler running* flag under the same lock as the queue, so exactly one sender ever
//! learns that it must launch a handler-loop job.
//!

use crate::{EnqueueStatus, Envelope};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use std::collections::VecDeque;

/// Predicate selecting the envelopes a blocked receive accepts.
pub(crate) type ReceiveFilter = Box<dyn Fn(&Envelope) -> bool + Send>;

/// Result of a receive.
pub(crate) enum Receipt {
    /// A matching envelope was already queued.
    Ready(Envelope),
    /// The machine must wait for the next matching enqueue.
    Pending(oneshot::Receiver<Envelope>),
}

struct Waiter {
    filter: ReceiveFilter,
    sender: oneshot::Sender<Envelope>,
}

struct InboxState {
    queue: VecDeque<Envelope>,
    handler_running: bool,
    closed: bool,
    waiter: Option<Waiter>,
}

/// FIFO mailbox of one machine.
pub(crate) struct Inbox {
    state: Mutex<InboxState>,
}

impl Inbox {
    /// A new inbox starts with its handler running: the creation job is already scheduled.
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(InboxState {
                queue: VecDeque::new(),
                handler_running: true,
                closed: false,
                waiter: None,
            }),
        }
    }

    pub(crate) fn enqueue(&self, envelope: Envelope) -> EnqueueStatus {
        let mut state = self.state.lock();
        if state.closed {
            return EnqueueStatus::Dropped;
        }

        if let Some(waiter) = state.waiter.take() {
            if (waiter.filter)(&envelope) {
                return match waiter.sender.send(envelope) {
                    Ok(()) => EnqueueStatus::Received,
                    // The waiting job is gone; keep the event.
                    Err(envelope) => Self::push(&mut state, envelope),
                };
            }
            state.waiter = Some(waiter);
        }

        Self::push(&mut state, envelope)
    }

    fn push(state: &mut InboxState, envelope: Envelope) -> EnqueueStatus {
        state.queue.push_back(envelope);
        if state.handler_running {
            EnqueueStatus::Queued
        } else {
            state.handler_running = true;
            EnqueueStatus::QueuedAndMustStartHandler
        }
    }

    /// Next envelope in FIFO order. An empty inbox marks the handler as no longer running.
    pub(crate) fn dequeue(&self) -> Option<Envelope> {
        let mut state = self.state.lock();
        let envelope = state.queue.pop_front();
        if envelope.is_none() {
            state.handler_running = false;
        }
        envelope
    }

    /// Takes the first queued envelope accepted by `filter`, or registers a waiter.
    pub(crate) fn receive(&self, filter: ReceiveFilter) -> Receipt {
        let mut state = self.state.lock();
        if let Some(position) = state.queue.iter().position(|envelope| filter(envelope)) {
            if let Some(envelope) = state.queue.remove(position) {
                return Receipt::Ready(envelope);
            }
        }
        let (sender, receiver) = oneshot::channel();
        state.waiter = Some(Waiter { filter, sender });
        Receipt::Pending(receiver)
    }

    /// Closes the inbox and returns what was left in it. Later enqueues are dropped.
    pub(crate) fn close(&self) -> Vec<Envelope> {
        let mut state = self.state.lock();
        state.closed = true;
        state.waiter = None;
        state.queue.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

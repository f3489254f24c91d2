// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Runtime event sink and subscriber.
//!
//! The runtime publishes failures and dropped events on a broadcast channel. A [`Sink`]
//! runs in its own task, receives those events and notifies a [`Subscriber`].

use crate::{Envelope, Error, MachineId};

use async_trait::async_trait;
use tokio::sync::broadcast::{error::RecvError, Receiver as EventReceiver};

use tracing::debug;

/// Event published by the runtime.
#[derive(Clone, Debug)]
pub enum RuntimeEvent {
    /// An error escaped a handler-loop job. The runtime stopped.
    Failure(Error),
    /// An event was sent to a machine that halted or never existed.
    EventDropped { envelope: Envelope, target: MachineId },
}

/// A sink that receives runtime events and notifies a subscriber.
pub struct Sink {
    /// The subscriber that will be notified of events.
    subscriber: Box<dyn Subscriber>,
    /// The broadcast receiver for runtime events.
    event_receiver: EventReceiver<RuntimeEvent>,
}

impl Sink {
    /// Creates a new Sink with the given event receiver and subscriber.
    ///
    /// # Arguments
    ///
    /// * `event_receiver` - Receiver obtained from [`Runtime::subscribe`](crate::Runtime::subscribe).
    /// * `subscriber` - Implementation of the Subscriber trait that will process events.
    ///
    pub fn new(
        event_receiver: EventReceiver<RuntimeEvent>,
        subscriber: impl Subscriber,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Runs the sink's event processing loop until the event channel is closed.
    /// Lagged events are skipped.
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!(
                        "Received runtime event: {:?}. Notify to the subscriber.",
                        event
                    );
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Sink lagged behind, {} events skipped.", skipped);
                    continue;
                }
            }
        }
    }
}

/// Trait for types that process runtime events.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Called when an event is received by the sink.
    async fn notify(&self, event: RuntimeEvent);
}

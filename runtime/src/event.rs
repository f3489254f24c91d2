// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Events and envelopes
//!
//! Events are application-defined payloads. The runtime never branches on the payload:
//! the concrete type is only used by machines to match on what they receive and by the
//! logger to name what was sent.
//!

use crate::{id::short_type_name, options::FailureDomain, OperationGroupId};

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

/// Upcast helper used to downcast events.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Defines the events that machines exchange.
///
/// # Examples
///
/// ```ignore
/// use machina_runtime::Event;
///
/// #[derive(Debug)]
/// struct Ping { round: u32 }
///
/// impl Event for Ping {}
/// ```
///
pub trait Event: AsAny + Debug + Send + Sync + 'static {
    /// Name used by the logger. Defaults to the type name without its module path.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Built-in event that halts the machine that dequeues it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Halt;

impl Event for Halt {}

/// Immutable wrapper around an event.
///
/// The envelope carries the operation group resolved when the event was sent, the
/// `must_handle` flag and the opaque failure domain of the send. Cloning an envelope
/// shares the payload.
#[derive(Clone)]
pub struct Envelope {
    event: Arc<dyn Event>,
    operation_group_id: OperationGroupId,
    must_handle: bool,
    failure_domain: Option<FailureDomain>,
}

impl Envelope {
    /// Wraps an event with the given operation group.
    pub fn new(event: impl Event, operation_group_id: OperationGroupId) -> Self {
        Self::from_shared(Arc::new(event), operation_group_id, false, None)
    }

    pub(crate) fn from_shared(
        event: Arc<dyn Event>,
        operation_group_id: OperationGroupId,
        must_handle: bool,
        failure_domain: Option<FailureDomain>,
    ) -> Self {
        Self {
            event,
            operation_group_id,
            must_handle,
            failure_domain,
        }
    }

    /// The payload.
    pub fn event(&self) -> &dyn Event {
        self.event.as_ref()
    }

    /// Shared handle to the payload.
    pub fn shared_event(&self) -> Arc<dyn Event> {
        self.event.clone()
    }

    /// Name of the payload type.
    pub fn name(&self) -> &'static str {
        self.event().name()
    }

    pub fn operation_group_id(&self) -> OperationGroupId {
        self.operation_group_id
    }

    /// True if the event must be handled before its target halts.
    pub fn must_handle(&self) -> bool {
        self.must_handle
    }

    pub fn failure_domain(&self) -> Option<&FailureDomain> {
        self.failure_domain.as_ref()
    }

    /// Type id of the payload.
    pub fn event_type(&self) -> TypeId {
        Any::type_id(self.event().as_any())
    }

    /// True if the payload is an `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.event().as_any().is::<E>()
    }

    /// Borrows the payload as an `E`.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.event().as_any().downcast_ref::<E>()
    }
}

impl Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("event", &self.event)
            .field("operation_group_id", &self.operation_group_id)
            .field("must_handle", &self.must_handle)
            .finish()
    }
}

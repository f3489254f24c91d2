// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Send and create options
//!

use crate::{Event, OperationGroupId};

use serde::{Deserialize, Serialize};

use std::sync::Arc;

/// Opaque failure-domain tag. The runtime propagates it and never interprets it.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FailureDomain(String);

impl FailureDomain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Options of a send.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Explicit operation group. Overrides the group of the sender.
    pub operation_group_id: Option<OperationGroupId>,
    /// The event must be handled before the target halts.
    pub must_handle: bool,
    pub failure_domain: Option<FailureDomain>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation_group(mut self, group: OperationGroupId) -> Self {
        self.operation_group_id = Some(group);
        self
    }

    pub fn with_must_handle(mut self, must_handle: bool) -> Self {
        self.must_handle = must_handle;
        self
    }

    pub fn with_failure_domain(mut self, domain: FailureDomain) -> Self {
        self.failure_domain = Some(domain);
        self
    }
}

/// Options of a machine creation.
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    pub friendly_name: Option<String>,
    /// Event passed to the entry of the start state.
    pub event: Option<Arc<dyn Event>>,
    /// Explicit operation group. Overrides the group of the creator.
    pub operation_group_id: Option<OperationGroupId>,
    pub failure_domain: Option<FailureDomain>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn with_event(mut self, event: impl Event) -> Self {
        self.event = Some(Arc::new(event));
        self
    }

    pub fn with_operation_group(mut self, group: OperationGroupId) -> Self {
        self.operation_group_id = Some(group);
        self
    }

    pub fn with_failure_domain(mut self, domain: FailureDomain) -> Self {
        self.failure_domain = Some(domain);
        self
    }
}

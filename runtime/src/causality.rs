// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Operation groups
//!
//! Every envelope and every machine carries an operation-group id. The id is a causality
//! tag used by external tracing to correlate related operations across machines. The
//! runtime propagates it and never interprets it.
//!

use crate::machine::MachineInfo;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Causality tag propagated across sends, creates and raises.
#[derive(
    Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize,
)]
pub struct OperationGroupId(Uuid);

impl OperationGroupId {
    /// The empty group.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// A fresh random group.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing uuid.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True for the empty group.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for OperationGroupId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for OperationGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decides the operation group of a new envelope or machine.
///
/// An explicit group wins. Otherwise the group of the sending machine is inherited.
/// Operations issued by the runtime itself (no sender) get the empty group.
pub fn resolve(
    explicit: Option<OperationGroupId>,
    sender: Option<&MachineInfo>,
) -> OperationGroupId {
    match (explicit, sender) {
        (Some(group), _) => group,
        (None, Some(info)) => info.operation_group_id(),
        (None, None) => OperationGroupId::nil(),
    }
}

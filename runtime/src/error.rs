// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::MachineId;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the machine runtime.
///
/// Creation errors are returned synchronously to the caller. Errors raised while a
/// machine runs are caught at the job boundary and published as
/// [`RuntimeEvent::Failure`](crate::RuntimeEvent::Failure).
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An explicit invariant violation.
    #[error("Assertion failure: {0}")]
    Assertion(String),
    /// An error that escaped a machine handler and was not handled by the machine.
    #[error("Machine {machine} failed in state '{state}': {message}")]
    Unhandled {
        machine: MachineId,
        state: String,
        message: String,
    },
    /// A machine handler panicked.
    #[error("Machine {machine} panicked: {message}")]
    Panic { machine: MachineId, message: String },
    /// The machine id is already bound to a live machine.
    #[error("Machine {0} already exists.")]
    DuplicateIdentity(MachineId),
    /// The type was never registered with the runtime.
    #[error("Type '{0}' is not a registered machine type.")]
    UnsupportedMachineType(String),
    /// A reserved id was bound to a different machine type.
    #[error("Machine id {id} was reserved for another type than '{expected}'.")]
    MachineTypeMismatch { id: MachineId, expected: String },
    /// The machine id was minted by another runtime.
    #[error("Machine id {0} was not created by this runtime.")]
    ForeignIdentity(MachineId),
    /// A network provider failed.
    #[error("Network error: {0}")]
    Network(String),
    /// The runtime is no longer running.
    #[error("The runtime is not running.")]
    Stopped,
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True if the error is an assertion failure.
    pub fn is_assertion(&self) -> bool {
        matches!(self, Error::Assertion(_))
    }
}

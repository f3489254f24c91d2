// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machine identity
//!
//! The `id` module provides the `MachineType` and `MachineId` types. A `MachineId` is the
//! unique address of a machine inside one runtime.
//!

use serde::{Deserialize, Serialize};

use std::fmt::{Error, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of a registered machine type.
///
/// Machine types are registered in the runtime catalog and machines are created by type.
/// The name of a Rust type is obtained with [`MachineType::of`].
///
/// # Examples
///
/// ```ignore
/// use machina_runtime::MachineType;
///
/// let machine_type = MachineType::of::<Server>();
/// assert_eq!(machine_type.short_name(), "Server");
/// ```
///
#[derive(
    Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MachineType(String);

impl MachineType {
    /// Creates a machine type from a type name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The machine type of the Rust type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().to_owned())
    }

    /// Full type name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &str {
        short_type_name(&self.0)
    }
}

impl From<&str> for MachineType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for MachineType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.0)
    }
}

/// Unique identity of a machine.
///
/// A `MachineId` is made of the machine type and a sequence value drawn from the
/// runtime counter. Two ids are equal when both the type and the value match; the
/// friendly name and the runtime tag are informational only.
///
/// Ids are never reused. An id can be reserved before the machine exists with
/// [`Runtime::create_machine_id`](crate::Runtime::create_machine_id) and bound later
/// with [`Runtime::create_machine_with_id`](crate::Runtime::create_machine_with_id).
///
/// # Thread Safety
///
/// `MachineId` is immutable, so it can be cloned and shared freely between machines
/// and tasks. It is serializable, so a network provider can ship it to another node.
///
#[derive(Clone, Serialize, Deserialize)]
pub struct MachineId {
    machine_type: MachineType,
    value: u64,
    friendly_name: Option<String>,
    runtime: u64,
}

impl MachineId {
    pub(crate) fn new(
        machine_type: MachineType,
        value: u64,
        friendly_name: Option<String>,
        runtime: u64,
    ) -> Self {
        Self {
            machine_type,
            value,
            friendly_name,
            runtime,
        }
    }

    /// The declared machine type.
    pub fn machine_type(&self) -> &MachineType {
        &self.machine_type
    }

    /// The sequence value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The optional friendly name.
    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    /// Tag of the runtime that minted this id.
    pub fn runtime(&self) -> u64 {
        self.runtime
    }
}

impl PartialEq for MachineId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.machine_type == other.machine_type
    }
}

impl Eq for MachineId {}

impl Hash for MachineId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.machine_type.hash(state);
        self.value.hash(state);
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match &self.friendly_name {
            Some(name) => write!(f, "{}({})", name, self.value),
            None => write!(f, "{}({})", self.machine_type.short_name(), self.value),
        }
    }
}

impl std::fmt::Debug for MachineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self)
    }
}

/// Allocator of machine ids for one runtime.
pub(crate) struct IdAllocator {
    runtime: u64,
    counter: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn new(runtime: u64) -> Self {
        Self {
            runtime,
            counter: AtomicU64::new(0),
        }
    }

    /// Mints the next id. Never blocks, never fails.
    pub(crate) fn next(
        &self,
        machine_type: MachineType,
        friendly_name: Option<String>,
    ) -> MachineId {
        let value = self.counter.fetch_add(1, Ordering::SeqCst);
        MachineId::new(machine_type, value, friendly_name, self.runtime)
    }

    pub(crate) fn runtime(&self) -> u64 {
        self.runtime
    }
}

pub(crate) fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

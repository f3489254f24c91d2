// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machine registry
//!
//! The registry maps the id of every live machine to its handle. An entry is added when a
//! machine is created and removed when it halts; removal is the only terminal transition.
//! The catalog maps every registered machine type to its constructor.
//!

use crate::{
    machine::{MachineConstructor, StateMachine},
    Error, MachineId, MachineType,
};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, error};

use std::sync::Arc;

/// Live machines, keyed by id.
#[derive(Default)]
pub(crate) struct MachineRegistry {
    machines: DashMap<MachineId, Arc<dyn StateMachine>>,
}

impl MachineRegistry {
    /// Binds `id` to the machine. Fails if the id is already bound.
    pub(crate) fn register(
        &self,
        id: MachineId,
        machine: Arc<dyn StateMachine>,
    ) -> Result<(), Error> {
        match self.machines.entry(id) {
            Entry::Occupied(entry) => {
                error!("Machine {} already exists!", entry.key());
                Err(Error::DuplicateIdentity(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(machine);
                Ok(())
            }
        }
    }

    /// Absence means halted or never created.
    pub(crate) fn lookup(&self, id: &MachineId) -> Option<Arc<dyn StateMachine>> {
        self.machines.get(id).map(|entry| entry.value().clone())
    }

    /// Idempotent.
    pub(crate) fn remove(&self, id: &MachineId) {
        if self.machines.remove(id).is_some() {
            debug!("Machine {} removed from the registry.", id);
        }
    }

    pub(crate) fn contains(&self, id: &MachineId) -> bool {
        self.machines.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.machines.len()
    }

    pub(crate) fn clear(&self) {
        self.machines.clear();
    }
}

/// Registered machine types.
#[derive(Default)]
pub(crate) struct MachineCatalog {
    constructors: DashMap<MachineType, MachineConstructor>,
}

impl MachineCatalog {
    /// Registers or replaces the constructor of a type.
    pub(crate) fn register(&self, machine_type: MachineType, constructor: MachineConstructor) {
        debug!("Machine type {} registered.", machine_type);
        self.constructors.insert(machine_type, constructor);
    }

    pub(crate) fn constructor(&self, machine_type: &MachineType) -> Result<MachineConstructor, Error> {
        self.constructors
            .get(machine_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnsupportedMachineType(machine_type.to_string()))
    }

    pub(crate) fn contains(&self, machine_type: &MachineType) -> bool {
        self.constructors.contains_key(machine_type)
    }
}

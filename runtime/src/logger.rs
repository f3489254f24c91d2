// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime logger
//!
//! The runtime reports what happens to machines and monitors through a pluggable
//! [`RuntimeLogger`]. Every callback has an empty default so a logger only implements the
//! notifications it cares about. The default logger forwards everything to `tracing`.
//!

use crate::{Error, MachineId, OperationGroupId, Temperature};

use tracing::{debug, error};

/// Consumer of runtime notifications.
///
/// Callbacks run synchronously on the job that triggered them, so they must be cheap
/// and must not call back into the runtime.
#[allow(unused_variables)]
pub trait RuntimeLogger: Send + Sync {
    /// A machine was created by `creator` (`None` for the runtime itself).
    fn on_create_machine(&self, id: &MachineId, creator: Option<&MachineId>) {}

    fn on_create_monitor(&self, monitor_type: &str, id: &MachineId) {}

    /// An event was sent. `is_target_halted` is set when the target is not alive.
    fn on_send(
        &self,
        target: &MachineId,
        sender: Option<&MachineId>,
        sender_state: Option<&str>,
        event_name: &str,
        operation_group_id: OperationGroupId,
        is_target_halted: bool,
    ) {
    }

    fn on_enqueue(&self, id: &MachineId, event_name: &str) {}

    fn on_dequeue(&self, id: &MachineId, state: &str, event_name: &str) {}

    fn on_raise(&self, id: &MachineId, state: &str, event_name: &str) {}

    /// A raised event is about to be handled.
    fn on_machine_event(&self, id: &MachineId, state: &str, event_name: &str) {}

    fn on_machine_state(&self, id: &MachineId, state: &str, is_entry: bool) {}

    fn on_machine_action(&self, id: &MachineId, state: &str, action: &str) {}

    fn on_monitor_state(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        is_entry: bool,
        temperature: Temperature,
    ) {
    }

    fn on_monitor_action(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        action: &str,
    ) {
    }

    fn on_monitor_event(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        event_name: &str,
    ) {
    }

    /// The machine blocked waiting for one of `event_types`.
    fn on_wait(&self, id: &MachineId, state: &str, event_types: &str) {}

    fn on_receive(
        &self,
        id: &MachineId,
        state: &str,
        event_name: &str,
        was_blocked: bool,
    ) {
    }

    /// The machine halted with `inbox_size` events left in its inbox.
    fn on_halt(&self, id: &MachineId, inbox_size: usize) {}

    /// A nondeterministic choice was made by `caller` (`None` for the runtime).
    fn on_random(&self, caller: Option<&MachineId>, result: &str) {}

    fn on_machine_exception_thrown(
        &self,
        id: &MachineId,
        state: &str,
        action: &str,
        error: &Error,
    ) {
    }

    fn on_machine_exception_handled(
        &self,
        id: &MachineId,
        state: &str,
        action: &str,
        error: &Error,
    ) {
    }

    fn on_error(&self, error: &Error) {}
}

/// Default logger. Forwards notifications to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl RuntimeLogger for TracingLogger {
    fn on_create_machine(&self, id: &MachineId, creator: Option<&MachineId>) {
        match creator {
            Some(creator) => debug!("Machine {} is created by {}.", id, creator),
            None => debug!("Machine {} is created.", id),
        }
    }

    fn on_create_monitor(&self, monitor_type: &str, id: &MachineId) {
        debug!("Monitor {} is created as {}.", monitor_type, id);
    }

    fn on_send(
        &self,
        target: &MachineId,
        sender: Option<&MachineId>,
        sender_state: Option<&str>,
        event_name: &str,
        operation_group_id: OperationGroupId,
        is_target_halted: bool,
    ) {
        let sender = sender
            .map(|id| format!("{} in state '{}'", id, sender_state.unwrap_or_default()))
            .unwrap_or_else(|| "runtime".to_owned());
        if is_target_halted {
            debug!(
                "{} sent event {} to halted machine {} (group {}).",
                sender, event_name, target, operation_group_id
            );
        } else {
            debug!(
                "{} sent event {} to {} (group {}).",
                sender, event_name, target, operation_group_id
            );
        }
    }

    fn on_enqueue(&self, id: &MachineId, event_name: &str) {
        debug!("Machine {} enqueued event {}.", id, event_name);
    }

    fn on_dequeue(&self, id: &MachineId, state: &str, event_name: &str) {
        debug!("Machine {} in state '{}' dequeued event {}.", id, state, event_name);
    }

    fn on_raise(&self, id: &MachineId, state: &str, event_name: &str) {
        debug!("Machine {} in state '{}' raised event {}.", id, state, event_name);
    }

    fn on_machine_event(&self, id: &MachineId, state: &str, event_name: &str) {
        debug!(
            "Machine {} in state '{}' handles raised event {}.",
            id, state, event_name
        );
    }

    fn on_machine_state(&self, id: &MachineId, state: &str, is_entry: bool) {
        if is_entry {
            debug!("Machine {} enters state '{}'.", id, state);
        } else {
            debug!("Machine {} exits state '{}'.", id, state);
        }
    }

    fn on_machine_action(&self, id: &MachineId, state: &str, action: &str) {
        debug!("Machine {} invoked action '{}' in state '{}'.", id, action, state);
    }

    fn on_monitor_state(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        is_entry: bool,
        temperature: Temperature,
    ) {
        let direction = if is_entry { "enters" } else { "exits" };
        debug!(
            "Monitor {} ({}) {} {} state '{}'.",
            monitor_type, id, direction, temperature, state
        );
    }

    fn on_monitor_action(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        action: &str,
    ) {
        debug!(
            "Monitor {} ({}) invoked action '{}' in state '{}'.",
            monitor_type, id, action, state
        );
    }

    fn on_monitor_event(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        event_name: &str,
    ) {
        debug!(
            "Monitor {} ({}) in state '{}' processes event {}.",
            monitor_type, id, state, event_name
        );
    }

    fn on_wait(&self, id: &MachineId, state: &str, event_types: &str) {
        debug!(
            "Machine {} in state '{}' is waiting for {}.",
            id, state, event_types
        );
    }

    fn on_receive(
        &self,
        id: &MachineId,
        state: &str,
        event_name: &str,
        was_blocked: bool,
    ) {
        if was_blocked {
            debug!(
                "Machine {} in state '{}' woke up with event {}.",
                id, state, event_name
            );
        } else {
            debug!("Machine {} in state '{}' received event {}.", id, state, event_name);
        }
    }

    fn on_halt(&self, id: &MachineId, inbox_size: usize) {
        debug!("Machine {} halted with {} events in its inbox.", id, inbox_size);
    }

    fn on_random(&self, caller: Option<&MachineId>, result: &str) {
        match caller {
            Some(id) => debug!("Machine {} nondeterministically chose {}.", id, result),
            None => debug!("Runtime nondeterministically chose {}.", result),
        }
    }

    fn on_machine_exception_thrown(
        &self,
        id: &MachineId,
        state: &str,
        action: &str,
        error: &Error,
    ) {
        error!(
            "Machine {} in state '{}' failed in action '{}': {}",
            id, state, action, error
        );
    }

    fn on_machine_exception_handled(
        &self,
        id: &MachineId,
        state: &str,
        action: &str,
        error: &Error,
    ) {
        debug!(
            "Machine {} in state '{}' handled error in action '{}': {}",
            id, state, action, error
        );
    }

    fn on_error(&self, error: &Error) {
        error!("Runtime failure: {}", error);
    }
}

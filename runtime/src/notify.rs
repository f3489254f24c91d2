// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Notifications
//!
//! Hooks called by state-machine engines at every step of a machine's life. They keep
//! [`MachineInfo`] up to date, forward to the [`RuntimeLogger`](crate::RuntimeLogger) and
//! publish failures and dropped events. State, action and raise notifications are only
//! reported when the configuration is verbose.
//!

use crate::{
    machine::MachineInfo, monitor::Temperature, scheduler, sink::RuntimeEvent, Envelope,
    Error, MachineId, Runtime,
};

use tracing::{debug, error};

use std::sync::atomic::Ordering;

impl Runtime {
    pub fn notify_entered_state(&self, info: &MachineInfo) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_machine_state(info.id(), &info.current_state_name(), true);
        }
    }

    pub fn notify_exited_state(&self, info: &MachineInfo) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_machine_state(info.id(), &info.current_state_name(), false);
        }
    }

    pub fn notify_invoked_action(&self, info: &MachineInfo, action: &str) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_machine_action(info.id(), &info.current_state_name(), action);
        }
    }

    pub fn notify_raised(&self, info: &MachineInfo, envelope: &Envelope) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_raise(info.id(), &info.current_state_name(), envelope.name());
        }
    }

    pub fn notify_handle_raised(&self, info: &MachineInfo, envelope: &Envelope) {
        if self.inner.configuration.is_verbose() {
            self.logger().on_machine_event(
                info.id(),
                &info.current_state_name(),
                envelope.name(),
            );
        }
    }

    pub fn notify_enqueued(&self, info: &MachineInfo, event_name: &str) {
        self.logger().on_enqueue(info.id(), event_name);
    }

    /// The machine took `envelope` from its inbox and now runs in its operation group.
    pub fn notify_dequeued(&self, info: &MachineInfo, envelope: &Envelope) {
        info.set_operation_group_id(envelope.operation_group_id());
        self.logger()
            .on_dequeue(info.id(), &info.current_state_name(), envelope.name());
    }

    /// The machine blocked in a receive. When called from a job launched by a waiting
    /// caller, that caller is released; jobs launched by anyone else are untouched.
    pub fn notify_wait(&self, info: &MachineInfo, event_types: &str) {
        info.set_waiting_to_receive(true);
        self.logger()
            .on_wait(info.id(), &info.current_state_name(), event_types);
        scheduler::release_rendezvous();
    }

    pub fn notify_received(&self, info: &MachineInfo, envelope: &Envelope, was_blocked: bool) {
        info.set_waiting_to_receive(false);
        info.set_operation_group_id(envelope.operation_group_id());
        self.logger().on_receive(
            info.id(),
            &info.current_state_name(),
            envelope.name(),
            was_blocked,
        );
    }

    /// The machine halted. It is unregistered and every envelope left in its inbox is
    /// dropped. A dropped `must_handle` envelope is a failure.
    pub fn notify_halted(&self, info: &MachineInfo, remaining: Vec<Envelope>) {
        self.logger().on_halt(info.id(), remaining.len());
        self.inner.machines.remove(info.id());
        for envelope in remaining {
            if envelope.must_handle() {
                self.raise_failure(Error::Assertion(format!(
                    "Machine {} halted before handling event {} marked as must handle.",
                    info.id(),
                    envelope.name()
                )));
            }
            self.notify_dropped(envelope, info.id());
        }
    }

    pub fn notify_exception_thrown(&self, info: &MachineInfo, action: &str, error: &Error) {
        self.logger().on_machine_exception_thrown(
            info.id(),
            &info.current_state_name(),
            action,
            error,
        );
    }

    pub fn notify_exception_handled(&self, info: &MachineInfo, action: &str, error: &Error) {
        self.logger().on_machine_exception_handled(
            info.id(),
            &info.current_state_name(),
            action,
            error,
        );
    }

    pub(crate) fn notify_monitor_created(&self, monitor_type: &str, id: &MachineId) {
        self.logger().on_create_monitor(monitor_type, id);
    }

    pub(crate) fn notify_monitor_state(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        is_entry: bool,
        temperature: Temperature,
    ) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_monitor_state(monitor_type, id, state, is_entry, temperature);
        }
    }

    pub(crate) fn notify_monitor_action(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        action: &str,
    ) {
        if self.inner.configuration.is_verbose() {
            self.logger()
                .on_monitor_action(monitor_type, id, state, action);
        }
    }

    pub(crate) fn notify_monitor_event(
        &self,
        monitor_type: &str,
        id: &MachineId,
        state: &str,
        event_name: &str,
    ) {
        self.logger()
            .on_monitor_event(monitor_type, id, state, event_name);
    }

    /// Publishes an envelope that reached no machine.
    pub fn notify_dropped(&self, envelope: Envelope, target: &MachineId) {
        debug!("Event {} sent to {} was dropped.", envelope.name(), target);
        self.publish(RuntimeEvent::EventDropped {
            envelope,
            target: target.clone(),
        });
    }

    /// Stops the runtime and publishes the failure.
    pub fn raise_failure(&self, failure: Error) {
        self.inner.is_running.store(false, Ordering::SeqCst);
        self.logger().on_error(&failure);
        if self.inner.break_on_failure.swap(false, Ordering::SeqCst) {
            break_on_failure(&failure);
        }
        self.publish(RuntimeEvent::Failure(failure));
    }

    fn publish(&self, event: RuntimeEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

/// Breakpoint target for `attach_debugger_on_failure`.
#[cold]
#[inline(never)]
fn break_on_failure(failure: &Error) {
    error!("Failure with debugger attached: {}", failure);
}

// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Specification monitors
//!
//! A monitor is a global, mailbox-less machine used for runtime verification. There is
//! exactly one instance per registered monitor type. Invocations run synchronously on the
//! caller and are serialized by a per-instance lock, so a monitor never observes two
//! events at once.
//!
//! Monitors track liveness with a [`Temperature`]: a monitor that stays `Hot` at the end
//! of an execution points at a liveness violation. The runtime reports temperatures and
//! never interprets them.
//!

use crate::{Envelope, Error, Event, MachineId, MachineType, OperationGroupId, Runtime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use std::{any::TypeId, sync::Arc};

/// Liveness marking of a monitor state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Temperature {
    /// Progress is pending.
    Hot,
    /// Progress was made.
    Cold,
    Neutral,
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Temperature::Hot => write!(f, "hot"),
            Temperature::Cold => write!(f, "cold"),
            Temperature::Neutral => write!(f, "neutral"),
        }
    }
}

/// Specification monitor.
#[allow(unused_variables)]
pub trait Monitor: Send + 'static {
    fn start_state(&self) -> &'static str {
        "Init"
    }

    fn start_temperature(&self) -> Temperature {
        Temperature::Neutral
    }

    /// Entry of the current state.
    fn on_entry(&mut self, ctx: &mut MonitorContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn handle(&mut self, ctx: &mut MonitorContext<'_>, envelope: &Envelope) -> Result<(), Error>;
}

/// Access to the monitor state from inside a monitor.
pub struct MonitorContext<'a> {
    runtime: &'a Runtime,
    id: &'a MachineId,
    state: String,
    temperature: Temperature,
    transition: Option<(String, Temperature)>,
    raised: Option<Envelope>,
}

impl<'a> MonitorContext<'a> {
    fn new(runtime: &'a Runtime, id: &'a MachineId, cell: &MonitorCell) -> Self {
        Self {
            runtime,
            id,
            state: cell.state.clone(),
            temperature: cell.temperature,
            transition: None,
            raised: None,
        }
    }

    pub fn id(&self) -> &MachineId {
        self.id
    }

    pub fn current_state(&self) -> &str {
        &self.state
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }

    /// Transitions to `state` with the given liveness once the current action completes.
    pub fn goto(&mut self, state: impl Into<String>, temperature: Temperature) {
        self.transition = Some((state.into(), temperature));
    }

    /// Raises an event handled by this monitor before the invocation returns.
    pub fn raise(&mut self, event: impl Event) -> Result<(), Error> {
        if self.raised.is_some() {
            return Err(Error::Assertion(format!(
                "Monitor {} raised an event while another raised event is pending.",
                self.id
            )));
        }
        self.raised = Some(Envelope::new(event, OperationGroupId::nil()));
        Ok(())
    }

    pub fn assert(&self, condition: bool, message: impl Into<String>) -> Result<(), Error> {
        self.runtime.assert(condition, message)
    }
}

struct MonitorCell {
    monitor: Box<dyn Monitor>,
    state: String,
    temperature: Temperature,
}

struct MonitorSlot {
    type_id: TypeId,
    monitor_type: MachineType,
    id: MachineId,
    cell: Mutex<MonitorCell>,
}

impl MonitorSlot {
    fn name(&self) -> &str {
        self.monitor_type.short_name()
    }

    fn start(&self, cell: &mut MonitorCell, runtime: &Runtime) -> Result<(), Error> {
        runtime.notify_monitor_state(self.name(), &self.id, &cell.state, true, cell.temperature);
        let mut ctx = MonitorContext::new(runtime, &self.id, cell);
        runtime.notify_monitor_action(self.name(), &self.id, &cell.state, "on_entry");
        cell.monitor.on_entry(&mut ctx)?;
        let raised = self.settle(cell, runtime, ctx.transition, ctx.raised)?;
        self.drain(cell, runtime, raised)
    }

    fn invoke(&self, cell: &mut MonitorCell, runtime: &Runtime, envelope: Envelope) -> Result<(), Error> {
        self.drain(cell, runtime, Some(envelope))
    }

    /// Handles the envelope and then every event raised while handling it.
    fn drain(
        &self,
        cell: &mut MonitorCell,
        runtime: &Runtime,
        mut next: Option<Envelope>,
    ) -> Result<(), Error> {
        while let Some(envelope) = next.take() {
            runtime.notify_monitor_event(self.name(), &self.id, &cell.state, envelope.name());
            runtime.notify_monitor_action(self.name(), &self.id, &cell.state, "handle");
            let mut ctx = MonitorContext::new(runtime, &self.id, cell);
            cell.monitor.handle(&mut ctx, &envelope)?;
            next = self.settle(cell, runtime, ctx.transition, ctx.raised)?;
        }
        Ok(())
    }

    /// Performs requested transitions and returns the pending raised event.
    fn settle(
        &self,
        cell: &mut MonitorCell,
        runtime: &Runtime,
        mut transition: Option<(String, Temperature)>,
        mut raised: Option<Envelope>,
    ) -> Result<Option<Envelope>, Error> {
        while let Some((state, temperature)) = transition.take() {
            runtime.notify_monitor_state(self.name(), &self.id, &cell.state, false, cell.temperature);
            cell.state = state;
            cell.temperature = temperature;
            runtime.notify_monitor_state(self.name(), &self.id, &cell.state, true, cell.temperature);

            let mut ctx = MonitorContext::new(runtime, &self.id, cell);
            runtime.notify_monitor_action(self.name(), &self.id, &cell.state, "on_entry");
            cell.monitor.on_entry(&mut ctx)?;
            transition = ctx.transition;
            if let Some(entry_raised) = ctx.raised {
                if raised.is_some() {
                    return Err(Error::Assertion(format!(
                        "Monitor {} raised two events in one step.",
                        self.id
                    )));
                }
                raised = Some(entry_raised);
            }
        }
        Ok(raised)
    }
}

/// Registered monitors. One instance per monitor type.
#[derive(Default)]
pub(crate) struct MonitorRegistry {
    monitors: Mutex<Vec<Arc<MonitorSlot>>>,
}

impl MonitorRegistry {
    /// Creates the instance and drives it to its start state. Returns `false` if the type
    /// was already registered.
    pub(crate) fn register<M: Monitor>(&self, runtime: &Runtime, monitor: M) -> Result<bool, Error> {
        let type_id = TypeId::of::<M>();
        let mut monitors = self.monitors.lock();
        if monitors.iter().any(|slot| slot.type_id == type_id) {
            debug!("Monitor {} is already registered.", std::any::type_name::<M>());
            return Ok(false);
        }

        let monitor_type = MachineType::of::<M>();
        let id = runtime.create_machine_id(&monitor_type, None);
        let cell = MonitorCell {
            state: monitor.start_state().to_owned(),
            temperature: monitor.start_temperature(),
            monitor: Box::new(monitor),
        };
        let slot = Arc::new(MonitorSlot {
            type_id,
            monitor_type,
            id,
            cell: Mutex::new(cell),
        });
        runtime.notify_monitor_created(slot.name(), &slot.id);
        {
            let mut cell = slot.cell.lock();
            slot.start(&mut cell, runtime)?;
        }
        monitors.push(slot);
        Ok(true)
    }

    fn slot(&self, type_id: TypeId) -> Option<Arc<MonitorSlot>> {
        self.monitors
            .lock()
            .iter()
            .find(|slot| slot.type_id == type_id)
            .cloned()
    }

    /// Runs the monitor under its instance lock. Unregistered types are ignored.
    pub(crate) fn invoke(&self, runtime: &Runtime, type_id: TypeId, envelope: Envelope) -> Result<(), Error> {
        let Some(slot) = self.slot(type_id) else {
            debug!("No monitor registered for event {}.", envelope.name());
            return Ok(());
        };
        let mut cell = slot.cell.lock();
        slot.invoke(&mut cell, runtime, envelope)
    }

    pub(crate) fn temperature(&self, type_id: TypeId) -> Option<Temperature> {
        self.slot(type_id).map(|slot| slot.cell.lock().temperature)
    }

    pub(crate) fn state(&self, type_id: TypeId) -> Option<String> {
        self.slot(type_id).map(|slot| slot.cell.lock().state.clone())
    }

    /// Names of the monitors currently in a hot state.
    pub(crate) fn hot(&self) -> Vec<String> {
        let slots: Vec<Arc<MonitorSlot>> = self.monitors.lock().clone();
        slots
            .iter()
            .filter(|slot| slot.cell.lock().temperature == Temperature::Hot)
            .map(|slot| slot.name().to_owned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.monitors.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.monitors.lock().clear();
    }
}

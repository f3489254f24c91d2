// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machines
//!
//! This module defines the two faces of a machine:
//!
//! - [`StateMachine`] is the collaborator interface the runtime schedules. The runtime
//!   only needs to bind a machine to its id, drive it to its start state, run its
//!   handler loop and enqueue envelopes into it. Any state-machine engine can be plugged
//!   in by implementing this trait and registering a constructor with
//!   [`Runtime::register_state_machine`].
//! - [`Machine`] is the application-facing trait of the flat engine shipped with the
//!   runtime ([`MachineHost`](crate::MachineHost)). A machine has a current state, an
//!   entry hook, one event handler and an exception hook; the [`MachineContext`] gives
//!   it access to the runtime (send, create, raise, receive, goto, halt, random choices,
//!   monitors and timers).
//!
//! # Examples
//!
//! ```ignore
//! use machina_runtime::*;
//!
//! #[derive(Debug)]
//! struct Ping;
//! impl Event for Ping {}
//!
//! #[derive(Default)]
//! struct Pinger { pings: u32 }
//!
//! #[async_trait]
//! impl Machine for Pinger {
//!     async fn handle(
//!         &mut self,
//!         ctx: &mut MachineContext,
//!         envelope: &Envelope,
//!     ) -> Result<(), Error> {
//!         if envelope.is::<Ping>() {
//!             self.pings += 1;
//!             ctx.goto("Pinged");
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!

use crate::{
    causality,
    inbox::{Inbox, Receipt, ReceiveFilter},
    monitor::Monitor,
    options::{CreateOptions, SendOptions},
    timer::{HaltTimer, InitTimer, TimeoutFlush, TimerElapsed, TimerId},
    Envelope, Error, Event, MachineId, MachineType, OperationGroupId, Runtime,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use std::{any::TypeId, panic::Location, sync::Arc, time::Duration};

/// Outcome of an enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueStatus {
    /// Queued behind a running handler.
    Queued,
    /// Queued into an idle machine. The caller must launch a handler-loop job.
    QueuedAndMustStartHandler,
    /// Handed to a machine blocked in receive.
    Received,
    /// The machine halted; the envelope was dropped.
    Dropped,
}

/// Outcome of a handler-loop run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerStatus {
    /// The inbox is drained.
    Idle,
    /// The machine halted.
    Halted,
}

/// Collaborator interface consumed by the scheduler.
///
/// Implementations are constructed from a [`MachineSeed`], which binds them to their
/// runtime and id. The schedule status (idle or handler running) lives inside the
/// implementation and is reported by [`enqueue`](StateMachine::enqueue).
#[async_trait]
pub trait StateMachine: Send + Sync + 'static {
    fn info(&self) -> &Arc<MachineInfo>;

    fn id(&self) -> &MachineId {
        self.info().id()
    }

    fn current_state_name(&self) -> String {
        self.info().current_state_name()
    }

    /// Enters the start state, handing it the creation event.
    async fn goto_start_state(&self, initial: Option<Envelope>) -> Result<(), Error>;

    /// Handles events until the inbox is drained or the machine halts.
    async fn run_event_handler(&self) -> Result<HandlerStatus, Error>;

    /// Places the envelope in the inbox and reports whether a handler must be launched.
    fn enqueue(&self, envelope: Envelope) -> EnqueueStatus;
}

/// Constructor registered for a machine type.
pub type MachineConstructor =
    Arc<dyn Fn(MachineSeed) -> Arc<dyn StateMachine> + Send + Sync>;

struct InfoState {
    operation_group_id: OperationGroupId,
    is_waiting_to_receive: bool,
    current_state_name: String,
    is_halted: bool,
}

/// Mutable metadata of a machine, shared between the machine and the scheduler.
pub struct MachineInfo {
    id: MachineId,
    state: Mutex<InfoState>,
}

impl MachineInfo {
    pub(crate) fn new(id: MachineId, operation_group_id: OperationGroupId) -> Self {
        Self {
            id,
            state: Mutex::new(InfoState {
                operation_group_id,
                is_waiting_to_receive: false,
                current_state_name: String::new(),
                is_halted: false,
            }),
        }
    }

    pub fn id(&self) -> &MachineId {
        &self.id
    }

    pub fn operation_group_id(&self) -> OperationGroupId {
        self.state.lock().operation_group_id
    }

    pub fn set_operation_group_id(&self, group: OperationGroupId) {
        self.state.lock().operation_group_id = group;
    }

    pub fn is_waiting_to_receive(&self) -> bool {
        self.state.lock().is_waiting_to_receive
    }

    pub(crate) fn set_waiting_to_receive(&self, waiting: bool) {
        self.state.lock().is_waiting_to_receive = waiting;
    }

    pub fn current_state_name(&self) -> String {
        self.state.lock().current_state_name.clone()
    }

    pub fn set_current_state_name(&self, name: impl Into<String>) {
        self.state.lock().current_state_name = name.into();
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().is_halted
    }

    pub fn set_halted(&self) {
        self.state.lock().is_halted = true;
    }
}

/// Everything a collaborator needs to bind itself to the runtime.
pub struct MachineSeed {
    runtime: Runtime,
    info: Arc<MachineInfo>,
}

impl MachineSeed {
    pub(crate) fn new(runtime: Runtime, info: Arc<MachineInfo>) -> Self {
        Self { runtime, info }
    }

    pub fn id(&self) -> &MachineId {
        self.info.id()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn info(&self) -> &Arc<MachineInfo> {
        &self.info
    }

    pub fn into_parts(self) -> (Runtime, Arc<MachineInfo>) {
        (self.runtime, self.info)
    }
}

/// What to do with an error returned by a machine action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// Let the error escape the handler loop. The runtime reports a failure.
    Throw,
    /// Drop the error and keep handling events.
    Handled,
    /// Drop the error and halt the machine.
    Halt,
}

/// Application-facing machine trait.
///
/// The runtime guarantees that at most one of these methods runs at any time for a
/// given machine, so implementations hold plain mutable state.
#[async_trait]
pub trait Machine: Send + 'static {
    /// Name of the start state.
    fn start_state(&self) -> &'static str {
        "Init"
    }

    /// Entry of the current state (`ctx.current_state()`). `trigger` is the creation
    /// event for the start state and the handled event after a transition.
    async fn on_entry(
        &mut self,
        ctx: &mut MachineContext,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        let _ = (ctx, trigger);
        Ok(())
    }

    /// Handles a dequeued or raised event.
    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error>;

    /// Decides what happens with an error returned by an action. Assertion failures are
    /// always fatal and never reach this hook.
    fn on_exception(&mut self, error: &Error) -> ExceptionOutcome {
        let _ = error;
        ExceptionOutcome::Throw
    }

    /// Called once when the machine halts.
    async fn on_halt(&mut self, ctx: &mut MachineContext) {
        let _ = ctx;
    }
}

/// Access to the runtime from inside a machine.
pub struct MachineContext {
    runtime: Runtime,
    info: Arc<MachineInfo>,
    inbox: Arc<Inbox>,
    raised: Option<Envelope>,
    transition: Option<String>,
    halt_requested: bool,
}

impl MachineContext {
    pub(crate) fn new(runtime: Runtime, info: Arc<MachineInfo>, inbox: Arc<Inbox>) -> Self {
        Self {
            runtime,
            info,
            inbox,
            raised: None,
            transition: None,
            halt_requested: false,
        }
    }

    pub fn id(&self) -> &MachineId {
        self.info.id()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn operation_group_id(&self) -> OperationGroupId {
        self.info.operation_group_id()
    }

    pub fn current_state(&self) -> String {
        self.info.current_state_name()
    }

    /// Transitions to `state` once the current action completes.
    pub fn goto(&mut self, state: impl Into<String>) {
        self.transition = Some(state.into());
    }

    /// Raises an event to this machine. It is handled right after the current action,
    /// before the next event of the inbox.
    pub fn raise(&mut self, event: impl Event) -> Result<(), Error> {
        if self.raised.is_some() {
            return Err(Error::Assertion(format!(
                "Machine {} raised an event while another raised event is pending.",
                self.id()
            )));
        }
        let envelope = Envelope::from_shared(
            Arc::new(event),
            causality::resolve(None, Some(&*self.info)),
            false,
            None,
        );
        self.runtime.notify_raised(&self.info, &envelope);
        self.raised = Some(envelope);
        Ok(())
    }

    /// Halts the machine once the current action completes.
    pub fn halt(&mut self) {
        self.halt_requested = true;
    }

    /// Sends an event. The operation group of this machine is inherited.
    pub fn send(&self, target: &MachineId, event: impl Event) {
        self.send_with(target, event, SendOptions::default());
    }

    pub fn send_with(&self, target: &MachineId, event: impl Event, options: SendOptions) {
        self.runtime
            .send_shared(target, Arc::new(event), options, Some(&*self.info));
    }

    /// Sends an event and waits for the target to handle it if it was idle.
    ///
    /// Returns `false` when the event was only queued behind a running handler.
    pub async fn send_and_execute(&self, target: &MachineId, event: impl Event) -> bool {
        self.send_and_execute_with(target, event, SendOptions::default())
            .await
    }

    pub async fn send_and_execute_with(
        &self,
        target: &MachineId,
        event: impl Event,
        options: SendOptions,
    ) -> bool {
        self.runtime
            .send_and_execute_shared(target, Arc::new(event), options, Some(&*self.info))
            .await
    }

    /// Creates a machine. The operation group of this machine is inherited.
    pub fn create_machine(
        &self,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        self.runtime
            .spawn_machine(machine_type, None, options, Some(&*self.info), false)
            .map(|(id, _)| id)
    }

    /// Creates a machine and waits until it is quiescent for the first time.
    pub async fn create_machine_and_execute(
        &self,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        let (id, quiescence) =
            self.runtime
                .spawn_machine(machine_type, None, options, Some(&*self.info), true)?;
        if let Some(quiescence) = quiescence {
            quiescence.wait().await;
        }
        Ok(id)
    }

    pub async fn remote_create_machine(
        &self,
        machine_type: &MachineType,
        endpoint: &str,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        self.runtime
            .remote_create_machine(machine_type, endpoint, options)
            .await
    }

    pub async fn remote_send(
        &self,
        target: &MachineId,
        event: impl Event,
        options: SendOptions,
    ) -> Result<(), Error> {
        self.runtime
            .remote_send_shared(target, Arc::new(event), options, Some(&*self.info))
            .await
    }

    /// Waits for an event of type `E`. Other events stay queued.
    pub async fn receive<E: Event>(&mut self) -> Result<Envelope, Error> {
        let description = crate::id::short_type_name(std::any::type_name::<E>()).to_owned();
        self.receive_matching(description, Box::new(|envelope: &Envelope| envelope.is::<E>()))
            .await
    }

    /// Waits for an event whose type is one of `event_types`.
    pub async fn receive_any(&mut self, event_types: &[TypeId]) -> Result<Envelope, Error> {
        let types = event_types.to_vec();
        let description = format!("{} event types", types.len());
        self.receive_matching(
            description,
            Box::new(move |envelope: &Envelope| types.contains(&envelope.event_type())),
        )
        .await
    }

    /// Waits for an event of type `E` accepted by `predicate`.
    pub async fn receive_where<E, F>(&mut self, predicate: F) -> Result<Envelope, Error>
    where
        E: Event,
        F: Fn(&E) -> bool + Send + 'static,
    {
        let description = crate::id::short_type_name(std::any::type_name::<E>()).to_owned();
        self.receive_matching(
            description,
            Box::new(move |envelope: &Envelope| envelope.downcast_ref::<E>().is_some_and(&predicate)),
        )
        .await
    }

    pub(crate) async fn receive_matching(
        &mut self,
        description: String,
        filter: ReceiveFilter,
    ) -> Result<Envelope, Error> {
        if self.raised.is_some() {
            return Err(Error::Assertion(format!(
                "Machine {} cannot receive while a raised event is pending.",
                self.id()
            )));
        }
        match self.inbox.receive(filter) {
            Receipt::Ready(envelope) => {
                self.runtime.notify_received(&self.info, &envelope, false);
                Ok(envelope)
            }
            Receipt::Pending(waiter) => {
                self.runtime.notify_wait(&self.info, &description);
                let envelope = waiter.await.map_err(|_| {
                    Error::Functional(format!(
                        "Machine {} was closed while waiting for {}.",
                        self.id(),
                        description
                    ))
                })?;
                self.runtime.notify_received(&self.info, &envelope, true);
                Ok(envelope)
            }
        }
    }

    /// A nondeterministic boolean.
    pub fn random(&self) -> bool {
        self.random_with(2)
    }

    /// True iff a draw in `[0, max_value)` is zero.
    pub fn random_with(&self, max_value: u32) -> bool {
        self.runtime.choose_boolean(Some(self.id()), max_value)
    }

    pub fn random_integer(&self, max_value: u32) -> u32 {
        self.runtime.choose_integer(Some(self.id()), max_value)
    }

    /// A fair coin toss identified by the call site.
    #[track_caller]
    pub fn fair_random(&self) -> bool {
        let location = Location::caller();
        let unique_id = format!(
            "{}:{}:{}:{}",
            self.id(),
            location.file(),
            location.line(),
            location.column()
        );
        self.runtime.choose_fair(Some(self.id()), &unique_id)
    }

    /// Invokes the monitor `M` with the event.
    pub fn monitor<M: Monitor>(&self, event: impl Event) -> Result<(), Error> {
        self.runtime.invoke_monitor::<M>(event)
    }

    pub fn assert(&self, condition: bool, message: impl Into<String>) -> Result<(), Error> {
        self.runtime.assert(condition, message)
    }

    /// Starts a timer that sends [`TimerElapsed`] to this machine after `period`, once or
    /// periodically. The timer runs as a machine of the runtime's timer machine type.
    pub fn start_timer(&self, period: Duration, periodic: bool) -> Result<TimerId, Error> {
        let timer_type = self.runtime.timer_machine_type();
        let init = InitTimer {
            owner: self.id().clone(),
            period,
            periodic,
        };
        let timer = self.create_machine(&timer_type, CreateOptions::new().with_event(init))?;
        Ok(TimerId::new(self.id().clone(), timer))
    }

    /// Stops a timer. With `flush`, waits for the timer to confirm and discards the
    /// elapsed events it sent before stopping.
    pub async fn stop_timer(&mut self, timer: &TimerId, flush: bool) -> Result<(), Error> {
        self.send(
            timer.timer_machine(),
            HaltTimer {
                owner: self.id().clone(),
                flush,
            },
        );
        if !flush {
            return Ok(());
        }
        loop {
            let expected = timer.clone();
            let envelope = self
                .receive_matching(
                    "TimeoutFlush".to_owned(),
                    Box::new(move |envelope: &Envelope| {
                        envelope
                            .downcast_ref::<TimerElapsed>()
                            .is_some_and(|elapsed| elapsed.timer == expected)
                            || envelope
                                .downcast_ref::<TimeoutFlush>()
                                .is_some_and(|flush| flush.timer == expected)
                    }),
                )
                .await?;
            if envelope.is::<TimeoutFlush>() {
                return Ok(());
            }
        }
    }

    pub(crate) fn take_raised(&mut self) -> Option<Envelope> {
        self.raised.take()
    }

    pub(crate) fn take_transition(&mut self) -> Option<String> {
        self.transition.take()
    }

    pub(crate) fn is_halt_requested(&self) -> bool {
        self.halt_requested
    }
}

// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machine host
//!
//! `MachineHost` adapts a [`Machine`] to the [`StateMachine`] collaborator interface. It
//! owns the inbox and runs the handler loop: raised events first, then the inbox in FIFO
//! order, until the inbox is drained or the machine halts.
//!

use crate::{
    event::Halt,
    inbox::Inbox,
    machine::{
        EnqueueStatus, ExceptionOutcome, HandlerStatus, Machine, MachineContext,
        MachineInfo, MachineSeed, StateMachine,
    },
    Envelope, Error, Runtime,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use std::sync::Arc;

struct Core<M> {
    machine: M,
    ctx: MachineContext,
}

/// Flat state-machine engine hosting a [`Machine`].
pub struct MachineHost<M: Machine> {
    runtime: Runtime,
    info: Arc<MachineInfo>,
    inbox: Arc<Inbox>,
    core: Mutex<Core<M>>,
}

impl<M: Machine> MachineHost<M> {
    /// Binds `machine` to the runtime and id of the seed.
    pub fn new(seed: MachineSeed, machine: M) -> Self {
        let (runtime, info) = seed.into_parts();
        let inbox = Arc::new(Inbox::new());
        info.set_current_state_name(machine.start_state());
        let ctx = MachineContext::new(runtime.clone(), info.clone(), inbox.clone());
        Self {
            runtime,
            info,
            inbox,
            core: Mutex::new(Core { machine, ctx }),
        }
    }

    async fn halt(&self, core: &mut Core<M>) {
        debug!("Halting machine {}.", self.info.id());
        self.info.set_halted();
        core.machine.on_halt(&mut core.ctx).await;
        let mut remaining = self.inbox.close();
        if let Some(raised) = core.ctx.take_raised() {
            remaining.insert(0, raised);
        }
        self.runtime.notify_halted(&self.info, remaining);
    }
}

impl<M: Machine> Core<M> {
    async fn enter(
        &mut self,
        runtime: &Runtime,
        info: &MachineInfo,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        runtime.notify_entered_state(info);
        runtime.notify_invoked_action(info, "on_entry");
        let result = self.machine.on_entry(&mut self.ctx, trigger).await;
        self.complete("on_entry", result, runtime, info)
    }

    async fn handle(
        &mut self,
        runtime: &Runtime,
        info: &MachineInfo,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        runtime.notify_invoked_action(info, "handle");
        let result = self.machine.handle(&mut self.ctx, envelope).await;
        self.complete("handle", result, runtime, info)?;
        self.settle(runtime, info, Some(envelope)).await
    }

    /// Performs the transitions requested by the last action, entry by entry.
    async fn settle(
        &mut self,
        runtime: &Runtime,
        info: &MachineInfo,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        while let Some(next) = self.ctx.take_transition() {
            if self.ctx.is_halt_requested() {
                break;
            }
            runtime.notify_exited_state(info);
            info.set_current_state_name(next);
            self.enter(runtime, info, trigger).await?;
        }
        Ok(())
    }

    /// Applies the exception policy of the machine to the result of an action.
    fn complete(
        &mut self,
        action: &str,
        result: Result<(), Error>,
        runtime: &Runtime,
        info: &MachineInfo,
    ) -> Result<(), Error> {
        let Err(error) = result else {
            return Ok(());
        };

        let outcome = if error.is_assertion() {
            ExceptionOutcome::Throw
        } else {
            self.machine.on_exception(&error)
        };

        match outcome {
            ExceptionOutcome::Throw => {
                runtime.notify_exception_thrown(info, action, &error);
                Err(match error {
                    Error::Assertion(_) | Error::Unhandled { .. } | Error::Panic { .. } => {
                        error
                    }
                    other => Error::Unhandled {
                        machine: info.id().clone(),
                        state: info.current_state_name(),
                        message: other.to_string(),
                    },
                })
            }
            ExceptionOutcome::Handled => {
                runtime.notify_exception_handled(info, action, &error);
                self.ctx.take_transition();
                self.ctx.take_raised();
                Ok(())
            }
            ExceptionOutcome::Halt => {
                runtime.notify_exception_handled(info, action, &error);
                self.ctx.take_transition();
                self.ctx.halt();
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<M: Machine> StateMachine for MachineHost<M> {
    fn info(&self) -> &Arc<MachineInfo> {
        &self.info
    }

    async fn goto_start_state(&self, initial: Option<Envelope>) -> Result<(), Error> {
        let mut core = self.core.lock().await;
        core.enter(&self.runtime, &self.info, initial.as_ref()).await?;
        core.settle(&self.runtime, &self.info, initial.as_ref())
            .await?;
        if core.ctx.is_halt_requested() {
            self.halt(&mut core).await;
        }
        Ok(())
    }

    async fn run_event_handler(&self) -> Result<HandlerStatus, Error> {
        // A previous job may still be releasing the lock after draining the inbox.
        let mut core = self.core.lock().await;
        loop {
            if self.info.is_halted() {
                return Ok(HandlerStatus::Halted);
            }

            let envelope = if let Some(raised) = core.ctx.take_raised() {
                self.runtime.notify_handle_raised(&self.info, &raised);
                raised
            } else if let Some(envelope) = self.inbox.dequeue() {
                self.runtime.notify_dequeued(&self.info, &envelope);
                envelope
            } else {
                return Ok(HandlerStatus::Idle);
            };

            if envelope.is::<Halt>() {
                self.halt(&mut core).await;
                return Ok(HandlerStatus::Halted);
            }

            core.handle(&self.runtime, &self.info, &envelope).await?;

            if core.ctx.is_halt_requested() {
                self.halt(&mut core).await;
                return Ok(HandlerStatus::Halted);
            }
        }
    }

    fn enqueue(&self, envelope: Envelope) -> EnqueueStatus {
        let name = envelope.name();
        let status = self.inbox.enqueue(envelope);
        if status != EnqueueStatus::Dropped {
            self.runtime.notify_enqueued(&self.info, name);
        }
        status
    }
}

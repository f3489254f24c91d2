// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Timers
//!
//! A timer is a machine that sends [`TimerElapsed`] events to the machine that owns it.
//! Machines start timers with [`MachineContext::start_timer`] and never name the timer
//! type themselves: the runtime creates a machine of its current timer machine type. In
//! production that is [`TimerMachine`], driven by the wall clock. In systematic mode it
//! is [`ControlledTimerMachine`], which fires when the nondeterminism source says so.
//!

use crate::{
    Envelope, Error, Event, Machine, MachineContext, MachineId, Runtime, SendOptions,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{sync::Arc, time::Duration};

/// Identity of a timer: its owner and the machine realizing it.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TimerId {
    owner: MachineId,
    timer: MachineId,
}

impl TimerId {
    pub(crate) fn new(owner: MachineId, timer: MachineId) -> Self {
        Self { owner, timer }
    }

    pub fn owner(&self) -> &MachineId {
        &self.owner
    }

    /// The machine realizing the timer.
    pub fn timer_machine(&self) -> &MachineId {
        &self.timer
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {}", self.timer, self.owner)
    }
}

/// Creation event of a timer machine.
#[derive(Clone, Debug)]
pub struct InitTimer {
    pub owner: MachineId,
    pub period: Duration,
    pub periodic: bool,
}

impl Event for InitTimer {}

/// Sent to the owner every time the timer fires.
#[derive(Clone, Debug)]
pub struct TimerElapsed {
    pub timer: TimerId,
}

impl Event for TimerElapsed {}

/// Stops a timer. With `flush`, the timer answers with [`TimeoutFlush`].
#[derive(Clone, Debug)]
pub struct HaltTimer {
    pub owner: MachineId,
    pub flush: bool,
}

impl Event for HaltTimer {}

/// Last event a flushed timer sends to its owner.
#[derive(Clone, Debug)]
pub struct TimeoutFlush {
    pub timer: TimerId,
}

impl Event for TimeoutFlush {}

fn init_timer(trigger: Option<&Envelope>) -> Result<InitTimer, Error> {
    trigger
        .and_then(|envelope| envelope.downcast_ref::<InitTimer>())
        .cloned()
        .ok_or_else(|| {
            Error::Assertion("Timer machine created without an InitTimer event.".to_owned())
        })
}

/// Stops the timer machine, confirming to the owner if asked to.
fn halt_timer(ctx: &mut MachineContext, timer: Option<&TimerId>, halt: &HaltTimer) {
    if halt.flush {
        let timer = timer
            .cloned()
            .unwrap_or_else(|| TimerId::new(halt.owner.clone(), ctx.id().clone()));
        ctx.send(&halt.owner, TimeoutFlush { timer });
    }
    ctx.halt();
}

/// Wall-clock timer.
///
/// The tick task and the halt handler share the `enabled` flag under a lock, so no
/// `TimerElapsed` is sent after the owner was told the timer stopped.
#[derive(Default)]
pub struct TimerMachine {
    timer: Option<TimerId>,
    enabled: Arc<Mutex<bool>>,
    token: Option<CancellationToken>,
}

impl TimerMachine {
    /// Sends one `TimerElapsed`. Returns `false` when the timer must stop ticking.
    fn fire(enabled: &Mutex<bool>, runtime: &Runtime, timer: &TimerId, periodic: bool) -> bool {
        let mut enabled = enabled.lock();
        if !*enabled {
            return false;
        }
        runtime.send_event(
            timer.owner(),
            TimerElapsed {
                timer: timer.clone(),
            },
            SendOptions::default(),
        );
        if !periodic {
            *enabled = false;
        }
        periodic
    }
}

#[async_trait]
impl Machine for TimerMachine {
    fn start_state(&self) -> &'static str {
        "Active"
    }

    async fn on_entry(
        &mut self,
        ctx: &mut MachineContext,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        if self.timer.is_some() {
            return Ok(());
        }
        let init = init_timer(trigger)?;
        let timer = TimerId::new(init.owner, ctx.id().clone());
        let period = init.period.max(Duration::from_millis(1));
        let periodic = init.periodic;
        let token = ctx.runtime().cancellation_token().child_token();
        *self.enabled.lock() = true;

        debug!("Timer {} started with period {:?}.", timer, period);
        let runtime = ctx.runtime().clone();
        let enabled = self.enabled.clone();
        let task_token = token.clone();
        let task_timer = timer.clone();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        if !Self::fire(&enabled, &runtime, &task_timer, periodic) {
                            break;
                        }
                    }
                }
            }
        });

        self.timer = Some(timer);
        self.token = Some(token);
        Ok(())
    }

    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if let Some(halt) = envelope.downcast_ref::<HaltTimer>() {
            *self.enabled.lock() = false;
            if let Some(token) = self.token.take() {
                token.cancel();
            }
            halt_timer(ctx, self.timer.as_ref(), halt);
        }
        Ok(())
    }

    async fn on_halt(&mut self, _ctx: &mut MachineContext) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

/// Self-addressed tick of the controlled timer.
#[derive(Clone, Copy, Debug)]
struct RepeatTimeout;

impl Event for RepeatTimeout {}

/// Timer driven by the nondeterminism source instead of the wall clock.
///
/// On every tick the timer asks the runtime for a random boolean and fires when it is
/// true. A one-shot timer stops ticking after it fired.
#[derive(Default)]
pub struct ControlledTimerMachine {
    timer: Option<TimerId>,
    periodic: bool,
    active: bool,
}

#[async_trait]
impl Machine for ControlledTimerMachine {
    fn start_state(&self) -> &'static str {
        "Active"
    }

    async fn on_entry(
        &mut self,
        ctx: &mut MachineContext,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        if self.timer.is_some() {
            return Ok(());
        }
        let init = init_timer(trigger)?;
        self.timer = Some(TimerId::new(init.owner, ctx.id().clone()));
        self.periodic = init.periodic;
        self.active = true;
        let id = ctx.id().clone();
        ctx.send(&id, RepeatTimeout);
        Ok(())
    }

    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if let Some(halt) = envelope.downcast_ref::<HaltTimer>() {
            self.active = false;
            halt_timer(ctx, self.timer.as_ref(), halt);
        } else if envelope.is::<RepeatTimeout>() && self.active {
            let Some(timer) = self.timer.clone() else {
                return Ok(());
            };
            if ctx.random() {
                ctx.send(timer.owner(), TimerElapsed { timer: timer.clone() });
                self.active = self.periodic;
            }
            if self.active {
                // Lets the owner run between ticks.
                tokio::task::yield_now().await;
                let id = ctx.id().clone();
                ctx.send(&id, RepeatTimeout);
            }
        }
        Ok(())
    }
}

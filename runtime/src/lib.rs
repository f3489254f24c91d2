// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Machina Runtime
//!
//! An asynchronous runtime for communicating state machines, built so that the same program
//! runs in production and under systematic testing. Machines exchange typed events, handle
//! them one at a time, and may block waiting for a specific event. Every source of
//! nondeterminism the runtime exposes (random choices, timers, the network) goes through a
//! pluggable seam that a test harness can control.
//!
//! ## Overview
//!
//! A machine is an isolated unit of state with a FIFO inbox. In response to an event, a
//! machine can:
//! - Update its private state and move to another named state
//! - Send events to other machines, or to itself
//! - Raise an event that it handles before anything else in its inbox
//! - Create other machines, locally or through the network provider
//! - Block until an event matching a predicate arrives
//! - Ask the runtime for a nondeterministic choice
//! - Invoke specification monitors and assert conditions
//! - Halt
//!
//! ## Core Architecture
//!
//! ### Scheduling
//!
//! Each machine is driven by at most one handler-loop job at a time. A job is launched only
//! when an enqueue finds the machine idle, and it runs until the inbox is drained, the
//! machine halts, or it blocks in a receive. Machines never share a job and never run
//! concurrently with themselves, so machine state needs no locking.
//!
//! ### Causality
//!
//! Every event carries an operation group. Unless a sender overrides it, the group flows
//! from the sender to the event and from the event to the machine that dequeues it, so a
//! whole chain of causally related events can be correlated.
//!
//! ### Failures
//!
//! An error or panic escaping a machine action stops that machine's job, stops the runtime
//! and is published as a [`RuntimeEvent::Failure`]. It never reaches the sender. Machines
//! can absorb non-assertion errors through [`Machine::on_exception`].
//!
//! ### Monitors
//!
//! Monitors are singleton observers invoked synchronously from machine code. They track
//! hot and cold states so a harness can detect liveness violations. Monitors only run in
//! systematic mode or when enabled for production.
//!
//! ## Getting Started
//!
//! ```ignore
//! use machina_runtime::*;
//!
//! #[derive(Debug)]
//! struct Ping;
//!
//! impl Event for Ping {}
//!
//! #[derive(Default)]
//! struct Server {
//!     pings: u32,
//! }
//!
//! #[async_trait]
//! impl Machine for Server {
//!     async fn handle(
//!         &mut self,
//!         ctx: &mut MachineContext,
//!         envelope: &Envelope,
//!     ) -> Result<(), Error> {
//!         if envelope.is::<Ping>() {
//!             self.pings += 1;
//!             if self.pings == 3 {
//!                 ctx.halt();
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let runtime = Runtime::new(Configuration::default());
//!     let server = runtime.register_machine::<Server>();
//!     let id = runtime.create_machine(&server, CreateOptions::new())?;
//!
//!     for _ in 0..3 {
//!         runtime.send_event(&id, Ping, SendOptions::default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Systematic Testing
//!
//! ```ignore
//! let runtime = Runtime::with_source(
//!     Configuration::systematic(7),
//!     RecordingRandom::new(SeededRandom::new(7)),
//! );
//! ```
//!
//! A systematic runtime uses a seeded nondeterminism source, the controlled timer machine
//! and always-on monitors. Recording the choices of a run and replaying them through
//! [`ScriptedRandom`] reproduces the run's decisions.
//!

mod causality;
mod config;
mod error;
mod event;
mod host;
mod id;
mod inbox;
mod logger;
mod machine;
mod monitor;
mod network;
mod notify;
mod options;
mod random;
mod registry;
mod runtime;
mod scheduler;
mod sink;
mod timer;

//
// Runtime
//

/// Entry point for creating machines, sending events and plugging seams.
///
/// See [`Configuration`] for the options that shape a runtime.
pub use runtime::Runtime;

/// Runtime options: mode, verbosity, monitors, seed and event buffer.
pub use config::Configuration;

/// Production or systematic execution.
pub use config::ExecutionMode;

/// Error type for every runtime operation and machine action.
pub use error::Error;

//
// Identity and Events
//

/// Identity of a machine, unique within its runtime.
pub use id::MachineId;

/// Name of a registered machine type.
pub use id::MachineType;

/// Trait implemented by every event exchanged between machines.
pub use event::Event;

/// An event with its delivery metadata.
pub use event::Envelope;

/// Event that halts the machine receiving it.
pub use event::Halt;

/// Causal correlation token carried by events and machines.
pub use causality::OperationGroupId;

/// Resolves the operation group of a new event or machine.
pub use causality::resolve as resolve_operation_group;

/// Options of a send.
pub use options::SendOptions;

/// Options of a machine creation.
pub use options::CreateOptions;

/// Opaque failure-domain tag carried by events.
pub use options::FailureDomain;

//
// Machines
//

/// Behavior of a machine hosted by the runtime's flat state-machine engine.
///
/// See [`MachineContext`] for what a machine can do while handling an event.
pub use machine::Machine;

/// Capabilities available to a machine during an action.
pub use machine::MachineContext;

/// Contract between the scheduler and a state-machine engine.
///
/// Implement it to plug an external engine in with [`Runtime::register_state_machine`].
pub use machine::StateMachine;

/// Shared metadata of a machine: state name, operation group and flags.
pub use machine::MachineInfo;

/// Runtime and identity handed to a machine constructor.
pub use machine::MachineSeed;

/// Constructor registered for a machine type.
pub use machine::MachineConstructor;

/// Outcome of an enqueue.
pub use machine::EnqueueStatus;

/// Outcome of a handler-loop job.
pub use machine::HandlerStatus;

/// What to do with an error escaping a machine action.
pub use machine::ExceptionOutcome;

/// Flat state-machine engine hosting a [`Machine`].
pub use host::MachineHost;

//
// Monitors
//

/// Singleton specification observer.
pub use monitor::Monitor;

/// Capabilities available to a monitor during an action.
pub use monitor::MonitorContext;

/// Liveness temperature of a monitor state.
pub use monitor::Temperature;

//
// Nondeterminism
//

/// Source of every nondeterministic choice made through the runtime.
pub use random::NondeterminismSource;

/// Entropy-backed source.
pub use random::ProductionRandom;

/// Deterministic source for a given seed.
pub use random::SeededRandom;

/// Source replaying a fixed sequence of choices.
pub use random::ScriptedRandom;

/// Source wrapper recording every choice.
pub use random::RecordingRandom;

/// A recorded choice.
pub use random::Choice;

//
// Network
//

/// Transport for remote creation and remote send.
pub use network::NetworkProvider;

/// Default provider. Serves the local endpoint only.
pub use network::LocalNetworkProvider;

/// Endpoint of the local provider.
pub use network::LOCAL_ENDPOINT;

//
// Observability
//

/// Consumer of runtime notifications.
pub use logger::RuntimeLogger;

/// Default logger. Forwards to `tracing`.
pub use logger::TracingLogger;

/// Failures and dropped events published by the runtime.
pub use sink::RuntimeEvent;

/// Connects the runtime event stream to a [`Subscriber`].
pub use sink::Sink;

/// Processes runtime events.
pub use sink::Subscriber;

//
// Timers
//

/// Identity of a timer.
pub use timer::TimerId;

/// Wall-clock timer machine.
pub use timer::TimerMachine;

/// Timer machine driven by the nondeterminism source.
pub use timer::ControlledTimerMachine;

/// Creation event of a timer machine.
pub use timer::InitTimer;

/// Sent to the owner when a timer fires.
pub use timer::TimerElapsed;

/// Stops a timer.
pub use timer::HaltTimer;

/// Last event of a flushed timer.
pub use timer::TimeoutFlush;

/// Re-export so machines can be implemented without a direct dependency.
pub use async_trait::async_trait;

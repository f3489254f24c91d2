// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Machina framework.
//! Provides a runtime for asynchronous, communicating state machines that runs the same
//! program in production and under systematic testing.

pub use machina_runtime::{
    async_trait, resolve_operation_group, Choice, Configuration,
    ControlledTimerMachine, CreateOptions, EnqueueStatus, Envelope, Error,
    Event, ExceptionOutcome, ExecutionMode, FailureDomain, Halt, HaltTimer,
    HandlerStatus, InitTimer, LocalNetworkProvider, Machine, MachineConstructor,
    MachineContext, MachineHost, MachineId, MachineInfo, MachineSeed,
    MachineType, Monitor, MonitorContext, NetworkProvider,
    NondeterminismSource, OperationGroupId, ProductionRandom, RecordingRandom,
    Runtime, RuntimeEvent, RuntimeLogger, ScriptedRandom, SeededRandom,
    SendOptions, Sink, StateMachine, Subscriber, Temperature, TimeoutFlush,
    TimerElapsed, TimerId, TimerMachine, TracingLogger, LOCAL_ENDPOINT,
};

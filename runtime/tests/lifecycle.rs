// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for machine lifecycle: creation errors, halting, dropped events and
// failure isolation.

use machina_runtime::{
    async_trait, Configuration, CreateOptions, Envelope, Error, Event, ExceptionOutcome,
    Halt, Machine, MachineContext, MachineType, Runtime, RuntimeEvent, SendOptions,
};

use tokio::sync::{broadcast, mpsc};

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
enum Fault {
    Error,
    Panic,
    Assertion,
    ReceiveWhileRaising,
}

#[derive(Debug)]
struct Crash(Fault);

impl Event for Crash {}

#[derive(Debug)]
struct Poke;

impl Event for Poke {}

#[derive(Debug)]
struct Pending;

impl Event for Pending {}

#[derive(Debug, PartialEq)]
enum Report {
    Poked,
    Halted,
}

struct Faulty {
    outcome: ExceptionOutcome,
    report: mpsc::UnboundedSender<Report>,
}

#[async_trait]
impl Machine for Faulty {
    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if let Some(Crash(fault)) = envelope.downcast_ref::<Crash>() {
            match fault {
                Fault::Error => return Err(Error::Functional("broken".to_owned())),
                Fault::Panic => panic!("boom"),
                Fault::Assertion => ctx.assert(false, "invariant")?,
                Fault::ReceiveWhileRaising => {
                    ctx.raise(Pending)?;
                    ctx.receive::<Poke>().await?;
                }
            }
        } else if envelope.is::<Poke>() {
            let _ = self.report.send(Report::Poked);
        }
        Ok(())
    }

    fn on_exception(&mut self, _error: &Error) -> ExceptionOutcome {
        self.outcome
    }

    async fn on_halt(&mut self, _ctx: &mut MachineContext) {
        let _ = self.report.send(Report::Halted);
    }
}

struct Fixture {
    runtime: Runtime,
    machine_type: MachineType,
    events: broadcast::Receiver<RuntimeEvent>,
    reports: mpsc::UnboundedReceiver<Report>,
}

fn fixture(outcome: ExceptionOutcome) -> Fixture {
    let runtime = Runtime::new(Configuration::default());
    let events = runtime.subscribe();
    let (sender, reports) = mpsc::unbounded_channel();
    let machine_type = runtime.register_machine_with(move || Faulty {
        outcome,
        report: sender.clone(),
    });
    Fixture {
        runtime,
        machine_type,
        events,
        reports,
    }
}

async fn next_event(events: &mut broadcast::Receiver<RuntimeEvent>) -> RuntimeEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_unhandled_error_is_published_and_stops_the_runtime() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        ..
    } = fixture(ExceptionOutcome::Throw);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    runtime.send_event(&id, Crash(Fault::Error), SendOptions::default());
    match next_event(&mut events).await {
        RuntimeEvent::Failure(Error::Unhandled {
            machine,
            state,
            message,
        }) => {
            assert_eq!(machine, id);
            assert_eq!(state, "Init");
            assert!(message.contains("broken"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!runtime.is_running());

    // A stopped runtime drops new events.
    runtime.send_event(&id, Poke, SendOptions::default());
    match next_event(&mut events).await {
        RuntimeEvent::EventDropped { envelope, target } => {
            assert!(envelope.is::<Poke>());
            assert_eq!(target, id);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        runtime.create_machine(&machine_type, CreateOptions::new()),
        Err(Error::Stopped)
    );
}

#[tokio::test]
async fn test_panic_is_caught_at_the_job_boundary() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        ..
    } = fixture(ExceptionOutcome::Throw);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    // The sender never observes the failure of the receiver.
    assert!(
        runtime
            .send_event_and_execute(&id, Crash(Fault::Panic), SendOptions::default())
            .await
    );
    match next_event(&mut events).await {
        RuntimeEvent::Failure(Error::Panic { machine, message }) => {
            assert_eq!(machine, id);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn test_handled_error_keeps_the_machine_running() {
    let Fixture {
        runtime,
        machine_type,
        mut reports,
        ..
    } = fixture(ExceptionOutcome::Handled);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    runtime.send_event(&id, Crash(Fault::Error), SendOptions::default());
    runtime.send_event(&id, Poke, SendOptions::default());
    assert_eq!(reports.recv().await, Some(Report::Poked));
    assert!(runtime.is_running());
    assert!(runtime.is_alive(&id));
}

#[tokio::test]
async fn test_halt_outcome_halts_the_machine() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        mut reports,
    } = fixture(ExceptionOutcome::Halt);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    runtime
        .send_event_and_execute(&id, Crash(Fault::Error), SendOptions::default())
        .await;
    assert_eq!(reports.recv().await, Some(Report::Halted));
    assert!(!runtime.is_alive(&id));
    assert!(runtime.is_running());

    runtime.send_event(&id, Poke, SendOptions::default());
    assert!(matches!(
        next_event(&mut events).await,
        RuntimeEvent::EventDropped { .. }
    ));
}

#[tokio::test]
async fn test_assertion_bypasses_the_exception_handler() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        ..
    } = fixture(ExceptionOutcome::Handled);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    runtime.send_event(&id, Crash(Fault::Assertion), SendOptions::default());
    assert_eq!(
        next_event(&mut events).await.into_failure(),
        Some(Error::Assertion("invariant".to_owned()))
    );
}

#[tokio::test]
async fn test_receive_with_a_pending_raise_is_an_assertion() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        ..
    } = fixture(ExceptionOutcome::Handled);
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    runtime.send_event(
        &id,
        Crash(Fault::ReceiveWhileRaising),
        SendOptions::default(),
    );
    match next_event(&mut events).await.into_failure() {
        Some(Error::Assertion(message)) => {
            assert!(message.contains("raised event is pending"))
        }
        other => panic!("unexpected failure {:?}", other),
    }
}

#[tokio::test]
async fn test_halt_event_unregisters_the_machine() {
    let Fixture {
        runtime,
        machine_type,
        mut events,
        mut reports,
    } = fixture(ExceptionOutcome::Throw);
    let id = runtime
        .create_machine_and_execute(&machine_type, CreateOptions::new())
        .await
        .unwrap();
    assert_eq!(runtime.machine_count(), 1);

    assert!(
        runtime
            .send_event_and_execute(&id, Halt, SendOptions::default())
            .await
    );
    assert_eq!(reports.recv().await, Some(Report::Halted));
    assert!(!runtime.is_alive(&id));
    assert_eq!(runtime.machine_count(), 0);

    // Sending to a halted machine is not an error.
    assert!(
        runtime
            .send_event_and_execute(&id, Poke, SendOptions::default())
            .await
    );
    assert!(matches!(
        next_event(&mut events).await,
        RuntimeEvent::EventDropped { .. }
    ));
    assert!(runtime.is_running());
}

#[tokio::test]
async fn test_creation_errors_are_returned_to_the_caller() {
    let Fixture {
        runtime,
        machine_type,
        ..
    } = fixture(ExceptionOutcome::Throw);

    assert_eq!(
        runtime.create_machine(&MachineType::new("Unknown"), CreateOptions::new()),
        Err(Error::UnsupportedMachineType("Unknown".to_owned()))
    );

    let reserved = runtime.create_machine_id(&machine_type, Some("worker"));
    assert_eq!(reserved.friendly_name(), Some("worker"));
    runtime
        .create_machine_and_execute_with_id(&reserved, &machine_type, CreateOptions::new())
        .await
        .unwrap();
    assert_eq!(
        runtime
            .create_machine_and_execute_with_id(&reserved, &machine_type, CreateOptions::new())
            .await,
        Err(Error::DuplicateIdentity(reserved.clone()))
    );
    assert_eq!(reserved.to_string(), format!("worker({})", reserved.value()));
}

#[tokio::test]
async fn test_dispose_releases_machines() {
    let Fixture {
        runtime,
        machine_type,
        ..
    } = fixture(ExceptionOutcome::Throw);
    for _ in 0..3 {
        runtime
            .create_machine_and_execute(&machine_type, CreateOptions::new())
            .await
            .unwrap();
    }
    assert_eq!(runtime.machine_count(), 3);

    runtime.dispose();
    assert!(!runtime.is_running());
    assert!(runtime.cancellation_token().is_cancelled());
    assert_eq!(runtime.machine_count(), 0);
}

trait FailureExt {
    fn into_failure(self) -> Option<Error>;
}

impl FailureExt for RuntimeEvent {
    fn into_failure(self) -> Option<Error> {
        match self {
            RuntimeEvent::Failure(error) => Some(error),
            RuntimeEvent::EventDropped { .. } => None,
        }
    }
}

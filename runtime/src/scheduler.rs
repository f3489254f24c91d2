// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Handler-loop jobs
//!
//! A job is the spawned unit of execution that runs one machine until it is quiescent:
//! a fresh job first enters the start state, then every job drains the inbox. The
//! scheduler launches a job only when an enqueue reports that the machine was idle, so
//! at most one job is active per machine.
//!
//! A caller that waits for a job (create-and-execute, send-and-execute) owns a rendezvous
//! created for that job alone. Only the job it launched releases it, either when the
//! machine blocks in receive or when the job ends. Fire-and-forget launches have none.
//!
//! The job boundary is the failure boundary. Errors and panics escaping a machine are
//! caught here and reported to the runtime, which stops and publishes a failure. They
//! never reach the sender, the creator or any other job.
//!

use crate::{
    machine::{HandlerStatus, StateMachine},
    Envelope, Error, Runtime,
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

tokio::task_local! {
    /// Rendezvous of the job running on the current task.
    static RENDEZVOUS: Rendezvous;
}

/// Released once by the job that owns it: when the machine blocks in receive or when the
/// job ends.
#[derive(Clone)]
struct Rendezvous(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl Rendezvous {
    fn release(&self) {
        if let Some(sender) = self.0.lock().take() {
            let _ = sender.send(());
        }
    }
}

/// Awaited by the caller that launched a job.
pub(crate) struct Quiescence(oneshot::Receiver<()>);

impl Quiescence {
    /// Waits for the launched job. Returns `false` if the job was dropped before it
    /// became quiescent.
    pub(crate) async fn wait(self) -> bool {
        self.0.await.is_ok()
    }
}

/// How a job starts.
pub(crate) enum Launch {
    /// A new machine. Enters the start state with the creation event first.
    Fresh(Option<Envelope>),
    /// An idle machine that received an event.
    Resume,
}

/// Spawns a handler-loop job for the machine.
pub(crate) fn launch(runtime: &Runtime, machine: Arc<dyn StateMachine>, launch: Launch) {
    spawn(runtime, machine, launch, None);
}

/// Spawns a handler-loop job and returns the rendezvous of that job.
pub(crate) fn launch_and_wait(
    runtime: &Runtime,
    machine: Arc<dyn StateMachine>,
    launch: Launch,
) -> Quiescence {
    let (sender, receiver) = oneshot::channel();
    spawn(
        runtime,
        machine,
        launch,
        Some(Rendezvous(Arc::new(Mutex::new(Some(sender))))),
    );
    Quiescence(receiver)
}

/// Releases the rendezvous of the job running on the current task, if any.
pub(crate) fn release_rendezvous() {
    let _ = RENDEZVOUS.try_with(Rendezvous::release);
}

fn spawn(
    runtime: &Runtime,
    machine: Arc<dyn StateMachine>,
    launch: Launch,
    rendezvous: Option<Rendezvous>,
) {
    let runtime = runtime.clone();
    tokio::spawn(async move {
        let id = machine.id().clone();
        let job = AssertUnwindSafe(run(&machine, launch)).catch_unwind();
        let result = match &rendezvous {
            Some(rendezvous) => RENDEZVOUS.scope(rendezvous.clone(), job).await,
            None => job.await,
        };
        match result {
            Ok(Ok(HandlerStatus::Idle)) => {
                debug!("Machine {} is idle.", id);
            }
            Ok(Ok(HandlerStatus::Halted)) => {
                debug!("Machine {} is halted.", id);
            }
            Ok(Err(error)) => runtime.raise_failure(error),
            Err(panic) => runtime.raise_failure(Error::Panic {
                machine: id,
                message: panic_message(&*panic),
            }),
        }
        if let Some(rendezvous) = rendezvous {
            rendezvous.release();
        }
    });
}

async fn run(
    machine: &Arc<dyn StateMachine>,
    launch: Launch,
) -> Result<HandlerStatus, Error> {
    if let Launch::Fresh(initial) = launch {
        machine.goto_start_state(initial).await?;
    }
    machine.run_event_handler().await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

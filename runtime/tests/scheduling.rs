// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for machine scheduling: exclusion, ordering, raise priority and
// rendezvous semantics of send-and-execute.

use machina_runtime::{
    async_trait, Configuration, CreateOptions, Envelope, Error, Event, Machine,
    MachineContext, MachineId, Runtime, SendOptions,
};

use tokio::sync::mpsc;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

// Numbered payload.
#[derive(Debug)]
struct Tick(u32);

impl Event for Tick {}

// Counts concurrent activations of the same machine.
struct Exclusive {
    active: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    handled: u32,
    expected: u32,
    done: mpsc::UnboundedSender<u32>,
}

#[async_trait]
impl Machine for Exclusive {
    async fn handle(
        &mut self,
        _ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if envelope.is::<Tick>() {
            if self.active.fetch_add(1, Ordering::SeqCst) != 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.handled += 1;
            if self.handled == self.expected {
                let _ = self.done.send(self.handled);
            }
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_machine_never_runs_concurrently_with_itself() {
    let runtime = Runtime::new(Configuration::default());
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let machine_type = {
        let active = active.clone();
        let overlaps = overlaps.clone();
        runtime.register_machine_with(move || Exclusive {
            active: active.clone(),
            overlaps: overlaps.clone(),
            handled: 0,
            expected: 400,
            done: sender.clone(),
        })
    };
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();

    let mut senders = Vec::new();
    for task in 0..4 {
        let runtime = runtime.clone();
        let id = id.clone();
        senders.push(tokio::spawn(async move {
            for value in 0..100 {
                runtime.send_event(&id, Tick(task * 100 + value), SendOptions::default());
                if value % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for sender in senders {
        sender.await.unwrap();
    }

    let handled = tokio::time::timeout(Duration::from_secs(10), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handled, 400);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(runtime.is_running());
}

// Records payloads in handling order.
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
    done: mpsc::UnboundedSender<()>,
}

#[derive(Debug)]
struct Start;

impl Event for Start {}

#[derive(Debug)]
struct Raised;

impl Event for Raised {}

#[derive(Debug)]
struct Later;

impl Event for Later {}

#[async_trait]
impl Machine for Recorder {
    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let entry = match envelope.downcast_ref::<Tick>() {
            Some(tick) => format!("Tick{}", tick.0),
            None => envelope.name().to_owned(),
        };
        self.seen.lock().unwrap().push(entry);
        if let Some(tick) = envelope.downcast_ref::<Tick>() {
            if tick.0 == 99 {
                let _ = self.done.send(());
            }
        } else if envelope.is::<Start>() {
            ctx.raise(Raised)?;
        } else if envelope.is::<Later>() {
            let _ = self.done.send(());
        }
        Ok(())
    }
}

fn recorder(runtime: &Runtime) -> (MachineId, Arc<Mutex<Vec<String>>>, mpsc::UnboundedReceiver<()>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (sender, receiver) = mpsc::unbounded_channel();
    let machine_type = {
        let seen = seen.clone();
        runtime.register_machine_with(move || Recorder {
            seen: seen.clone(),
            done: sender.clone(),
        })
    };
    let id = runtime
        .create_machine(&machine_type, CreateOptions::new())
        .unwrap();
    (id, seen, receiver)
}

#[tokio::test]
async fn test_events_from_one_sender_are_handled_in_order() {
    let runtime = Runtime::new(Configuration::default());
    let (id, seen, mut done) = recorder(&runtime);

    for value in 0..100 {
        runtime.send_event(&id, Tick(value), SendOptions::default());
    }
    done.recv().await.unwrap();

    let expected: Vec<String> = (0..100).map(|value| format!("Tick{}", value)).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_raised_event_is_handled_before_the_inbox() {
    let runtime = Runtime::new(Configuration::default());
    let (id, seen, mut done) = recorder(&runtime);

    runtime.send_event(&id, Start, SendOptions::default());
    runtime.send_event(&id, Later, SendOptions::default());
    done.recv().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["Start".to_owned(), "Raised".to_owned(), "Later".to_owned()]
    );
}

#[derive(Debug)]
struct Hello {
    client: MachineId,
}

impl Event for Hello {}

#[derive(Debug)]
struct Ping;

impl Event for Ping {}

#[derive(Debug)]
struct Pong;

impl Event for Pong {}

#[derive(Default)]
struct Server {
    client: Option<MachineId>,
}

#[async_trait]
impl Machine for Server {
    async fn on_entry(
        &mut self,
        _ctx: &mut MachineContext,
        trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        if let Some(hello) = trigger.and_then(|envelope| envelope.downcast_ref::<Hello>()) {
            self.client = Some(hello.client.clone());
        }
        Ok(())
    }

    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if envelope.is::<Ping>() {
            if let Some(client) = &self.client {
                ctx.send(client, Pong);
            }
        }
        Ok(())
    }
}

// Result of the client's exchange with the server.
#[derive(Debug, PartialEq)]
struct Exchange {
    ping_executed: bool,
    pong_received: bool,
    self_send_executed: bool,
}

struct Client {
    report: mpsc::UnboundedSender<Exchange>,
}

#[async_trait]
impl Machine for Client {
    async fn on_entry(
        &mut self,
        ctx: &mut MachineContext,
        _trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        let server_type = ctx.runtime().register_machine::<Server>();
        let server = ctx
            .create_machine_and_execute(
                &server_type,
                CreateOptions::new().with_event(Hello {
                    client: ctx.id().clone(),
                }),
            )
            .await?;

        let ping_executed = ctx.send_and_execute(&server, Ping).await;
        let pong = ctx.receive::<Pong>().await?;

        // This machine is running, so the event can only be queued.
        let me = ctx.id().clone();
        let self_send_executed = ctx.send_and_execute(&me, Start).await;

        let _ = self.report.send(Exchange {
            ping_executed,
            pong_received: pong.is::<Pong>(),
            self_send_executed,
        });
        Ok(())
    }

    async fn handle(
        &mut self,
        _ctx: &mut MachineContext,
        _envelope: &Envelope,
    ) -> Result<(), Error> {
        Ok(())
    }
}

#[tokio::test]
async fn test_send_and_execute_rendezvous() {
    let runtime = Runtime::new(Configuration::default());
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let client = runtime.register_machine_with(move || Client {
        report: sender.clone(),
    });
    runtime
        .create_machine_and_execute(&client, CreateOptions::new())
        .await
        .unwrap();

    let exchange = receiver.recv().await.unwrap();
    assert_eq!(
        exchange,
        Exchange {
            ping_executed: true,
            pong_received: true,
            self_send_executed: false,
        }
    );
    assert_eq!(runtime.machine_count(), 2);
}

#[derive(Debug)]
struct Go;

impl Event for Go {}

// Blocks in receive while handling Start.
struct Waiter {
    waiting: Arc<AtomicUsize>,
    done: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl Machine for Waiter {
    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        if envelope.is::<Start>() {
            self.waiting.store(1, Ordering::SeqCst);
            ctx.receive::<Go>().await?;
            self.waiting.store(2, Ordering::SeqCst);
            let _ = self.done.send(());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_send_and_execute_returns_when_target_blocks() {
    let runtime = Runtime::new(Configuration::default());
    let waiting = Arc::new(AtomicUsize::new(0));
    let (sender, mut done) = mpsc::unbounded_channel();
    let waiter = {
        let waiting = waiting.clone();
        runtime.register_machine_with(move || Waiter {
            waiting: waiting.clone(),
            done: sender.clone(),
        })
    };
    let id = runtime
        .create_machine_and_execute(&waiter, CreateOptions::new())
        .await
        .unwrap();

    assert!(
        runtime
            .send_event_and_execute(&id, Start, SendOptions::default())
            .await
    );
    assert_eq!(waiting.load(Ordering::SeqCst), 1);

    // Handed straight to the pending receive.
    assert!(
        !runtime
            .send_event_and_execute(&id, Go, SendOptions::default())
            .await
    );
    done.recv().await.unwrap();
    assert_eq!(waiting.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_create_and_execute_observes_creation_event() {
    let runtime = Runtime::new(Configuration::default());
    let server = runtime.register_machine::<Server>();
    let (id, _seen, mut done) = recorder(&runtime);

    let created = runtime
        .create_machine_and_execute(
            &server,
            CreateOptions::new().with_event(Hello { client: id.clone() }),
        )
        .await
        .unwrap();
    assert!(runtime.is_alive(&created));

    // The server kept the client from its creation event and answers it.
    assert!(
        runtime
            .send_event_and_execute(&created, Ping, SendOptions::default())
            .await
    );
    runtime.send_event(&id, Later, SendOptions::default());
    done.recv().await.unwrap();
}

#[derive(Debug)]
struct Pang;

impl Event for Pang {}

// Holds its handler open on Pang until the gate opens.
struct Gated {
    seen: Arc<Mutex<Vec<&'static str>>>,
    inside: mpsc::UnboundedSender<()>,
    gate: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl Machine for Gated {
    async fn handle(
        &mut self,
        _ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        self.seen.lock().unwrap().push(envelope.name());
        if envelope.is::<Pang>() {
            let _ = self.inside.send(());
            self.gate.notified().await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_event_sent_during_rendezvous_joins_the_running_job() {
    let runtime = Runtime::new(Configuration::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(tokio::sync::Notify::new());
    let (sender, mut inside) = mpsc::unbounded_channel();
    let machine_type = {
        let seen = seen.clone();
        let gate = gate.clone();
        runtime.register_machine_with(move || Gated {
            seen: seen.clone(),
            inside: sender.clone(),
            gate: gate.clone(),
        })
    };
    let id = runtime
        .create_machine_and_execute(&machine_type, CreateOptions::new())
        .await
        .unwrap();

    assert!(
        runtime
            .send_event_and_execute(&id, Ping, SendOptions::default())
            .await
    );

    let pang = {
        let runtime = runtime.clone();
        let id = id.clone();
        tokio::spawn(async move {
            runtime
                .send_event_and_execute(&id, Pang, SendOptions::default())
                .await
        })
    };
    inside.recv().await.unwrap();
    runtime.send_event(&id, Pong, SendOptions::default());
    gate.notify_one();

    // The Pang job drains Pong before it reports quiescence.
    assert!(pang.await.unwrap());
    assert_eq!(*seen.lock().unwrap(), vec!["Ping", "Pang", "Pong"]);
}

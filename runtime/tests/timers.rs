// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for wall-clock and controlled timers.

use machina_runtime::{
    async_trait, Configuration, ControlledTimerMachine, CreateOptions, Envelope, Error,
    Machine, MachineContext, MachineType, Runtime, ScriptedRandom, TimerElapsed, TimerId,
};

use tokio::sync::mpsc;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Debug, PartialEq)]
enum Report {
    Elapsed(usize),
    Stopped(usize),
}

// Starts a timer on entry and stops it with a flush after `stop_after` ticks.
struct Owner {
    period: Duration,
    periodic: bool,
    stop_after: usize,
    timer: Option<TimerId>,
    elapsed: Arc<AtomicUsize>,
    report: mpsc::UnboundedSender<Report>,
}

#[async_trait]
impl Machine for Owner {
    async fn on_entry(
        &mut self,
        ctx: &mut MachineContext,
        _trigger: Option<&Envelope>,
    ) -> Result<(), Error> {
        self.timer = Some(ctx.start_timer(self.period, self.periodic)?);
        Ok(())
    }

    async fn handle(
        &mut self,
        ctx: &mut MachineContext,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let Some(elapsed) = envelope.downcast_ref::<TimerElapsed>() else {
            return Ok(());
        };
        assert_eq!(Some(&elapsed.timer), self.timer.as_ref());
        assert_eq!(elapsed.timer.owner(), ctx.id());

        let count = self.elapsed.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.report.send(Report::Elapsed(count));
        if count == self.stop_after {
            if let Some(timer) = self.timer.take() {
                ctx.stop_timer(&timer, true).await?;
                let _ = self.report.send(Report::Stopped(count));
            }
        }
        Ok(())
    }
}

fn register_owner(
    runtime: &Runtime,
    period: Duration,
    periodic: bool,
    stop_after: usize,
) -> (MachineType, Arc<AtomicUsize>, mpsc::UnboundedReceiver<Report>) {
    let elapsed = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = mpsc::unbounded_channel();
    let machine_type = {
        let elapsed = elapsed.clone();
        runtime.register_machine_with(move || Owner {
            period,
            periodic,
            stop_after,
            timer: None,
            elapsed: elapsed.clone(),
            report: sender.clone(),
        })
    };
    (machine_type, elapsed, receiver)
}

#[tokio::test]
async fn test_periodic_timer_stops_after_flush() {
    let runtime = Runtime::new(Configuration::default());
    let (owner, elapsed, mut reports) =
        register_owner(&runtime, Duration::from_millis(10), true, 3);
    runtime
        .create_machine(&owner, CreateOptions::new())
        .unwrap();

    for count in 1..=3 {
        assert_eq!(reports.recv().await, Some(Report::Elapsed(count)));
    }
    assert_eq!(reports.recv().await, Some(Report::Stopped(3)));

    // Nothing is delivered once the flush completed.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(elapsed.load(Ordering::SeqCst), 3);
    assert_eq!(runtime.machine_count(), 1);
    assert!(runtime.is_running());
}

#[tokio::test]
async fn test_one_shot_timer_fires_once() {
    let runtime = Runtime::new(Configuration::default());
    let (owner, elapsed, mut reports) =
        register_owner(&runtime, Duration::from_millis(5), false, usize::MAX);
    runtime
        .create_machine(&owner, CreateOptions::new())
        .unwrap();

    assert_eq!(reports.recv().await, Some(Report::Elapsed(1)));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(elapsed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_controlled_timer_fires_when_the_source_says_so() {
    let runtime = Runtime::with_source(
        Configuration::systematic(0),
        ScriptedRandom::booleans([false, false, true]),
    );
    assert_eq!(
        runtime.timer_machine_type(),
        MachineType::of::<ControlledTimerMachine>()
    );
    let (owner, elapsed, mut reports) =
        register_owner(&runtime, Duration::from_secs(3600), false, usize::MAX);
    runtime
        .create_machine(&owner, CreateOptions::new())
        .unwrap();

    // The period is ignored: the third choice fires the timer.
    assert_eq!(reports.recv().await, Some(Report::Elapsed(1)));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(elapsed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_controlled_periodic_timer_flush() {
    let runtime = Runtime::new(Configuration::systematic(11));
    let (owner, elapsed, mut reports) =
        register_owner(&runtime, Duration::from_secs(3600), true, 2);
    runtime
        .create_machine(&owner, CreateOptions::new())
        .unwrap();

    assert_eq!(reports.recv().await, Some(Report::Elapsed(1)));
    assert_eq!(reports.recv().await, Some(Report::Elapsed(2)));
    assert_eq!(reports.recv().await, Some(Report::Stopped(2)));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(elapsed.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.machine_count(), 1);
}

// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime
//!
//! The `runtime` module provides the `Runtime` type. The runtime is responsible for
//! creating, addressing, scheduling and tearing down machines, and owns the seams that
//! make the same program run in production or under systematic testing: the
//! nondeterminism source, the network provider, the logger and the timer machine type.
//!

use crate::{
    causality,
    config::{Configuration, ExecutionMode},
    host::MachineHost,
    id::IdAllocator,
    logger::{RuntimeLogger, TracingLogger},
    machine::{
        EnqueueStatus, Machine, MachineConstructor, MachineInfo, MachineSeed,
        StateMachine,
    },
    monitor::{Monitor, MonitorRegistry, Temperature},
    network::{LocalNetworkProvider, NetworkProvider},
    random::{Choice, NondeterminismSource, ProductionRandom, SeededRandom},
    registry::{MachineCatalog, MachineRegistry},
    scheduler::{self, Launch, Quiescence},
    sink::{RuntimeEvent, Sink, Subscriber},
    timer::{ControlledTimerMachine, TimerMachine},
    CreateOptions, Envelope, Error, Event, MachineId, MachineType, OperationGroupId,
    SendOptions,
};

use parking_lot::{Mutex, RwLock};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{
    any::TypeId,
    panic::Location,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

static RUNTIME_TAGS: AtomicU64 = AtomicU64::new(1);

pub(crate) struct RuntimeInner {
    pub(crate) tag: u64,
    pub(crate) configuration: Configuration,
    pub(crate) ids: IdAllocator,
    pub(crate) is_running: AtomicBool,
    pub(crate) machines: MachineRegistry,
    pub(crate) catalog: MachineCatalog,
    pub(crate) monitors: MonitorRegistry,
    pub(crate) network: RwLock<Arc<dyn NetworkProvider>>,
    pub(crate) nondeterminism: Mutex<Box<dyn NondeterminismSource>>,
    pub(crate) logger: RwLock<Arc<dyn RuntimeLogger>>,
    pub(crate) timer_type: RwLock<MachineType>,
    pub(crate) events: broadcast::Sender<RuntimeEvent>,
    pub(crate) token: CancellationToken,
    pub(crate) break_on_failure: AtomicBool,
}

/// Runtime reference.
///
/// Cloning a `Runtime` is cheap: every clone shares the same machines, monitors and
/// seams. Machines hold a clone of the runtime until they halt, so a runtime with live
/// machines stays alive until [`dispose`](Runtime::dispose) is called.
///
/// # Examples
///
/// ```ignore
/// use machina_runtime::*;
///
/// let runtime = Runtime::new(Configuration::default());
/// let server = runtime.register_machine::<Server>();
/// let id = runtime.create_machine(&server, CreateOptions::new())?;
/// let handled = runtime
///     .send_event_and_execute(&id, Request, SendOptions::default())
///     .await;
/// ```
///
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Creates a runtime.
    ///
    /// Systematic mode uses a [`SeededRandom`] source (seed `0` when unset) and the
    /// controlled timer. Production mode uses entropy unless a seed is configured.
    pub fn new(configuration: Configuration) -> Self {
        let source: Box<dyn NondeterminismSource> =
            match (configuration.mode, configuration.random_seed) {
                (ExecutionMode::Systematic, seed) => {
                    Box::new(SeededRandom::new(seed.unwrap_or_default()))
                }
                (ExecutionMode::Production, Some(seed)) => Box::new(SeededRandom::new(seed)),
                (ExecutionMode::Production, None) => Box::new(ProductionRandom::new()),
            };
        Self::build(configuration, source)
    }

    /// Creates a runtime that draws every choice from `source`.
    pub fn with_source(
        configuration: Configuration,
        source: impl NondeterminismSource + 'static,
    ) -> Self {
        Self::build(configuration, Box::new(source))
    }

    fn build(configuration: Configuration, source: Box<dyn NondeterminismSource>) -> Self {
        let tag = RUNTIME_TAGS.fetch_add(1, Ordering::SeqCst);
        let timer_type = match configuration.mode {
            ExecutionMode::Production => MachineType::of::<TimerMachine>(),
            ExecutionMode::Systematic => MachineType::of::<ControlledTimerMachine>(),
        };
        let (events, _) = broadcast::channel(configuration.event_buffer.max(1));
        let break_on_failure = configuration.attach_debugger_on_failure;

        let inner = Arc::new_cyclic(|weak: &Weak<RuntimeInner>| RuntimeInner {
            tag,
            configuration,
            ids: IdAllocator::new(tag),
            is_running: AtomicBool::new(true),
            machines: MachineRegistry::default(),
            catalog: MachineCatalog::default(),
            monitors: MonitorRegistry::default(),
            network: RwLock::new(Arc::new(LocalNetworkProvider::from_weak(weak.clone()))),
            nondeterminism: Mutex::new(source),
            logger: RwLock::new(Arc::new(TracingLogger)),
            timer_type: RwLock::new(timer_type),
            events,
            token: CancellationToken::new(),
            break_on_failure: AtomicBool::new(break_on_failure),
        });

        let runtime = Self { inner };
        runtime.register_machine::<TimerMachine>();
        runtime.register_machine::<ControlledTimerMachine>();
        debug!("Runtime {} is created.", tag);
        runtime
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    /// Tag of this runtime. Every id it mints carries it.
    pub fn tag(&self) -> u64 {
        self.inner.tag
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    /// Token cancelled when the runtime is disposed.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Registers `M`, built with `M::default()`.
    pub fn register_machine<M: Machine + Default>(&self) -> MachineType {
        self.register_machine_with(M::default)
    }

    /// Registers `M`, built with `factory`.
    pub fn register_machine_with<M, F>(&self, factory: F) -> MachineType
    where
        M: Machine,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let machine_type = MachineType::of::<M>();
        let constructor: MachineConstructor = Arc::new(move |seed: MachineSeed| {
            Arc::new(MachineHost::new(seed, factory())) as Arc<dyn StateMachine>
        });
        self.inner.catalog.register(machine_type.clone(), constructor);
        machine_type
    }

    /// Registers a machine type realized by an external state-machine engine.
    pub fn register_state_machine<F>(&self, machine_type: MachineType, constructor: F)
    where
        F: Fn(MachineSeed) -> Arc<dyn StateMachine> + Send + Sync + 'static,
    {
        self.inner.catalog.register(machine_type, Arc::new(constructor));
    }

    pub fn is_registered(&self, machine_type: &MachineType) -> bool {
        self.inner.catalog.contains(machine_type)
    }

    /// Reserves an unbound id. Never blocks, never fails.
    pub fn create_machine_id(
        &self,
        machine_type: &MachineType,
        friendly_name: Option<&str>,
    ) -> MachineId {
        self.inner
            .ids
            .next(machine_type.clone(), friendly_name.map(str::to_owned))
    }

    /// Creates a machine. Returns once the machine is registered; its start state and
    /// creation event run in a spawned job.
    ///
    /// # Errors
    ///
    /// `UnsupportedMachineType` if the type is not registered, `Stopped` if the runtime
    /// is no longer running.
    ///
    pub fn create_machine(
        &self,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        self.spawn_machine(machine_type, None, options, None, false)
            .map(|(id, _)| id)
    }

    /// Creates a machine and waits until it is quiescent for the first time, so the
    /// caller observes the effects of the creation event.
    pub async fn create_machine_and_execute(
        &self,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        let (id, quiescence) = self.spawn_machine(machine_type, None, options, None, true)?;
        if let Some(quiescence) = quiescence {
            quiescence.wait().await;
        }
        Ok(id)
    }

    /// Creates a machine bound to a reserved id.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`create_machine`](Runtime::create_machine):
    /// `ForeignIdentity` if the id was minted by another runtime, `MachineTypeMismatch`
    /// if it was reserved for another type and `DuplicateIdentity` if it is already bound.
    ///
    pub fn create_machine_with_id(
        &self,
        id: &MachineId,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<(), Error> {
        self.spawn_machine(machine_type, Some(id.clone()), options, None, false)
            .map(|_| ())
    }

    pub async fn create_machine_and_execute_with_id(
        &self,
        id: &MachineId,
        machine_type: &MachineType,
        options: CreateOptions,
    ) -> Result<(), Error> {
        let (_, quiescence) =
            self.spawn_machine(machine_type, Some(id.clone()), options, None, true)?;
        if let Some(quiescence) = quiescence {
            quiescence.wait().await;
        }
        Ok(())
    }

    pub(crate) fn spawn_machine(
        &self,
        machine_type: &MachineType,
        id: Option<MachineId>,
        options: CreateOptions,
        creator: Option<&MachineInfo>,
        wait: bool,
    ) -> Result<(MachineId, Option<Quiescence>), Error> {
        if !self.is_running() {
            return Err(Error::Stopped);
        }
        let constructor = self.inner.catalog.constructor(machine_type)?;
        let id = match id {
            Some(id) => {
                self.check_reserved(&id, machine_type)?;
                id
            }
            None => self
                .inner
                .ids
                .next(machine_type.clone(), options.friendly_name.clone()),
        };

        let group = causality::resolve(options.operation_group_id, creator);
        let info = Arc::new(MachineInfo::new(id.clone(), group));
        let machine = constructor(MachineSeed::new(self.clone(), info));
        self.inner.machines.register(id.clone(), machine.clone())?;
        self.logger()
            .on_create_machine(&id, creator.map(|info| info.id()));

        let initial = options.event.map(|event| {
            Envelope::from_shared(event, group, false, options.failure_domain.clone())
        });
        let launch = Launch::Fresh(initial);
        if wait {
            let quiescence = scheduler::launch_and_wait(self, machine, launch);
            Ok((id, Some(quiescence)))
        } else {
            scheduler::launch(self, machine, launch);
            Ok((id, None))
        }
    }

    fn check_reserved(&self, id: &MachineId, machine_type: &MachineType) -> Result<(), Error> {
        if id.runtime() != self.inner.ids.runtime() {
            return Err(Error::ForeignIdentity(id.clone()));
        }
        if id.machine_type() != machine_type {
            return Err(Error::MachineTypeMismatch {
                id: id.clone(),
                expected: machine_type.to_string(),
            });
        }
        Ok(())
    }

    /// Sends an event. Sending to a halted or unknown machine is not an error: the event
    /// is dropped and published as [`RuntimeEvent::EventDropped`].
    pub fn send_event(&self, target: &MachineId, event: impl Event, options: SendOptions) {
        self.send_shared(target, Arc::new(event), options, None);
    }

    /// Sends an event and waits for the target if it was idle.
    ///
    /// # Returns
    ///
    /// `true` if the target was idle and the call awaited the job it launched until that
    /// job drained the inbox, halted, failed or blocked in receive (or the event was
    /// dropped); `false` if the event was only queued behind a running handler.
    ///
    pub async fn send_event_and_execute(
        &self,
        target: &MachineId,
        event: impl Event,
        options: SendOptions,
    ) -> bool {
        self.send_and_execute_shared(target, Arc::new(event), options, None)
            .await
    }

    pub(crate) fn send_shared(
        &self,
        target: &MachineId,
        event: Arc<dyn Event>,
        options: SendOptions,
        sender: Option<&MachineInfo>,
    ) {
        let envelope = Self::wrap(event, options, sender);
        self.deliver(target, envelope, sender);
    }

    pub(crate) async fn send_and_execute_shared(
        &self,
        target: &MachineId,
        event: Arc<dyn Event>,
        options: SendOptions,
        sender: Option<&MachineInfo>,
    ) -> bool {
        let envelope = Self::wrap(event, options, sender);
        match self.enqueue(target, envelope, sender) {
            Some((machine, EnqueueStatus::QueuedAndMustStartHandler)) => {
                scheduler::launch_and_wait(self, machine, Launch::Resume)
                    .wait()
                    .await
            }
            Some((_, EnqueueStatus::Queued | EnqueueStatus::Received)) => false,
            Some((_, EnqueueStatus::Dropped)) | None => true,
        }
    }

    /// Enqueues an envelope and launches a job if the target was idle.
    pub(crate) fn deliver(
        &self,
        target: &MachineId,
        envelope: Envelope,
        sender: Option<&MachineInfo>,
    ) {
        if let Some((machine, EnqueueStatus::QueuedAndMustStartHandler)) =
            self.enqueue(target, envelope, sender)
        {
            scheduler::launch(self, machine, Launch::Resume);
        }
    }

    fn wrap(
        event: Arc<dyn Event>,
        options: SendOptions,
        sender: Option<&MachineInfo>,
    ) -> Envelope {
        Envelope::from_shared(
            event,
            causality::resolve(options.operation_group_id, sender),
            options.must_handle,
            options.failure_domain,
        )
    }

    fn enqueue(
        &self,
        target: &MachineId,
        envelope: Envelope,
        sender: Option<&MachineInfo>,
    ) -> Option<(Arc<dyn StateMachine>, EnqueueStatus)> {
        let machine = if self.is_running() {
            self.inner.machines.lookup(target)
        } else {
            None
        };

        let sender_state = sender.map(|info| info.current_state_name());
        self.logger().on_send(
            target,
            sender.map(|info| info.id()),
            sender_state.as_deref(),
            envelope.name(),
            envelope.operation_group_id(),
            machine.is_none(),
        );

        let Some(machine) = machine else {
            self.notify_dropped(envelope, target);
            return None;
        };
        let status = machine.enqueue(envelope.clone());
        if status == EnqueueStatus::Dropped {
            self.notify_dropped(envelope, target);
        }
        Some((machine, status))
    }

    /// Creates a machine on a remote endpoint through the network provider.
    pub async fn remote_create_machine(
        &self,
        machine_type: &MachineType,
        endpoint: &str,
        options: CreateOptions,
    ) -> Result<MachineId, Error> {
        if !self.is_registered(machine_type) {
            return Err(Error::UnsupportedMachineType(machine_type.to_string()));
        }
        let provider = self.network_provider();
        provider
            .remote_create_machine(machine_type, options.friendly_name, endpoint, options.event)
            .await
    }

    /// Sends an event to a remote machine through the network provider.
    pub async fn remote_send_event(
        &self,
        target: &MachineId,
        event: impl Event,
        options: SendOptions,
    ) -> Result<(), Error> {
        self.remote_send_shared(target, Arc::new(event), options, None)
            .await
    }

    pub(crate) async fn remote_send_shared(
        &self,
        target: &MachineId,
        event: Arc<dyn Event>,
        options: SendOptions,
        sender: Option<&MachineInfo>,
    ) -> Result<(), Error> {
        if !self.is_registered(target.machine_type()) {
            return Err(Error::UnsupportedMachineType(
                target.machine_type().to_string(),
            ));
        }
        let envelope = Self::wrap(event, options, sender);
        let provider = self.network_provider();
        provider.remote_send(target, envelope).await
    }

    /// Registers the monitor `M`. A no-op when monitors are disabled; idempotent per type.
    pub fn register_monitor<M: Monitor + Default>(&self) -> Result<(), Error> {
        self.register_monitor_instance(M::default())
    }

    /// Registers a prepared monitor instance.
    pub fn register_monitor_instance<M: Monitor>(&self, monitor: M) -> Result<(), Error> {
        if !self.inner.configuration.monitors_enabled() {
            debug!("Monitors are disabled, {} is ignored.", std::any::type_name::<M>());
            return Ok(());
        }
        self.inner.monitors.register(self, monitor).map(|_| ())
    }

    /// Invokes the monitor `M` synchronously. Concurrent invocations are serialized.
    pub fn invoke_monitor<M: Monitor>(&self, event: impl Event) -> Result<(), Error> {
        if !self.inner.configuration.monitors_enabled() {
            return Ok(());
        }
        let envelope = Envelope::new(event, OperationGroupId::nil());
        self.inner
            .monitors
            .invoke(self, TypeId::of::<M>(), envelope)
    }

    pub fn monitor_temperature<M: Monitor>(&self) -> Option<Temperature> {
        self.inner.monitors.temperature(TypeId::of::<M>())
    }

    pub fn monitor_state<M: Monitor>(&self) -> Option<String> {
        self.inner.monitors.state(TypeId::of::<M>())
    }

    /// Names of the monitors in a hot state.
    pub fn hot_monitors(&self) -> Vec<String> {
        self.inner.monitors.hot()
    }

    pub fn monitor_count(&self) -> usize {
        self.inner.monitors.len()
    }

    /// A nondeterministic boolean.
    pub fn random(&self) -> bool {
        self.choose_boolean(None, 2)
    }

    /// True iff a draw in `[0, max_value)` is zero.
    pub fn random_with(&self, max_value: u32) -> bool {
        self.choose_boolean(None, max_value)
    }

    /// A nondeterministic integer in `[0, max_value)`.
    pub fn random_integer(&self, max_value: u32) -> u32 {
        self.choose_integer(None, max_value)
    }

    /// A fair coin toss identified by the call site.
    #[track_caller]
    pub fn fair_random(&self) -> bool {
        let location = Location::caller();
        let unique_id = format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
        self.choose_fair(None, &unique_id)
    }

    pub(crate) fn choose_boolean(&self, caller: Option<&MachineId>, max_value: u32) -> bool {
        let value = self.inner.nondeterminism.lock().boolean(max_value);
        self.logger()
            .on_random(caller, &Choice::Boolean(value).to_string());
        value
    }

    pub(crate) fn choose_fair(&self, caller: Option<&MachineId>, unique_id: &str) -> bool {
        let value = self.inner.nondeterminism.lock().fair_boolean(unique_id);
        self.logger()
            .on_random(caller, &Choice::Boolean(value).to_string());
        value
    }

    pub(crate) fn choose_integer(&self, caller: Option<&MachineId>, max_value: u32) -> u32 {
        let value = self.inner.nondeterminism.lock().integer(max_value);
        self.logger()
            .on_random(caller, &Choice::Integer(value).to_string());
        value
    }

    /// Replaces the nondeterminism source.
    pub fn set_nondeterminism_source(&self, source: impl NondeterminismSource + 'static) {
        *self.inner.nondeterminism.lock() = Box::new(source);
    }

    /// Operation group of a machine, or the empty group if it is not alive.
    pub fn current_operation_group_id(&self, id: &MachineId) -> OperationGroupId {
        self.inner
            .machines
            .lookup(id)
            .map(|machine| machine.info().operation_group_id())
            .unwrap_or_default()
    }

    /// Stops the runtime. Running jobs complete; new sends are dropped and new creations
    /// fail with `Stopped`.
    pub fn stop(&self) {
        if self.inner.is_running.swap(false, Ordering::SeqCst) {
            debug!("Runtime {} is stopped.", self.inner.tag);
        }
    }

    /// Stops the runtime and releases its machines, monitors, timers and network provider.
    pub fn dispose(&self) {
        self.stop();
        self.inner.token.cancel();
        self.inner.monitors.clear();
        self.network_provider().dispose();
        self.inner.machines.clear();
        debug!("Runtime {} is disposed.", self.inner.tag);
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    pub fn set_logger(&self, logger: Arc<dyn RuntimeLogger>) {
        *self.inner.logger.write() = logger;
    }

    /// Restores the default `tracing` logger.
    pub fn remove_logger(&self) {
        *self.inner.logger.write() = Arc::new(TracingLogger);
    }

    pub(crate) fn logger(&self) -> Arc<dyn RuntimeLogger> {
        self.inner.logger.read().clone()
    }

    /// Replaces the network provider. The previous provider is disposed.
    pub fn set_network_provider(&self, provider: Arc<dyn NetworkProvider>) {
        let previous = std::mem::replace(&mut *self.inner.network.write(), provider);
        previous.dispose();
    }

    /// Restores the local provider.
    pub fn remove_network_provider(&self) {
        self.set_network_provider(Arc::new(LocalNetworkProvider::new(self)));
    }

    pub fn network_provider(&self) -> Arc<dyn NetworkProvider> {
        self.inner.network.read().clone()
    }

    pub fn local_endpoint(&self) -> String {
        self.network_provider().local_endpoint()
    }

    /// Machine type used to realize timers.
    pub fn timer_machine_type(&self) -> MachineType {
        self.inner.timer_type.read().clone()
    }

    /// Overrides the timer machine type. The type must be registered.
    pub fn set_timer_machine_type(&self, machine_type: MachineType) -> Result<(), Error> {
        if !self.is_registered(&machine_type) {
            return Err(Error::UnsupportedMachineType(machine_type.to_string()));
        }
        *self.inner.timer_type.write() = machine_type;
        Ok(())
    }

    /// Subscribes to failures and dropped events.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    /// Runs a sink for `subscriber` until the runtime is disposed.
    pub fn run_sink(&self, subscriber: impl Subscriber) -> JoinHandle<()> {
        let mut sink = Sink::new(self.subscribe(), subscriber);
        let token = self.inner.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sink.run() => {}
            }
        })
    }

    /// Returns an assertion failure when `condition` is false.
    pub fn assert(&self, condition: bool, message: impl Into<String>) -> Result<(), Error> {
        if condition {
            Ok(())
        } else {
            Err(Error::Assertion(message.into()))
        }
    }

    /// True if the machine is created and not halted.
    pub fn is_alive(&self, id: &MachineId) -> bool {
        self.inner.machines.contains(id)
    }

    /// Number of live machines.
    pub fn machine_count(&self) -> usize {
        self.inner.machines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Machine, MachineContext};

    use async_trait::async_trait;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Ping;

    impl Event for Ping {}

    #[derive(Default)]
    struct Counter {
        pings: u32,
    }

    #[async_trait]
    impl Machine for Counter {
        async fn handle(
            &mut self,
            ctx: &mut MachineContext,
            envelope: &Envelope,
        ) -> Result<(), Error> {
            if envelope.is::<Ping>() {
                self.pings += 1;
                ctx.goto(format!("Pinged{}", self.pings));
            }
            Ok(())
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_create_and_send() {
        let runtime = Runtime::new(Configuration::default().with_verbosity(2));
        let counter = runtime.register_machine::<Counter>();
        let id = runtime
            .create_machine_and_execute(&counter, CreateOptions::new())
            .await
            .unwrap();
        assert!(runtime.is_alive(&id));

        assert!(
            runtime
                .send_event_and_execute(&id, Ping, SendOptions::default())
                .await
        );
        assert!(logs_contain("Machine Counter(0) is created."));
        assert!(logs_contain("dequeued event Ping"));
        assert!(logs_contain("enters state 'Pinged1'"));
        assert_eq!(runtime.machine_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_type_and_reserved_ids() {
        let runtime = Runtime::new(Configuration::default());
        let ghost = MachineType::from("Ghost");
        assert_eq!(
            runtime.create_machine(&ghost, CreateOptions::new()),
            Err(Error::UnsupportedMachineType("Ghost".to_owned()))
        );

        let counter = runtime.register_machine::<Counter>();
        let reserved = runtime.create_machine_id(&counter, Some("reserved"));
        assert!(!runtime.is_alive(&reserved));
        runtime
            .create_machine_with_id(&reserved, &counter, CreateOptions::new())
            .unwrap();
        assert!(runtime.is_alive(&reserved));
        assert_eq!(
            runtime.create_machine_with_id(&reserved, &counter, CreateOptions::new()),
            Err(Error::DuplicateIdentity(reserved.clone()))
        );

        let timer = MachineType::of::<TimerMachine>();
        let mismatched = runtime.create_machine_id(&timer, None);
        assert!(matches!(
            runtime.create_machine_with_id(&mismatched, &counter, CreateOptions::new()),
            Err(Error::MachineTypeMismatch { .. })
        ));

        let other = Runtime::new(Configuration::default());
        let foreign = other.create_machine_id(&counter, None);
        assert_eq!(
            runtime.create_machine_with_id(&foreign, &counter, CreateOptions::new()),
            Err(Error::ForeignIdentity(foreign.clone()))
        );
    }

    #[tokio::test]
    async fn test_stop_rejects_new_work() {
        let runtime = Runtime::new(Configuration::default());
        let counter = runtime.register_machine::<Counter>();
        runtime.stop();
        assert!(!runtime.is_running());
        assert_eq!(
            runtime.create_machine(&counter, CreateOptions::new()),
            Err(Error::Stopped)
        );
    }

    #[tokio::test]
    async fn test_timer_type_indirection() {
        let runtime = Runtime::new(Configuration::default());
        assert_eq!(runtime.timer_machine_type(), MachineType::of::<TimerMachine>());
        assert!(
            runtime
                .set_timer_machine_type(MachineType::from("Ghost"))
                .is_err()
        );
        runtime
            .set_timer_machine_type(MachineType::of::<ControlledTimerMachine>())
            .unwrap();
        assert_eq!(
            runtime.timer_machine_type(),
            MachineType::of::<ControlledTimerMachine>()
        );

        let systematic = Runtime::new(Configuration::systematic(1));
        assert_eq!(
            systematic.timer_machine_type(),
            MachineType::of::<ControlledTimerMachine>()
        );
    }

    #[test]
    #[traced_test]
    fn test_random_choices_are_logged() {
        let runtime = Runtime::new(Configuration::systematic(9));
        let replay = Runtime::new(Configuration::systematic(9));
        let first: Vec<u32> = (0..10).map(|_| runtime.random_integer(100)).collect();
        let second: Vec<u32> = (0..10).map(|_| replay.random_integer(100)).collect();
        assert_eq!(first, second);
        assert!(logs_contain("Runtime nondeterministically chose"));
    }
}

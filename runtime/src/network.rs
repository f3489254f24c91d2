// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Network provider
//!
//! Remote creation and remote send go through a pluggable [`NetworkProvider`]. The
//! runtime never implements a transport: it validates the machine type and delegates.
//! The default [`LocalNetworkProvider`] serves its own endpoint by delegating back to the
//! local runtime and rejects every other endpoint.
//!

use crate::{
    runtime::RuntimeInner, CreateOptions, Envelope, Error, Event, MachineId, MachineType,
    Runtime,
};

use async_trait::async_trait;
use tracing::debug;

use std::sync::{Arc, Weak};

/// Endpoint served by [`LocalNetworkProvider`].
pub const LOCAL_ENDPOINT: &str = "local";

/// Transport for remote machines.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Endpoint of this node.
    fn local_endpoint(&self) -> String;

    /// Creates a machine of `machine_type` on `endpoint`.
    async fn remote_create_machine(
        &self,
        machine_type: &MachineType,
        friendly_name: Option<String>,
        endpoint: &str,
        event: Option<Arc<dyn Event>>,
    ) -> Result<MachineId, Error>;

    /// Delivers an envelope to a remote machine.
    async fn remote_send(&self, target: &MachineId, envelope: Envelope) -> Result<(), Error>;

    /// Releases the transport. Called when the provider is replaced or the runtime is
    /// disposed.
    fn dispose(&self) {}
}

/// Local-only provider.
pub struct LocalNetworkProvider {
    runtime: Weak<RuntimeInner>,
}

impl LocalNetworkProvider {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.downgrade(),
        }
    }

    pub(crate) fn from_weak(runtime: Weak<RuntimeInner>) -> Self {
        Self { runtime }
    }

    fn runtime(&self) -> Result<Runtime, Error> {
        self.runtime
            .upgrade()
            .map(Runtime::from_inner)
            .ok_or(Error::Stopped)
    }
}

#[async_trait]
impl NetworkProvider for LocalNetworkProvider {
    fn local_endpoint(&self) -> String {
        LOCAL_ENDPOINT.to_owned()
    }

    async fn remote_create_machine(
        &self,
        machine_type: &MachineType,
        friendly_name: Option<String>,
        endpoint: &str,
        event: Option<Arc<dyn Event>>,
    ) -> Result<MachineId, Error> {
        if endpoint != LOCAL_ENDPOINT {
            return Err(Error::Network(format!(
                "Endpoint '{}' is not reachable by the local provider.",
                endpoint
            )));
        }
        let options = CreateOptions {
            friendly_name,
            event,
            ..CreateOptions::default()
        };
        self.runtime()?.create_machine(machine_type, options)
    }

    async fn remote_send(&self, target: &MachineId, envelope: Envelope) -> Result<(), Error> {
        debug!("Delivering remote event {} locally to {}.", envelope.name(), target);
        self.runtime()?.deliver(target, envelope, None);
        Ok(())
    }
}

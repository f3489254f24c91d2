// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime configuration
//!

use serde::{Deserialize, Serialize};

/// How the runtime is driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Real randomness and wall-clock timers.
    #[default]
    Production,
    /// Seeded randomness, controlled timers and monitors always enabled.
    Systematic,
}

/// Runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// Notification detail. State, action and raise notifications need a level above 1.
    pub verbosity: u8,
    /// Monitors are no-ops in production mode unless this is set.
    pub enable_monitors_in_production: bool,
    /// Breaks into the debugger hook on the first failure.
    pub attach_debugger_on_failure: bool,
    pub mode: ExecutionMode,
    /// Seed of the nondeterminism source. Production mode uses entropy when unset.
    pub random_seed: Option<u64>,
    /// Capacity of the runtime event stream.
    pub event_buffer: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            verbosity: 1,
            enable_monitors_in_production: false,
            attach_debugger_on_failure: false,
            mode: ExecutionMode::Production,
            random_seed: None,
            event_buffer: 100,
        }
    }
}

impl Configuration {
    /// Configuration for systematic testing with the given seed.
    pub fn systematic(seed: u64) -> Self {
        Self::default()
            .with_mode(ExecutionMode::Systematic)
            .with_random_seed(seed)
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_monitors_in_production(mut self, enable: bool) -> Self {
        self.enable_monitors_in_production = enable;
        self
    }

    pub fn with_attach_debugger_on_failure(mut self, attach: bool) -> Self {
        self.attach_debugger_on_failure = attach;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    /// True if monitors are registered and invoked.
    pub fn monitors_enabled(&self) -> bool {
        self.mode == ExecutionMode::Systematic || self.enable_monitors_in_production
    }

    /// True if state, action and raise notifications are reported.
    pub fn is_verbose(&self) -> bool {
        self.verbosity > 1
    }
}

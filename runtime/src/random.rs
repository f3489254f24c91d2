// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Nondeterminism sources
//!
//! Every nondeterministic choice of the runtime and of machine code goes through a
//! [`NondeterminismSource`]. Production draws from a conventional RNG. Systematic testing
//! swaps in a seeded or scripted source so an execution can be replayed.
//!

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use std::{collections::VecDeque, sync::Arc};

/// Source of boolean and integer choices.
///
/// A `max_value` of zero is treated as one.
pub trait NondeterminismSource: Send + Sync {
    /// True iff a draw in `[0, max_value)` is zero.
    fn boolean(&mut self, max_value: u32) -> bool;

    /// A fair coin toss identified by the call site.
    fn fair_boolean(&mut self, unique_id: &str) -> bool {
        let _ = unique_id;
        self.boolean(2)
    }

    /// A draw in `[0, max_value)`.
    fn integer(&mut self, max_value: u32) -> u32;
}

/// A choice made by a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    Boolean(bool),
    Integer(u32),
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Boolean(value) => write!(f, "{}", value),
            Choice::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// Entropy-seeded production source.
pub struct ProductionRandom {
    rng: StdRng,
}

impl ProductionRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for ProductionRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl NondeterminismSource for ProductionRandom {
    fn boolean(&mut self, max_value: u32) -> bool {
        self.rng.gen_range(0..max_value.max(1)) == 0
    }

    fn integer(&mut self, max_value: u32) -> u32 {
        self.rng.gen_range(0..max_value.max(1))
    }
}

/// ChaCha20-based source. The same seed yields the same choices.
pub struct SeededRandom {
    seed: u64,
    rng: ChaCha20Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl NondeterminismSource for SeededRandom {
    fn boolean(&mut self, max_value: u32) -> bool {
        self.rng.gen_range(0..max_value.max(1)) == 0
    }

    fn integer(&mut self, max_value: u32) -> u32 {
        self.rng.gen_range(0..max_value.max(1))
    }
}

/// Replays a fixed script of choices.
///
/// An exhausted script answers `false` and `0`.
pub struct ScriptedRandom {
    script: VecDeque<Choice>,
}

impl ScriptedRandom {
    pub fn new(script: impl IntoIterator<Item = Choice>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Script of boolean choices.
    pub fn booleans(script: impl IntoIterator<Item = bool>) -> Self {
        Self::new(script.into_iter().map(Choice::Boolean))
    }

    /// Choices left in the script.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl NondeterminismSource for ScriptedRandom {
    fn boolean(&mut self, _max_value: u32) -> bool {
        match self.script.pop_front() {
            Some(Choice::Boolean(value)) => value,
            Some(Choice::Integer(value)) => {
                warn!("Scripted integer {} replayed as a boolean choice.", value);
                value == 0
            }
            None => false,
        }
    }

    fn integer(&mut self, max_value: u32) -> u32 {
        match self.script.pop_front() {
            Some(Choice::Integer(value)) => value % max_value.max(1),
            Some(Choice::Boolean(value)) => {
                warn!("Scripted boolean {} replayed as an integer choice.", value);
                u32::from(!value)
            }
            None => 0,
        }
    }
}

/// Wraps a source and records every choice it makes.
///
/// The recorded trace can be replayed with [`ScriptedRandom::new`].
pub struct RecordingRandom<S> {
    inner: S,
    trace: Arc<Mutex<Vec<Choice>>>,
}

impl<S: NondeterminismSource> RecordingRandom<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the trace. It stays valid after the source moves into a runtime.
    pub fn trace(&self) -> Arc<Mutex<Vec<Choice>>> {
        self.trace.clone()
    }
}

impl<S: NondeterminismSource> NondeterminismSource for RecordingRandom<S> {
    fn boolean(&mut self, max_value: u32) -> bool {
        let value = self.inner.boolean(max_value);
        self.trace.lock().push(Choice::Boolean(value));
        value
    }

    fn fair_boolean(&mut self, unique_id: &str) -> bool {
        let value = self.inner.fair_boolean(unique_id);
        self.trace.lock().push(Choice::Boolean(value));
        value
    }

    fn integer(&mut self, max_value: u32) -> u32 {
        let value = self.inner.integer(max_value);
        self.trace.lock().push(Choice::Integer(value));
        value
    }
}

//! Correlation id generation.
//!
//! A context that is created without a correlation id asks a
//! [`CorrelationIdGenerator`] for one. The generator is passed in through
//! [`crate::RequestContextBuilder::generator`] instead of being swapped out
//! globally, so tests can be deterministic without touching shared state.

use parking_lot::Mutex;
use rand::Rng;
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::types::CorrelationId;

/// Produces fresh correlation ids.
///
/// Implementations only need to be collision resistant. Callers must not
/// rely on any ordering or structure in the generated values.
pub trait CorrelationIdGenerator: Send + Sync + fmt::Debug {
    /// Returns a new correlation id.
    fn generate(&self) -> CorrelationId;
}

/// Returns the generator used when none is supplied.
pub fn default_generator() -> Arc<dyn CorrelationIdGenerator> {
    static DEFAULT: OnceLock<Arc<NuidGenerator>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(NuidGenerator::new())).clone()
}

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u64 = 62;
const PREFIX_LEN: usize = 12;
const SEQUENCE_LEN: usize = 10;
/// 62^10, the number of distinct sequence suffixes.
const MAX_SEQUENCE: u64 = 839_299_365_868_340_224;
const MIN_INCREMENT: u64 = 33;
const MAX_INCREMENT: u64 = 333;

/// Length of every id produced by [`NuidGenerator`].
pub const NUID_LEN: usize = PREFIX_LEN + SEQUENCE_LEN;

/// NUID-style generator: a random base-62 prefix followed by a sequence that
/// advances by a random increment.
///
/// The prefix is re-randomized whenever the sequence space is exhausted, so
/// ids stay unique without hitting the random source on every call.
pub struct NuidGenerator {
    state: Mutex<NuidState>,
}

struct NuidState {
    prefix: [u8; PREFIX_LEN],
    sequence: u64,
    increment: u64,
}

impl NuidGenerator {
    /// Creates a generator with a freshly randomized prefix and sequence.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NuidState::fresh()),
        }
    }
}

impl Default for NuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NuidGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NuidGenerator").finish_non_exhaustive()
    }
}

impl CorrelationIdGenerator for NuidGenerator {
    fn generate(&self) -> CorrelationId {
        let id = self.state.lock().next();
        CorrelationId::try_new(id).expect("NUIDs are never empty")
    }
}

impl NuidState {
    fn fresh() -> Self {
        let mut rng = rand::rng();
        let mut state = Self {
            prefix: [b'0'; PREFIX_LEN],
            sequence: 0,
            increment: MIN_INCREMENT,
        };
        state.reset(&mut rng);
        state
    }

    fn reset(&mut self, rng: &mut impl Rng) {
        for byte in &mut self.prefix {
            *byte = DIGITS[rng.random_range(0..DIGITS.len())];
        }
        self.sequence = rng.random_range(0..MAX_SEQUENCE);
        self.increment = rng.random_range(MIN_INCREMENT..MAX_INCREMENT);
    }

    fn next(&mut self) -> String {
        self.sequence += self.increment;
        if self.sequence >= MAX_SEQUENCE {
            self.reset(&mut rand::rng());
        }

        let mut out = [b'0'; NUID_LEN];
        out[..PREFIX_LEN].copy_from_slice(&self.prefix);
        let mut remaining = self.sequence;
        for slot in out[PREFIX_LEN..].iter_mut().rev() {
            // Always < 62, so the index cast is lossless.
            #[allow(clippy::cast_possible_truncation)]
            let digit = (remaining % BASE) as usize;
            *slot = DIGITS[digit];
            remaining /= BASE;
        }
        out.iter().map(|&b| char::from(b)).collect()
    }
}

/// Generator producing the simple (hyphen-free) form of a `UUIDv7`.
///
/// Useful when correlation ids should sort roughly by creation time.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl CorrelationIdGenerator for UuidV7Generator {
    fn generate(&self) -> CorrelationId {
        let id = Uuid::now_v7().simple().to_string();
        CorrelationId::try_new(id).expect("a formatted UUID is never empty")
    }
}

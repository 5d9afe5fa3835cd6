//! Deterministic correlation-id generators.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::correlation::CorrelationIdGenerator;
use crate::types::CorrelationId;

/// Always returns the same correlation id.
#[derive(Debug, Clone)]
pub struct FixedCorrelationId {
    id: CorrelationId,
}

impl FixedCorrelationId {
    /// Creates a generator returning `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty.
    pub fn new(id: &str) -> Self {
        Self {
            id: CorrelationId::try_new(id.to_string())
                .expect("fixed correlation id must not be empty"),
        }
    }
}

impl CorrelationIdGenerator for FixedCorrelationId {
    fn generate(&self) -> CorrelationId {
        self.id.clone()
    }
}

/// Returns `"{prefix}-1"`, `"{prefix}-2"`, and so on.
#[derive(Debug)]
pub struct SequentialCorrelationIds {
    prefix: String,
    last: AtomicU64,
}

impl SequentialCorrelationIds {
    /// Creates a generator numbering ids from 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last: AtomicU64::new(0),
        }
    }

    /// How many ids have been handed out.
    pub fn issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

impl CorrelationIdGenerator for SequentialCorrelationIds {
    fn generate(&self) -> CorrelationId {
        let n = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        CorrelationId::try_new(format!("{}-{n}", self.prefix))
            .expect("sequential ids always contain the counter")
    }
}

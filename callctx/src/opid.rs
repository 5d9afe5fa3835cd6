//! Process-wide operation id generator.
//!
//! Every context construction and every clone draws exactly one id from here.
//! The counter is global rather than per connection because a context may be
//! created before it is bound to any connection.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::OpId;

static LAST_OP_ID: AtomicU64 = AtomicU64::new(0);

/// Draws the next operation id. The first id drawn in a process is 1.
pub(crate) fn next_op_id() -> OpId {
    // Only uniqueness matters, not ordering relative to other memory.
    let previous = LAST_OP_ID.fetch_add(1, Ordering::Relaxed);
    OpId::new(previous.wrapping_add(1))
}

//! Property test generators.
//!
//! Header names produced here never collide with the reserved `_cid`, `_opid`
//! and `_timeout` names, so they can be written freely without disturbing a
//! context's identity.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use crate::context::ContextSnapshot;
use crate::types::{OpId, CID_HEADER, OPID_HEADER, TIMEOUT_HEADER};

/// Generates application header names.
///
/// Names start with a letter, so they never start with the `_` that marks
/// reserved headers.
pub fn arb_header_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}"
}

/// Generates header values, including the empty string.
pub fn arb_header_value() -> impl Strategy<Value = String> {
    "[ -~]{0,64}"
}

/// Generates a map of application headers.
pub fn arb_headers() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map(arb_header_name(), arb_header_value(), 0..8)
}

/// Generates timeouts in whole milliseconds, up to one day.
pub fn arb_timeout() -> impl Strategy<Value = Duration> {
    (0u64..=86_400_000u64).prop_map(Duration::from_millis)
}

/// Generates operation ids.
pub fn arb_op_id() -> impl Strategy<Value = OpId> {
    any::<u64>().prop_map(OpId::new)
}

/// Generates well-formed snapshots as a peer might send them.
pub fn arb_snapshot() -> impl Strategy<Value = ContextSnapshot> {
    (
        "[a-zA-Z0-9]{1,22}",
        arb_op_id(),
        arb_timeout(),
        arb_headers(),
        arb_headers(),
    )
        .prop_map(|(cid, op_id, timeout, mut request_headers, response_headers)| {
            request_headers.insert(CID_HEADER.to_string(), cid);
            request_headers.insert(OPID_HEADER.to_string(), op_id.to_string());
            request_headers.insert(TIMEOUT_HEADER.to_string(), timeout.as_millis().to_string());
            ContextSnapshot {
                request_headers,
                response_headers,
            }
        })
}

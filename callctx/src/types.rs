//! Core identifier types and reserved header names.
//!
//! Identifiers use smart constructors so that a value, once built, is valid
//! everywhere it travels. Header values on the wire are always strings; these
//! types are the typed view the rest of the crate works with.

use nutype::nutype;
use std::time::Duration;

use crate::errors::{ContextError, ContextResult};

/// Request header carrying the correlation id.
pub const CID_HEADER: &str = "_cid";

/// Request and response header carrying the operation id (a `u64` as decimal text).
pub const OPID_HEADER: &str = "_opid";

/// Request header carrying the request timeout in milliseconds.
pub const TIMEOUT_HEADER: &str = "_timeout";

/// Timeout applied when none is configured or the `_timeout` header is unusable.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// A per-request multiplexing token.
///
/// Operation ids let many in-flight calls share one connection: the id is sent
/// with the request, echoed on the reply, and used to route the reply back to
/// its waiter. Ids drawn from the process-wide generator are never reused.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct OpId(u64);

impl OpId {
    /// Parses the textual form carried in an `_opid` header.
    ///
    /// A missing header and a value that is not a non-negative integer are
    /// both protocol violations and surface as [`ContextError`].
    pub(crate) fn from_header(raw: Option<&str>) -> ContextResult<Self> {
        let raw = raw.ok_or(ContextError::MissingOpId)?;
        raw.parse::<u64>()
            .map(Self::new)
            .map_err(|_| ContextError::InvalidOpId {
                value: raw.to_string(),
            })
    }

    /// Renders the id the way it travels in the `_opid` header.
    pub(crate) fn to_header_value(self) -> String {
        self.into_inner().to_string()
    }
}

/// A correlation identifier threaded through a chain of related calls.
///
/// Correlation ids are opaque: any non-empty string is accepted, and the value
/// is carried unchanged across clones so tracing can follow a call chain.
#[nutype(
    validate(not_empty),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(String);

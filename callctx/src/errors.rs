//! Error types for callctx.
//!
//! The context itself produces a single kind of failure: a malformed operation
//! id. Everything else it exposes is either infallible or answered with
//! `Option` (a header that is not there is not an error). A bad `_timeout` is
//! not an error at all; the default timeout is substituted.
//!
//! # Error Categories
//!
//! - **ContextError**: the context is missing a usable `_opid`. This is a
//!   protocol violation by a peer or an internal bug and must reach the caller.
//! - **CallError**: failures of the collaborator layer built on top of the
//!   context (demultiplexing and deadline enforcement).
//!
//! # Example Usage
//!
//! ```rust
//! use callctx::{CallError, CallResult, PendingCalls, Reply, OPID_HEADER};
//! use std::collections::HashMap;
//!
//! fn route(calls: &PendingCalls, reply: Reply) -> CallResult<()> {
//!     match calls.dispatch(reply) {
//!         // The waiter already gave up; drop the late reply.
//!         Err(CallError::UnknownOpId(_)) => Ok(()),
//!         other => other,
//!     }
//! }
//!
//! let calls = PendingCalls::default();
//! let late = Reply::new(
//!     HashMap::from([(OPID_HEADER.to_string(), "42".to_string())]),
//!     Vec::new(),
//! );
//! assert!(route(&calls, late).is_ok());
//!
//! let garbled = Reply::new(HashMap::new(), Vec::new());
//! assert!(matches!(route(&calls, garbled), Err(CallError::Malformed(_))));
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::OpId;

/// A request context that cannot be demultiplexed.
///
/// Raised when the operation id is read for routing and the `_opid` header is
/// absent or does not hold a non-negative integer. Never retried: the same
/// context will fail the same way every time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The `_opid` header is absent.
    #[error("malformed context: missing the required _opid header")]
    MissingOpId,

    /// The `_opid` header is present but is not a non-negative integer.
    #[error("malformed context: _opid is not a non-negative integer: {value:?}")]
    InvalidOpId {
        /// The offending header value
        value: String,
    },
}

/// Errors raised while executing a call over a multiplexed transport.
///
/// # Error Handling Strategy
///
/// - **Malformed**: treat as a protocol error on the connection
/// - **DeadlineExceeded**: the call's `timeout()` elapsed; the waiter is gone
/// - **Cancelled**: the caller cancelled the call scope
/// - **DuplicateOpId**: two live calls share an opid; indicates a caller bug
/// - **UnknownOpId**: a reply arrived for no outstanding call (usually late)
/// - **TooManyPending**: back off and retry later
/// - **Abandoned**: the transport dropped the waiter without replying
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The context carried no usable operation id.
    #[error(transparent)]
    Malformed(#[from] ContextError),

    /// The call did not complete within its timeout.
    #[error("call exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The call was cancelled through its [`crate::scope::CancelHandle`].
    #[error("call was cancelled")]
    Cancelled,

    /// Another outstanding call is already registered under this opid.
    #[error("operation id {0} is already awaiting a reply")]
    DuplicateOpId(OpId),

    /// A reply carried an opid with no outstanding call.
    #[error("no outstanding call for operation id {0}")]
    UnknownOpId(OpId),

    /// The outstanding-call table is full.
    #[error("too many outstanding calls (limit {limit})")]
    TooManyPending {
        /// The configured limit
        limit: usize,
    },

    /// The reply channel closed before a reply was delivered.
    #[error("reply for operation id {0} was abandoned")]
    Abandoned(OpId),
}

impl CallError {
    /// Whether the failure indicates a protocol violation rather than a
    /// transient condition.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::DuplicateOpId(_))
    }
}

/// Result type for context reads that can fail.
pub type ContextResult<T> = Result<T, ContextError>;

/// Result type for call execution.
pub type CallResult<T> = Result<T, CallError>;

//! # callctx
//!
//! Per-call request context for multiplexed RPC and pub/sub transports.
//!
//! A [`RequestContext`] travels with one logical call. It holds the request
//! headers sent to the peer, the response headers that come back, the call's
//! timeout, and ephemeral properties that stay in-process. Three reserved
//! headers identify the call:
//!
//! - `_cid`: correlation id, kept across clones so a call chain can be traced
//! - `_opid`: operation id, unique per context, used to route replies
//! - `_timeout`: timeout in milliseconds, five seconds by default
//!
//! Operation ids come from one process-wide atomic counter. Correlation ids
//! come from a pluggable [`CorrelationIdGenerator`]; the default produces
//! 22-character base62 ids.
//!
//! Transports use [`PendingCalls`] to match replies to waiting calls on a
//! shared connection, and [`RequestContext::scope`] to bound a call by its
//! timeout.
//!
//! ## Example
//!
//! ```rust
//! use callctx::{PendingCalls, Reply, RequestContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let calls = PendingCalls::default();
//! let ctx = RequestContext::new("");
//! ctx.add_request_header("tenant", "acme");
//! let pending = calls.register(&ctx)?;
//!
//! // The peer rebuilds the context from the wire headers and answers it.
//! let inbound = RequestContext::from_request_headers(ctx.wire_request_headers());
//! let reply = Reply::to(&inbound, b"pong".to_vec())?;
//!
//! // The transport routes the reply to the waiting call.
//! calls.dispatch(reply)?;
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()?;
//! let payload = runtime.block_on(pending.wait(&ctx))?;
//! assert_eq!(payload, b"pong");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod correlation;
pub mod demux;
pub mod errors;
mod opid;
pub mod properties;
pub mod scope;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{CallConfig, MaxPendingCalls, TimeoutMs};
pub use context::{ContextSnapshot, RequestContext, RequestContextBuilder};
pub use correlation::{default_generator, CorrelationIdGenerator, NuidGenerator, UuidV7Generator};
pub use demux::{PendingCalls, PendingReply, Reply};
pub use errors::{CallError, CallResult, ContextError, ContextResult};
pub use properties::{PropertyKey, PropertyValue};
pub use scope::{CallScope, CancelHandle};
pub use types::{CorrelationId, OpId, CID_HEADER, DEFAULT_TIMEOUT, OPID_HEADER, TIMEOUT_HEADER};

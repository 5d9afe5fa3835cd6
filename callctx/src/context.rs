//! The per-call request context.
//!
//! A [`RequestContext`] belongs to exactly one logical call. It carries the
//! request headers sent to the peer, the response headers received back, the
//! call's timeout, and a few reserved headers that identify the call:
//!
//! - `_cid`: the correlation id, stable across clones for tracing
//! - `_opid`: the operation id, unique per context, used to demultiplex replies
//! - `_timeout`: the timeout in milliseconds
//!
//! All accessors take `&self` and are safe to call from any number of threads.
//! The three maps sit behind one reader/writer lock, and every read accessor
//! hands back a copy so callers never observe a map while it is being written.
//!
//! Inbound contexts should not be reused for outbound calls. Clone them
//! instead: the clone keeps the correlation id and headers but draws a fresh
//! operation id, so the derived call gets its own multiplexing identity.
//!
//! # Example
//!
//! ```rust
//! use callctx::RequestContext;
//! use std::time::Duration;
//!
//! let ctx = RequestContext::new("");
//! ctx.add_request_header("tenant", "acme")
//!     .set_timeout(Duration::from_millis(7_500));
//!
//! // Later, while handling the call, make a downstream call.
//! let downstream = ctx.clone();
//! assert_eq!(downstream.correlation_id(), ctx.correlation_id());
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CallConfig;
use crate::correlation::{default_generator, CorrelationIdGenerator};
use crate::errors::ContextResult;
use crate::opid::next_op_id;
use crate::properties::{PropertyKey, PropertyValue};
use crate::scope::{CallScope, CancelHandle};
use crate::types::{OpId, CID_HEADER, DEFAULT_TIMEOUT, OPID_HEADER, TIMEOUT_HEADER};

/// Request/response metadata and timing policy for one call.
///
/// See the [module documentation](self) for the reserved headers and the
/// cloning rules.
pub struct RequestContext {
    state: RwLock<ContextState>,
    /// Used when `_timeout` is missing or unparseable.
    fallback_timeout: Duration,
}

#[derive(Clone, Default)]
struct ContextState {
    request: HashMap<String, String>,
    response: HashMap<String, String>,
    ephemeral: HashMap<PropertyKey, PropertyValue>,
}

impl RequestContext {
    /// Creates a context for the given correlation id.
    ///
    /// An empty correlation id is replaced by one from the default
    /// generator. The context starts with a fresh operation id and the
    /// default five second timeout.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self::builder().correlation_id(correlation_id).build()
    }

    /// Returns a builder for contexts that need a custom generator, timeout
    /// or configuration.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::new()
    }

    /// Builds a context from request headers received off the wire.
    ///
    /// The headers are taken verbatim: `_cid` and `_opid` are the sender's and
    /// are never regenerated. No validation happens here; a context without a
    /// usable `_opid` fails later, when the operation id is read.
    pub fn from_request_headers(headers: HashMap<String, String>) -> Self {
        Self::from_state(
            ContextState {
                request: headers,
                ..ContextState::default()
            },
            DEFAULT_TIMEOUT,
        )
    }

    fn from_state(state: ContextState, fallback_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(state),
            fallback_timeout,
        }
    }

    /// Returns the correlation id, or an empty string if a peer sent a
    /// context without one.
    pub fn correlation_id(&self) -> String {
        self.request_header(CID_HEADER).unwrap_or_default()
    }

    /// Sets a request header, replacing any previous value.
    ///
    /// The reserved names `_cid`, `_opid` and `_timeout` are not checked.
    /// Overwriting `_opid` in particular can break demultiplexing.
    pub fn add_request_header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.state.write().request.insert(name.into(), value.into());
        self
    }

    /// Gets the named request header.
    pub fn request_header(&self, name: &str) -> Option<String> {
        self.state.read().request.get(name).cloned()
    }

    /// Returns a copy of the request headers.
    pub fn request_headers(&self) -> HashMap<String, String> {
        self.state.read().request.clone()
    }

    /// The exact header set a transport serializes when sending this call.
    ///
    /// Ephemeral properties are never part of it.
    pub fn wire_request_headers(&self) -> HashMap<String, String> {
        self.request_headers()
    }

    /// Sets a response header, replacing any previous value.
    ///
    /// `_opid` is reserved for the echoed operation id.
    pub fn add_response_header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.state.write().response.insert(name.into(), value.into());
        self
    }

    /// Gets the named response header.
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.state.read().response.get(name).cloned()
    }

    /// Returns a copy of the response headers.
    pub fn response_headers(&self) -> HashMap<String, String> {
        self.state.read().response.clone()
    }

    /// Merges deserialized reply metadata into the response headers.
    pub fn apply_response_headers(&self, headers: HashMap<String, String>) -> &Self {
        self.state.write().response.extend(headers);
        self
    }

    /// Sets the request timeout, stored as whole milliseconds.
    pub fn set_timeout(&self, timeout: Duration) -> &Self {
        self.add_request_header(TIMEOUT_HEADER, encode_timeout(timeout))
    }

    /// Returns the request timeout.
    ///
    /// A missing or unparseable `_timeout` header yields the default timeout
    /// instead of an error; a bad header never stops a call from proceeding.
    pub fn timeout(&self) -> Duration {
        let parsed = self
            .state
            .read()
            .request
            .get(TIMEOUT_HEADER)
            .map(|raw| raw.parse::<u64>().map_err(|_| raw.clone()));

        match parsed {
            Some(Ok(millis)) => Duration::from_millis(millis),
            Some(Err(raw)) => {
                debug!(
                    value = %raw,
                    default_ms = self.fallback_timeout.as_millis(),
                    "unparseable _timeout header, using default"
                );
                self.fallback_timeout
            }
            None => {
                debug!(
                    default_ms = self.fallback_timeout.as_millis(),
                    "missing _timeout header, using default"
                );
                self.fallback_timeout
            }
        }
    }

    /// Adds an ephemeral property. Properties stay in-process and are never
    /// serialized.
    pub fn add_ephemeral_property<V>(&self, key: impl Into<PropertyKey>, value: V) -> &Self
    where
        V: Any + Send + Sync,
    {
        self.state
            .write()
            .ephemeral
            .insert(key.into(), Arc::new(value));
        self
    }

    /// Gets the property stored under `key`.
    pub fn ephemeral_property(&self, key: impl Into<PropertyKey>) -> Option<PropertyValue> {
        self.state.read().ephemeral.get(&key.into()).cloned()
    }

    /// Gets the property stored under `key` if it has type `T`.
    pub fn ephemeral_property_as<T>(&self, key: impl Into<PropertyKey>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.ephemeral_property(key)?.downcast::<T>().ok()
    }

    /// Returns a copy of the ephemeral property map. Values are shared.
    pub fn ephemeral_properties(&self) -> HashMap<PropertyKey, PropertyValue> {
        self.state.read().ephemeral.clone()
    }

    /// Takes a serializable copy of both header maps.
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.read();
        ContextSnapshot {
            request_headers: state.request.clone(),
            response_headers: state.response.clone(),
        }
    }

    /// Bridges the timeout into a deadline-bound execution scope.
    ///
    /// The scope is bounded only when `timeout()` is greater than zero.
    /// Dropping the returned handle does not cancel the scope.
    pub fn scope(&self) -> (CallScope, CancelHandle) {
        CallScope::with_timeout(self.timeout())
    }

    /// Overwrites `_opid` with a transport-assigned id.
    pub(crate) fn set_request_op_id(&self, id: OpId) {
        self.add_request_header(OPID_HEADER, id.to_header_value());
    }

    /// Reads `_opid` for demultiplexing.
    pub(crate) fn op_id(&self) -> ContextResult<OpId> {
        let raw = self.request_header(OPID_HEADER);
        OpId::from_header(raw.as_deref()).map_err(|e| {
            warn!(
                error = %e,
                correlation_id = %self.correlation_id(),
                "cannot demultiplex context"
            );
            e
        })
    }

    /// Writes the literal id string into the response `_opid` header.
    pub(crate) fn set_response_op_id(&self, id: &str) {
        self.add_response_header(OPID_HEADER, id);
    }
}

impl Clone for RequestContext {
    /// Copies all headers and properties, but draws a fresh operation id.
    ///
    /// The correlation id is preserved so a derived call can be traced back
    /// to its parent. Header maps are copied; property values are shared.
    fn clone(&self) -> Self {
        let mut state = self.state.read().clone();
        let op_id = next_op_id();
        let parent = state
            .request
            .insert(OPID_HEADER.to_string(), op_id.to_header_value());
        debug!(parent_op_id = ?parent, %op_id, "cloned request context");
        Self::from_state(state, self.fallback_timeout)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("RequestContext")
            .field("request_headers", &state.request)
            .field("response_headers", &state.response)
            .field("ephemeral_properties", &state.ephemeral.len())
            .finish()
    }
}

/// A serializable copy of a context's headers.
///
/// Carries the request and response header maps and nothing else, so
/// ephemeral properties cannot leak into a serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Request headers, including the reserved `_cid`, `_opid` and `_timeout`.
    pub request_headers: HashMap<String, String>,
    /// Response headers.
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
}

impl From<ContextSnapshot> for RequestContext {
    /// Rebuilds a context without regenerating `_cid` or `_opid`.
    fn from(snapshot: ContextSnapshot) -> Self {
        Self::from_state(
            ContextState {
                request: snapshot.request_headers,
                response: snapshot.response_headers,
                ephemeral: HashMap::new(),
            },
            DEFAULT_TIMEOUT,
        )
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    correlation_id: Option<String>,
    generator: Option<Arc<dyn CorrelationIdGenerator>>,
    timeout: Option<Duration>,
    config: Option<CallConfig>,
}

impl RequestContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation id. An empty id means "generate one".
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the generator consulted when no correlation id is given.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn CorrelationIdGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the initial timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Applies a configuration. Its default timeout becomes both the initial
    /// timeout (unless [`Self::timeout`] is set) and the fallback.
    #[must_use]
    pub const fn config(mut self, config: CallConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the context.
    ///
    /// Uses defaults for any unspecified fields:
    /// - correlation id: generated
    /// - timeout: the configured default, otherwise five seconds
    pub fn build(self) -> RequestContext {
        let fallback_timeout = self
            .config
            .map_or(DEFAULT_TIMEOUT, |config| config.default_timeout.as_duration());

        let correlation_id = match self.correlation_id {
            Some(id) if !id.is_empty() => id,
            _ => self
                .generator
                .unwrap_or_else(default_generator)
                .generate()
                .into_inner(),
        };

        let request = HashMap::from([
            (CID_HEADER.to_string(), correlation_id),
            (OPID_HEADER.to_string(), next_op_id().to_header_value()),
            (
                TIMEOUT_HEADER.to_string(),
                encode_timeout(self.timeout.unwrap_or(fallback_timeout)),
            ),
        ]);

        RequestContext::from_state(
            ContextState {
                request,
                ..ContextState::default()
            },
            fallback_timeout,
        )
    }
}

fn encode_timeout(timeout: Duration) -> String {
    u64::try_from(timeout.as_millis())
        .unwrap_or(u64::MAX)
        .to_string()
}

//! Reply demultiplexing for calls sharing one connection.
//!
//! Each outbound call registers its operation id in a [`PendingCalls`] table
//! and gets back a [`PendingReply`]. When a reply frame arrives, the transport
//! hands it to [`PendingCalls::dispatch`], which reads the echoed `_opid` and
//! completes the matching waiter. On the serving side, [`Reply::to`] echoes
//! the inbound operation id so the caller's table can route the reply.
//!
//! ```text
//!   caller                         connection                     responder
//!   ------                         ----------                     ---------
//!   register(ctx) ──► pending[opid]
//!   send ctx.wire_request_headers() ───────────────────────────►  from_request_headers
//!                                                                  Reply::to(inbound)
//!   dispatch(reply) ◄──────────────────────────────── _opid echoed
//!   pending[opid] ──► PendingReply::wait resolves
//! ```

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::CallConfig;
use crate::context::RequestContext;
use crate::errors::{CallError, CallResult, ContextResult};
use crate::scope::CallScope;
use crate::types::{OpId, OPID_HEADER};

/// A deserialized reply: response metadata plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    headers: HashMap<String, String>,
    payload: Vec<u8>,
}

impl Reply {
    /// Wraps reply metadata and payload read off the wire.
    pub const fn new(headers: HashMap<String, String>, payload: Vec<u8>) -> Self {
        Self { headers, payload }
    }

    /// Builds the reply to an inbound request.
    ///
    /// The inbound `_opid` is echoed verbatim into the context's response
    /// headers, which then become the reply metadata.
    pub fn to(inbound: &RequestContext, payload: Vec<u8>) -> ContextResult<Self> {
        inbound.op_id()?;
        if let Some(raw) = inbound.request_header(OPID_HEADER) {
            inbound.set_response_op_id(&raw);
        }
        Ok(Self {
            headers: inbound.response_headers(),
            payload,
        })
    }

    /// The reply metadata.
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The reply payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Splits the reply into metadata and payload.
    pub fn into_parts(self) -> (HashMap<String, String>, Vec<u8>) {
        (self.headers, self.payload)
    }

    fn op_id(&self) -> ContextResult<OpId> {
        OpId::from_header(self.headers.get(OPID_HEADER).map(String::as_str))
    }
}

/// Table of calls awaiting a reply on one connection.
///
/// A connection should either use the process-wide ids the contexts already
/// carry ([`Self::register`]) or connection-scoped sequence numbers
/// ([`Self::register_sequenced`]), not both.
#[derive(Debug)]
pub struct PendingCalls {
    table: Arc<Mutex<WaiterTable>>,
    max_pending: usize,
}

#[derive(Debug, Default)]
struct WaiterTable {
    waiters: HashMap<OpId, Waiter>,
    last_sequence: u64,
    last_token: u64,
}

/// A registered waiter. The token tells a stale [`PendingReply`] apart from a
/// later registration that reused the same opid.
#[derive(Debug)]
struct Waiter {
    token: u64,
    sender: oneshot::Sender<Reply>,
}

impl PendingCalls {
    /// Creates an empty table limited by `config.max_pending_calls`.
    pub fn new(config: &CallConfig) -> Self {
        Self {
            table: Arc::new(Mutex::new(WaiterTable::default())),
            max_pending: config.max_pending_calls.into_inner(),
        }
    }

    /// Registers the call identified by the context's `_opid`.
    pub fn register(&self, ctx: &RequestContext) -> CallResult<PendingReply> {
        let op_id = ctx.op_id()?;
        let mut table = self.table.lock();
        self.ensure_capacity(&table)?;
        self.insert(&mut table, op_id)
    }

    /// Assigns the next connection-scoped sequence number as the context's
    /// `_opid`, then registers the call.
    ///
    /// On error neither the context nor the sequence is touched.
    pub fn register_sequenced(&self, ctx: &RequestContext) -> CallResult<PendingReply> {
        let mut table = self.table.lock();
        self.ensure_capacity(&table)?;
        let sequence = table.last_sequence.wrapping_add(1);
        let op_id = OpId::new(sequence);
        let pending = self.insert(&mut table, op_id)?;
        table.last_sequence = sequence;
        drop(table);

        ctx.set_request_op_id(op_id);
        Ok(pending)
    }

    fn ensure_capacity(&self, table: &WaiterTable) -> CallResult<()> {
        let pending_len = table.waiters.len();
        if pending_len >= self.max_pending {
            warn!(
                pending_len,
                max_pending = self.max_pending,
                "too many outstanding calls; refusing new call"
            );
            return Err(CallError::TooManyPending {
                limit: self.max_pending,
            });
        }
        Ok(())
    }

    fn insert(&self, table: &mut WaiterTable, op_id: OpId) -> CallResult<PendingReply> {
        let token = table.last_token.wrapping_add(1);
        match table.waiters.entry(op_id) {
            Entry::Occupied(_) => Err(CallError::DuplicateOpId(op_id)),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(Waiter { token, sender });
                table.last_token = token;
                debug!(%op_id, pending_len = table.waiters.len(), "registered pending call");
                Ok(PendingReply {
                    op_id,
                    token,
                    receiver,
                    table: Arc::downgrade(&self.table),
                })
            }
        }
    }

    /// Routes a reply to the call waiting on its `_opid`.
    ///
    /// A reply with a missing or malformed `_opid` is a protocol violation.
    /// A reply for an opid nobody waits on (typically one that already timed
    /// out) is dropped and reported as [`CallError::UnknownOpId`].
    pub fn dispatch(&self, reply: Reply) -> CallResult<()> {
        let op_id = reply.op_id().map_err(|e| {
            warn!(error = %e, "reply cannot be demultiplexed");
            e
        })?;

        let waiter = self.table.lock().waiters.remove(&op_id);
        match waiter {
            Some(waiter) => {
                if waiter.sender.send(reply).is_err() {
                    debug!(%op_id, "waiter went away before delivery");
                } else {
                    debug!(%op_id, "delivered reply");
                }
                Ok(())
            }
            None => {
                warn!(%op_id, "no outstanding call for reply; dropping it");
                Err(CallError::UnknownOpId(op_id))
            }
        }
    }

    /// Forgets a pending call. Returns whether it was pending.
    pub fn cancel(&self, op_id: OpId) -> bool {
        self.table.lock().waiters.remove(&op_id).is_some()
    }

    /// Drops every waiter, e.g. because the connection closed. Each waiter
    /// resolves with [`CallError::Abandoned`].
    pub fn abandon_all(&self) -> usize {
        let abandoned: Vec<_> = self.table.lock().waiters.drain().collect();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "abandoned pending calls");
        }
        abandoned.len()
    }

    /// Number of calls awaiting a reply.
    pub fn len(&self) -> usize {
        self.table.lock().waiters.len()
    }

    /// Whether no call is awaiting a reply.
    pub fn is_empty(&self) -> bool {
        self.table.lock().waiters.is_empty()
    }

    /// The operation ids awaiting a reply, in ascending order.
    pub fn pending_op_ids(&self) -> Vec<OpId> {
        let mut ids: Vec<OpId> = self.table.lock().waiters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new(&CallConfig::default())
    }
}

/// A registered call waiting for its reply.
///
/// Dropping it, or dropping a [`Self::wait`] future before it resolves,
/// removes the call from its [`PendingCalls`].
#[derive(Debug)]
pub struct PendingReply {
    op_id: OpId,
    token: u64,
    receiver: oneshot::Receiver<Reply>,
    table: Weak<Mutex<WaiterTable>>,
}

impl PendingReply {
    /// The operation id the reply will be routed by.
    pub const fn op_id(&self) -> OpId {
        self.op_id
    }

    /// Waits for the reply within the context's timeout.
    ///
    /// On success the reply metadata is merged into the context's response
    /// headers and the payload is returned.
    pub async fn wait(self, ctx: &RequestContext) -> CallResult<Vec<u8>> {
        let (scope, _cancel) = ctx.scope();
        self.wait_in(scope, ctx).await
    }

    /// Waits for the reply within an explicit scope, so the caller can cancel.
    ///
    /// If the scope ends first the call is removed from its table; a reply
    /// that arrives afterwards is reported as unknown by
    /// [`PendingCalls::dispatch`].
    pub async fn wait_in(mut self, scope: CallScope, ctx: &RequestContext) -> CallResult<Vec<u8>> {
        let op_id = self.op_id;
        match scope.run(&mut self.receiver).await {
            Ok(Ok(reply)) => {
                let (headers, payload) = reply.into_parts();
                ctx.apply_response_headers(headers);
                Ok(payload)
            }
            Ok(Err(_)) => Err(CallError::Abandoned(op_id)),
            Err(e) => {
                debug!(%op_id, error = %e, "call ended without a reply");
                Err(e)
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock();
        let still_registered = table
            .waiters
            .get(&self.op_id)
            .is_some_and(|waiter| waiter.token == self.token);
        if still_registered {
            table.waiters.remove(&self.op_id);
            debug!(op_id = %self.op_id, "released pending call");
        }
    }
}

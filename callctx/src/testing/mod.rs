//! Testing utilities for code built on `callctx`.
//!
//! - [`generators`]: `proptest` strategies for header names, values and timeouts
//! - [`fixtures`]: deterministic correlation-id generators
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use callctx::testing::prelude::*;
//! use callctx::RequestContext;
//! use std::sync::Arc;
//!
//! let ctx = RequestContext::builder()
//!     .generator(Arc::new(FixedCorrelationId::new("test-cid")))
//!     .build();
//! assert_eq!(ctx.correlation_id(), "test-cid");
//! ```

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::fixtures::*;
    pub use super::generators::*;
}

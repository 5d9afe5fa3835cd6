//! callctx Benchmarks
//!
//! This crate contains performance benchmarks for the callctx request
//! context: construction, cloning, header access under contention, and reply
//! demultiplexing.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

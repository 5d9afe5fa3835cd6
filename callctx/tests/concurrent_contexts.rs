//! Concurrency tests for operation id uniqueness and header access.

#![allow(missing_docs)]

use callctx::{RequestContext, OPID_HEADER};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const CONTEXTS_PER_THREAD: usize = 12_500;

#[test]
fn op_ids_are_unique_across_threads_for_new_and_clone() {
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            thread::spawn(move || {
                let parent = RequestContext::new(format!("thread-{t}"));
                let mut ids = Vec::with_capacity(CONTEXTS_PER_THREAD);
                ids.push(parent.request_header(OPID_HEADER).unwrap());
                for i in 1..CONTEXTS_PER_THREAD {
                    let ctx = if i % 2 == 0 {
                        RequestContext::new("")
                    } else {
                        parent.clone()
                    };
                    ids.push(ctx.request_header(OPID_HEADER).unwrap());
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::with_capacity(THREADS * CONTEXTS_PER_THREAD);
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(id.parse::<u64>().is_ok(), "non-numeric _opid {id:?}");
            assert!(seen.insert(id.clone()), "duplicate _opid {id}");
        }
    }
    assert_eq!(seen.len(), THREADS * CONTEXTS_PER_THREAD);
}

#[test]
fn concurrent_writers_lose_no_headers_and_readers_see_consistent_maps() {
    const WRITERS: usize = 4;
    const READERS: usize = 4;
    const WRITES_PER_WRITER: usize = 500;

    let ctx = Arc::new(RequestContext::new("shared"));
    let reserved = ctx.request_headers();

    thread::scope(|s| {
        for w in 0..WRITERS {
            let ctx = &ctx;
            s.spawn(move || {
                for i in 0..WRITES_PER_WRITER {
                    ctx.add_request_header(format!("w{w}-{i}"), i.to_string())
                        .add_response_header(format!("w{w}"), i.to_string());
                }
            });
        }

        for _ in 0..READERS {
            let ctx = &ctx;
            let reserved = &reserved;
            s.spawn(move || {
                for _ in 0..WRITES_PER_WRITER {
                    let snapshot = ctx.request_headers();
                    for (name, value) in reserved {
                        assert_eq!(snapshot.get(name), Some(value));
                    }
                    for (name, value) in &snapshot {
                        if let Some(index) = name.split('-').nth(1) {
                            assert_eq!(index, value, "torn header {name}");
                        }
                    }
                    let _ = ctx.response_headers();
                }
            });
        }
    });

    let headers = ctx.request_headers();
    assert_eq!(headers.len(), reserved.len() + WRITERS * WRITES_PER_WRITER);
    for w in 0..WRITERS {
        assert_eq!(
            ctx.response_header(&format!("w{w}")),
            Some((WRITES_PER_WRITER - 1).to_string())
        );
    }
}

#[test]
fn clones_taken_during_writes_are_internally_consistent() {
    let ctx = Arc::new(RequestContext::new("parent"));

    thread::scope(|s| {
        let writer = &ctx;
        s.spawn(move || {
            for i in 0..1_000 {
                writer.add_request_header("counter", i.to_string());
            }
        });

        let cloner = &ctx;
        s.spawn(move || {
            for _ in 0..1_000 {
                let child = RequestContext::clone(cloner);
                assert_eq!(child.correlation_id(), "parent");
                assert_ne!(
                    child.request_header(OPID_HEADER),
                    cloner.request_header(OPID_HEADER)
                );
            }
        });
    });
}

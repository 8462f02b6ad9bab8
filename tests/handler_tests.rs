//! End-to-end tests for the request handler
//!
//! Each test wires the handler to fakes and checks which collaborators were
//! called, and how often.


use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use eks_token::TOKEN_PREFIX;
use pod_census::handler::{FunctionEvent, HandlerError, GENERIC_ERROR_MESSAGE};

use test_utils::*;

// ============================================================================
// Success Path Tests
// ============================================================================

#[tokio::test]
async fn test_reports_pod_count() {
    let ctx = TestContext::new(PodOutcome::Count(42));

    let message = ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap();

    assert_eq!(message, "There are 42 pods in the cluster");
    assert_eq!(ctx.describes(), 1);
    assert_eq!(ctx.mints(), 1);
    assert_eq!(ctx.queries(), 1);
}

#[tokio::test]
async fn test_empty_cluster_reports_zero() {
    let ctx = TestContext::new(PodOutcome::Count(0));

    let response = ctx.handler.respond(&FunctionEvent::new("empty")).await;

    assert_eq!(response.cluster_name.as_deref(), Some("empty"));
    assert_eq!(response.message, "There are 0 pods in the cluster");
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_query_receives_resolved_endpoint_and_fresh_token() {
    let ctx = TestContext::new(PodOutcome::Count(1));

    ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap();

    let seen = ctx.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, endpoint_for("prod"));
    assert!(seen[0].1.as_str().starts_with(TOKEN_PREFIX));
}

// ============================================================================
// Cache Behaviour Tests
// ============================================================================

#[tokio::test]
async fn test_second_invocation_skips_control_plane() {
    let ctx = TestContext::new(PodOutcome::Count(3));

    ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap();
    ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap();
    ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap();

    assert_eq!(ctx.describes(), 1);
    // Tokens are never reused
    assert_eq!(ctx.mints(), 3);
    assert_eq!(ctx.queries(), 3);
}

#[tokio::test]
async fn test_each_cluster_resolved_once() {
    let ctx = TestContext::new(PodOutcome::Count(3));

    for name in ["a", "b", "a", "b", "c"] {
        ctx.handler.handle(&FunctionEvent::new(name)).await.unwrap();
    }

    assert_eq!(ctx.describes(), 3);
    assert_eq!(ctx.handler.resolver().cached_len(), 3);
}

#[tokio::test]
async fn test_concurrent_invocations_share_one_resolution() {
    let describe_calls = Arc::new(AtomicUsize::new(0));
    let ctx = Arc::new(TestContext::with_control_plane(
        FakeControlPlane::slow(describe_calls.clone(), Duration::from_millis(50)),
        describe_calls,
        PodOutcome::Count(7),
    ));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.handler.handle(&FunctionEvent::new("prod")).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "There are 7 pods in the cluster");
    }

    assert_eq!(ctx.describes(), 1);
    assert_eq!(ctx.mints(), 10);
}

// ============================================================================
// Failure Path Tests
// ============================================================================

#[tokio::test]
async fn test_resolution_failure_stops_before_minting() {
    let ctx = TestContext::with_failing_control_plane(PodOutcome::Count(5));

    let err = ctx.handler.handle(&FunctionEvent::new("missing")).await.unwrap_err();

    assert!(matches!(err, HandlerError::Resolution(_)));
    assert_eq!(ctx.describes(), 1);
    assert_eq!(ctx.mints(), 0);
    assert_eq!(ctx.queries(), 0);
    assert!(!ctx.handler.resolver().is_cached("missing"));
}

#[tokio::test]
async fn test_query_failure_keeps_cache_entry() {
    let ctx = TestContext::new(PodOutcome::QueryFails);

    let err = ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap_err();
    assert!(matches!(err, HandlerError::Query(_)));
    assert_eq!(ctx.mints(), 1);
    assert!(ctx.handler.resolver().is_cached("prod"));

    // The next invocation still benefits from the cache
    let _ = ctx.handler.handle(&FunctionEvent::new("prod")).await;
    assert_eq!(ctx.describes(), 1);
}

#[tokio::test]
async fn test_failure_response_uses_generic_message() {
    let ctx = TestContext::new(PodOutcome::QueryFails);

    let response = ctx.handler.respond(&FunctionEvent::new("prod")).await;

    assert_eq!(response.message, GENERIC_ERROR_MESSAGE);
    let error = response.error.expect("error should be reported");
    assert!(error.contains("Pod query failed"));
}

#[tokio::test]
async fn test_empty_cluster_name_rejected() {
    let ctx = TestContext::new(PodOutcome::Count(1));

    let err = ctx.handler.handle(&FunctionEvent::new("")).await.unwrap_err();

    assert!(matches!(err, HandlerError::Resolution(_)));
    assert_eq!(ctx.describes(), 0);
    assert_eq!(ctx.mints(), 0);
}

#[tokio::test]
async fn test_hung_query_times_out() {
    let ctx = TestContext::with_call_timeout(PodOutcome::Hangs, Duration::from_millis(50));

    let err = ctx.handler.handle(&FunctionEvent::new("prod")).await.unwrap_err();

    match err {
        HandlerError::Timeout { step, .. } => assert_eq!(step, "pod query"),
        other => panic!("Expected timeout, got {:?}", other),
    }
    assert!(ctx.handler.resolver().is_cached("prod"));
}

//! Tests for the JSON-lines event stream


use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pod_census::handler::{InvocationResponse, GENERIC_ERROR_MESSAGE};
use pod_census::serve::serve_lines;

use test_utils::*;

fn parse_responses(output: &[u8]) -> Vec<InvocationResponse> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_slow_events_do_not_block_each_other() {
    let describe_calls = Arc::new(AtomicUsize::new(0));
    let ctx = TestContext::with_control_plane(
        FakeControlPlane::slow(describe_calls.clone(), Duration::from_millis(300)),
        describe_calls,
        PodOutcome::Count(2),
    );
    let input = b"{\"ClusterName\": \"a\"}\n{\"ClusterName\": \"b\"}\n{\"ClusterName\": \"c\"}\n{\"ClusterName\": \"d\"}\n{\"ClusterName\": \"e\"}\n";

    let start = Instant::now();
    let (output, answered) = serve_lines(ctx.handler.clone(), &input[..], Vec::new()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(answered, 5);
    assert_eq!(ctx.describes(), 5);
    // Handled one after another this would take at least 1.5s
    assert!(elapsed < Duration::from_millis(1200), "took {:?}", elapsed);
    assert_eq!(parse_responses(&output).len(), 5);
}

#[tokio::test]
async fn test_repeated_cluster_in_stream_resolved_once() {
    let describe_calls = Arc::new(AtomicUsize::new(0));
    let ctx = TestContext::with_control_plane(
        FakeControlPlane::slow(describe_calls.clone(), Duration::from_millis(50)),
        describe_calls,
        PodOutcome::Count(9),
    );
    let input = "{\"ClusterName\": \"prod\"}\n".repeat(8);

    let (output, answered) = serve_lines(ctx.handler.clone(), input.as_bytes(), Vec::new()).await.unwrap();

    assert_eq!(answered, 8);
    assert_eq!(ctx.describes(), 1);
    assert_eq!(ctx.mints(), 8);
    for response in parse_responses(&output) {
        assert_eq!(response.message, "There are 9 pods in the cluster");
    }
}

// ============================================================================
// Response Tests
// ============================================================================

#[tokio::test]
async fn test_responses_name_their_cluster() {
    let ctx = TestContext::new(PodOutcome::Count(4));
    let input = "{\"ClusterName\": \"prod\"}\n\n   \n{\"clusterName\": \"dev\"}\n";

    let (output, answered) = serve_lines(ctx.handler.clone(), input.as_bytes(), Vec::new()).await.unwrap();

    assert_eq!(answered, 2);
    let mut responses = parse_responses(&output);
    responses.sort_by(|a, b| a.cluster_name.cmp(&b.cluster_name));

    assert_eq!(responses[0].cluster_name.as_deref(), Some("dev"));
    assert_eq!(responses[1].cluster_name.as_deref(), Some("prod"));
    for response in &responses {
        assert_eq!(response.message, "There are 4 pods in the cluster");
        assert!(response.error.is_none());
    }
}

#[tokio::test]
async fn test_malformed_line_answered_without_handler() {
    let ctx = TestContext::new(PodOutcome::Count(1));
    let input = "{ not json\n{\"ClusterName\": \"prod\"}\n";

    let (output, answered) = serve_lines(ctx.handler.clone(), input.as_bytes(), Vec::new()).await.unwrap();

    assert_eq!(answered, 2);
    assert_eq!(ctx.describes(), 1);

    let responses = parse_responses(&output);
    let rejected = responses
        .iter()
        .find(|r| r.cluster_name.is_none())
        .expect("malformed event should be answered");
    assert_eq!(rejected.message, GENERIC_ERROR_MESSAGE);
    assert!(rejected.error.as_deref().unwrap().starts_with("Invalid event"));
}

#[tokio::test]
async fn test_failed_event_reports_its_cluster() {
    let ctx = TestContext::with_failing_control_plane(PodOutcome::Count(1));

    let (output, _) = serve_lines(ctx.handler.clone(), &b"{\"ClusterName\": \"missing\"}\n"[..], Vec::new())
        .await
        .unwrap();

    let responses = parse_responses(&output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].cluster_name.as_deref(), Some("missing"));
    assert_eq!(responses[0].message, GENERIC_ERROR_MESSAGE);
    assert!(responses[0].error.is_some());
}

#[tokio::test]
async fn test_empty_input_answers_nothing() {
    let ctx = TestContext::new(PodOutcome::Count(1));

    let (output, answered) = serve_lines(ctx.handler.clone(), &b""[..], Vec::new()).await.unwrap();

    assert_eq!(answered, 0);
    assert!(output.is_empty());
    assert_eq!(ctx.describes(), 0);
}

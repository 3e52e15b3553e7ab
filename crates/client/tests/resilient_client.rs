//! Behaviour of the resilient request path against a scripted transport.
//!
//! Timing-sensitive tests run on a paused clock so backoff sleeps and
//! the logout coalescing window elapse instantly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use solarcare_client::{
    ApiError, ApiErrorKind, ApiRequest, AuthService, CacheTag, LatchPhase, Submission, TransportError,
};
use solarcare_storage::{keys, KeyValueStore};
use tokio_util::sync::CancellationToken;

use common::{harness, ScriptedTransport, Step};

// ---------------------------------------------------------------------------
// Test: retry policy
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retryable_status_is_attempted_four_times() {
    let h = harness(ScriptedTransport::always(Step::status(503)), true);

    let result = h.api.send(ApiRequest::get("/services")).await;

    assert_matches!(result, Err(ApiError::Http { status: 503, .. }));
    assert_eq!(h.transport.calls(), 4);
    assert!(!h.store.state().ui.is_loading());
}

#[tokio::test(start_paused = true)]
async fn client_error_is_attempted_once() {
    let h = harness(ScriptedTransport::always(Step::status(400)), true);

    let err = h.api.send(ApiRequest::get("/services")).await.unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Client);
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn three_server_errors_then_success() {
    let transport = ScriptedTransport::new(vec![
        Step::status(500),
        Step::status(500),
        Step::status(500),
        Step::Respond(200, json!({"ok": true})),
    ]);
    let h = harness(transport, true);

    let data = h.api.send(ApiRequest::get("/services")).await.unwrap();

    assert_eq!(data, json!({"ok": true}));
    assert_eq!(h.transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn network_failures_are_retried() {
    let transport = ScriptedTransport::new(vec![Step::network(), Step::network()]);
    let h = harness(transport, true);

    assert!(h.api.send(ApiRequest::get("/leads")).await.is_ok());
    assert_eq!(h.transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_grow_between_attempts() {
    let h = harness(ScriptedTransport::always(Step::status(502)), true);
    let started = tokio::time::Instant::now();

    let _ = h.api.send(ApiRequest::get("/services")).await;

    // 1s + 2s + 4s base delays plus at most 1s jitter each.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
    assert!(elapsed <= Duration::from_secs(10), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn hung_transport_times_out_and_retries() {
    let transport = ScriptedTransport::new(vec![Step::Hang]);
    let h = harness(transport, true);

    assert!(h.api.send(ApiRequest::get("/services")).await.is_ok());
    assert_eq!(h.transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_timeouts_exhaust_as_timeout_errors() {
    let h = harness(
        ScriptedTransport::always(Step::Fail(TransportError::Timeout(Duration::from_secs(10)))),
        true,
    );

    let err = h.api.send(ApiRequest::get("/services")).await.unwrap_err();
    assert_eq!(err.kind(), ApiErrorKind::Timeout);
    assert_eq!(h.transport.calls(), 4);
}

#[tokio::test]
async fn panicking_transport_becomes_fetch_error() {
    let h = harness(ScriptedTransport::always(Step::Panic("socket exploded")), true);

    let err = h.api.send(ApiRequest::get("/services")).await.unwrap_err();

    assert_eq!(err, ApiError::Fetch("socket exploded".into()));
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.store.state().ui.in_flight, 0);
}

// ---------------------------------------------------------------------------
// Test: headers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn standard_headers_and_bearer_token_are_sent() {
    let h = harness(ScriptedTransport::new(vec![]), true);
    h.api
        .send(ApiRequest::get("/leads").with_param("page", "2"))
        .await
        .unwrap();

    let request = &h.transport.requests()[0];
    assert_eq!(request.url, "http://api.test/api/leads");
    assert_eq!(request.query_param("page"), Some("2"));
    assert_eq!(request.header("Content-Type"), Some("application/json"));
    assert_eq!(request.header("Accept"), Some("application/json"));
    assert_eq!(request.header("X-App-Version"), Some("9.9.9"));
    assert_eq!(request.header("X-Platform"), Some("android"));
    assert_eq!(request.bearer_token(), Some("tok-1"));
    assert_eq!(request.timeout, Duration::from_secs(10));
}

#[tokio::test]
async fn no_authorization_header_when_logged_out() {
    let h = harness(ScriptedTransport::new(vec![]), false);
    h.api.send(ApiRequest::get("/services")).await.unwrap();

    let request = &h.transport.requests()[0];
    assert!(request.header("Authorization").is_none());
    assert_eq!(request.header("X-Platform"), Some("android"));
}

// ---------------------------------------------------------------------------
// Test: idempotent logout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_auth_failures_log_out_once() {
    let h = harness(ScriptedTransport::always(Step::status(401)), true);

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let api = h.api.clone();
            tokio::spawn(async move { api.send(ApiRequest::get(format!("/leads/{i}"))).await })
        })
        .collect();

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Auth);
    }

    assert_eq!(h.logout.dispatch_count(), 1);
    assert_eq!(h.transport.calls(), 10, "auth failures are never retried");
    let auth = h.store.state().auth;
    assert!(!auth.is_logged_in());
    assert!(auth.token().is_none());
    assert!(auth.refresh_token().is_none());
    assert!(auth.user().is_none());
    assert!(auth.last_login_time().is_none());
}

#[tokio::test(start_paused = true)]
async fn explicit_logout_rejected_by_server_tears_down_once() {
    let h = harness(ScriptedTransport::always(Step::status(401)), true);
    let auth = AuthService::new(h.api.clone(), Arc::new(h.clock.clone()));

    auth.logout().await;

    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.logout.dispatch_count(), 1);
    assert_eq!(h.logout.phase(), LatchPhase::Idle);
    assert!(!h.store.state().auth.is_logged_in());
}

#[tokio::test(start_paused = true)]
async fn new_episode_after_cooldown_logs_out_again() {
    let h = harness(ScriptedTransport::always(Step::status(403)), true);

    let _ = h.api.send(ApiRequest::get("/auth/profile")).await;
    assert_eq!(h.logout.dispatch_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let _ = h.api.send(ApiRequest::get("/auth/profile")).await;
    assert_eq!(h.logout.dispatch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn logout_clears_cached_queries() {
    let transport = ScriptedTransport::new(vec![Step::Respond(200, json!([{"id": "l-1"}]))])
        .then_always(Step::status(401));
    let h = harness(transport, true);

    h.api
        .query("leads", ApiRequest::get("/leads"), vec![CacheTag::Lead])
        .await
        .unwrap();
    assert_eq!(h.api.queries().len(), 1);

    let _ = h.api.send(ApiRequest::get("/auth/profile")).await;
    assert!(h.api.queries().is_empty());
}

// ---------------------------------------------------------------------------
// Test: loading flag and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn aborted_query_stops_loading_once_and_skips_cache() {
    let h = harness(ScriptedTransport::new(vec![Step::Hang]), true);
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let api = h.api.clone();
        let cancel = cancel.clone();
        async move {
            api.query_cancellable("services", ApiRequest::get("/services"), vec![CacheTag::Service], &cancel)
                .await
        }
    });

    while h.transport.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.store.state().ui.in_flight, 1);

    cancel.cancel();
    assert_matches!(task.await.unwrap(), Err(ApiError::Aborted));
    assert_eq!(h.store.state().ui.in_flight, 0);
    assert!(h.api.queries().is_empty());
}

#[tokio::test]
async fn background_requests_do_not_toggle_loading() {
    let h = harness(ScriptedTransport::new(vec![Step::Hang]), true);

    let task = tokio::spawn({
        let api = h.api.clone();
        async move { api.send(ApiRequest::get("/services").background()).await }
    });

    while h.transport.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.store.state().ui.in_flight, 0);
    task.abort();
}

// ---------------------------------------------------------------------------
// Test: query cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mutation_invalidates_tagged_queries() {
    let h = harness(ScriptedTransport::new(vec![]), true);
    let list = || h.api.query("leads", ApiRequest::get("/leads"), vec![CacheTag::Lead]);

    list().await.unwrap();
    list().await.unwrap();
    assert_eq!(h.transport.calls(), 1);

    h.api
        .mutate(ApiRequest::post("/leads", json!({"serviceId": "s"})), &[CacheTag::Lead])
        .await
        .unwrap();
    list().await.unwrap();
    assert_eq!(h.transport.calls(), 3);
}

#[tokio::test]
async fn failed_mutation_keeps_cache() {
    let transport = ScriptedTransport::new(vec![Step::Respond(200, json!([])), Step::status(422)]);
    let h = harness(transport, true);

    h.api
        .query("leads", ApiRequest::get("/leads"), vec![CacheTag::Lead])
        .await
        .unwrap();
    let _ = h.api.mutate(ApiRequest::post("/leads", json!({})), &[CacheTag::Lead]).await;
    assert_eq!(h.api.queries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn persisted_copy_served_while_offline() {
    let transport = ScriptedTransport::new(vec![Step::Respond(200, json!([{"id": "rooftop-3kw"}]))])
        .then_always(Step::network());
    let h = harness(transport, true);

    let request = || ApiRequest::get("/services");
    h.api
        .query_persisted("services", keys::CACHE_SERVICES, request(), vec![CacheTag::Service])
        .await
        .unwrap();
    h.api.queries().reset();

    let data = h
        .api
        .query_persisted("services", keys::CACHE_SERVICES, request(), vec![CacheTag::Service])
        .await
        .unwrap();
    assert_eq!(data, json!([{"id": "rooftop-3kw"}]));

    h.clock.advance(Duration::from_secs(6 * 60));
    h.api.queries().reset();
    let err = h
        .api
        .query_persisted("services", keys::CACHE_SERVICES, request(), vec![CacheTag::Service])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ApiErrorKind::Network);
}

#[tokio::test(start_paused = true)]
async fn response_in_flight_across_logout_is_not_persisted() {
    let transport = ScriptedTransport::new(vec![Step::Delayed(
        Duration::from_secs(1),
        200,
        json!([{"id": "previous-users-lead"}]),
    )])
    .then_always(Step::status(401));
    let h = harness(transport, true);

    let leads = tokio::spawn({
        let api = h.api.clone();
        async move {
            api.query_persisted("leads", keys::CACHE_LEADS, ApiRequest::get("/leads"), vec![CacheTag::Lead])
                .await
        }
    });
    while h.transport.calls() == 0 {
        tokio::task::yield_now().await;
    }

    let _ = h.api.send(ApiRequest::get("/auth/profile")).await;
    assert_eq!(h.logout.dispatch_count(), 1);

    leads.await.unwrap().unwrap();
    assert!(!h.store.state().auth.is_logged_in());
    assert!(h.api.queries().is_empty());
    let persisted = h
        .kv
        .get_item(&format!("{}{}", keys::API_CACHE_PREFIX, keys::CACHE_LEADS))
        .await
        .unwrap();
    assert!(persisted.is_none());
}

// ---------------------------------------------------------------------------
// Test: offline queue
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unreachable_mutation_is_queued() {
    let h = harness(ScriptedTransport::always(Step::network()), true);

    let submission = h
        .api
        .mutate_or_queue(ApiRequest::post("/leads", json!({"serviceId": "site-survey"})), &[CacheTag::Lead])
        .await
        .unwrap();

    let Submission::Queued(id) = submission else {
        panic!("expected the request to be queued");
    };
    let pending = h.api.offline_queue().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].method, "POST");
    assert_eq!(pending[0].path, "/leads");
}

#[tokio::test(start_paused = true)]
async fn flush_drops_sent_and_rejected_keeps_unreachable() {
    let transport = ScriptedTransport::new(vec![Step::status(201), Step::status(400)])
        .then_always(Step::network());
    let h = harness(transport, true);
    let queue = h.api.offline_queue();
    queue.enqueue("post", "/leads", Some(json!({"serviceId": "a"}))).await.unwrap();
    queue.enqueue("patch", "/leads/1/status", Some(json!({"status": "bogus"}))).await.unwrap();
    queue.enqueue("post", "/leads/2/documents", None).await.unwrap();

    let report = h.api.flush_offline_queue().await;

    assert_eq!((report.sent, report.dropped, report.kept), (1, 1, 1));
    let pending = queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].path, "/leads/2/documents");
    // 1 + 1 + 4 attempts for the unreachable one.
    assert_eq!(h.transport.calls(), 6);
    assert_eq!(h.store.state().ui.in_flight, 0);
}

use autocredit::client::{ClientSettings, RequestClient, JSON_ACCEPT, RATE_LIMIT_RESET_HEADER};
use autocredit::error::CreditError;
use autocredit::utils::RetryPolicy;
use mockito::Matcher;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

mod common;
use common::test_helpers::*;

fn rate_limit_reset(offset_secs: i64) -> String {
    (chrono::Utc::now().timestamp() + offset_secs).to_string()
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/psf/requests")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"full_name": "psf/requests"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = create_test_client(3, Duration::from_millis(1), None);
    let response = client
        .get(&format!("{}/repos/psf/requests", server.url()), None)
        .await
        .unwrap();

    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["full_name"], "psf/requests");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_wait_does_not_use_an_attempt() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", "/repos/psf/requests")
        .with_status(403)
        .with_header(RATE_LIMIT_RESET_HEADER, &rate_limit_reset(-30))
        .with_body(r#"{"message": "API rate limit exceeded for 127.0.0.1"}"#)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/repos/psf/requests")
        .with_status(200)
        .with_body(r#"{"full_name": "psf/requests"}"#)
        .expect(1)
        .create_async()
        .await;

    // A single attempt: the 403 must be waited out, not retried.
    let client = create_test_client(1, Duration::from_millis(1), None);
    let response = client
        .get(&format!("{}/repos/psf/requests", server.url()), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_wait_respects_deadline() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", "/pypi/requests/json")
        .with_status(403)
        .with_header(RATE_LIMIT_RESET_HEADER, &rate_limit_reset(3600))
        .with_body("rate limit exceeded")
        .expect(1)
        .create_async()
        .await;

    let client = create_test_client(3, Duration::from_millis(1), None);
    let started = Instant::now();
    let err = client
        .get(
            &format!("{}/pypi/requests/json", server.url()),
            Some(Instant::now() + Duration::from_secs(2)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::RateLimited { wait_secs, .. } if wait_secs >= 3600));
    assert!(started.elapsed() < Duration::from_secs(2));
    limited.assert_async().await;
}

#[tokio::test]
async fn test_sustained_rate_limiting_gives_up_after_capped_resends() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    // Reset already in the past: every resend would be immediate.
    let limited = server
        .mock("GET", "/repos/psf/requests")
        .with_status(403)
        .with_header(RATE_LIMIT_RESET_HEADER, &rate_limit_reset(-60))
        .with_body(r#"{"message": "API rate limit exceeded"}"#)
        .expect(4)
        .create_async()
        .await;

    let client = RequestClient::new(ClientSettings {
        accept: JSON_ACCEPT.to_string(),
        token: None,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(3, Duration::from_millis(10)).with_rate_limit_waits(3),
    })
    .unwrap();

    let started = Instant::now();
    let result = timeout(
        Duration::from_secs(5),
        client.get(&format!("{}/repos/psf/requests", server.url()), None),
    )
    .await
    .expect("call returns without a deadline");

    assert!(matches!(result, Err(CreditError::RateLimited { wait_secs: 0, .. })));
    // Three resends, each paused for at least the base delay
    assert!(started.elapsed() >= Duration::from_millis(30));
    limited.assert_async().await;
}

#[tokio::test]
async fn test_nothing_is_sent_after_the_deadline() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/psf/requests")
        .with_status(200)
        .with_body(r#"{"full_name": "psf/requests"}"#)
        .expect(0)
        .create_async()
        .await;

    let deadline = Instant::now();
    sleep(Duration::from_millis(20)).await;

    let client = create_test_client(3, Duration::from_millis(1), None);
    let err = client
        .get(&format!("{}/repos/psf/requests", server.url()), Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::DeadlineExceeded { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_backoff_past_the_deadline_fails_fast() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/pypi/numpy/json")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;

    // The first backoff (1s) would overrun a 200ms budget.
    let client = create_test_client(3, Duration::from_secs(1), None);
    let started = Instant::now();
    let err = client
        .get(
            &format!("{}/pypi/numpy/json", server.url()),
            Some(Instant::now() + Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::DeadlineExceeded { .. }));
    assert!(started.elapsed() < Duration::from_millis(200));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_forbidden_without_rate_limit_is_a_plain_failure() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/private/repo")
        .with_status(403)
        .with_header(RATE_LIMIT_RESET_HEADER, &rate_limit_reset(-30))
        .with_body(r#"{"message": "Resource not accessible"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = create_test_client(2, Duration::from_millis(1), None);
    let err = client
        .get(&format!("{}/repos/private/repo", server.url()), None)
        .await
        .unwrap_err();

    match err {
        CreditError::RequestExhausted { attempts, source, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, CreditError::Upstream { status: 403, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retries_are_bounded_and_back_off() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/flaky/repo")
        .with_status(500)
        .with_body("internal error")
        .expect(3)
        .create_async()
        .await;

    let client = create_test_client(3, Duration::from_millis(40), None);
    let started = Instant::now();
    let err = client
        .get(&format!("{}/repos/flaky/repo", server.url()), None)
        .await
        .unwrap_err();

    // 40ms before the second attempt, 80ms before the third
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert!(matches!(err, CreditError::RequestExhausted { attempts: 3, .. }));
    assert!(!err.is_not_found());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/pypi/numpy/json")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/pypi/numpy/json")
        .with_status(200)
        .with_body(r#"{"info": {"name": "numpy"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = create_test_client(3, Duration::from_millis(1), None);
    let response = client
        .get(&format!("{}/pypi/numpy/json", server.url()), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    failing.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_reported_after_retries() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/nobody/nothing")
        .with_status(404)
        .with_body(r#"{"message": "Not Found"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = create_test_client(2, Duration::from_millis(1), None);
    let err = client
        .get(&format!("{}/repos/nobody/nothing", server.url()), None)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_auth_and_caller_headers_are_sent() {
    setup_test_logger();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/psf/requests/comments")
        .match_header("authorization", "Bearer test-token")
        .match_header("accept", "application/json")
        .match_header("x-request-id", "42")
        .match_body(Matcher::Json(json!({"body": "thanks"})))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let client = create_test_client(1, Duration::from_millis(1), Some("test-token"));
    let mut extra = HeaderMap::new();
    extra.insert("x-request-id", HeaderValue::from_static("42"));
    extra.insert("accept", HeaderValue::from_static("text/html"));

    let response = client
        .send(
            Method::POST,
            &format!("{}/repos/psf/requests/comments", server.url()),
            Some(&json!({"body": "thanks"})),
            Some(&extra),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transport_error_is_retried_then_exhausted() {
    setup_test_logger();
    // Nothing listens on port 9 of localhost in the test environment.
    let client = create_test_client(2, Duration::from_millis(1), None);
    let err = client.get("http://127.0.0.1:9/repos/a/b", None).await.unwrap_err();

    match err {
        CreditError::RequestExhausted { attempts, source, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, CreditError::Transport(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

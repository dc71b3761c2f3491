//! Retry policy of the async executor.

mod common;

use std::time::Duration;

use common::{error_body, stats, todo, ScriptedTransport, BASE_URL};
use todo_core::{ApiClient, CreateTodo, RetryPolicy, TodoClient};
use uuid::Uuid;

fn api(transport: &ScriptedTransport, retry: RetryPolicy) -> ApiClient<ScriptedTransport> {
    ApiClient::new(TodoClient::new(BASE_URL), transport.clone(), retry)
}

fn policy(read_retries: u32, write_retries: u32) -> RetryPolicy {
    RetryPolicy {
        read_retries,
        write_retries,
        delay: Duration::from_millis(50),
    }
}

#[tokio::test(start_paused = true)]
async fn read_recovers_after_server_errors() {
    let transport = ScriptedTransport::new();
    transport.respond(503, error_body(503, "unavailable"));
    transport.respond(503, error_body(503, "unavailable"));
    transport.respond_json(200, &stats(4, 2));

    let result = api(&transport, policy(2, 0)).stats().await.unwrap();

    assert_eq!(result, stats(4, 2));
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn read_gives_up_with_the_last_server_error() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.respond(500, error_body(500, "An internal error occurred"));
    }

    let err = api(&transport, policy(2, 0)).stats().await.unwrap_err();

    assert!(err.is_server_error());
    assert_eq!(err.status_code, 500);
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn read_retries_transport_failures() {
    let transport = ScriptedTransport::new();
    transport.fail("connection reset");
    let existing = todo("Buy milk");
    transport.respond_json(200, &existing);

    let fetched = api(&transport, policy(1, 0)).get_todo(existing.id).await.unwrap();

    assert_eq!(fetched, existing);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_never_retried() {
    let transport = ScriptedTransport::new();
    transport.respond(404, error_body(404, "Todo not found"));

    let err = api(&transport, policy(2, 1)).get_todo(Uuid::new_v4()).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn write_is_retried_at_most_once_on_transport_failure() {
    let transport = ScriptedTransport::new();
    transport.fail("connection refused");
    transport.fail("connection refused");
    transport.respond_json(201, &todo("never reached"));

    let err = api(&transport, policy(0, 3))
        .create_todo(&CreateTodo::new("Walk dog"))
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(err.status_code, 0);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn write_is_not_retried_after_a_response() {
    let transport = ScriptedTransport::new();
    transport.respond(503, error_body(503, "unavailable"));

    let err = api(&transport, RetryPolicy::default())
        .toggle_todo(Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(err.is_server_error());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_linearly() {
    let transport = ScriptedTransport::new();
    transport.fail("connection reset");
    transport.fail("connection reset");
    transport.respond_json(200, &stats(0, 0));

    let started = tokio::time::Instant::now();
    api(&transport, policy(2, 0)).stats().await.unwrap();

    // 50ms after the first attempt, 100ms after the second.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(150), "waited {waited:?}");
    assert!(waited < Duration::from_millis(200), "waited {waited:?}");
}

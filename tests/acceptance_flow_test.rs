use std::sync::Arc;
use std::time::Duration;

use popin_call::http::HttpResponse;
use popin_call::session::SessionStore;
use popin_call::test_utils::{RecordingListener, ScriptedHttpClient};
use popin_call::types::RegisteredUser;
use popin_call::wait::{MAX_WAIT_DURATION, POLL_INTERVAL, WaitState};
use popin_call::{AcceptanceEvent, ChannelListener, ClientConfig, PopinClient};

fn registered_client(http: Arc<ScriptedHttpClient>) -> Arc<PopinClient> {
    let session = Arc::new(SessionStore::with_user(RegisteredUser {
        status: 1,
        token: "tok-42".to_string(),
        channel: "private-user.42".to_string(),
    }));
    PopinClient::with_session(
        ClientConfig::default().with_base_url("https://api.test/v1"),
        http,
        session,
    )
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_position_updates_then_acceptance() {
    let _ = env_logger::builder().is_test(true).try_init();

    let http = Arc::new(ScriptedHttpClient::new());
    http.push_json(200, r#"{"status":1,"position":5}"#)
        .push_json(200, r#"{"status":1,"position":5}"#)
        .push_json(200, r#"{"status":1,"position":2}"#)
        .push_json(200, r#"{"status":2,"call_id":99,"message":"Agent joined"}"#);
    let client = registered_client(http.clone());
    let listener = RecordingListener::new();
    let handler = client.wait_for_acceptance(&listener);

    assert!(handler.start(42));
    advance(30).await;

    assert_eq!(
        listener.events(),
        vec![
            AcceptanceEvent::QueuePositionChanged(5),
            AcceptanceEvent::QueuePositionChanged(2),
            AcceptanceEvent::CallAccepted(99),
        ]
    );
    assert_eq!(handler.state(), WaitState::Accepted);

    let requests = http.requests();
    assert_eq!(requests.len(), 4);
    for request in &requests {
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://api.test/v1/user/connect/update");
        assert_eq!(request.body_str(), Some("call_queue_id=42"));
        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer tok-42")
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_invisible_to_listener() {
    let _ = env_logger::builder().is_test(true).try_init();

    let http = Arc::new(ScriptedHttpClient::new());
    http.push_error("connection refused")
        .push_json(500, "Internal Server Error")
        .push_json(200, "<html>maintenance</html>")
        .push_json(200, r#"{"status":9}"#)
        .push_json(200, r#"{"status":2}"#)
        .push_json(200, r#"{"status":1,"position":1}"#)
        .push_json(200, r#"{"status":3,"message":"Agent unavailable"}"#);
    let client = registered_client(http.clone());
    let listener = RecordingListener::new();
    let handler = client.wait_for_acceptance(&listener);

    handler.start(7);
    advance(60).await;

    assert_eq!(
        listener.events(),
        vec![
            AcceptanceEvent::QueuePositionChanged(1),
            AcceptanceEvent::CallMissed,
        ]
    );
    assert_eq!(http.requests().len(), 7);
    assert_eq!(handler.state(), WaitState::Missed);
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_with_single_position_report() {
    let http = Arc::new(
        ScriptedHttpClient::new()
            .with_fallback(HttpResponse::json(200, r#"{"status":1,"position":1}"#)),
    );
    let client = registered_client(http.clone());
    let (listener, mut events) = ChannelListener::new();
    let handler = client.wait_for_acceptance(&listener);

    let started = tokio::time::Instant::now();
    handler.start(7);

    assert_eq!(
        events.recv().await,
        Some(AcceptanceEvent::QueuePositionChanged(1))
    );
    assert_eq!(events.recv().await, Some(AcceptanceEvent::CallMissed));
    let waited = started.elapsed();
    assert!(waited >= MAX_WAIT_DURATION);
    assert!(waited <= MAX_WAIT_DURATION + POLL_INTERVAL);

    advance(30).await;
    assert!(events.try_recv().is_err());
    assert_eq!(http.requests().len(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_stop_silences_listener() {
    let http = Arc::new(
        ScriptedHttpClient::new()
            .with_fallback(HttpResponse::json(200, r#"{"status":2,"call_id":5}"#)),
    );
    http.push_json(200, r#"{"status":1,"position":3}"#);
    let client = registered_client(http.clone());
    let (listener, mut events) = ChannelListener::new();
    let handler = client.wait_for_acceptance(&listener);

    handler.start(7);
    assert_eq!(
        events.recv().await,
        Some(AcceptanceEvent::QueuePositionChanged(3))
    );
    handler.stop();
    advance(30).await;

    assert!(events.try_recv().is_err());
    assert_eq!(http.requests().len(), 1);
    assert_eq!(handler.state(), WaitState::Stopped);
}

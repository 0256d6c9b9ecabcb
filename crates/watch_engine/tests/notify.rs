use std::time::Duration;

use pretty_assertions::assert_eq;
use watch_core::{NotifyFailure, Target};
use watch_engine::{LogNotifier, Notifier, WebhookNotifier};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target() -> Target {
    Target::new("acme", "https://acme.test/pricing")
}

#[tokio::test]
async fn webhook_posts_content_and_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({
            "content": "Change detected on acme",
            "username": "page-watch",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "991"})))
        .expect(1)
        .mount(&server)
        .await;

    let notifier =
        WebhookNotifier::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
    let ack = notifier
        .notify("Change detected on acme", &target())
        .await
        .unwrap();

    assert_eq!(ack.message_id.as_deref(), Some("991"));
}

#[tokio::test]
async fn webhook_without_body_is_still_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5))
        .unwrap()
        .with_username("watchdog");
    let ack = notifier.notify("hello", &target()).await.unwrap();

    assert_eq!(ack.message_id, None);
}

#[tokio::test]
async fn webhook_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
    let err = notifier.notify("hello", &target()).await.unwrap_err();

    assert_eq!(err.kind, NotifyFailure::HttpStatus(500));
}

#[tokio::test]
async fn slow_webhook_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri(), Duration::from_millis(50)).unwrap();
    let err = notifier.notify("hello", &target()).await.unwrap_err();

    assert_eq!(err.kind, NotifyFailure::Timeout);
}

#[tokio::test]
async fn log_notifier_always_acknowledges() {
    watch_logging::initialize_for_tests();
    let ack = LogNotifier.notify("hello", &target()).await.unwrap();
    assert_eq!(ack.message_id, None);
}

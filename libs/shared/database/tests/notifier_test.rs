use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::notifier::{dispatch, Notifier, OutboundMessage, SupabaseNotifier};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

#[tokio::test]
async fn posts_message_to_the_messages_table() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::default()
        .with_supabase_url(&mock_server.uri())
        .to_app_config();

    let sender = Uuid::new_v4();
    let receiver = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(header("apikey", "test-anon-key"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "sender_id": sender,
            "receiver_id": receiver,
            "appointment_id": 42,
            "content": "Your appointment was confirmed"
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(MockSupabaseResponses::message_response(sender, receiver, Some(42))),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = SupabaseNotifier::new(&config);
    let message = OutboundMessage::new(sender, receiver, Some(42), "Your appointment was confirmed");

    notifier.send(&message).await.expect("message should be accepted");
}

#[tokio::test]
async fn gateway_errors_are_reported_but_not_fatal_to_dispatch() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::default()
        .with_supabase_url(&mock_server.uri())
        .to_app_config();

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(MockSupabaseResponses::error_response("boom", "XX000")),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let notifier = SupabaseNotifier::new(&config);
    let message = OutboundMessage::new(Uuid::new_v4(), Uuid::new_v4(), None, "Slot opened");

    let err = notifier.send(&message).await.unwrap_err();
    assert!(err.to_string().contains("500"));

    let delivered = dispatch(&notifier, &[message]).await;
    assert_eq!(delivered, 0);
}

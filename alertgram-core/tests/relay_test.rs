use alertgram_core::{DeliveryResult, Event, Level, Relay, RelayConfig};
use mockito::Matcher;
use serde_json::json;

const OK_BODY: &str = r#"{"ok":true,"result":{}}"#;

fn config(origin: &str) -> RelayConfig {
    RelayConfig::from_json(
        &json!({
            "api_origin": origin,
            "api_token": "123:abc",
            "default_template": "{level} {title}",
            "delivery": {"timeout_ms": 2000, "max_retries": 1, "backoff_ms": 10, "backoff": "fixed"},
            "destinations": [
                {
                    "name": "prod-errors",
                    "channel_id": "-1001",
                    "filter": {
                        "op": "and",
                        "children": [
                            {"field": "level", "operator": "equals", "value": "error"},
                            {"field": "environment", "operator": "equals", "value": "prod"}
                        ]
                    }
                },
                {
                    "name": "web",
                    "channel_id": "-1002",
                    "filter": {"field": "tags.server_name", "operator": "equals", "value": "web1"}
                },
                {
                    "name": "legacy",
                    "receivers": "-1003;-1004/9",
                    "filters": {"or_filters": [
                        {"type": "regex__message", "value": "timeout"},
                        {"type": "tag__server_name", "value": "^db"}
                    ]}
                }
            ]
        })
        .to_string(),
    )
    .unwrap()
}

fn event() -> Event {
    Event::new(Level::Error)
        .with_environment("prod")
        .with_title("ConnectionError")
        .with_tag("server_name", "db1")
}

#[tokio::test]
async fn test_event_delivered_to_matching_destinations_only() {
    let mut server = mockito::Server::new_async().await;
    let prod = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({"chat_id": "-1001", "text": "error ConnectionError"})))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;
    let legacy = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({"chat_id": "-1003"})))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;
    let legacy_thread = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({"chat_id": "-1004", "message_thread_id": 9})))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;
    let web = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({"chat_id": "-1002"})))
        .expect(0)
        .create_async()
        .await;

    let relay = Relay::from_config(&config(&server.url())).unwrap();
    let reports = relay.process(&event()).await;

    let summary: Vec<_> = reports
        .iter()
        .map(|r| (r.channel_id.as_str(), r.thread_id, r.result.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("-1001", None, DeliveryResult::Delivered),
            ("-1003", None, DeliveryResult::Delivered),
            ("-1004", Some(9), DeliveryResult::Delivered),
        ]
    );
    prod.assert_async().await;
    legacy.assert_async().await;
    legacy_thread.assert_async().await;
    web.assert_async().await;
}

#[tokio::test]
async fn test_one_failing_chat_does_not_block_others() {
    let mut server = mockito::Server::new_async().await;
    let _kicked = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({"chat_id": "-1003"})))
        .with_status(403)
        .with_body(r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was kicked from the group chat"}"#)
        .expect(1)
        .create_async()
        .await;
    let _others = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::AnyOf(vec![
            Matcher::PartialJson(json!({"chat_id": "-1001"})),
            Matcher::PartialJson(json!({"chat_id": "-1004"})),
        ]))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(2)
        .create_async()
        .await;

    let relay = Relay::from_config(&config(&server.url())).unwrap();
    let reports = relay.process(&event()).await;

    assert_eq!(reports.len(), 3);
    assert!(reports[0].result.is_delivered());
    assert!(matches!(&reports[1].result, DeliveryResult::Failed(reason) if reason.contains("bot was kicked")));
    assert_eq!(reports[1].attempts, 1);
    assert!(reports[2].result.is_delivered());
}

#[tokio::test]
async fn test_server_errors_retried_then_reported() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/bot123:abc/sendMessage")
        .with_status(500)
        .with_body(r#"{"ok":false,"error_code":500,"description":"Internal Server Error"}"#)
        .expect(2)
        .create_async()
        .await;

    let relay = Relay::from_config(&config(&server.url())).unwrap();
    let event = Event::new(Level::Error).with_environment("prod");
    let reports = relay.process(&event).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].attempts, 2);
    assert!(!reports[0].result.is_delivered());
    failing.assert_async().await;
}

#[tokio::test]
async fn test_unmatched_event_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let none = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let relay = Relay::from_config(&config(&server.url())).unwrap();
    let reports = relay.process(&Event::new(Level::Info)).await;

    assert!(reports.is_empty());
    none.assert_async().await;
}

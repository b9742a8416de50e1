mod common;

use common::*;
use denm_common::denm::DenmMessage;
use denmgw::amqp::{InboundBody, PropertyValue};
use serde_json::{json, Value};
use std::time::Duration;

fn property<'a>(
    message: &'a denmgw::amqp::AmqpMessage,
    key: &str,
) -> Option<&'a PropertyValue> {
    message
        .properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

#[tokio::test]
async fn valid_post_publishes_one_enveloped_message() {
    let gateway = TestGateway::start().await;

    let (status, body) = gateway
        .post("/denm", &sample_submission().to_string())
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"status": "success"})
    );

    let sent = gateway.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let message = &sent[0];

    assert_eq!(
        property(message, "messageType"),
        Some(&PropertyValue::Str("DENM".to_string()))
    );
    assert_eq!(property(message, "causeCode"), Some(&PropertyValue::Int(2)));

    let Some(PropertyValue::Str(quad)) = property(message, "quadTree") else {
        panic!("quadTree property missing");
    };
    assert!(quad.starts_with(',') && quad.ends_with(','));
    let interior = &quad[1..quad.len() - 1];
    assert_eq!(interior.len(), 18);
    assert!(interior.bytes().all(|b| (b'0'..=b'3').contains(&b)));

    assert_eq!(message.to, "examples");
    assert!(message.durable);
    let decoded = DenmMessage::decode(&message.body).unwrap();
    assert_eq!(decoded.header.station_id, 1_234_567);
}

#[tokio::test]
async fn malformed_body_returns_invalid_json() {
    let gateway = TestGateway::start().await;

    let (status, body) = gateway.post("/denm", "{").await;
    assert_eq!(status, 400);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({"error": "Invalid JSON"})
    );
    assert!(gateway.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_envelope_field_returns_named_error() {
    let gateway = TestGateway::start().await;

    let mut submission = sample_submission();
    submission.as_object_mut().unwrap().remove("publisherId");
    let (status, body) = gateway.post("/denm", &submission.to_string()).await;
    assert_eq!(status, 400);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert!(
        error["error"].as_str().unwrap().contains("publisherId"),
        "{error}"
    );
}

#[tokio::test]
async fn out_of_range_denm_field_returns_error() {
    let gateway = TestGateway::start().await;

    let mut submission = sample_submission();
    submission["data"]["management"]["eventPosition"]["latitude"] = json!(91.0);
    let (status, body) = gateway.post("/denm", &submission.to_string()).await;
    assert_eq!(status, 400);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert!(
        error["error"].as_str().unwrap().contains("latitude"),
        "{error}"
    );
    assert!(gateway.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn swagger_endpoints_are_served() {
    let gateway = TestGateway::start().await;

    let (status, body) = gateway.get("/swagger.json").await;
    assert_eq!(status, 200);
    let doc: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["openapi"], "3.0.0");
    assert!(doc["paths"]["/denm"]["post"].is_object());

    let (status, body) = gateway.get("/api-docs").await;
    assert_eq!(status, 200);
    assert!(body.contains("swagger-ui"));
}

#[tokio::test]
async fn inbound_delivery_fans_out_to_every_observer() {
    let gateway = TestGateway::start().await;

    let mut observer_a = gateway.ws_connect().await;
    let mut observer_b = gateway.ws_connect().await;
    gateway.wait_for_observers(2).await;

    let denm = DenmMessage::from_json(&sample_denm_json()).unwrap();
    let expected = denm.to_json().unwrap();
    gateway
        .deliveries
        .send(InboundBody::Binary(denm.encode().unwrap()))
        .unwrap();

    assert_eq!(observer_a.recv_json().await, expected);
    assert_eq!(observer_b.recv_json().await, expected);

    // Exactly once: no further frames for this single delivery.
    observer_a.expect_silence(Duration::from_millis(100)).await;
    observer_b.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn observers_see_deliveries_in_publish_order() {
    let gateway = TestGateway::start().await;
    let mut observer = gateway.ws_connect().await;
    gateway.wait_for_observers(1).await;

    for station in 1..=3u32 {
        let mut denm = DenmMessage::from_json(&sample_denm_json()).unwrap();
        denm.set_station_id(station);
        gateway
            .deliveries
            .send(InboundBody::Binary(denm.encode().unwrap()))
            .unwrap();
    }

    for station in 1..=3u64 {
        let frame = observer.recv_json().await;
        assert_eq!(frame["header"]["stationId"], json!(station));
    }
}

#[tokio::test]
async fn undecodable_delivery_is_discarded() {
    let gateway = TestGateway::start().await;
    let mut observer = gateway.ws_connect().await;
    gateway.wait_for_observers(1).await;

    gateway
        .deliveries
        .send(InboundBody::Binary(vec![0x00, 0x01, 0x02, 0x03]))
        .unwrap();
    gateway
        .deliveries
        .send(InboundBody::Other("amqp-value"))
        .unwrap();
    observer.expect_silence(Duration::from_millis(100)).await;

    // The loop survives bad deliveries; a good one still arrives.
    let denm = DenmMessage::from_json(&sample_denm_json()).unwrap();
    gateway
        .deliveries
        .send(InboundBody::Binary(denm.encode().unwrap()))
        .unwrap();
    assert_eq!(observer.recv_json().await, denm.to_json().unwrap());
}

#[tokio::test]
async fn shutdown_closes_links_cleanly() {
    let mut gateway = TestGateway::start().await;

    let (status, _) = gateway
        .post("/denm", &sample_submission().to_string())
        .await;
    assert_eq!(status, 200);

    gateway.service.stop().await;

    // The sender rejects submissions after shutdown.
    let (status, body) = gateway
        .post("/denm", &sample_submission().to_string())
        .await;
    assert_eq!(status, 400);
    assert!(body.contains("closed"), "{body}");
}

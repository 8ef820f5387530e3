//! Literal end-to-end scenario 6 (spec §8): a broadcast on a connection's
//! own id-topic with a `disconnect` event stops the multiplexer and forces
//! every joined channel closed within the forced-close timeout.

use serde_json::json;
use sockmux::{message::Broadcast, pubsub::PubSub};
use sockmux_test::{room_registry, LocalHarness};

#[tokio::test]
async fn disconnect_broadcast_on_the_id_topic_stops_the_connection() {
    let mut h = LocalHarness::connect_with_id(room_registry(), Some("users_socket:42")).await;

    h.send(json!({"join_ref": "7", "ref": "7", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let _ = h.recv().await;

    h.pubsub.publish(
        Broadcast { topic: "users_socket:42".into(), event: "disconnect".into(), payload: json!({}) },
        None,
    );

    assert!(!h.info().await, "a disconnect broadcast on the id-topic must stop the connection");
    h.terminate().await;
}

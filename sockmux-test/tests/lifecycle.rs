//! Literal end-to-end scenarios 1-5 (spec §8 "End-to-end scenarios"), plus
//! the graceful `phx_leave` path named in the §4.3 runtime-loop table.

use serde_json::json;
use sockmux_test::{room_registry, LocalHarness};

#[tokio::test]
async fn heartbeat_replies_ok_with_same_ref_and_no_state_change() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"join_ref": null, "ref": "1", "topic": "phoenix", "event": "heartbeat", "payload": {}})).await;
    let reply = h.recv().await;

    assert_eq!(reply["ref"], "1");
    assert_eq!(reply["topic"], "phoenix");
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["payload"], json!({}));

    // Sent twice with the same ref, still gets the same ref back (§8
    // round-trip/idempotence property).
    h.send(json!({"join_ref": null, "ref": "1", "topic": "phoenix", "event": "heartbeat", "payload": {}})).await;
    let reply2 = h.recv().await;
    assert_eq!(reply2["ref"], "1");
    assert_eq!(reply2["status"], "ok");
}

#[tokio::test]
async fn join_and_echo() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"join_ref": "7", "ref": "7", "topic": "room:42", "event": "phx_join", "payload": {"user": "a"}}))
        .await;
    let join_reply = h.recv().await;
    assert_eq!(join_reply["join_ref"], "7");
    assert_eq!(join_reply["ref"], "7");
    assert_eq!(join_reply["topic"], "room:42");
    assert_eq!(join_reply["status"], "ok");

    h.send(json!({"ref": "8", "topic": "room:42", "event": "msg", "payload": {"body": "hi"}})).await;
    assert!(h.info().await, "the echo reply is delivered through the async event queue");
    let echo_reply = h.recv().await;
    assert_eq!(echo_reply["join_ref"], "7");
    assert_eq!(echo_reply["ref"], "8");
    assert_eq!(echo_reply["topic"], "room:42");
    assert_eq!(echo_reply["status"], "ok");
    assert_eq!(echo_reply["payload"], json!({"echo": "hi"}));
}

#[tokio::test]
async fn unmatched_topic_errors_without_starting_a_worker() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"ref": "3", "topic": "nope:1", "event": "phx_join", "payload": {}})).await;
    let reply = h.recv().await;

    assert_eq!(reply["ref"], "3");
    assert_eq!(reply["topic"], "nope:1");
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["payload"]["reason"], "unmatched topic");
}

#[tokio::test]
async fn duplicate_join_closes_the_old_worker_before_the_new_one_replies() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"join_ref": "7", "ref": "7", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let _ = h.recv().await;

    h.send(json!({"join_ref": "9", "ref": "9", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let reply = h.recv().await;

    assert_eq!(reply["join_ref"], "9");
    assert_eq!(reply["ref"], "9");
    assert_eq!(reply["topic"], "room:42");
    assert_eq!(reply["status"], "ok");
}

#[tokio::test]
async fn phx_leave_replies_ok_and_clears_the_topic_from_both_maps() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"join_ref": "7", "ref": "7", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let _ = h.recv().await;

    h.send(json!({"join_ref": "7", "ref": "12", "topic": "room:42", "event": "phx_leave", "payload": {}})).await;
    assert!(h.info().await, "the phx_leave reply is delivered through the async event queue");
    let leave_reply = h.recv().await;
    assert_eq!(leave_reply["ref"], "12");
    assert_eq!(leave_reply["topic"], "room:42");
    assert_eq!(leave_reply["status"], "ok");
    assert_eq!(leave_reply["payload"], json!({}));

    // Neither map still holds the topic: a later message to it is now
    // unmatched rather than routed to the (now-gone) worker.
    h.send(json!({"ref": "13", "topic": "room:42", "event": "msg", "payload": {}})).await;
    let reply = h.recv().await;
    assert_eq!(reply["ref"], "13");
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["payload"]["reason"], "unmatched topic");
}

#[tokio::test]
async fn channel_crash_during_handle_in_emits_phx_error_and_allows_rejoin() {
    let mut h = LocalHarness::connect(room_registry()).await;

    h.send(json!({"join_ref": "7", "ref": "7", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let _ = h.recv().await;

    h.send(json!({"ref": "10", "topic": "room:42", "event": "boom", "payload": {}})).await;
    assert!(h.info().await, "the crash notice is delivered through the async event queue");
    let err_frame = h.recv().await;
    assert_eq!(err_frame["event"], "phx_error");
    assert_eq!(err_frame["topic"], "room:42");
    assert_eq!(err_frame["join_ref"], "7");

    h.send(json!({"join_ref": "11", "ref": "11", "topic": "room:42", "event": "phx_join", "payload": {}})).await;
    let rejoin_reply = h.recv().await;
    assert_eq!(rejoin_reply["join_ref"], "11");
    assert_eq!(rejoin_reply["status"], "ok");
}

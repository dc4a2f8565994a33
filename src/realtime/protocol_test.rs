use super::*;

const TOPIC: &str = "realtime:lightbulb-changes";

fn frame(topic: &str, event: &str, payload: Value, reference: Option<&str>) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_owned(),
        event: event.to_owned(),
        payload,
        reference: reference.map(ToOwned::to_owned),
        join_ref: None,
    }
}

// =============================================================================
// outbound
// =============================================================================

#[test]
fn join_frame_requests_update_changes_on_table() {
    let join = PhoenixMessage::join(TOPIC, "lightbulb", "anon", "1");
    let value: Value = serde_json::from_str(&join.encode().unwrap()).unwrap();

    assert_eq!(value["topic"], TOPIC);
    assert_eq!(value["event"], "phx_join");
    assert_eq!(value["ref"], "1");
    assert_eq!(value["join_ref"], "1");
    assert_eq!(value["payload"]["access_token"], "anon");
    assert_eq!(
        value["payload"]["config"]["postgres_changes"],
        json!([{ "event": "UPDATE", "schema": "public", "table": "lightbulb" }])
    );
}

#[test]
fn heartbeat_frame_targets_phoenix_topic() {
    let value: Value = serde_json::from_str(&PhoenixMessage::heartbeat("7").encode().unwrap()).unwrap();
    assert_eq!(value["topic"], "phoenix");
    assert_eq!(value["event"], "heartbeat");
    assert_eq!(value["ref"], "7");
    assert!(value.get("join_ref").is_none());
}

#[test]
fn channel_topic_prefixes_realtime() {
    assert_eq!(channel_topic("lightbulb-changes"), TOPIC);
}

#[test]
fn decode_tolerates_null_ref_and_missing_payload() {
    let msg = PhoenixMessage::decode(r#"{"topic":"realtime:x","event":"presence_state","ref":null}"#).unwrap();
    assert_eq!(msg.reference, None);
    assert_eq!(msg.payload, Value::Null);
    assert!(PhoenixMessage::decode("not json").is_err());
}

// =============================================================================
// classify
// =============================================================================

#[test]
fn join_reply_ok_and_error() {
    let ok = frame(TOPIC, "phx_reply", json!({"status": "ok", "response": {"postgres_changes": []}}), Some("1"));
    assert_eq!(
        classify(&ok, TOPIC),
        Inbound::Reply { reference: Some("1".into()), ok: true, response: json!({"postgres_changes": []}) }
    );

    let err = frame(TOPIC, "phx_reply", json!({"status": "error", "response": {"reason": "unauthorized"}}), Some("1"));
    let Inbound::Reply { ok, response, .. } = classify(&err, TOPIC) else {
        panic!("expected reply");
    };
    assert!(!ok);
    assert_eq!(rejection_reason(&response), "unauthorized");
}

#[test]
fn heartbeat_reply_on_phoenix_topic_is_a_reply() {
    let reply = frame("phoenix", "phx_reply", json!({"status": "ok", "response": {}}), Some("2"));
    assert!(matches!(classify(&reply, TOPIC), Inbound::Reply { ok: true, .. }));
}

#[test]
fn update_change_yields_row() {
    let payload = json!({
        "ids": [1],
        "data": {
            "type": "UPDATE",
            "schema": "public",
            "table": "lightbulb",
            "commit_timestamp": "2025-01-01T00:00:01Z",
            "record": {"id": 1, "is_on": true, "updated_at": "2025-01-01T00:00:01+00:00"},
            "old_record": {"id": 1}
        }
    });
    let Inbound::Change(row) = classify(&frame(TOPIC, "postgres_changes", payload, None), TOPIC) else {
        panic!("expected change");
    };
    assert_eq!(row.id, 1);
    assert!(row.value);
    assert!(row.last_changed_at.is_some());
}

#[test]
fn non_update_changes_and_other_topics_are_ignored() {
    let insert = json!({"data": {"type": "INSERT", "record": {"id": 2, "is_on": true}}});
    assert_eq!(classify(&frame(TOPIC, "postgres_changes", insert, None), TOPIC), Inbound::Ignored);

    let other = json!({"data": {"type": "UPDATE", "record": {"id": 1, "is_on": true}}});
    assert_eq!(classify(&frame("realtime:other", "postgres_changes", other, None), TOPIC), Inbound::Ignored);

    let broken = json!({"data": {"type": "UPDATE", "record": {"id": 1}}});
    assert_eq!(classify(&frame(TOPIC, "postgres_changes", broken, None), TOPIC), Inbound::Ignored);
}

#[test]
fn channel_failures_are_classified() {
    assert_eq!(classify(&frame(TOPIC, "phx_error", json!({}), None), TOPIC), Inbound::ChannelError("channel error".into()));
    assert_eq!(classify(&frame(TOPIC, "phx_close", json!({}), None), TOPIC), Inbound::ChannelClosed);

    let system_err = json!({"status": "error", "message": "table not in publication", "extension": "postgres_changes"});
    assert_eq!(
        classify(&frame(TOPIC, "system", system_err, None), TOPIC),
        Inbound::SystemError("table not in publication".into())
    );

    let system_ok = json!({"status": "ok", "message": "Subscribed to PostgreSQL"});
    assert_eq!(classify(&frame(TOPIC, "system", system_ok, None), TOPIC), Inbound::Ignored);
}

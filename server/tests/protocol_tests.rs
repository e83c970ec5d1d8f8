//! Wire-format fidelity: the JSON the browser sends and receives.

use protocol::{ClientEnvelope, Handshake, Point, Realm, ServerEvent, ServerFrame};

#[test]
fn handshake_frame_shape() {
    let handshake: Handshake = serde_json::from_str(r#"{"token": "abc.def"}"#).unwrap();
    assert_eq!(handshake.token, "abc.def");
}

#[test]
fn every_command_name_roundtrips() {
    let samples = vec![
        (r#"{"name":"move:request","payload":{"x":1,"y":2}}"#, "move:request"),
        (
            r#"{"name":"inventory:equip","payload":{"inventoryId":1,"slot":"head"}}"#,
            "inventory:equip",
        ),
        (
            r#"{"name":"inventory:unequip","payload":{"slot":"amulet"}}"#,
            "inventory:unequip",
        ),
        (
            r#"{"name":"inventory:use","payload":{"inventoryId":3}}"#,
            "inventory:use",
        ),
        (
            r#"{"name":"collectable:collect","payload":{"spawnId":9}}"#,
            "collectable:collect",
        ),
        (
            r#"{"name":"shoutbox:send","payload":{"message":"hi"}}"#,
            "shoutbox:send",
        ),
        (
            r#"{"name":"editor:region:delete","payload":{"regionId":4}}"#,
            "editor:region:delete",
        ),
        (
            r#"{"name":"editor:path:delete","payload":{"pathId":4}}"#,
            "editor:path:delete",
        ),
    ];

    for (raw, expected_name) in samples {
        let envelope: ClientEnvelope = serde_json::from_str(raw)
            .unwrap_or_else(|err| panic!("{raw} failed to parse: {err}"));
        assert_eq!(envelope.command.name(), expected_name);

        let back = serde_json::to_value(&envelope).unwrap();
        assert_eq!(back["name"], expected_name);
    }
}

#[test]
fn move_started_payload_carries_the_full_path() {
    let event = ServerEvent::MoveStarted {
        user_id: 7,
        path: vec![Point::new(100, 100), Point::new(132, 100)],
    };

    let json = serde_json::to_value(ServerFrame::Event(event)).unwrap();
    assert_eq!(json["name"], "move:started");
    assert_eq!(json["payload"]["path"][1]["x"], 132);
}

#[test]
fn capture_event_names_both_realms() {
    let event = ServerEvent::TerritoriesCapture {
        territory_id: 17,
        name: "Stone Keep".to_string(),
        previous_realm: Realm::A,
        new_realm: Realm::B,
    };

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["name"], "territories:capture");
    assert_eq!(json["payload"]["previousRealm"], "a");
    assert_eq!(json["payload"]["newRealm"], "b");
}

#[test]
fn ack_error_codes_are_stable_wire_strings() {
    use server::error::GameServerError;

    assert_eq!(GameServerError::AuthInvalid.ack_code(), "authInvalid");
    assert_eq!(GameServerError::Unreachable.ack_code(), "unreachable");
    assert_eq!(GameServerError::OnCooldown.ack_code(), "onCooldown");
    assert_eq!(
        GameServerError::AlreadyBeingCollected.ack_code(),
        "alreadyBeingCollected"
    );
    assert_eq!(GameServerError::AlreadyInRealm.ack_code(), "alreadyInRealm");
}

#[test]
fn frames_over_the_socket_are_distinguishable() {
    // An ack and an event must never be confused by the client.
    let ack: ServerFrame = serde_json::from_str(r#"{"ack": 7, "ok": false, "error": {"code": "unreachable", "message": "no path"}}"#).unwrap();
    match ack {
        ServerFrame::Ack(frame) => {
            assert!(!frame.ok);
            assert_eq!(frame.error.unwrap().code, "unreachable");
        }
        ServerFrame::Event(_) => panic!("parsed ack as event"),
    }

    let event: ServerFrame = serde_json::from_str(
        r#"{"name": "collectable:failed", "payload": {"spawnId": 9}}"#,
    )
    .unwrap();
    assert!(matches!(
        event,
        ServerFrame::Event(ServerEvent::CollectableFailed { spawn_id: 9 })
    ));
}

use serde_json::{Value, json};
use voicelive_rs::protocol::client_events::ClientEvent;
use voicelive_rs::protocol::models::{Item, ResponseParams, SessionConfig};
use voicelive_rs::protocol::server_events::ServerEvent;
use voicelive_rs::{ApiErrorType, Modality};

fn to_json(event: &ClientEvent) -> Value {
    serde_json::to_value(event).expect("client event serializes")
}

#[test]
fn session_update_frame_shape() {
    let event = ClientEvent::SessionUpdate {
        event_id: Some("evt_1".to_string()),
        session: Box::new(SessionConfig {
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            temperature: Some(0.7),
            ..SessionConfig::default()
        }),
    };

    let json = to_json(&event);
    assert_eq!(json["type"], "session.update");
    assert_eq!(json["event_id"], "evt_1");
    assert_eq!(json["session"]["modalities"], json!(["text", "audio"]));
    assert_eq!(json["session"]["temperature"], json!(0.7));
    // Unset optionals must not appear on the wire.
    assert!(json["session"].get("voice").is_none());
}

#[test]
fn audio_buffer_frames() {
    let append = to_json(&ClientEvent::InputAudioBufferAppend {
        event_id: None,
        audio: "UENNMTY=".to_string(),
    });
    assert_eq!(append["type"], "input_audio_buffer.append");
    assert_eq!(append["audio"], "UENNMTY=");
    assert!(append.get("event_id").is_none());

    let commit = to_json(&ClientEvent::InputAudioBufferCommit { event_id: None });
    assert_eq!(commit["type"], "input_audio_buffer.commit");

    let clear = to_json(&ClientEvent::OutputAudioBufferClear { event_id: None });
    assert_eq!(clear["type"], "output_audio_buffer.clear");
}

#[test]
fn conversation_item_frames() {
    let create = to_json(&ClientEvent::ConversationItemCreate {
        event_id: None,
        previous_item_id: Some("item_0".to_string()),
        item: Box::new(Item::user_text("hello")),
    });
    assert_eq!(create["type"], "conversation.item.create");
    assert_eq!(create["previous_item_id"], "item_0");
    assert_eq!(create["item"]["type"], "message");
    assert_eq!(create["item"]["role"], "user");
    assert_eq!(create["item"]["content"][0]["type"], "input_text");
    assert_eq!(create["item"]["content"][0]["text"], "hello");

    let truncate = to_json(&ClientEvent::ConversationItemTruncate {
        event_id: None,
        item_id: "item_7".to_string(),
        content_index: 0,
        audio_end_ms: 1500,
    });
    assert_eq!(truncate["type"], "conversation.item.truncate");
    assert_eq!(truncate["item_id"], "item_7");
    assert_eq!(truncate["audio_end_ms"], 1500);

    let delete = to_json(&ClientEvent::ConversationItemDelete {
        event_id: None,
        item_id: "item_7".to_string(),
    });
    assert_eq!(delete["type"], "conversation.item.delete");
}

#[test]
fn response_frames_carry_overrides() {
    let create = to_json(&ClientEvent::ResponseCreate {
        event_id: None,
        response: Some(Box::new(ResponseParams {
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            ..ResponseParams::default()
        })),
        additional_instructions: Some("Keep it brief.".to_string()),
    });
    assert_eq!(create["type"], "response.create");
    assert_eq!(create["response"]["modalities"], json!(["text", "audio"]));
    assert_eq!(create["additional_instructions"], "Keep it brief.");

    let cancel = to_json(&ClientEvent::ResponseCancel {
        event_id: None,
        response_id: Some("resp_3".to_string()),
    });
    assert_eq!(cancel["type"], "response.cancel");
    assert_eq!(cancel["response_id"], "resp_3");
}

#[test]
fn session_created_parses_without_event_id() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"session.created","session":{"id":"abc"}}"#)
            .expect("parses");
    match event {
        ServerEvent::SessionCreated { session, event_id } => {
            assert_eq!(session.id.as_deref(), Some("abc"));
            assert!(event_id.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn speech_events_parse() {
    let started: ServerEvent = serde_json::from_str(
        r#"{"type":"input_audio_buffer.speech_started","event_id":"evt_9","audio_start_ms":120,"item_id":"item_1"}"#,
    )
    .expect("parses");
    match started {
        ServerEvent::SpeechStarted {
            audio_start_ms,
            item_id,
            ..
        } => {
            assert_eq!(audio_start_ms, Some(120));
            assert_eq!(item_id.as_deref(), Some("item_1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stopped: ServerEvent =
        serde_json::from_str(r#"{"type":"input_audio_buffer.speech_stopped"}"#).expect("parses");
    assert!(matches!(stopped, ServerEvent::SpeechStopped { .. }));
}

#[test]
fn transcript_and_transcription_events_parse() {
    let done: ServerEvent = serde_json::from_str(
        r#"{"type":"response.audio_transcript.done","response_id":"resp_1","transcript":"good morning"}"#,
    )
    .expect("parses");
    match done {
        ServerEvent::ResponseAudioTranscriptDone { transcript, .. } => {
            assert_eq!(transcript, "good morning");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let completed: ServerEvent = serde_json::from_str(
        r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"item_2","transcript":"hi"}"#,
    )
    .expect("parses");
    match completed {
        ServerEvent::InputAudioTranscriptionCompleted {
            item_id,
            transcript,
            ..
        } => {
            assert_eq!(item_id.as_deref(), Some("item_2"));
            assert_eq!(transcript, "hi");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn error_frames_classify_sub_type() {
    let event: ServerEvent = serde_json::from_str(
        r#"{"type":"error","error":{"type":"invalid_request_error","code":"invalid_value","message":"bad request"}}"#,
    )
    .expect("parses");
    match event {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.error_type, ApiErrorType::InvalidRequestError);
            assert_eq!(error.code.as_deref(), Some("invalid_value"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Unknown sub-types still parse rather than falling through.
    let event: ServerEvent = serde_json::from_str(
        r#"{"type":"error","error":{"type":"brand_new_error","message":"?"}}"#,
    )
    .expect("parses");
    match event {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.error_type, ApiErrorType::Unknown);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn unrecognized_types_fall_back_to_unknown_with_payload() {
    let raw = r#"{"type":"rate_limits.updated","rate_limits":[{"name":"requests","limit":100}]}"#;
    let event: ServerEvent = serde_json::from_str(raw).expect("parses");
    match event {
        ServerEvent::Unknown(value) => {
            assert_eq!(value["type"], "rate_limits.updated");
            assert_eq!(value["rate_limits"][0]["limit"], 100);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn malformed_known_type_falls_back_to_unknown() {
    // Right discriminator, wrong body shape: preserved, not dropped.
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"response.audio_transcript.done","transcript":42}"#)
            .expect("parses");
    assert!(matches!(event, ServerEvent::Unknown(_)));
}

#[test]
fn kind_reports_the_wire_discriminator() {
    let event: ServerEvent =
        serde_json::from_str(r#"{"type":"session.updated","session":{}}"#).expect("parses");
    assert_eq!(event.kind(), Some("session.updated"));

    let unknown: ServerEvent =
        serde_json::from_str(r#"{"type":"something.else"}"#).expect("parses");
    assert_eq!(unknown.kind(), Some("something.else"));
}

use std::time::{Duration, Instant};

use futures_util::stream;
use serde_json::json;
use stream_transport::{ChunkStream, ScriptedSource, ToolPhase, TransportEvent};
use tape_stream::{
    pump, EngineSet, PumpOptions, Role, SessionHost, SessionState, StreamSession, Transcript, UiWrite,
};

#[derive(Default)]
struct RecordingHost {
    frames: usize,
    writes: Vec<UiWrite>,
}

impl RecordingHost {
    fn text_writes(&self) -> Vec<&str> {
        self.writes
            .iter()
            .filter_map(|write| match write {
                UiWrite::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl SessionHost for RecordingHost {
    fn request_frame(&mut self) {
        self.frames += 1;
    }

    fn apply(&mut self, write: UiWrite) {
        self.writes.push(write);
    }
}

fn delta(text: &str) -> TransportEvent {
    TransportEvent::Delta {
        role: "assistant".to_string(),
        delta: text.to_string(),
    }
}

fn reasoning(text: &str) -> TransportEvent {
    TransportEvent::Reasoning {
        delta: text.to_string(),
    }
}

#[test]
fn deltas_within_one_frame_produce_one_write() {
    let mut session = StreamSession::new();
    let mut host = RecordingHost::default();
    session.begin("hi", &mut host);

    for _ in 0..50 {
        session.apply(delta("x"), &mut host);
    }
    session.on_frame(&mut host);

    assert_eq!(host.frames, 1);
    assert_eq!(host.text_writes(), vec!["x".repeat(50).as_str()]);
}

#[test]
fn stop_during_reasoning_flushes_the_pending_text_once() {
    let mut session = StreamSession::new();
    let mut host = RecordingHost::default();
    let handle = session.begin("hi", &mut host);

    for part in ["one ", "two ", "three"] {
        session.apply(reasoning(part), &mut host);
    }
    assert!(session.stop(&mut host));

    assert_eq!(host.text_writes(), vec!["one two three"]);
    let reasoning = session
        .messages()
        .iter()
        .find(|message| message.role == Role::AssistantReasoning)
        .expect("reasoning message");
    assert!(reasoning.stopped);
    assert!(!reasoning.complete);
    assert!(handle.is_aborted());
    assert!(handle.is_released());
    assert_eq!(session.state(), SessionState::Aborted);

    session.on_frame(&mut host);
    assert_eq!(host.text_writes().len(), 1);
}

#[test]
fn stop_during_content_flushes_the_pending_text_once() {
    let mut session = StreamSession::new();
    let mut host = RecordingHost::default();
    session.begin("hi", &mut host);

    for part in ["a", "b", "c"] {
        session.apply(delta(part), &mut host);
    }
    session.stop(&mut host);
    session.apply(delta("late"), &mut host);
    session.on_frame(&mut host);

    assert_eq!(host.text_writes(), vec!["abc"]);
    assert_eq!(session.assistant().map(|message| message.text()), Some("abc"));
    assert!(!session.stop(&mut host));
}

#[tokio::test]
async fn scripted_turn_with_a_tool_call_reaches_the_transcript() {
    let source = ScriptedSource::new()
        .event(&delta("Let me check."))
        .event(&TransportEvent::ToolStatus {
            status: ToolPhase::Started,
            tool_call_id: "call_1".to_string(),
            function: Some("read_file".to_string()),
            arguments: Some("{\"path\":\"a.txt\"}".to_string()),
            result: None,
            result_type: None,
        })
        .event(&TransportEvent::ToolStatus {
            status: ToolPhase::Finished,
            tool_call_id: "call_1".to_string(),
            function: None,
            arguments: None,
            result: Some(json!({"ok": true, "content": "hello"})),
            result_type: None,
        })
        .event(&delta(" Done."))
        .event(&TransportEvent::Completed {})
        .rechunk(11);

    let mut session = StreamSession::new();
    let mut transcript = Transcript::new(EngineSet::raw(), Duration::from_millis(400));
    session.begin("read a.txt", &mut transcript);
    let state = pump(&mut session, &mut transcript, source.into_stream(), PumpOptions::default()).await;

    assert_eq!(state, SessionState::Completed);
    let roles: Vec<Role> = transcript.messages().iter().map(|message| message.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::ToolInvocation]);

    let acknowledgements = session.take_acknowledgements();
    assert_eq!(acknowledgements.len(), 1);
    assert!(acknowledgements[0].success);
    assert_eq!(acknowledgements[0].function, "read_file");

    let assistant = transcript.messages()[1].clone();
    assert_eq!(assistant.text(), "Let me check. Done.");
    assert_eq!(assistant.tool_calls.len(), 1);
    assert!(assistant.complete);

    let frame = transcript.render_frame(Instant::now());
    assert!(frame.iter().any(|(id, mutations)| *id == assistant.id && !mutations.is_empty()));
    let view = transcript.view(assistant.id).expect("assistant view");
    let text: String = view.committed().iter().map(|node| node.text_content()).collect();
    assert!(text.contains("Let me check. Done."));
    assert!(transcript.view(transcript.messages()[2].id).is_none());
}

#[tokio::test]
async fn abort_from_another_task_interrupts_a_pending_read() {
    let mut session = StreamSession::new();
    let mut host = RecordingHost::default();
    let handle = session.begin("hi", &mut host);
    let chunks: ChunkStream = Box::pin(stream::pending());

    let aborter = handle.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        aborter.abort();
    });

    let state = pump(&mut session, &mut host, chunks, PumpOptions::default()).await;
    task.await.expect("abort task");

    assert_eq!(state, SessionState::Aborted);
    assert!(handle.is_released());
    assert!(session.assistant().is_none());
}

#[tokio::test]
async fn tool_call_during_reasoning_completes_the_reasoning_first() {
    let source = ScriptedSource::new()
        .event(&reasoning("Need the "))
        .event(&reasoning("file."))
        .event(&TransportEvent::ToolStatus {
            status: ToolPhase::Started,
            tool_call_id: "call_7".to_string(),
            function: Some("read_file".to_string()),
            arguments: Some("{\"path\":\"b.txt\"}".to_string()),
            result: None,
            result_type: None,
        })
        .event(&TransportEvent::ToolStatus {
            status: ToolPhase::Finished,
            tool_call_id: "call_7".to_string(),
            function: None,
            arguments: None,
            result: Some(json!({"ok": true, "content": "bee"})),
            result_type: None,
        })
        .event(&delta("It says bee."))
        .event(&TransportEvent::Completed {})
        .rechunk(7);

    let mut session = StreamSession::new();
    let mut transcript = Transcript::new(EngineSet::raw(), Duration::from_millis(400));
    session.begin("read b.txt", &mut transcript);
    let state = pump(&mut session, &mut transcript, source.into_stream(), PumpOptions::default()).await;

    assert_eq!(state, SessionState::Completed);
    let roles: Vec<Role> = transcript.messages().iter().map(|message| message.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::AssistantReasoning, Role::Assistant, Role::ToolInvocation]
    );

    let reasoning = &transcript.messages()[1];
    assert!(reasoning.complete);
    assert!(!reasoning.stopped);
    assert_eq!(reasoning.text(), "Need the file.");
    assert_eq!(transcript.messages()[2].text(), "It says bee.");
}

#[test]
fn reasoning_is_marked_complete_before_the_tool_card_is_inserted() {
    let mut session = StreamSession::new();
    let mut host = RecordingHost::default();
    session.begin("hi", &mut host);

    session.apply(reasoning("thinking"), &mut host);
    session.apply(
        TransportEvent::ToolStatus {
            status: ToolPhase::Started,
            tool_call_id: "call_2".to_string(),
            function: Some("list_dir".to_string()),
            arguments: None,
            result: None,
            result_type: None,
        },
        &mut host,
    );

    let completed = host
        .writes
        .iter()
        .position(|write| {
            matches!(write, UiWrite::Update(message)
                if message.role == Role::AssistantReasoning && message.complete)
        })
        .expect("reasoning completion");
    let card = host
        .writes
        .iter()
        .position(|write| matches!(write, UiWrite::Insert(message) if message.role == Role::ToolInvocation))
        .expect("tool card insert");
    assert!(completed < card);
    assert_eq!(host.text_writes(), vec!["thinking"]);
}

//! Streaming session state machine.
//!
//! The session owns the message list for one conversation and turns transport
//! events into UI writes. Text deltas are coalesced per display frame: a delta
//! only marks its message dirty and asks the host for a frame; the frame
//! callback writes the latest text once.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use stream_transport::{ReadHandle, ToolPhase, TransportError, TransportEvent};

pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    AssistantReasoning,
    ToolInvocation,
    SystemError,
}

/// Tool call declared on an assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub function: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCard {
    pub call_id: String,
    pub function: String,
    pub arguments: String,
    pub state: ToolState,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// `None` while an assistant message only carries tool calls.
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool: Option<ToolCard>,
    pub complete: bool,
    /// Ended by an explicit stop rather than by the stream.
    pub stopped: bool,
}

impl Message {
    fn new(id: MessageId, role: Role, content: Option<String>) -> Self {
        Self {
            id,
            role,
            content,
            tool_calls: Vec::new(),
            tool: None,
            complete: false,
            stopped: false,
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingFirstToken,
    Reasoning,
    Content,
    ToolRunning,
    Completed,
    Error,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error | SessionState::Aborted)
    }

    /// A turn is in flight and may still receive events.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != SessionState::Idle
    }
}

/// One mutation of the host's message list.
#[derive(Debug, Clone, PartialEq)]
pub enum UiWrite {
    Insert(Message),
    /// Latest accumulated text of a streaming message.
    Text { id: MessageId, text: String },
    /// Lifecycle or tool state changed.
    Update(Message),
    Reset,
}

pub trait SessionHost {
    /// Asks for one `on_frame` call at the next display frame.
    fn request_frame(&mut self);

    fn apply(&mut self, write: UiWrite);
}

/// Record sent back over the transport once a tool call finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAcknowledgement {
    pub tool_call_id: String,
    pub function: String,
    pub success: bool,
    pub content: String,
}

const FAILURE_PREFIXES: &[&str] = &["error", "failed", "failure", "exception", "fatal"];

#[derive(Debug)]
pub struct StreamSession {
    state: SessionState,
    messages: Vec<Message>,
    next_id: MessageId,
    reasoning: Option<MessageId>,
    assistant: Option<MessageId>,
    tools: HashMap<String, MessageId>,
    dirty: Vec<MessageId>,
    frame_requested: bool,
    acknowledgements: Vec<ToolAcknowledgement>,
    handle: ReadHandle,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            messages: Vec::new(),
            next_id: 1,
            reasoning: None,
            assistant: None,
            tools: HashMap::new(),
            dirty: Vec::new(),
            frame_requested: false,
            acknowledgements: Vec::new(),
            handle: ReadHandle::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn assistant(&self) -> Option<&Message> {
        self.assistant.and_then(|id| self.message(id))
    }

    /// Handle for the current turn's transport read.
    pub fn read_handle(&self) -> ReadHandle {
        self.handle.clone()
    }

    /// True while coalesced text is waiting for the next frame.
    pub fn frame_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn acknowledgements(&self) -> &[ToolAcknowledgement] {
        &self.acknowledgements
    }

    pub fn take_acknowledgements(&mut self) -> Vec<ToolAcknowledgement> {
        std::mem::take(&mut self.acknowledgements)
    }

    /// Starts a turn with the user's message. An active turn is stopped first.
    pub fn begin(&mut self, user_text: impl Into<String>, host: &mut dyn SessionHost) -> ReadHandle {
        if self.state.is_active() {
            self.stop(host);
        }

        self.handle = ReadHandle::new();
        self.reasoning = None;
        self.assistant = None;
        self.tools.clear();

        let id = self.push(Role::User, Some(user_text.into()));
        if let Some(message) = self.message_mut(id) {
            message.complete = true;
        }
        self.insert(id, host);
        self.state = SessionState::AwaitingFirstToken;
        self.handle.clone()
    }

    /// Applies one transport event. Events after a terminal state are dropped.
    pub fn apply(&mut self, event: TransportEvent, host: &mut dyn SessionHost) {
        if self.state.is_terminal() {
            tracing::trace!(event = event.type_name(), state = ?self.state, "event after terminal state dropped");
            return;
        }

        match event {
            TransportEvent::Reasoning { delta } => self.on_reasoning(&delta, host),
            TransportEvent::Delta { role, delta } => {
                if role != "assistant" {
                    tracing::trace!(role = %role, "delta role folded into assistant content");
                }
                self.on_content(&delta, host);
            }
            TransportEvent::ToolStatus {
                status: ToolPhase::Started,
                tool_call_id,
                function,
                arguments,
                ..
            } => self.on_tool_started(tool_call_id, function, arguments, host),
            TransportEvent::ToolStatus {
                status: ToolPhase::Finished,
                tool_call_id,
                function,
                result,
                result_type,
                ..
            } => self.on_tool_finished(&tool_call_id, function, result, result_type.as_deref(), host),
            TransportEvent::Completed {} => self.complete(host),
            TransportEvent::Error { error } => self.fail(error, host),
        }
    }

    /// Frame callback: writes the latest text of every dirty message.
    pub fn on_frame(&mut self, host: &mut dyn SessionHost) {
        self.flush(host);
    }

    /// Explicit cancellation. A no-op once the turn has ended.
    ///
    /// Returns true when a running turn was actually stopped.
    pub fn stop(&mut self, host: &mut dyn SessionHost) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.handle.abort();
        self.halt(host);
        true
    }

    /// The transport read failed. Aborts end the turn silently; anything else
    /// keeps the partial content and appends one visible error.
    pub fn fail_transport(&mut self, error: &TransportError, host: &mut dyn SessionHost) {
        if self.state.is_terminal() {
            return;
        }
        if error.is_abort() {
            self.halt(host);
            return;
        }
        tracing::warn!(%error, "transport failed mid-stream");
        self.fail(error.to_string(), host);
    }

    /// The transport ended without a terminal record.
    pub fn finish_transport(&mut self, host: &mut dyn SessionHost) {
        if self.state.is_active() || self.state == SessionState::Idle {
            self.complete(host);
        } else {
            self.handle.release();
        }
    }

    /// Drops the whole conversation.
    pub fn reset(&mut self, host: &mut dyn SessionHost) {
        if self.state.is_active() {
            self.handle.abort();
        }
        self.messages.clear();
        self.reasoning = None;
        self.assistant = None;
        self.tools.clear();
        self.dirty.clear();
        self.frame_requested = false;
        self.acknowledgements.clear();
        self.state = SessionState::Idle;
        host.apply(UiWrite::Reset);
    }

    fn on_reasoning(&mut self, delta: &str, host: &mut dyn SessionHost) {
        let id = match self.reasoning {
            Some(id) => id,
            None => {
                let id = self.push(Role::AssistantReasoning, Some(String::new()));
                self.insert(id, host);
                self.reasoning = Some(id);
                id
            }
        };
        self.append(id, delta, host);
        self.state = SessionState::Reasoning;
    }

    fn on_content(&mut self, delta: &str, host: &mut dyn SessionHost) {
        self.complete_reasoning(host);
        let id = self.ensure_assistant(host);
        self.append(id, delta, host);
        self.state = SessionState::Content;
    }

    fn on_tool_started(
        &mut self,
        call_id: String,
        function: Option<String>,
        arguments: Option<String>,
        host: &mut dyn SessionHost,
    ) {
        self.complete_reasoning(host);
        self.flush(host);

        let function = function.unwrap_or_default();
        let arguments = arguments.unwrap_or_default();
        let assistant = self.ensure_assistant(host);
        if let Some(message) = self.message_mut(assistant) {
            message.tool_calls.push(ToolCall {
                id: call_id.clone(),
                function: function.clone(),
                arguments: arguments.clone(),
            });
        }
        self.update(assistant, host);

        let card = self.push(Role::ToolInvocation, None);
        if let Some(message) = self.message_mut(card) {
            message.tool = Some(ToolCard {
                call_id: call_id.clone(),
                function,
                arguments,
                state: ToolState::Running,
                result: None,
            });
        }
        self.insert(card, host);
        self.tools.insert(call_id, card);
        self.state = SessionState::ToolRunning;
    }

    fn on_tool_finished(
        &mut self,
        call_id: &str,
        function: Option<String>,
        result: Option<Value>,
        result_type: Option<&str>,
        host: &mut dyn SessionHost,
    ) {
        let Some(&card) = self.tools.get(call_id) else {
            tracing::warn!(tool_call_id = call_id, "tool result for unknown call");
            return;
        };

        let success = classify_tool_result(result.as_ref(), result_type);
        let content = result.as_ref().map(result_text).unwrap_or_default();
        let mut acknowledged_function = function.unwrap_or_default();
        if let Some(tool) = self.message_mut(card).and_then(|message| {
            message.complete = true;
            message.tool.as_mut()
        }) {
            tool.state = if success {
                ToolState::Succeeded
            } else {
                ToolState::Failed
            };
            tool.result = result;
            if acknowledged_function.is_empty() {
                acknowledged_function = tool.function.clone();
            }
        }
        self.update(card, host);

        self.acknowledgements.push(ToolAcknowledgement {
            tool_call_id: call_id.to_string(),
            function: acknowledged_function,
            success,
            content,
        });

        let running = self.messages.iter().any(|message| {
            message
                .tool
                .as_ref()
                .is_some_and(|tool| tool.state == ToolState::Running)
        });
        self.state = if running {
            SessionState::ToolRunning
        } else {
            SessionState::Content
        };
    }

    fn complete(&mut self, host: &mut dyn SessionHost) {
        self.flush(host);
        self.complete_reasoning(host);
        if let Some(id) = self.assistant {
            if let Some(message) = self.message_mut(id) {
                message.complete = true;
            }
            self.update(id, host);
        }
        self.handle.release();
        self.state = SessionState::Completed;
    }

    fn fail(&mut self, error: String, host: &mut dyn SessionHost) {
        self.flush(host);
        self.complete_reasoning(host);
        if let Some(id) = self.assistant {
            if let Some(message) = self.message_mut(id) {
                message.complete = true;
            }
            self.update(id, host);
        }
        let id = self.push(Role::SystemError, Some(error));
        if let Some(message) = self.message_mut(id) {
            message.complete = true;
        }
        self.insert(id, host);
        self.handle.release();
        self.state = SessionState::Error;
    }

    /// Shared tail of stop and transport aborts.
    fn halt(&mut self, host: &mut dyn SessionHost) {
        self.flush(host);
        if let Some(id) = self.reasoning.take() {
            if let Some(message) = self.message_mut(id) {
                message.stopped = true;
            }
            self.update(id, host);
        }
        if let Some(id) = self.assistant {
            if let Some(message) = self.message_mut(id) {
                message.stopped = true;
            }
            self.update(id, host);
        }
        self.handle.release();
        self.state = SessionState::Aborted;
    }

    fn complete_reasoning(&mut self, host: &mut dyn SessionHost) {
        let Some(id) = self.reasoning.take() else {
            return;
        };
        self.flush(host);
        if let Some(message) = self.message_mut(id) {
            message.complete = true;
        }
        self.update(id, host);
    }

    fn ensure_assistant(&mut self, host: &mut dyn SessionHost) -> MessageId {
        if let Some(id) = self.assistant {
            return id;
        }
        let id = self.push(Role::Assistant, None);
        self.insert(id, host);
        self.assistant = Some(id);
        id
    }

    fn append(&mut self, id: MessageId, delta: &str, host: &mut dyn SessionHost) {
        if let Some(message) = self.message_mut(id) {
            message.content.get_or_insert_with(String::new).push_str(delta);
        }
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
        if !self.frame_requested {
            self.frame_requested = true;
            host.request_frame();
        }
    }

    fn flush(&mut self, host: &mut dyn SessionHost) {
        self.frame_requested = false;
        for id in std::mem::take(&mut self.dirty) {
            if let Some(message) = self.message(id) {
                host.apply(UiWrite::Text {
                    id,
                    text: message.text().to_string(),
                });
            }
        }
    }

    fn push(&mut self, role: Role, content: Option<String>) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message::new(id, role, content));
        id
    }

    fn insert(&self, id: MessageId, host: &mut dyn SessionHost) {
        if let Some(message) = self.message(id) {
            host.apply(UiWrite::Insert(message.clone()));
        }
    }

    fn update(&self, id: MessageId, host: &mut dyn SessionHost) {
        if let Some(message) = self.message(id) {
            host.apply(UiWrite::Update(message.clone()));
        }
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }
}

/// Success of a finished tool call.
///
/// A declared shape wins: `result_type: "error"`, a boolean result, or an
/// object with a `success`/`ok` flag or a non-null `error`. Text payloads fall
/// back to matching failure markers.
pub fn classify_tool_result(result: Option<&Value>, result_type: Option<&str>) -> bool {
    if result_type.is_some_and(|kind| kind.trim().eq_ignore_ascii_case("error")) {
        return false;
    }

    match result {
        None | Some(Value::Null) => true,
        Some(Value::Bool(ok)) => *ok,
        Some(Value::Object(map)) => {
            let declared = map
                .get("success")
                .or_else(|| map.get("ok"))
                .and_then(Value::as_bool);
            match declared {
                Some(flag) => flag,
                None => matches!(map.get("error"), None | Some(Value::Null)),
            }
        }
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => classify_tool_result(Some(&parsed), None),
            _ => !looks_like_failure(text),
        },
        Some(_) => true,
    }
}

fn looks_like_failure(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    FAILURE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        || lower.contains("traceback (most recent call last)")
}

fn result_text(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

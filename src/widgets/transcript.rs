//! Host-side message list fed by a [`StreamSession`](crate::runtime::StreamSession).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::EnvConfig;
use crate::core::Phase;
use crate::render::engine::EngineSet;
use crate::runtime::session::{Message, MessageId, Role, SessionHost, UiWrite};
use crate::tree::reconcile::Mutation;
use crate::widgets::message_view::MessageView;

/// Applies session writes and owns one [`MessageView`] per assistant or
/// reasoning message.
#[derive(Debug)]
pub struct Transcript {
    engines: EngineSet,
    fade_window: Duration,
    messages: Vec<Message>,
    views: HashMap<MessageId, MessageView>,
    frame_requested: bool,
    frame_requests: usize,
    writes: usize,
}

impl Transcript {
    pub fn new(engines: EngineSet, fade_window: Duration) -> Self {
        Self {
            engines,
            fade_window,
            messages: Vec::new(),
            views: HashMap::new(),
            frame_requested: false,
            frame_requests: 0,
            writes: 0,
        }
    }

    /// Built-in engines and the fade window from `config`.
    pub fn from_config(config: &EnvConfig) -> Self {
        Self::new(EngineSet::builtin(config), config.fade_window)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn view(&self, id: MessageId) -> Option<&MessageView> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: MessageId) -> Option<&mut MessageView> {
        self.views.get_mut(&id)
    }

    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    pub fn frame_requests(&self) -> usize {
        self.frame_requests
    }

    /// Writes applied since creation or the last reset.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Runs a pass for every view that needs one, in message order.
    pub fn render_frame(&mut self, now: Instant) -> Vec<(MessageId, Vec<Mutation>)> {
        self.frame_requested = false;
        let mut frame = Vec::new();
        for message in &self.messages {
            let Some(view) = self.views.get_mut(&message.id) else {
                continue;
            };
            if let Some(mutations) = view.render(now) {
                frame.push((message.id, mutations));
            }
        }
        frame
    }

    /// Tears down every view together with its caches and committed tree.
    pub fn reset(&mut self) {
        for view in self.views.values_mut() {
            view.reset();
        }
        self.views.clear();
        self.messages.clear();
        self.frame_requested = false;
        self.writes = 0;
    }

    fn upsert(&mut self, message: Message) {
        if renders_rich(message.role) {
            let engines = &self.engines;
            let window = self.fade_window;
            let view = self
                .views
                .entry(message.id)
                .or_insert_with(|| MessageView::new(message.id, engines.clone(), window));
            view.set_text(message.text());
            view.set_phase(phase_of(&message));
        }

        match self.messages.iter_mut().find(|existing| existing.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    fn set_text(&mut self, id: MessageId, text: String) {
        if let Some(view) = self.views.get_mut(&id) {
            view.set_text(text.as_str());
        }
        if let Some(message) = self.messages.iter_mut().find(|message| message.id == id) {
            message.content = Some(text);
        }
    }
}

impl SessionHost for Transcript {
    fn request_frame(&mut self) {
        self.frame_requested = true;
        self.frame_requests += 1;
    }

    fn apply(&mut self, write: UiWrite) {
        self.writes += 1;
        match write {
            UiWrite::Insert(message) | UiWrite::Update(message) => self.upsert(message),
            UiWrite::Text { id, text } => self.set_text(id, text),
            UiWrite::Reset => self.reset(),
        }
    }
}

fn renders_rich(role: Role) -> bool {
    matches!(role, Role::Assistant | Role::AssistantReasoning)
}

fn phase_of(message: &Message) -> Phase {
    if message.complete || message.stopped {
        Phase::Finished
    } else {
        Phase::Streaming
    }
}

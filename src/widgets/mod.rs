//! Host glue: per-message views and the transcript that owns them.

pub mod message_view;
pub mod transcript;

pub use message_view::MessageView;
pub use transcript::Transcript;

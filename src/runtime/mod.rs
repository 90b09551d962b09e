//! Streaming runtime: the session state machine, the transport pump and the
//! fade tracker.

use std::sync::{Mutex, MutexGuard};

pub mod driver;
pub mod fade;
pub mod session;

pub use driver::{pump, PumpOptions};
pub use fade::{Chunk, FadeTracker};
pub use session::{
    Message, MessageId, Role, SessionHost, SessionState, StreamSession, ToolAcknowledgement, ToolCall,
    ToolCard, ToolState, UiWrite,
};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

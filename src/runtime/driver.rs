//! Transport pump: feeds decoded records into a [`StreamSession`].
//!
//! The pump stands in for the host's display frame while it runs: coalesced
//! text is written at most once per `frame_interval`. The chunk read is the
//! only suspension point and is raced against the session's abort flag.

use std::time::Duration;

use futures_util::StreamExt;
use stream_transport::{ChunkStream, RecordDecoder};
use tokio::time::Instant;

use crate::runtime::session::{SessionHost, SessionState, StreamSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOptions {
    pub frame_interval: Duration,
    /// Upper bound on how long a pending read can hide an abort.
    pub abort_poll: Duration,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            abort_poll: Duration::from_millis(25),
        }
    }
}

/// Drives one turn until it completes, fails, runs out of input or is
/// aborted through the session's read handle. Returns the final state.
pub async fn pump(
    session: &mut StreamSession,
    host: &mut dyn SessionHost,
    mut chunks: ChunkStream,
    options: PumpOptions,
) -> SessionState {
    let handle = session.read_handle();
    let mut decoder = RecordDecoder::default();
    let mut next_frame: Option<Instant> = None;

    loop {
        if handle.is_aborted() {
            session.stop(host);
            break;
        }
        if session.state().is_terminal() {
            break;
        }

        if session.frame_pending() {
            let due = *next_frame.get_or_insert_with(|| Instant::now() + options.frame_interval);
            if Instant::now() >= due {
                session.on_frame(host);
                next_frame = None;
                continue;
            }
        } else {
            next_frame = None;
        }

        let wait = match next_frame {
            Some(due) => due.saturating_duration_since(Instant::now()).min(options.abort_poll),
            None => options.abort_poll,
        };

        match tokio::time::timeout(wait, chunks.next()).await {
            Err(_) => continue,
            Ok(Some(Ok(bytes))) => {
                for event in decoder.feed(&bytes) {
                    session.apply(event, host);
                }
            }
            Ok(Some(Err(error))) => {
                session.fail_transport(&error, host);
                break;
            }
            Ok(None) => {
                for event in decoder.finish() {
                    session.apply(event, host);
                }
                session.finish_transport(host);
                break;
            }
        }
    }

    if decoder.skipped() > 0 {
        tracing::debug!(skipped = decoder.skipped(), "malformed transport records skipped");
    }
    session.state()
}

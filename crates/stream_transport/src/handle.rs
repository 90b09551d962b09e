use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct HandleState {
    aborted: AtomicBool,
    released: AtomicBool,
}

/// Shared abort flag for one transport read loop.
///
/// Cloning shares the flag. `abort` may be called from any callback at any
/// time; the read handle is released exactly once no matter how many times
/// `abort` or `release` run or which of them wins a race.
#[derive(Debug, Clone, Default)]
pub struct ReadHandle {
    state: Arc<HandleState>,
}

impl ReadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the read loop to stop and releases the handle.
    ///
    /// Returns true only for the call that actually released it.
    pub fn abort(&self) -> bool {
        self.state.aborted.store(true, Ordering::Release);
        self.release()
    }

    /// Releases the handle without marking it aborted (normal completion).
    pub fn release(&self) -> bool {
        let first = !self.state.released.swap(true, Ordering::AcqRel);
        if first {
            tracing::trace!("transport read handle released");
        }
        first
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::ReadHandle;

    #[test]
    fn release_is_idempotent() {
        let handle = ReadHandle::new();
        assert!(handle.release());
        assert!(!handle.release());
        assert!(!handle.abort());
        assert!(handle.is_aborted());
    }

    #[test]
    fn racing_aborts_release_exactly_once() {
        let handle = ReadHandle::new();
        let releases: usize = (0..8)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || handle.abort())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|join| usize::from(join.join().expect("abort thread panicked")))
            .sum();

        assert_eq!(releases, 1);
        assert!(handle.is_released());
    }
}

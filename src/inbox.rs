use log::debug;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Single slot mailbox between the receive thread and consumers.
///
/// Publishing overwrites a frame nobody has taken yet, so a slow consumer only ever sees
/// the most recent frame.
#[derive(Default)]
pub struct Inbox {
    slot: Mutex<Option<Vec<u8>>>,
    ready: Condvar,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, frame: Vec<u8>) {
        let mut slot = self.lock();
        if let Some(old) = slot.replace(frame) {
            debug!("Inbox: dropped unread frame of {} bytes.", old.len());
        }
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a frame and take it out of the slot.
    ///
    /// Returns at once if a frame is already waiting.
    pub fn take(&self, timeout: Duration) -> Option<Vec<u8>> {
        let slot = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |frame| frame.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

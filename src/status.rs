//! Ephemeral status reporting.
//!
//! One human-readable status line shared by every operation in the
//! manager. Last writer wins; there is no queue and no history beyond
//! the single previous value a transient status reverts to.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Holds the current status string and an optional pending revert.
///
/// Cheap to clone; all clones share the same value. A transient status
/// schedules a revert to the value held immediately before the call.
/// Any later mutation cancels a pending revert, so a superseded timer
/// can never clobber newer state.
#[derive(Clone)]
pub struct StatusBroadcaster {
    inner: Arc<StatusInner>,
}

struct StatusInner {
    current: Mutex<String>,
    revert_task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatusInner {
                current: Mutex::new(String::new()),
                revert_task: Mutex::new(None),
            }),
        }
    }

    /// The current status message.
    pub fn current(&self) -> String {
        self.inner.current.lock().expect("status poisoned").clone()
    }

    /// Replace the current status, returning the previous value.
    pub fn set(&self, message: impl Into<String>) -> String {
        self.cancel_pending_revert();
        self.swap(message.into())
    }

    /// Show `message`, then revert to the value held immediately before
    /// this call once `revert_after` has elapsed.
    ///
    /// Must be called from within a tokio runtime. The revert is
    /// cancelled if any other mutation happens first.
    pub fn set_transient(&self, message: impl Into<String>, revert_after: Duration) {
        self.cancel_pending_revert();
        let previous = self.swap(message.into());

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(revert_after).await;
            *inner.current.lock().expect("status poisoned") = previous;
        });
        *self
            .inner
            .revert_task
            .lock()
            .expect("status revert poisoned") = Some(handle);
    }

    fn swap(&self, message: String) -> String {
        let mut current = self.inner.current.lock().expect("status poisoned");
        std::mem::replace(&mut *current, message)
    }

    fn cancel_pending_revert(&self) {
        if let Some(handle) = self
            .inner
            .revert_task
            .lock()
            .expect("status revert poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_value() {
        let status = StatusBroadcaster::new();
        assert_eq!(status.set("first"), "");
        assert_eq!(status.set("second"), "first");
        assert_eq!(status.current(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_reverts_after_delay() {
        let status = StatusBroadcaster::new();
        status.set("idle");
        status.set_transient("busy", Duration::from_millis(100));
        assert_eq!(status.current(), "busy");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(status.current(), "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn later_set_cancels_pending_revert() {
        let status = StatusBroadcaster::new();
        status.set("idle");
        status.set_transient("busy", Duration::from_millis(100));
        status.set("done");

        tokio::time::sleep(Duration::from_millis(200)).await;
        // The old timer must not resurrect "idle".
        assert_eq!(status.current(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_reverts_to_value_before_the_call() {
        let status = StatusBroadcaster::new();
        status.set("a");
        status.set_transient("b", Duration::from_millis(50));
        status.set_transient("c", Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The second transient captured "b" and its revert survives;
        // the first revert (to "a") was cancelled.
        assert_eq!(status.current(), "b");
    }
}

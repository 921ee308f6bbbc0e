//! Pause gate: the loop's single suspension point for pause/resume.

use tokio::sync::watch;

/// A closable gate the loop waits on while paused.
///
/// Closing an already closed gate and opening an open one are no-ops, so a
/// second `pause()` never replaces the pending wait.
pub(super) struct PauseGate {
    paused: watch::Sender<bool>,
}

impl PauseGate {
    pub(super) fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    /// Returns `true` if the gate was open.
    pub(super) fn close(&self) -> bool {
        self.paused.send_if_modified(|paused| {
            if *paused {
                false
            } else {
                *paused = true;
                true
            }
        })
    }

    /// Returns `true` if the gate was closed.
    pub(super) fn open(&self) -> bool {
        self.paused.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        })
    }

    pub(super) fn is_closed(&self) -> bool {
        *self.paused.borrow()
    }

    /// Resolves once the gate is open.
    pub(super) async fn wait_open(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_close_and_open_are_idempotent() {
        let gate = PauseGate::new();
        assert!(!gate.is_closed());
        assert!(gate.close());
        assert!(!gate.close());
        assert!(gate.is_closed());
        assert!(gate.open());
        assert!(!gate.open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_open_blocks_until_opened() {
        let gate = Arc::new(PauseGate::new());
        gate.close();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_open().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        gate.open();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_open_returns_immediately_when_open() {
        PauseGate::new().wait_open().await;
    }
}

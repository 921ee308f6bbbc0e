//! Per-state timeout timer.

use super::StateMachine;
use ralph_domain::SupervisorState;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

impl StateMachine {
    /// Arm the timeout configured for `state`, if any.
    ///
    /// The timer holds only a weak handle and fires only if the machine is
    /// still in `state` at `generation`. Without a tokio runtime no timer is
    /// armed.
    pub(super) fn arm_timeout(&self, state: SupervisorState, generation: u64) {
        let Some(after) = self.shared.config.timeout_for(state) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(state = %state, "No async runtime; state timeout not armed");
            return;
        };

        let weak = self.downgrade();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let Some(machine) = weak.upgrade() else {
                return;
            };
            let fired = std::panic::catch_unwind(AssertUnwindSafe(|| {
                machine.fail_on_timeout(state, generation, after)
            }));
            if fired.is_err() {
                warn!(state = %state, "Callback panicked while handling a state timeout");
            }
        });

        let mut inner = self.inner();
        if inner.state == state && inner.generation == generation {
            inner.cancel_timer();
            inner.timer = Some(timer);
        } else {
            timer.abort();
        }
    }
}

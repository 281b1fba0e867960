//! Debounce coordinator
//!
//! Sits between the filter store and the fetch layer. Rapid edits (every
//! keystroke in the brand filter, every drag of the date slider) restart
//! a quiet-period timer; only when the stream goes silent for the
//! configured window does the latest snapshot get republished as
//! "settled". Trailing edge only: there is no leading emission.
//!
//! One logical consumer per coordinator. Dropping the coordinator (or
//! calling `shutdown`) cancels any pending timer so nothing is emitted
//! after teardown.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::snapshot::FilterSnapshot;

/// Debounce state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DebouncePhase {
    /// No edit since the last settle (or since startup)
    Idle = 0,
    /// An edit arrived and the quiet-period timer is running
    Pending = 1,
    /// The timer elapsed and the latest snapshot was republished
    Settled = 2,
}

impl DebouncePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DebouncePhase::Pending,
            2 => DebouncePhase::Settled,
            _ => DebouncePhase::Idle,
        }
    }
}

/// Trailing-edge debounce over a stream of filter snapshots
pub struct DebounceCoordinator {
    settled_rx: watch::Receiver<FilterSnapshot>,
    phase: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl DebounceCoordinator {
    /// Spawn the debounce task over the store's update stream. The
    /// settled value starts as whatever the input currently holds.
    pub fn spawn(mut input: watch::Receiver<FilterSnapshot>, quiet_period: Duration) -> Self {
        let initial = input.borrow_and_update().clone();
        let (settled_tx, settled_rx) = watch::channel(initial);
        let phase = Arc::new(AtomicU8::new(DebouncePhase::Idle as u8));
        let cancel = CancellationToken::new();

        let task_phase = phase.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                // Wait for the first edit of a burst
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    changed = input.changed() => {
                        if changed.is_err() {
                            // Store dropped; nothing more will arrive
                            break;
                        }
                    }
                }

                task_phase.store(DebouncePhase::Pending as u8, Ordering::SeqCst);

                // Restart the quiet-period timer on every further edit
                loop {
                    tokio::select! {
                        _ = task_cancel.cancelled() => return,
                        _ = tokio::time::sleep(quiet_period) => {
                            let snapshot = input.borrow_and_update().clone();
                            log::debug!(
                                "filter edits settled at revision {}",
                                snapshot.revision
                            );
                            settled_tx.send_replace(snapshot);
                            task_phase.store(DebouncePhase::Settled as u8, Ordering::SeqCst);
                            break;
                        }
                        changed = input.changed() => {
                            if changed.is_err() {
                                // Teardown mid-burst: do not emit
                                task_phase.store(DebouncePhase::Idle as u8, Ordering::SeqCst);
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self {
            settled_rx,
            phase,
            cancel,
        }
    }

    /// The most recent settled snapshot
    pub fn settled(&self) -> FilterSnapshot {
        self.settled_rx.borrow().clone()
    }

    /// Subscribe to settled snapshots
    pub fn subscribe(&self) -> watch::Receiver<FilterSnapshot> {
        self.settled_rx.clone()
    }

    pub fn phase(&self) -> DebouncePhase {
        DebouncePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// True while edits are being held back by the quiet-period timer,
    /// for UI feedback (spinner next to the filter bar)
    pub fn is_debouncing(&self) -> bool {
        self.phase() == DebouncePhase::Pending
    }

    /// Cancel the debounce task. Any pending timer is dropped without
    /// emitting.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DebounceCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

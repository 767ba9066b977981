// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Listener dispatch for token availability changes.
//!
//! Listeners observe transitions into and out of the closed state.  They
//! are invoked from a dedicated notifier thread, never from the pool's
//! critical section: a listener is expected to call back into the pool
//! (typically `tokens()`) and would deadlock if fired under the pool lock.
//!
//! The wakeup channel is bounded and lossy.  Listeners carry no payload
//! and must re-read the pool state anyway, so coalescing or dropping
//! wakeups under load is harmless.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::debug;

type Listener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Pending-wakeup capacity.  One slot would do; a little slack keeps
/// bursts from dropping the final wakeup of a quiet period.
const WAKEUP_QUEUE_DEPTH: usize = 16;

pub(crate) struct ChangeNotifier {
    listeners: Arc<Mutex<Vec<Listener>>>,
    wakeup: SyncSender<()>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let listeners: Arc<Mutex<Vec<Listener>>> = Arc::new(Mutex::new(Vec::new()));
        let (wakeup, wakeups) = mpsc::sync_channel::<()>(WAKEUP_QUEUE_DEPTH);

        let worker_listeners = Arc::clone(&listeners);
        thread::spawn(move || {
            // exits when the pool (and with it the sender) is dropped
            while wakeups.recv().is_ok() {
                let snapshot: Vec<Listener> = worker_listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for listener in snapshot {
                    listener();
                }
            }
            debug!("Token change notifier stopped");
        });

        Self { listeners, wakeup }
    }

    pub(crate) fn add(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Queue a wakeup without blocking.  A full queue means the notifier
    /// thread already has wakeups pending; the dropped one is redundant.
    pub(crate) fn notify(&self) {
        match self.wakeup.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                debug!("Token change notifier is gone, dropping wakeup");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn listeners_run_off_thread() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let (done, woken) = mpsc::channel();

        let listener_hits = Arc::clone(&hits);
        notifier.add(move || {
            listener_hits.fetch_add(1, Ordering::SeqCst);
            let _ = done.send(());
        });

        notifier.notify();
        woken.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn notify_without_listeners_is_fine() {
        let notifier = ChangeNotifier::new();
        for _ in 0..100 {
            notifier.notify();
        }
    }
}

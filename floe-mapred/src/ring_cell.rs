use std::sync::Arc;

use floe_cluster::Ring;
use tokio::sync::{Notify, OnceCell};

/// The rendezvous between a worker's term watcher and one MapRed process's
/// sub-tasks: first ring wins, later updates are discarded. `set` is
/// non-blocking and silently ignored once a ring has already been
/// delivered; `wait` blocks until the first successful `set`.
#[derive(Default)]
pub struct RingCell {
    ring: OnceCell<Arc<Ring>>,
    notify: Notify,
}

impl RingCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking; a no-op if a ring has already been set.
    pub fn set(&self, ring: Arc<Ring>) {
        if self.ring.set(ring).is_ok() {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) -> Arc<Ring> {
        loop {
            if let Some(ring) = self.ring.get() {
                return ring.clone();
            }
            let notified = self.notify.notified();
            if let Some(ring) = self.ring.get() {
                return ring.clone();
            }
            notified.await;
        }
    }

    pub fn get(&self) -> Option<Arc<Ring>> {
        self.ring.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_sets_are_ignored() {
        let cell = RingCell::new();
        let r1 = Arc::new(Ring::new(&["a".to_string()]).unwrap());
        let r2 = Arc::new(Ring::new(&["b".to_string()]).unwrap());
        cell.set(r1.clone());
        cell.set(r2);
        let got = cell.wait().await;
        assert_eq!(got.peer_for_key("x"), r1.peer_for_key("x"));
    }

    #[tokio::test]
    async fn wait_unblocks_once_a_ring_arrives() {
        let cell = Arc::new(RingCell::new());
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait().await })
        };
        tokio::task::yield_now().await;
        cell.set(Arc::new(Ring::new(&["only".to_string()]).unwrap()));
        let ring = waiter.await.unwrap();
        assert_eq!(ring.peer_for_key("any"), "only");
    }
}

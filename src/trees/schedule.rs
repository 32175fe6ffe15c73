use crate::events::{EventSink, TreeKind};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A single pending "refresh this tree later" timer.
///
/// Scheduling while a timer is pending aborts it and starts over, so at
/// most one refresh is ever queued.
pub struct DelayedRefresh {
    tree: TreeKind,
    delay: Duration,
    events: EventSink,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedRefresh {
    pub fn new(tree: TreeKind, delay: Duration, events: EventSink) -> Self {
        Self {
            tree,
            delay,
            events,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&self) {
        let mut pending = self.slot();
        if let Some(previous) = pending.take()
            && !previous.is_finished()
        {
            debug!("rescheduling pending {} refresh", self.tree.title());
            previous.abort();
        }

        let events = self.events.clone();
        let tree = self.tree;
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.refresh(tree);
        }));
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.slot().take() {
            previous.abort();
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DelayedRefresh {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::DelayedRefresh;
    use crate::events::{EventSink, TreeKind, ViewEvent};
    use std::time::Duration;

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_timer() {
        let (events, mut rx) = EventSink::channel();
        let timer = DelayedRefresh::new(TreeKind::Environments, Duration::from_millis(40), events);

        timer.schedule();
        tokio::time::sleep(Duration::from_millis(10)).await;
        timer.schedule();
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ViewEvent::Refresh(TreeKind::Environments))
        ));
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_pending());
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (events, mut rx) = EventSink::channel();
        let timer = DelayedRefresh::new(TreeKind::Environments, Duration::from_millis(20), events);

        timer.schedule();
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(rx.try_recv().is_err());
    }
}

//! Subscriber fan-out: one live subscriber per scan, keepalive ticks

use crate::types::{ScanEvent, ScanEventKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Tracks the single live subscriber of each scan
///
/// Claiming a scan that already has a live subscriber preempts the old one:
/// its cancellation flag flips and its stream ends.
#[derive(Default)]
pub struct SubscriberRegistry {
    live: Arc<Mutex<HashMap<String, (u64, watch::Sender<bool>)>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// New empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the live slot for a scan, preempting any previous subscriber
    pub fn claim(&self, scan_id: &str) -> SubscriberSlot {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = watch::channel(false);
        let previous = self
            .live
            .lock()
            .unwrap()
            .insert(scan_id.to_string(), (id, tx));
        if let Some((old_id, old_tx)) = previous {
            debug!("Preempting subscriber {} of scan {}", old_id, scan_id);
            let _ = old_tx.send(true);
        }
        SubscriberSlot {
            scan_id: scan_id.to_string(),
            id,
            cancelled: rx,
            live: self.live.clone(),
        }
    }

    /// Number of scans with a live subscriber
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

/// Handle on the live slot of one scan
pub struct SubscriberSlot {
    scan_id: String,
    id: u64,
    cancelled: watch::Receiver<bool>,
    live: Arc<Mutex<HashMap<String, (u64, watch::Sender<bool>)>>>,
}

impl SubscriberSlot {
    /// Whether a newer subscriber preempted this one
    pub fn is_preempted(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolve when this subscriber is preempted
    pub async fn preempted(&mut self) {
        // A closed channel also means the slot is gone
        while !*self.cancelled.borrow() {
            if self.cancelled.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for SubscriberSlot {
    fn drop(&mut self) {
        let mut live = self.live.lock().unwrap();
        if let Some((current_id, _)) = live.get(&self.scan_id) {
            if *current_id == self.id {
                live.remove(&self.scan_id);
            }
        }
    }
}

/// Wrap an event channel with idle keepalive ticks
///
/// If no event arrives for `interval`, a `keepalive` tick is forwarded
/// instead. Ticks carry `event_seq = 0` and are never persisted. Event
/// order is preserved.
pub fn with_keepalive(
    scan_id: String,
    mut events: mpsc::Receiver<ScanEvent>,
    interval: Duration,
) -> mpsc::Receiver<ScanEvent> {
    let (tx, out) = mpsc::channel(32);
    tokio::spawn(async move {
        loop {
            match tokio::time::timeout(interval, events.recv()).await {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let tick = ScanEvent::new(scan_id.clone(), ScanEventKind::Keepalive);
                    if tx.send(tick).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_subscriber_preempts_first() {
        let registry = SubscriberRegistry::new();
        let first = registry.claim("s1");
        assert!(!first.is_preempted());

        let second = registry.claim("s1");
        assert!(first.is_preempted());
        assert!(!second.is_preempted());
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_independent_scans_do_not_interfere() {
        let registry = SubscriberRegistry::new();
        let a = registry.claim("s1");
        let b = registry.claim("s2");
        assert!(!a.is_preempted());
        assert!(!b.is_preempted());
        assert_eq!(registry.live_count(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_only_own_slot() {
        let registry = SubscriberRegistry::new();
        let first = registry.claim("s1");
        let second = registry.claim("s1");
        // The preempted slot must not evict its successor
        drop(first);
        assert_eq!(registry.live_count(), 1);
        drop(second);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_preempted_resolves() {
        let registry = SubscriberRegistry::new();
        let mut first = registry.claim("s1");
        let waiter = tokio::spawn(async move {
            first.preempted().await;
        });
        tokio::task::yield_now().await;
        let _second = registry.claim("s1");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("preemption must resolve the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_on_idle_stream() {
        let (tx, rx) = mpsc::channel(8);
        let mut wrapped = with_keepalive("s1".to_string(), rx, Duration::from_millis(20));

        // Idle: the first delivery is a keepalive tick
        let tick = wrapped.recv().await.unwrap();
        assert_eq!(tick.label(), "keepalive");
        assert_eq!(tick.event_seq, 0);

        // A real event passes through; further idle ticks may interleave
        tx.send(ScanEvent::new("s1", ScanEventKind::MultiStart))
            .await
            .unwrap();
        let event = loop {
            let e = wrapped.recv().await.unwrap();
            if e.label() != "keepalive" {
                break e;
            }
        };
        assert_eq!(event.label(), "multiStart");

        drop(tx);
        while let Some(e) = wrapped.recv().await {
            assert_eq!(e.label(), "keepalive");
        }
    }

    #[tokio::test]
    async fn test_no_keepalive_when_events_flow() {
        let (tx, rx) = mpsc::channel(8);
        let mut wrapped = with_keepalive("s1".to_string(), rx, Duration::from_millis(500));

        for _ in 0..3 {
            tx.send(ScanEvent::new("s1", ScanEventKind::Keepalive))
                .await
                .unwrap();
        }
        drop(tx);

        let mut labels = Vec::new();
        while let Some(event) = wrapped.recv().await {
            labels.push(event.label());
        }
        assert_eq!(labels.len(), 3);
    }
}

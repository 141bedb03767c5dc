use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Kinds of user interaction that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerMove,
    PointerDown,
    KeyPress,
    Scroll,
    Touch,
}

impl ActivityKind {
    /// Signals the inactivity monitor listens to.
    pub const TRACKED: [ActivityKind; 5] = [
        ActivityKind::PointerMove,
        ActivityKind::PointerDown,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::Touch,
    ];
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::PointerMove => "pointer-move",
            ActivityKind::PointerDown => "pointer-down",
            ActivityKind::KeyPress => "key-press",
            ActivityKind::Scroll => "scroll",
            ActivityKind::Touch => "touch",
        };
        f.write_str(name)
    }
}

pub type ActivityCallback = Arc<dyn Fn(ActivityKind) + Send + Sync>;

/// Something that reports user interaction.
pub trait ActivitySource: Send + Sync {
    /// Call `callback` for each signal of one of `kinds` until the subscription is dropped.
    fn on_activity(&self, kinds: &[ActivityKind], callback: ActivityCallback) -> Subscription;
}

/// Registered activity listener. Detached on `unsubscribe()` or drop.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

struct Listener {
    kinds: Vec<ActivityKind>,
    callback: ActivityCallback,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

/// In-process activity source: the UI layer calls `record` for each input event.
#[derive(Clone, Default)]
pub struct ActivityHub {
    inner: Arc<HubInner>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal to every listener subscribed to its kind.
    pub fn record(&self, kind: ActivityKind) {
        // Callbacks run outside the lock so they may subscribe or unsubscribe
        let callbacks: Vec<ActivityCallback> = {
            let listeners = self.inner.listeners.lock().unwrap_or_else(|p| p.into_inner());
            listeners
                .values()
                .filter(|l| l.kinds.contains(&kind))
                .map(|l| Arc::clone(&l.callback))
                .collect()
        };

        for callback in callbacks {
            callback(kind);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }
}

impl ActivitySource for ActivityHub {
    fn on_activity(&self, kinds: &[ActivityKind], callback: ActivityCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(
                id,
                Listener {
                    kinds: kinds.to_vec(),
                    callback,
                },
            );

        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.listeners
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> ActivityCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_: ActivityKind| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_record_reaches_matching_listeners() {
        let hub = ActivityHub::new();
        let keys = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let _keys_sub = hub.on_activity(&[ActivityKind::KeyPress], counter_callback(&keys));
        let _all_sub = hub.on_activity(&ActivityKind::TRACKED, counter_callback(&all));

        hub.record(ActivityKind::KeyPress);
        hub.record(ActivityKind::Scroll);

        assert_eq!(keys.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_detaches_listener() {
        let hub = ActivityHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = hub.on_activity(&ActivityKind::TRACKED, counter_callback(&count));
        assert_eq!(hub.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(hub.listener_count(), 0);

        hub.record(ActivityKind::Touch);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropping_subscription_detaches_listener() {
        let hub = ActivityHub::new();
        {
            let _sub = hub.on_activity(&ActivityKind::TRACKED, Arc::new(|_: ActivityKind| {}));
            assert_eq!(hub.listener_count(), 1);
        }
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_hub_is_harmless() {
        let hub = ActivityHub::new();
        let sub = hub.on_activity(&ActivityKind::TRACKED, Arc::new(|_: ActivityKind| {}));
        drop(hub);
        sub.unsubscribe();
    }

    #[test]
    fn test_activity_kind_display() {
        assert_eq!(ActivityKind::KeyPress.to_string(), "key-press");
        assert_eq!(ActivityKind::PointerMove.to_string(), "pointer-move");
    }
}

//! Readiness event fabric.
//!
//! Publish/subscribe for the coordinator's page-level events. One-shot
//! readiness events are sticky: a subscriber attaching after the event
//! has fired receives an immediate callback, an earlier subscriber is
//! queued and invoked exactly once, and a duplicate emit is discarded so
//! readiness stays monotonic.
//!
//! A bounded polling probe backs subscribers that cannot rely on the
//! subscription having been wired before the event fired; the probe
//! shares its callback slot with the subscription, so whichever path runs
//! first consumes it and the other goes quiet.

use crate::engine::EngineSource;
use crate::surface::SurfaceRef;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Event families emitted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EngineReady,
    SurfaceReady,
    InitializationFailed,
    WidgetReady,
}

impl EventKind {
    /// One-shot readiness events are recorded sticky; failure events may
    /// repeat across retries.
    fn is_sticky(self) -> bool {
        !matches!(self, EventKind::InitializationFailed)
    }
}

/// Subscription routing key: an event family, scoped to a canvas id where
/// the family is per-canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    kind: EventKind,
    id: Option<String>,
}

impl EventKey {
    pub fn engine_ready() -> Self {
        Self {
            kind: EventKind::EngineReady,
            id: None,
        }
    }

    pub fn surface_ready(id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::SurfaceReady,
            id: Some(id.into()),
        }
    }

    pub fn initialization_failed(id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::InitializationFailed,
            id: Some(id.into()),
        }
    }

    pub fn widget_ready(id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::WidgetReady,
            id: Some(id.into()),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Structured page-level events.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    EngineReady {
        source: EngineSource,
    },
    SurfaceReady {
        id: String,
        surface: SurfaceRef,
        source: EngineSource,
    },
    InitializationFailed {
        id: String,
        reason: String,
        attempts: u64,
    },
    WidgetReady {
        id: String,
    },
}

impl CoordinatorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CoordinatorEvent::EngineReady { .. } => EventKind::EngineReady,
            CoordinatorEvent::SurfaceReady { .. } => EventKind::SurfaceReady,
            CoordinatorEvent::InitializationFailed { .. } => EventKind::InitializationFailed,
            CoordinatorEvent::WidgetReady { .. } => EventKind::WidgetReady,
        }
    }

    pub fn key(&self) -> EventKey {
        let id = match self {
            CoordinatorEvent::EngineReady { .. } => None,
            CoordinatorEvent::SurfaceReady { id, .. } => Some(id.clone()),
            CoordinatorEvent::InitializationFailed { id, .. } => Some(id.clone()),
            CoordinatorEvent::WidgetReady { id } => Some(id.clone()),
        };
        EventKey {
            kind: self.kind(),
            id,
        }
    }
}

/// A one-shot callback slot shared between the subscription path and a
/// polling probe. Whoever takes it first fires; the empty slot silences
/// the other path.
type OnceSlot = Rc<RefCell<Option<Box<dyn FnOnce(&CoordinatorEvent)>>>>;

struct PollingProbe {
    key: EventKey,
    slot: OnceSlot,
    interval: Duration,
    attempts_left: u32,
    next_due: Instant,
}

#[derive(Default)]
struct FabricInner {
    once: HashMap<EventKey, Vec<OnceSlot>>,
    repeating: HashMap<EventKey, Vec<Box<dyn FnMut(&CoordinatorEvent)>>>,
    sticky: HashMap<EventKey, CoordinatorEvent>,
    probes: Vec<PollingProbe>,
}

/// The event fabric. Clonable handle over shared subscription state.
#[derive(Clone, Default)]
pub struct EventFabric {
    inner: Rc<RefCell<FabricInner>>,
}

impl EventFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe once. Fires immediately if the event already happened,
    /// otherwise exactly once when it does.
    pub fn once(&self, key: EventKey, callback: impl FnOnce(&CoordinatorEvent) + 'static) {
        let already = self.inner.borrow().sticky.get(&key).cloned();
        match already {
            Some(event) => callback(&event),
            None => {
                let slot: OnceSlot = Rc::new(RefCell::new(Some(Box::new(callback))));
                self.inner.borrow_mut().once.entry(key).or_default().push(slot);
            }
        }
    }

    /// Subscribe once, with a bounded polling fallback that checks the
    /// sticky store every `interval` for up to `max_attempts` attempts.
    /// The probe stops as soon as the event fires through either path.
    pub fn once_with_polling(
        &self,
        key: EventKey,
        callback: impl FnOnce(&CoordinatorEvent) + 'static,
        now: Instant,
        interval: Duration,
        max_attempts: u32,
    ) {
        let already = self.inner.borrow().sticky.get(&key).cloned();
        if let Some(event) = already {
            callback(&event);
            return;
        }
        let slot: OnceSlot = Rc::new(RefCell::new(Some(Box::new(callback))));
        let mut inner = self.inner.borrow_mut();
        inner.once.entry(key.clone()).or_default().push(slot.clone());
        inner.probes.push(PollingProbe {
            key,
            slot,
            interval,
            attempts_left: max_attempts,
            next_due: now + interval,
        });
    }

    /// Subscribe to every future emit of an event family.
    pub fn on(&self, key: EventKey, callback: impl FnMut(&CoordinatorEvent) + 'static) {
        self.inner
            .borrow_mut()
            .repeating
            .entry(key)
            .or_default()
            .push(Box::new(callback));
    }

    /// Publish an event. Returns false if a sticky event for the same key
    /// had already fired; the duplicate is discarded.
    pub fn emit(&self, event: CoordinatorEvent) -> bool {
        let key = event.key();
        let (once_subs, mut repeating) = {
            let mut inner = self.inner.borrow_mut();
            if event.kind().is_sticky() {
                if inner.sticky.contains_key(&key) {
                    log::debug!("duplicate {:?} event discarded", event.kind());
                    return false;
                }
                inner.sticky.insert(key.clone(), event.clone());
            }
            (
                inner.once.remove(&key).unwrap_or_default(),
                inner.repeating.remove(&key).unwrap_or_default(),
            )
        };

        // Callbacks run outside the borrow; they may subscribe again.
        for slot in once_subs {
            if let Some(callback) = slot.borrow_mut().take() {
                callback(&event);
            }
        }
        for callback in repeating.iter_mut() {
            callback(&event);
        }

        // Reinstall the repeating handlers ahead of any added during the
        // callbacks.
        if !repeating.is_empty() {
            let mut inner = self.inner.borrow_mut();
            let added = inner.repeating.remove(&key).unwrap_or_default();
            repeating.extend(added);
            inner.repeating.insert(key, repeating);
        }
        true
    }

    /// Advance polling probes. Driven by the host's event loop.
    pub fn tick(&self, now: Instant) {
        let mut due: Vec<(OnceSlot, CoordinatorEvent)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let probes = std::mem::take(&mut inner.probes);
            let mut kept = Vec::with_capacity(probes.len());
            for mut probe in probes {
                if probe.slot.borrow().is_none() {
                    // The subscription path already fired; stop polling.
                    continue;
                }
                if now < probe.next_due {
                    kept.push(probe);
                    continue;
                }
                probe.attempts_left = probe.attempts_left.saturating_sub(1);
                probe.next_due = now + probe.interval;
                if let Some(event) = inner.sticky.get(&probe.key).cloned() {
                    due.push((probe.slot.clone(), event));
                    continue;
                }
                if probe.attempts_left == 0 {
                    log::warn!(
                        "polling fallback for {:?} exhausted its attempts",
                        probe.key.kind()
                    );
                    continue;
                }
                kept.push(probe);
            }
            // Probes registered from inside earlier callbacks stay.
            let added = std::mem::take(&mut inner.probes);
            kept.extend(added);
            inner.probes = kept;
        }
        for (slot, event) in due {
            if let Some(callback) = slot.borrow_mut().take() {
                callback(&event);
            }
        }
    }

    /// Whether a sticky event has fired for this key.
    pub fn has_fired(&self, key: &EventKey) -> bool {
        self.inner.borrow().sticky.contains_key(key)
    }

    /// Forget a sticky event so a later lifecycle (e.g. re-initialization
    /// after disposal) can fire it again.
    pub fn clear_sticky(&self, key: &EventKey) {
        self.inner.borrow_mut().sticky.remove(key);
    }

    #[cfg(test)]
    fn probe_count(&self) -> usize {
        self.inner.borrow().probes.len()
    }
}

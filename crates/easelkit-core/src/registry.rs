//! Surface registry.
//!
//! The singleton map from canvas id to owned surface instance. The
//! in-flight marker is the sole serialization primitive: interleaved
//! requests for the same id observe a strict "first request constructs,
//! later requests attach" order, a per-key mutex without blocking.
//! Cross-id operations are fully independent.

use crate::deferred::Deferred;
use crate::surface::{SharedSurface, SurfaceOptions, SurfaceRef};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Registry errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("construction failed for canvas '{id}': {reason}")]
    Construction { id: String, reason: String },
}

/// One registered canvas.
pub struct RegistryEntry {
    /// Canvas id.
    pub id: String,
    /// The owned surface. The registry holds the only long-lived strong
    /// reference.
    pub surface: SharedSurface,
    /// When the surface was stored.
    pub created_at: Instant,
    /// Options the surface was constructed with. `None` for surfaces
    /// adopted from a raw, out-of-band construction.
    pub options: Option<SurfaceOptions>,
    /// Which code path created it, for diagnostics.
    pub source_tag: String,
}

/// How a `get_or_create` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A live entry already existed.
    Existing,
    /// Another caller's construction was in flight; this caller attached.
    JoinedInFlight,
    /// This caller started the construction.
    Constructing,
}

struct Inner {
    entries: HashMap<String, RegistryEntry>,
    in_flight: HashMap<String, Deferred<SurfaceRef, RegistryError>>,
}

/// Clonable handle to the registry. Mutation happens exclusively through
/// these methods; consumers receive non-owning [`SurfaceRef`]s.
#[derive(Clone)]
pub struct SurfaceRegistry {
    inner: Rc<RefCell<Inner>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Return the surface for `id`, constructing it if needed.
    ///
    /// First caller wins the construction; all concurrent callers receive
    /// its result through the same deferred. A cached entry that fails its
    /// health check is discarded and rebuilt transparently.
    ///
    /// Waiters receive non-owning [`SurfaceRef`]s; the registry keeps the
    /// only long-lived strong reference, so a settled deferred held by a
    /// caller cannot keep a disposed surface alive.
    pub fn get_or_create(
        &self,
        id: &str,
        options: SurfaceOptions,
        source_tag: &str,
        initializer: impl FnOnce(&SurfaceOptions) -> Deferred<SharedSurface, RegistryError>,
        now: Instant,
    ) -> (Deferred<SurfaceRef, RegistryError>, Disposition) {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(entry) = inner.entries.get(id) {
                let health = entry.surface.borrow().health();
                if health.is_alive() {
                    return (
                        Deferred::resolved(SurfaceRef::new(&entry.surface)),
                        Disposition::Existing,
                    );
                }
                log::warn!(
                    "surface for '{id}' failed its health check ({health:?}); discarding and reconstructing"
                );
                inner.entries.remove(id);
            }
            if let Some(pending) = inner.in_flight.get(id) {
                log::debug!("construction for '{id}' already in flight; attaching");
                return (pending.clone(), Disposition::JoinedInFlight);
            }
        }

        let result: Deferred<SurfaceRef, RegistryError> = Deferred::new();
        self.inner
            .borrow_mut()
            .in_flight
            .insert(id.to_string(), result.clone());

        // The initializer runs outside the borrow; it may settle
        // synchronously or much later.
        let construction = initializer(&options);
        let registry = self.clone();
        let result_for_waiters = result.clone();
        let entry_id = id.to_string();
        let entry_tag = source_tag.to_string();
        let entry_options = options;
        construction.subscribe(move |outcome| {
            match outcome {
                Ok(surface) => {
                    let handout = SurfaceRef::new(surface);
                    {
                        let mut inner = registry.inner.borrow_mut();
                        inner.in_flight.remove(&entry_id);
                        inner.entries.insert(
                            entry_id.clone(),
                            RegistryEntry {
                                id: entry_id.clone(),
                                surface: surface.clone(),
                                created_at: now,
                                options: Some(entry_options.clone()),
                                source_tag: entry_tag.clone(),
                            },
                        );
                    }
                    log::info!("surface for '{entry_id}' created by '{entry_tag}'");
                    result_for_waiters.resolve(handout);
                }
                Err(err) => {
                    // No partial state: the marker is cleared so a future
                    // retry can construct afresh.
                    registry.inner.borrow_mut().in_flight.remove(&entry_id);
                    log::error!("construction for '{entry_id}' failed: {err}");
                    result_for_waiters.reject(err.clone());
                }
            }
        });

        (result, Disposition::Constructing)
    }

    /// Register an externally constructed, live surface (the gatekeeper's
    /// adoption path). If a live entry already exists, the existing
    /// surface wins and is returned instead.
    pub fn adopt(
        &self,
        id: &str,
        surface: SharedSurface,
        source_tag: &str,
        now: Instant,
    ) -> SharedSurface {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.entries.get(id) {
            if entry.surface.borrow().health().is_alive() {
                log::debug!("adoption for '{id}': live entry already registered; keeping it");
                return entry.surface.clone();
            }
            inner.entries.remove(id);
        }
        log::info!("adopted pre-existing surface for '{id}' from '{source_tag}'");
        inner.entries.insert(
            id.to_string(),
            RegistryEntry {
                id: id.to_string(),
                surface: surface.clone(),
                created_at: now,
                options: None,
                source_tag: source_tag.to_string(),
            },
        );
        surface
    }

    /// Non-owning reference to a registered surface.
    pub fn get(&self, id: &str) -> Option<SurfaceRef> {
        self.inner
            .borrow()
            .entries
            .get(id)
            .map(|entry| SurfaceRef::new(&entry.surface))
    }

    /// Whether an entry exists for `id` (live or not).
    pub fn contains(&self, id: &str) -> bool {
        self.inner.borrow().entries.contains_key(id)
    }

    /// Ids with a live registered surface.
    pub fn live_ids(&self) -> Vec<String> {
        self.inner
            .borrow()
            .entries
            .values()
            .filter(|e| e.surface.borrow().health().is_alive())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Ids with a construction currently in flight.
    pub fn in_flight_ids(&self) -> Vec<String> {
        self.inner.borrow().in_flight.keys().cloned().collect()
    }

    /// Whether any live surface is registered.
    pub fn has_any_surface(&self) -> bool {
        !self.live_ids().is_empty()
    }

    /// Release the surface for `id`. The entry is removed and the
    /// registry's strong reference dropped, so outstanding non-owning
    /// references die and no later call can return the disposed instance.
    pub fn dispose(&self, id: &str) -> bool {
        let entry = self.inner.borrow_mut().entries.remove(id);
        match entry {
            Some(entry) => {
                entry.surface.borrow_mut().dispose();
                log::info!("disposed surface for '{id}'");
                true
            }
            None => false,
        }
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

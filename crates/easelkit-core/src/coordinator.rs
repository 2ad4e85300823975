//! Canvas lifecycle coordinator.
//!
//! The facade the page actually talks to: it wires the readiness broker,
//! the surface registry, the construction gatekeeper and the event fabric
//! so that exactly one live surface exists per canvas id no matter how
//! many independent code paths ask for one, and in whatever order the
//! engine's loading strategies land.

use crate::deferred::Deferred;
use crate::engine::broker::{EngineBroker, FallbackFactory};
use crate::engine::bundled::{BundledLoader, ModuleCache};
use crate::engine::network::{NetworkLoadHandle, NetworkLoader};
use crate::engine::{EngineHandle, EngineSource};
use crate::events::{CoordinatorEvent, EventFabric, EventKey};
use crate::gatekeeper;
use crate::registry::{Disposition, RegistryError, SurfaceRegistry};
use crate::surface::{SharedSurface, SurfaceOptions, SurfaceRef};
use peniko::Color;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Coordinator errors. Everything else in the taxonomy self-heals before
/// reaching a caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("initialization failed for canvas '{id}': {reason}")]
    ConstructionFailed { id: String, reason: String },
    #[error("coordinator is in failed state: {0}")]
    Fatal(String),
}

/// Tunables for engine resolution and the polling fallback.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Overall budget for engine resolution.
    pub engine_budget: Duration,
    /// Deadline for the bundled module-cache scan.
    pub bundled_timeout: Duration,
    /// Deadline for the hosted-copy load.
    pub network_timeout: Duration,
    /// Interval of the event-fabric polling fallback.
    pub poll_interval: Duration,
    /// Attempt cap of the polling fallback.
    pub max_poll_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            engine_budget: Duration::from_secs(5),
            bundled_timeout: Duration::from_millis(250),
            network_timeout: Duration::from_secs(4),
            poll_interval: Duration::from_millis(200),
            max_poll_attempts: 25,
        }
    }
}

/// Construction request options.
#[derive(Debug, Clone)]
pub struct CanvasOptions {
    /// Logical canvas id.
    pub id: String,
    /// Width in logical pixels.
    pub width: f64,
    /// Height in logical pixels.
    pub height: f64,
    /// Background color.
    pub background_color: Color,
    /// Which code path is asking, for diagnostics.
    pub source: String,
}

impl CanvasOptions {
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            background_color: Color::WHITE,
            source: "unspecified".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_background_color(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    fn surface_options(&self) -> SurfaceOptions {
        let rgba = self.background_color.to_rgba8();
        SurfaceOptions::new(self.id.clone(), self.width, self.height)
            .with_background([rgba.r, rgba.g, rgba.b, rgba.a])
    }
}

/// A satisfied construction request.
#[derive(Clone)]
pub struct CanvasInit {
    /// Non-owning reference to the sole surface for the requested id.
    /// The registry keeps the only strong reference; upgrade to use it,
    /// or re-query through [`CanvasCoordinator::get_canvas`] later.
    pub surface: SurfaceRef,
    /// Whether a live surface already existed for the id.
    pub is_existing: bool,
    /// Human-readable outcome, for diagnostics.
    pub message: String,
}

impl fmt::Debug for CanvasInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasInit")
            .field("id", &self.surface.id())
            .field("is_existing", &self.is_existing)
            .field("message", &self.message)
            .finish()
    }
}

/// Snapshot of coordinator state.
#[derive(Debug, Clone)]
pub struct CoordinatorStatus {
    /// Whether the gatekeeper has been installed over a resolved engine.
    pub is_initialized: bool,
    /// Whether engine resolution succeeded.
    pub engine_ready: bool,
    /// Canvas ids with a construction currently in flight.
    pub in_progress: Vec<String>,
    /// Constructions actually started, across all ids.
    pub attempts: u64,
    /// Every loading source tried so far, in order.
    pub sources: Vec<EngineSource>,
    /// Whether any live surface is registered.
    pub has_surface: bool,
}

struct CoordState {
    config: CoordinatorConfig,
    attempts: u64,
    gated: Option<EngineHandle>,
    banner: Option<String>,
}

/// The coordinator. Clonable service handle; pass clones to consumers at
/// construction time instead of reaching for ambient globals.
#[derive(Clone)]
pub struct CanvasCoordinator {
    state: Rc<RefCell<CoordState>>,
    broker: EngineBroker,
    registry: SurfaceRegistry,
    fabric: EventFabric,
}

impl CanvasCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_broker(config, EngineBroker::new())
    }

    /// Build with a custom stub factory, for embedders shipping their own
    /// degraded-mode engine.
    pub fn with_fallback_factory(config: CoordinatorConfig, factory: FallbackFactory) -> Self {
        Self::with_broker(config, EngineBroker::with_fallback_factory(factory))
    }

    fn with_broker(config: CoordinatorConfig, broker: EngineBroker) -> Self {
        Self {
            state: Rc::new(RefCell::new(CoordState {
                config,
                attempts: 0,
                gated: None,
                banner: None,
            })),
            broker,
            registry: SurfaceRegistry::new(),
            fabric: EventFabric::new(),
        }
    }

    /// Register the bundled module cache as the highest-priority loading
    /// strategy. Must happen before the first construction request.
    pub fn register_bundled_cache(&self, cache: ModuleCache) {
        let timeout = self.state.borrow().config.bundled_timeout;
        self.broker
            .push_strategy(Box::new(BundledLoader::new(cache)), timeout);
    }

    /// Register the hosted-copy loading strategy; the returned handle is
    /// completed by whatever transport fetches the engine.
    pub fn register_network_loader(&self) -> NetworkLoadHandle {
        let timeout = self.state.borrow().config.network_timeout;
        let (loader, handle) = NetworkLoader::new();
        self.broker.push_strategy(Box::new(loader), timeout);
        handle
    }

    /// Request the surface for `options.id`, creating it if needed.
    ///
    /// Any number of interleaved calls for the same id resolve to the
    /// identical surface instance, and the underlying construction runs
    /// exactly once.
    pub fn initialize_canvas(
        &self,
        options: CanvasOptions,
        now: Instant,
    ) -> Deferred<CanvasInit, CoordinatorError> {
        if let Some(banner) = self.state.borrow().banner.clone() {
            return Deferred::rejected(CoordinatorError::Fatal(banner));
        }

        let id = options.id.clone();
        log::debug!("initializeCanvas('{id}') requested by '{}'", options.source);

        let coord = self.clone();
        let (construction, disposition) = self.registry.get_or_create(
            &id,
            options.surface_options(),
            &options.source,
            move |opts| coord.construct_when_engine_ready(opts.clone(), now),
            now,
        );

        if disposition == Disposition::Constructing {
            // A fresh construction obsoletes any previously recorded
            // readiness for this id (stale-entry self-heal keeps the same
            // id but a new surface).
            self.fabric.clear_sticky(&EventKey::surface_ready(&id));
            self.state.borrow_mut().attempts += 1;

            // One failure event per construction, however many callers
            // attach to it.
            let coord = self.clone();
            let failed_id = id.clone();
            construction.subscribe(move |outcome| {
                if let Err(err) = outcome {
                    let attempts = coord.state.borrow().attempts;
                    coord.fabric.emit(CoordinatorEvent::InitializationFailed {
                        id: failed_id.clone(),
                        reason: err.to_string(),
                        attempts,
                    });
                }
            });
        }

        let out: Deferred<CanvasInit, CoordinatorError> = Deferred::new();
        let is_existing = disposition == Disposition::Existing;
        let message = match disposition {
            Disposition::Existing => "existing surface returned",
            Disposition::JoinedInFlight => "attached to in-flight construction",
            Disposition::Constructing => "surface created",
        }
        .to_string();

        let coord = self.clone();
        let out_for_waiters = out.clone();
        construction.subscribe(move |outcome| match outcome {
            Ok(handout) => {
                let source = coord
                    .broker
                    .resolved_source()
                    .unwrap_or(EngineSource::FallbackStub);
                coord.fabric.emit(CoordinatorEvent::SurfaceReady {
                    id: handout.id().to_string(),
                    surface: handout.clone(),
                    source,
                });
                out_for_waiters.resolve(CanvasInit {
                    surface: handout.clone(),
                    is_existing,
                    message: message.clone(),
                });
            }
            Err(err) => {
                let fatal = coord.state.borrow().banner.clone();
                out_for_waiters.reject(match fatal {
                    Some(banner) => CoordinatorError::EngineUnavailable(banner),
                    None => CoordinatorError::ConstructionFailed {
                        id: id.clone(),
                        reason: err.to_string(),
                    },
                });
            }
        });
        out
    }

    /// The registry initializer: waits for engine readiness, then runs
    /// one raw construction. Registry bookkeeping belongs to the caller's
    /// `get_or_create`, so the raw constructor is used here rather than
    /// the gated wrapper.
    fn construct_when_engine_ready(
        &self,
        options: SurfaceOptions,
        now: Instant,
    ) -> Deferred<SharedSurface, RegistryError> {
        let result: Deferred<SharedSurface, RegistryError> = Deferred::new();
        let budget = self.state.borrow().config.engine_budget;
        let coord = self.clone();
        let result_out = result.clone();
        self.broker
            .ensure_ready(now, budget)
            .subscribe(move |outcome| match outcome {
                Ok(handle) => {
                    coord.note_engine_ready(handle);
                    match handle.engine.construct_surface(&options) {
                        Ok(surface) => {
                            result_out.resolve(surface);
                        }
                        Err(err) => {
                            result_out.reject(RegistryError::Construction {
                                id: options.id.clone(),
                                reason: err.to_string(),
                            });
                        }
                    }
                }
                Err(err) => {
                    coord.enter_failed_state(err.to_string());
                    result_out.reject(RegistryError::Construction {
                        id: options.id.clone(),
                        reason: err.to_string(),
                    });
                }
            });
        result
    }

    /// Install the gatekeeper and announce readiness, exactly once no
    /// matter how many paths resolve the engine.
    fn note_engine_ready(&self, handle: &EngineHandle) {
        let announce = {
            let mut state = self.state.borrow_mut();
            if state.gated.is_none() {
                state.gated = Some(gatekeeper::install(handle, &self.registry));
                true
            } else {
                false
            }
        };
        if announce {
            self.fabric.emit(CoordinatorEvent::EngineReady {
                source: handle.source,
            });
        }
    }

    fn enter_failed_state(&self, reason: String) {
        let mut state = self.state.borrow_mut();
        if state.banner.is_none() {
            log::error!("entering error-banner mode: {reason}");
            state.banner = Some(reason);
        }
    }

    /// Non-owning reference to the surface for `id`, if registered.
    pub fn get_canvas(&self, id: &str) -> Option<SurfaceRef> {
        self.registry.get(id)
    }

    /// The gated engine handle, for legacy integrations that insist on
    /// calling a constructor directly. Present once the engine resolved.
    pub fn engine_handle(&self) -> Option<EngineHandle> {
        self.state.borrow().gated.clone()
    }

    /// Bring a surface constructed before gatekeeper installation under
    /// registry ownership.
    pub fn adopt_surface(
        &self,
        id: &str,
        surface: SharedSurface,
        source_tag: &str,
        now: Instant,
    ) -> SharedSurface {
        let kept = gatekeeper::adopt_raw_surface(&self.registry, id, surface, source_tag, now);
        if let Some(source) = self.broker.resolved_source() {
            self.fabric.emit(CoordinatorEvent::SurfaceReady {
                id: id.to_string(),
                surface: SurfaceRef::new(&kept),
                source,
            });
        }
        kept
    }

    /// Release the surface for `id` and forget its readiness events so a
    /// re-initialization runs a full lifecycle.
    pub fn dispose(&self, id: &str) -> bool {
        let disposed = self.registry.dispose(id);
        if disposed {
            self.fabric.clear_sticky(&EventKey::surface_ready(id));
            self.fabric.clear_sticky(&EventKey::widget_ready(id));
        }
        disposed
    }

    /// Global status snapshot.
    pub fn get_status(&self) -> CoordinatorStatus {
        let state = self.state.borrow();
        CoordinatorStatus {
            is_initialized: state.gated.is_some(),
            engine_ready: self.broker.is_ready(),
            in_progress: self.registry.in_flight_ids(),
            attempts: state.attempts,
            sources: self.broker.sources_tried(),
            has_surface: self.registry.has_any_surface(),
        }
    }

    /// The single user-visible failure: set only when even the fallback
    /// stub could not be constructed.
    pub fn degraded_banner(&self) -> Option<String> {
        self.state.borrow().banner.clone()
    }

    /// The event fabric, for subscribers and for collaborators (such as
    /// the editor widget) that publish their own readiness.
    pub fn events(&self) -> EventFabric {
        self.fabric.clone()
    }

    /// Subscribe to every future emit of an event family.
    pub fn on_event(&self, key: EventKey, callback: impl FnMut(&CoordinatorEvent) + 'static) {
        self.fabric.on(key, callback);
    }

    /// Subscribe once to a page-level event. Fires immediately if the
    /// event already happened.
    pub fn once_event(&self, key: EventKey, callback: impl FnOnce(&CoordinatorEvent) + 'static) {
        self.fabric.once(key, callback);
    }

    /// Subscribe once to a page-level event, with the configured bounded
    /// polling fallback.
    pub fn once_event_with_polling(
        &self,
        key: EventKey,
        callback: impl FnOnce(&CoordinatorEvent) + 'static,
        now: Instant,
    ) {
        let (interval, attempts) = {
            let config = &self.state.borrow().config;
            (config.poll_interval, config.max_poll_attempts)
        };
        self.fabric
            .once_with_polling(key, callback, now, interval, attempts);
    }

    /// Drive deadlines and polling. Call from the host's frame or timer
    /// loop.
    pub fn tick(&self, now: Instant) {
        self.broker.tick(now);
        self.fabric.tick(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bundled::ModuleExport;
    use crate::engine::fallback::FallbackEngine;
    use crate::engine::{Engine, EngineError};
    use std::cell::Cell;

    struct EngineExport(Rc<dyn Engine>);
    impl ModuleExport for EngineExport {
        fn as_engine(&self) -> Option<Rc<dyn Engine>> {
            Some(self.0.clone())
        }
    }

    fn bundled_coordinator() -> CanvasCoordinator {
        let coordinator = CanvasCoordinator::new(CoordinatorConfig::default());
        let mut cache = ModuleCache::new();
        cache.insert(
            "render-engine",
            Rc::new(EngineExport(Rc::new(FallbackEngine::new()))),
        );
        coordinator.register_bundled_cache(cache);
        coordinator
    }

    fn unwrap_init(d: &Deferred<CanvasInit, CoordinatorError>) -> CanvasInit {
        d.peek().expect("settled").expect("resolved")
    }

    #[test]
    fn three_back_to_back_requests_share_one_construction() {
        let coordinator = CanvasCoordinator::new(CoordinatorConfig::default());
        let network = coordinator.register_network_loader();

        let ready_events = Rc::new(Cell::new(0));
        let counter = ready_events.clone();
        coordinator.events().on(EventKey::surface_ready("c1"), move |_| {
            counter.set(counter.get() + 1)
        });

        let t0 = Instant::now();
        let options = || CanvasOptions::new("c1", 800.0, 600.0);
        let first = coordinator.initialize_canvas(options(), t0);
        let second = coordinator.initialize_canvas(options(), t0);
        let third = coordinator.initialize_canvas(options(), t0);

        assert!(!first.is_settled());
        assert_eq!(coordinator.get_status().in_progress, vec!["c1".to_string()]);

        network.complete(Rc::new(FallbackEngine::new()));
        coordinator.tick(t0 + Duration::from_millis(50));

        let a = unwrap_init(&first);
        let b = unwrap_init(&second);
        let c = unwrap_init(&third);
        let shared = a.surface.upgrade().unwrap();
        assert!(Rc::ptr_eq(&shared, &b.surface.upgrade().unwrap()));
        assert!(Rc::ptr_eq(&shared, &c.surface.upgrade().unwrap()));
        assert!(!a.is_existing);

        assert_eq!(ready_events.get(), 1, "exactly one surfaceReady for c1");
        let status = coordinator.get_status();
        assert_eq!(status.attempts, 1);
        assert!(status.engine_ready);
        assert!(status.has_surface);
        assert!(status.in_progress.is_empty());
    }

    #[test]
    fn bundled_engine_resolves_synchronously() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();

        let first = coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0);
        let init = unwrap_init(&first);
        assert!(!init.is_existing);
        assert_eq!(init.surface.id(), "c1");

        let second = coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0);
        let again = unwrap_init(&second);
        assert!(again.is_existing);
        assert!(Rc::ptr_eq(
            &init.surface.upgrade().unwrap(),
            &again.surface.upgrade().unwrap()
        ));
        assert_eq!(coordinator.get_status().attempts, 1);
    }

    #[test]
    fn engine_ready_fires_once_and_reaches_late_subscribers() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();
        coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0);
        coordinator.initialize_canvas(CanvasOptions::new("c2", 800.0, 600.0), t0);

        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        coordinator.events().once(EventKey::engine_ready(), move |event| {
            if let CoordinatorEvent::EngineReady { source } = event {
                s.set(Some(*source));
            }
        });
        assert_eq!(seen.get(), Some(EngineSource::Bundled));
        assert!(coordinator.get_status().is_initialized);
    }

    #[test]
    fn legacy_constructor_calls_share_the_coordinator_surface() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();
        let init =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));

        // A legacy script grabs the (gated) engine handle and constructs
        // directly; it must receive the registered surface.
        let handle = coordinator.engine_handle().expect("engine resolved");
        assert!(handle.engine.is_gated());
        let raw = handle
            .engine
            .construct_surface(&SurfaceOptions::new("c1", 800.0, 600.0))
            .unwrap();
        assert!(Rc::ptr_eq(&raw, &init.surface.upgrade().unwrap()));
        assert_eq!(coordinator.get_status().attempts, 1);
    }

    #[test]
    fn fatal_stub_failure_sets_banner_and_fails_fast() {
        let coordinator = CanvasCoordinator::with_fallback_factory(
            CoordinatorConfig::default(),
            Box::new(|| Err(EngineError::ResolutionFailed("no memory".to_string()))),
        );

        let failures = Rc::new(Cell::new(0));
        let f = failures.clone();
        coordinator
            .events()
            .on(EventKey::initialization_failed("c1"), move |_| {
                f.set(f.get() + 1)
            });

        let t0 = Instant::now();
        let first = coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0);
        assert!(matches!(
            first.peek(),
            Some(Err(CoordinatorError::EngineUnavailable(_)))
        ));
        assert_eq!(failures.get(), 1);
        assert!(coordinator.degraded_banner().is_some());

        // Banner mode fails fast without touching the registry.
        let second = coordinator.initialize_canvas(CanvasOptions::new("c2", 800.0, 600.0), t0);
        assert!(matches!(
            second.peek(),
            Some(Err(CoordinatorError::Fatal(_)))
        ));
        assert!(!coordinator.get_status().has_surface);
    }

    #[test]
    fn coalesced_callers_share_one_failure_event() {
        let coordinator = CanvasCoordinator::with_fallback_factory(
            CoordinatorConfig::default(),
            Box::new(|| Err(EngineError::ResolutionFailed("no memory".to_string()))),
        );
        let _network = coordinator.register_network_loader();

        let failures = Rc::new(Cell::new(0));
        let f = failures.clone();
        coordinator
            .events()
            .on(EventKey::initialization_failed("c1"), move |_| {
                f.set(f.get() + 1)
            });

        let t0 = Instant::now();
        let options = || CanvasOptions::new("c1", 800.0, 600.0);
        let first = coordinator.initialize_canvas(options(), t0);
        let second = coordinator.initialize_canvas(options(), t0);
        let third = coordinator.initialize_canvas(options(), t0);
        assert!(!first.is_settled());

        // Budget exhausted, network never answered, stub factory refuses.
        coordinator.tick(t0 + Duration::from_secs(5));
        assert!(matches!(first.peek(), Some(Err(_))));
        assert!(matches!(second.peek(), Some(Err(_))));
        assert!(matches!(third.peek(), Some(Err(_))));
        assert_eq!(failures.get(), 1, "one construction, one failure event");
    }

    #[test]
    fn self_heal_refreshes_the_sticky_ready_event() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();
        let init =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));

        // Out-of-band teardown followed by a transparent reconstruction.
        init.surface.upgrade().unwrap().borrow_mut().dispose();
        let healed =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));

        // A late subscriber must see the replacement, not the payload
        // recorded before the heal.
        let seen: Rc<RefCell<Option<SurfaceRef>>> = Rc::new(RefCell::new(None));
        let s = seen.clone();
        coordinator
            .events()
            .once(EventKey::surface_ready("c1"), move |event| {
                if let CoordinatorEvent::SurfaceReady { surface, .. } = event {
                    *s.borrow_mut() = Some(surface.clone());
                }
            });
        let late = seen.borrow().clone().expect("sticky event delivered");
        assert!(late.is_alive());
        assert!(Rc::ptr_eq(
            &late.upgrade().unwrap(),
            &healed.surface.upgrade().unwrap()
        ));
    }

    #[test]
    fn dispose_invalidates_and_allows_a_full_new_lifecycle() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();

        let ready_events = Rc::new(Cell::new(0));
        let counter = ready_events.clone();
        coordinator.events().on(EventKey::surface_ready("c1"), move |_| {
            counter.set(counter.get() + 1)
        });

        let init =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));
        let non_owning = coordinator.get_canvas("c1").unwrap();
        assert_eq!(ready_events.get(), 1);

        assert!(coordinator.dispose("c1"));
        assert!(!non_owning.is_alive());
        // The registry held the only strong reference; every outstanding
        // handle, the settled init result included, is now dead.
        assert!(init.surface.upgrade().is_none());
        assert!(coordinator.get_canvas("c1").is_none());

        let fresh =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));
        assert!(!fresh.is_existing);
        assert!(fresh.surface.is_alive());
        assert_eq!(ready_events.get(), 2, "new lifecycle announces again");
        assert_eq!(coordinator.get_status().attempts, 2);
    }

    #[test]
    fn stale_surface_is_replaced_transparently() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();
        let init =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));

        // Out-of-band teardown, bypassing the coordinator entirely.
        init.surface.upgrade().unwrap().borrow_mut().dispose();

        let healed =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));
        assert!(healed.surface.is_alive());
        // The discarded entry's strong reference is gone with it.
        assert!(init.surface.upgrade().is_none());
    }

    #[test]
    fn adopted_surface_wins_over_later_requests() {
        let coordinator = bundled_coordinator();
        let t0 = Instant::now();

        let raw: SharedSurface = Rc::new(RefCell::new(crate::surface::BasicSurface::new(
            &SurfaceOptions::new("c1", 640.0, 480.0),
        )));
        let kept = coordinator.adopt_surface("c1", raw.clone(), "legacy-global", t0);
        assert!(Rc::ptr_eq(&kept, &raw));

        let init =
            unwrap_init(&coordinator.initialize_canvas(CanvasOptions::new("c1", 800.0, 600.0), t0));
        assert!(init.is_existing);
        assert!(Rc::ptr_eq(&init.surface.upgrade().unwrap(), &raw));
        assert_eq!(coordinator.get_status().attempts, 0);
    }

    #[test]
    fn status_reflects_idle_coordinator() {
        let coordinator = CanvasCoordinator::new(CoordinatorConfig::default());
        let status = coordinator.get_status();
        assert!(!status.is_initialized);
        assert!(!status.engine_ready);
        assert!(!status.has_surface);
        assert_eq!(status.attempts, 0);
        assert!(status.sources.is_empty());
    }
}

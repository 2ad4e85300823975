//! Engine readiness broker.
//!
//! Races the configured loading strategies, each with an independent
//! deadline, and exposes exactly one monotonic readiness signal with
//! provenance. The first strategy to yield a working constructor wins;
//! losers are abandoned, and a late completion is checked against the
//! recorded resolution and discarded rather than swapped in.

use super::fallback::FallbackEngine;
use super::{Engine, EngineError, EngineHandle, EngineSource};
use crate::deferred::Deferred;
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};
#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// One poll of a loading strategy.
pub enum LoaderPoll {
    /// Still waiting.
    Pending,
    /// The strategy produced a working engine.
    Ready(Rc<dyn Engine>),
    /// The strategy will never produce an engine.
    Failed(String),
}

/// A competing engine-loading strategy.
///
/// Strategies are started together and polled from the broker's tick in
/// priority order until one yields, fails, or runs out its deadline.
pub trait LoaderStrategy {
    fn source(&self) -> EngineSource;

    /// Called once when the race begins.
    fn start(&mut self, now: Instant);

    /// Called on every broker tick while the strategy is racing, and after
    /// resolution so late completions can be observed and discarded.
    fn poll(&mut self, now: Instant) -> LoaderPoll;
}

/// Factory for the last-resort stub engine.
pub type FallbackFactory = Box<dyn Fn() -> Result<Rc<dyn Engine>, EngineError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Racing,
    Won,
    Failed,
    TimedOut,
    /// Completed after another strategy had already won.
    Superseded,
}

struct StrategySlot {
    strategy: Box<dyn LoaderStrategy>,
    timeout: Duration,
    deadline: Option<Instant>,
    state: SlotState,
}

struct BrokerInner {
    slots: Vec<StrategySlot>,
    fallback_factory: FallbackFactory,
    started_at: Option<Instant>,
    overall_deadline: Option<Instant>,
    resolved_source: Option<EngineSource>,
    sources_tried: Vec<EngineSource>,
}

enum TickDecision {
    Nothing,
    Resolve(EngineHandle),
    Reject(EngineError),
}

/// Resolves engine availability from competing loading strategies.
///
/// Clonable handle; the resolution deferred settles at most once per
/// broker lifetime.
#[derive(Clone)]
pub struct EngineBroker {
    inner: Rc<RefCell<BrokerInner>>,
    resolution: Deferred<EngineHandle, EngineError>,
}

impl EngineBroker {
    pub fn new() -> Self {
        Self::with_fallback_factory(Box::new(|| {
            Ok(Rc::new(FallbackEngine::new()) as Rc<dyn Engine>)
        }))
    }

    /// Create a broker with a custom stub factory. Used when the embedder
    /// ships its own degraded-mode engine, and by tests exercising the
    /// fatal path.
    pub fn with_fallback_factory(factory: FallbackFactory) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BrokerInner {
                slots: Vec::new(),
                fallback_factory: factory,
                started_at: None,
                overall_deadline: None,
                resolved_source: None,
                sources_tried: Vec::new(),
            })),
            resolution: Deferred::new(),
        }
    }

    /// Register a strategy with its independent timeout. Must happen
    /// before the race starts; later registrations are ignored.
    pub fn push_strategy(&self, strategy: Box<dyn LoaderStrategy>, timeout: Duration) {
        let mut inner = self.inner.borrow_mut();
        if inner.started_at.is_some() {
            log::warn!(
                "loader strategy '{}' registered after the race started; ignored",
                strategy.source()
            );
            return;
        }
        inner.slots.push(StrategySlot {
            strategy,
            timeout,
            deadline: None,
            state: SlotState::Idle,
        });
    }

    /// Start (or join) engine resolution. Idempotent: every call returns
    /// the same deferred, and only the first call starts the race.
    pub fn ensure_ready(&self, now: Instant, budget: Duration) -> Deferred<EngineHandle, EngineError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.started_at.is_none() {
                inner.started_at = Some(now);
                inner.overall_deadline = Some(now + budget);
                // Reborrow the guard so slots and sources_tried split.
                let inner = &mut *inner;
                for slot in &mut inner.slots {
                    let source = slot.strategy.source();
                    slot.strategy.start(now);
                    slot.deadline = Some(now + slot.timeout.min(budget));
                    slot.state = SlotState::Racing;
                    inner.sources_tried.push(source);
                }
                log::info!(
                    "engine resolution started: {} strategies, budget {:?}",
                    inner.slots.len(),
                    budget
                );
            }
        }
        self.tick(now);
        self.resolution.clone()
    }

    /// Advance deadlines and poll racing strategies. Driven by the host's
    /// event loop through the coordinator.
    pub fn tick(&self, now: Instant) {
        let decision = {
            let mut inner = self.inner.borrow_mut();
            if inner.started_at.is_none() {
                return;
            }
            if inner.resolved_source.is_some() {
                Self::drain_losers(&mut inner, now);
                TickDecision::Nothing
            } else {
                Self::advance_race(&mut inner, now)
            }
        };
        // Settle outside the borrow: resolution subscribers may call back
        // into the broker.
        match decision {
            TickDecision::Nothing => {}
            TickDecision::Resolve(handle) => {
                log::info!("engine ready via {} source", handle.source);
                self.resolution.resolve(handle);
            }
            TickDecision::Reject(err) => {
                log::error!("engine resolution failed fatally: {err}");
                self.resolution.reject(err);
            }
        }
    }

    /// Observe and discard strategy completions that arrive after
    /// resolution.
    fn drain_losers(inner: &mut BrokerInner, now: Instant) {
        for slot in &mut inner.slots {
            if slot.state != SlotState::Racing {
                continue;
            }
            match slot.strategy.poll(now) {
                LoaderPoll::Pending => {}
                LoaderPoll::Ready(_) => {
                    slot.state = SlotState::Superseded;
                    log::debug!(
                        "{} strategy completed after resolution; discarded",
                        slot.strategy.source()
                    );
                }
                LoaderPoll::Failed(reason) => {
                    slot.state = SlotState::Failed;
                    log::debug!("{} strategy failed after resolution: {reason}", slot.strategy.source());
                }
            }
        }
    }

    fn advance_race(inner: &mut BrokerInner, now: Instant) -> TickDecision {
        let overall_passed = inner
            .overall_deadline
            .map(|deadline| now >= deadline)
            .unwrap_or(false);

        for slot in &mut inner.slots {
            if slot.state != SlotState::Racing {
                continue;
            }
            let expired = overall_passed
                || slot.deadline.map(|deadline| now >= deadline).unwrap_or(false);
            if expired {
                slot.state = SlotState::TimedOut;
                log::warn!("{} strategy timed out", slot.strategy.source());
                continue;
            }
            match slot.strategy.poll(now) {
                LoaderPoll::Pending => {}
                LoaderPoll::Ready(engine) => {
                    let source = slot.strategy.source();
                    slot.state = SlotState::Won;
                    inner.resolved_source = Some(source);
                    return TickDecision::Resolve(EngineHandle::new(engine, source, now));
                }
                LoaderPoll::Failed(reason) => {
                    slot.state = SlotState::Failed;
                    log::warn!("{} strategy failed: {reason}", slot.strategy.source());
                }
            }
        }

        let any_racing = inner.slots.iter().any(|s| s.state == SlotState::Racing);
        if any_racing {
            return TickDecision::Nothing;
        }

        // Every real strategy failed or timed out: synthesize the stub.
        inner.sources_tried.push(EngineSource::FallbackStub);
        match (inner.fallback_factory)() {
            Ok(engine) => {
                inner.resolved_source = Some(EngineSource::FallbackStub);
                log::warn!("no real engine available; degrading to fallback stub");
                TickDecision::Resolve(EngineHandle::new(engine, EngineSource::FallbackStub, now))
            }
            Err(err) => TickDecision::Reject(EngineError::ResolutionFailed(format!(
                "fallback stub construction failed: {err}"
            ))),
        }
    }

    /// The readiness deferred. Settles exactly once.
    pub fn resolution(&self) -> Deferred<EngineHandle, EngineError> {
        self.resolution.clone()
    }

    /// Whether the race has started.
    pub fn is_started(&self) -> bool {
        self.inner.borrow().started_at.is_some()
    }

    /// Whether the engine resolved successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.resolution.peek(), Some(Ok(_)))
    }

    /// Source of the winning strategy, if resolved.
    pub fn resolved_source(&self) -> Option<EngineSource> {
        self.inner.borrow().resolved_source
    }

    /// Every source the broker has tried, in order.
    pub fn sources_tried(&self) -> Vec<EngineSource> {
        self.inner.borrow().sources_tried.clone()
    }
}

impl Default for EngineBroker {
    fn default() -> Self {
        Self::new()
    }
}

//! External rendering engine boundary.
//!
//! The engine is whatever provides the surface-construction capability:
//! the real library extracted from a bundled module cache, a hosted copy
//! loaded over the network, or the in-process fallback stub. The broker
//! in [`broker`] decides which one the page actually gets.

pub mod broker;
pub mod bundled;
pub mod fallback;
pub mod network;

use crate::surface::{SharedSurface, SurfaceOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Which loading strategy produced the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSource {
    /// Extracted from an already-loaded bundled module cache.
    Bundled,
    /// Loaded from a hosted copy over the network.
    Network,
    /// The minimal in-process substitute; degraded mode.
    FallbackStub,
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSource::Bundled => write!(f, "bundled"),
            EngineSource::Network => write!(f, "network"),
            EngineSource::FallbackStub => write!(f, "fallback_stub"),
        }
    }
}

/// Engine errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("no loading strategy produced a usable engine within budget")]
    Unavailable,
    #[error("engine resolution failed: {0}")]
    ResolutionFailed(String),
    #[error("surface construction failed: {0}")]
    Construction(String),
}

/// The surface-construction capability.
///
/// Implemented by real engine bindings, by the fallback stub, and by the
/// gatekeeper's wrapper that funnels every call through the registry.
pub trait Engine {
    /// Engine name, for diagnostics.
    fn name(&self) -> &str;

    /// Construct a new rendering surface.
    fn construct_surface(&self, options: &SurfaceOptions) -> Result<SharedSurface, EngineError>;

    /// Whether construction calls on this engine are already funneled
    /// through the registry. The gatekeeper checks this marker so that
    /// racing installation paths never double-wrap.
    fn is_gated(&self) -> bool {
        false
    }
}

/// A resolved reference to the engine.
///
/// Created at most once per coordinator lifetime: availability transitions
/// false to true exactly once and never reverts (the page reloads instead
/// of re-resolving).
#[derive(Clone)]
pub struct EngineHandle {
    /// The construction capability.
    pub engine: Rc<dyn Engine>,
    /// Which strategy won the race.
    pub source: EngineSource,
    /// When resolution happened.
    pub resolved_at: Instant,
}

impl EngineHandle {
    pub fn new(engine: Rc<dyn Engine>, source: EngineSource, now: Instant) -> Self {
        Self {
            engine,
            source,
            resolved_at: now,
        }
    }

    /// Whether the page is running on the degraded stub engine.
    pub fn is_degraded(&self) -> bool {
        self.source == EngineSource::FallbackStub
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .field("source", &self.source)
            .field("gated", &self.engine.is_gated())
            .finish()
    }
}

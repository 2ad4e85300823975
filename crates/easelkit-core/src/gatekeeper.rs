//! Construction gatekeeper.
//!
//! Once the engine is ready, its construction entry point is wrapped so
//! that every caller, including code the coordinator does not control,
//! becomes a caller of the registry. The wrapper implements [`Engine`]
//! itself and carries the `is_gated` marker, so racing installation paths
//! never double-wrap, and a raw construction that slipped through before
//! installation is adopted rather than treated as an error.

use crate::deferred::Deferred;
use crate::engine::{Engine, EngineError, EngineHandle};
use crate::registry::{RegistryError, SurfaceRegistry};
use crate::surface::{SharedSurface, SurfaceOptions};
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// The registry-funneling engine wrapper handed to legacy callers.
pub struct GatedEngine {
    name: String,
    inner: Rc<dyn Engine>,
    registry: SurfaceRegistry,
}

impl Engine for GatedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct_surface(&self, options: &SurfaceOptions) -> Result<SharedSurface, EngineError> {
        let inner = self.inner.clone();
        let (result, disposition) = self.registry.get_or_create(
            &options.id,
            options.clone(),
            "gated-entry-point",
            move |opts| match inner.construct_surface(opts) {
                Ok(surface) => Deferred::resolved(surface),
                Err(err) => Deferred::rejected(RegistryError::Construction {
                    id: opts.id.clone(),
                    reason: err.to_string(),
                }),
            },
            Instant::now(),
        );
        log::debug!(
            "gated construction for '{}' satisfied as {disposition:?}",
            options.id
        );
        match result.peek() {
            Some(Ok(handout)) => handout.upgrade().ok_or_else(|| {
                EngineError::Construction(format!(
                    "surface for '{}' vanished after registration",
                    options.id
                ))
            }),
            Some(Err(err)) => Err(EngineError::Construction(err.to_string())),
            // Only reachable if a joined construction is waiting on work
            // that cannot finish before the engine itself exists; a raw
            // caller holding a gated engine proves the engine exists.
            None => Err(EngineError::Construction(format!(
                "construction for '{}' is still in flight",
                options.id
            ))),
        }
    }

    fn is_gated(&self) -> bool {
        true
    }
}

/// Install the interception layer over an engine handle.
///
/// Idempotent: an already-gated handle is returned unchanged, whichever
/// initialization path gets here first.
pub fn install(handle: &EngineHandle, registry: &SurfaceRegistry) -> EngineHandle {
    if handle.engine.is_gated() {
        log::debug!("gatekeeper already installed; skipping double-wrap");
        return handle.clone();
    }
    log::info!(
        "gatekeeper installed over engine '{}' ({})",
        handle.engine.name(),
        handle.source
    );
    EngineHandle {
        engine: Rc::new(GatedEngine {
            name: format!("gated({})", handle.engine.name()),
            inner: handle.engine.clone(),
            registry: registry.clone(),
        }),
        source: handle.source,
        resolved_at: handle.resolved_at,
    }
}

/// Bring a surface constructed outside the gatekeeper under registry
/// ownership.
///
/// Construction-before-interception is expected: if the id is free the
/// surface is adopted; if a live surface is already registered, that one
/// wins and the raw duplicate is disposed so it cannot linger half-alive.
pub fn adopt_raw_surface(
    registry: &SurfaceRegistry,
    id: &str,
    surface: SharedSurface,
    source_tag: &str,
    now: Instant,
) -> SharedSurface {
    let kept = registry.adopt(id, surface.clone(), source_tag, now);
    if !Rc::ptr_eq(&kept, &surface) {
        log::warn!(
            "raw construction for '{id}' raced an existing registration; disposing the duplicate"
        );
        surface.borrow_mut().dispose();
    }
    kept
}

//! Minimal in-process fallback engine.
//!
//! Used when neither the bundled cache nor the network produces a real
//! engine within budget. Surfaces it constructs honor the full `Surface`
//! contract but render nothing real; dependents can detect degraded mode
//! through [`EngineSource::FallbackStub`](super::EngineSource).

use super::{Engine, EngineError};
use crate::surface::{BasicSurface, SharedSurface, SurfaceOptions};
use std::cell::RefCell;
use std::rc::Rc;

/// The fallback stub engine.
#[derive(Debug, Default)]
pub struct FallbackEngine;

impl FallbackEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for FallbackEngine {
    fn name(&self) -> &str {
        "easelkit-fallback-stub"
    }

    fn construct_surface(&self, options: &SurfaceOptions) -> Result<SharedSurface, EngineError> {
        log::warn!(
            "constructing surface '{}' on the fallback stub engine; rendering is degraded",
            options.id
        );
        Ok(Rc::new(RefCell::new(BasicSurface::new(options))))
    }
}

//! EaselKit demo entry point (native).
//!
//! Drives a whole coordinator lifecycle from the command line: racing
//! loading strategies, three back-to-back initialization requests for the
//! same canvas, widget attachment, a status dump, and disposal.

use easelkit_core::coordinator::{CanvasCoordinator, CanvasOptions, CoordinatorConfig};
use easelkit_core::engine::bundled::{ModuleCache, ModuleExport};
use easelkit_core::engine::{Engine, EngineError};
use easelkit_core::events::EventKey;
use easelkit_core::surface::{BasicSurface, SharedSurface, SurfaceOptions};
use easelkit_widget::EditorWidget;
use kurbo::{Point, Size};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

/// Demo engine shipped inside the "bundled module cache".
struct DemoEngine;

impl Engine for DemoEngine {
    fn name(&self) -> &str {
        "demo-bundled-engine"
    }

    fn construct_surface(&self, options: &SurfaceOptions) -> Result<SharedSurface, EngineError> {
        Ok(Rc::new(RefCell::new(BasicSurface::new(options))))
    }
}

struct DemoExport;

impl ModuleExport for DemoExport {
    fn as_engine(&self) -> Option<Rc<dyn Engine>> {
        Some(Rc::new(DemoEngine))
    }
}

fn main() {
    env_logger::init();
    log::info!("Starting EaselKit demo");

    let coordinator = CanvasCoordinator::new(CoordinatorConfig::default());

    // The engine is already on the "page": the bundled strategy wins the
    // race without touching the network path.
    let mut cache = ModuleCache::new();
    cache.insert("analytics", Rc::new(NoEngineExport));
    cache.insert("render-engine", Rc::new(DemoExport));
    coordinator.register_bundled_cache(cache);
    let _network = coordinator.register_network_loader();

    coordinator
        .events()
        .once(EventKey::engine_ready(), |event| {
            log::info!("engine ready: {event:?}");
        });

    // Three independent page paths ask for the same canvas back to back;
    // only one construction runs.
    let now = Instant::now();
    for source in ["page-init", "legacy-global", "admin-hook"] {
        let options = CanvasOptions::new("main", 1024.0, 768.0).with_source(source);
        coordinator.initialize_canvas(options, now).subscribe(move |outcome| {
            match outcome {
                Ok(init) => log::info!("{source}: {}", init.message),
                Err(err) => log::error!("{source}: {err}"),
            }
        });
    }
    coordinator.tick(Instant::now());

    let widget = EditorWidget::new(coordinator.clone(), "main", 1024.0, 768.0);
    widget.attach(Instant::now());
    widget
        .add_shape(
            easelkit_core::surface::DrawableKind::Rect,
            Point::new(40.0, 40.0),
            Size::new(200.0, 120.0),
        )
        .expect("canvas is attached");
    widget.render().expect("canvas is attached");
    log::info!(
        "design: {}",
        widget.save_design().expect("canvas is attached")
    );

    let status = coordinator.get_status();
    log::info!(
        "status: initialized={} engine_ready={} attempts={} sources={:?} has_surface={}",
        status.is_initialized,
        status.engine_ready,
        status.attempts,
        status.sources,
        status.has_surface
    );

    coordinator.dispose("main");
    log::info!("disposed 'main'; surface present: {}", coordinator.get_canvas("main").is_some());
}

struct NoEngineExport;

impl ModuleExport for NoEngineExport {}
